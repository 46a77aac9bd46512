//! Single-participant fast path: every entry point returns its completion
//! synchronously, copies source to destination byte-for-byte, and leaves
//! no instance behind.

use starling::{CollectiveKind, DataType, ReduceOp, DEFAULT_CQ};

use super::helpers::run_flat;

#[test]
fn test_single_rank_barrier() {
    run_flat(1, |engine, _rank| {
        let done = engine.barrier(1, DEFAULT_CQ, None).unwrap().unwrap();
        assert_eq!(done.kind(), CollectiveKind::Barrier);
        assert_eq!(engine.registry_size(), 0);
    });
}

#[test]
fn test_single_rank_buffer_ops_copy_through() {
    run_flat(1, |engine, _rank| {
        let src: Vec<i32> = vec![3, 1, 4, 1];
        let mut dst = vec![0i32; 4];

        let done = unsafe {
            engine.allreduce(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                4,
                DataType::I32,
                ReduceOp::Sum,
                1,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("single-rank allreduce completes synchronously");
        assert_eq!(done.kind(), CollectiveKind::Allreduce);
        assert_eq!(done.tag(), 1);
        assert_eq!(dst, src);

        let mut dst2 = vec![0i32; 4];
        unsafe {
            engine.allgather(
                dst2.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                4,
                DataType::I32,
                2,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("single-rank allgather completes synchronously");
        assert_eq!(dst2, src);

        let mut dst3 = vec![0i32; 4];
        unsafe {
            engine.gather(
                0,
                dst3.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                4,
                DataType::I32,
                3,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("single-rank gather completes synchronously");
        assert_eq!(dst3, src);

        let mut dst4 = vec![0i32; 4];
        unsafe {
            engine.scatter(
                0,
                dst4.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                4,
                DataType::I32,
                4,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("single-rank scatter completes synchronously");
        assert_eq!(dst4, src);

        assert_eq!(engine.registry_size(), 0);
        assert_eq!(engine.pending_size(), 0);
    });
}

#[test]
fn test_single_rank_remaining_ops() {
    run_flat(1, |engine, _rank| {
        let src: Vec<u8> = vec![7, 8, 9];
        let mut dst = vec![0u8; 3];

        unsafe {
            engine.reduce(
                0,
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                3,
                DataType::U8,
                ReduceOp::Max,
                10,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("synchronous");
        assert_eq!(dst, src);

        let mut dst = vec![0u8; 3];
        unsafe {
            engine.scan(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                3,
                DataType::U8,
                ReduceOp::Sum,
                11,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("synchronous");
        assert_eq!(dst, src);

        let mut dst = vec![0u8; 3];
        unsafe {
            engine.reduce_scatter(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                3,
                DataType::U8,
                ReduceOp::Sum,
                12,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("synchronous");
        assert_eq!(dst, src);

        let mut dst = vec![0u8; 3];
        unsafe {
            engine.alltoall(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                3,
                DataType::U8,
                13,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("synchronous");
        assert_eq!(dst, src);

        let mut dst = vec![0u8; 3];
        unsafe {
            engine.gatherv(
                0,
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                3,
                &[3],
                DataType::U8,
                14,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("synchronous");
        assert_eq!(dst, src);

        let mut dst = vec![0u8; 3];
        unsafe {
            engine.scatterv(
                0,
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                &[3],
                3,
                DataType::U8,
                15,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("synchronous");
        assert_eq!(dst, src);

        let mut dst = vec![0u8; 3];
        unsafe {
            engine.allgatherv(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                &[3],
                DataType::U8,
                16,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("synchronous");
        assert_eq!(dst, src);

        let mut dst = vec![0u8; 3];
        unsafe {
            engine.alltoallv(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                &[3],
                &[3],
                DataType::U8,
                17,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("synchronous");
        assert_eq!(dst, src);

        let mut buf = vec![1u8, 2, 3];
        unsafe {
            engine.bcast(
                0,
                buf.as_mut_ptr() as u64,
                3,
                DataType::U8,
                18,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap()
        .expect("synchronous");
        assert_eq!(buf, vec![1, 2, 3]);

        engine.wait_barrier(19).unwrap();
        assert_eq!(engine.registry_size(), 0);
        assert_eq!(engine.pending_size(), 0);
    });
}
