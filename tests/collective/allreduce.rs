use starling::{DataType, ReduceOp, DEFAULT_CQ};

use super::helpers::{run_flat, run_smp, wait};

#[test]
fn test_allreduce_4_ranks_sum() {
    run_flat(4, |engine, rank| {
        let src: Vec<i32> = vec![(rank + 1) as i32; 4];
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
        .unwrap();
        wait(engine, done);
        assert_eq!(dst, vec![10i32; 4], "rank {rank} allreduce failed");
    });
}

#[test]
fn test_allreduce_3_ranks_non_power_of_two() {
    run_flat(3, |engine, rank| {
        let src: Vec<i32> = vec![(rank + 1) as i32, 10 * (rank + 1) as i32];
        let mut dst = vec![0i32; 2];
        let done = unsafe {
            engine.allreduce(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                2,
                DataType::I32,
                ReduceOp::Sum,
                2,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(dst, vec![6, 60], "rank {rank} allreduce failed");
    });
}

#[test]
fn test_allreduce_max_f64() {
    run_flat(4, |engine, rank| {
        let src: Vec<f64> = vec![rank as f64, -(rank as f64)];
        let mut dst = vec![0f64; 2];
        let done = unsafe {
            engine.allreduce(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                2,
                DataType::F64,
                ReduceOp::Max,
                3,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(dst, vec![3.0, 0.0]);
    });
}

#[test]
fn test_smp_allreduce_decomposes_into_three_phases() {
    // 2 nodes x 2 ranks/node, inputs [1,2,3,4], sum, tag 7: every rank
    // ends at 10; one node-local phase and one closing broadcast
    // everywhere, one cross-node phase on the two node owners only.
    run_smp(2, 2, |engine, rank| {
        let src: Vec<i32> = vec![(rank + 1) as i32];
        let mut dst = vec![0i32; 1];
        let done = unsafe {
            engine.allreduce(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                1,
                DataType::I32,
                ReduceOp::Sum,
                7,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(dst, vec![10], "rank {rank} smp allreduce failed");

        let stats = engine.stats();
        assert_eq!(stats.intra_phases, 1, "rank {rank} intra phases");
        assert_eq!(stats.rebroadcast_phases, 1, "rank {rank} rebroadcast phases");
        let owner = rank == 0 || rank == 2;
        let expected_inter = if owner { 1 } else { 0 };
        assert_eq!(stats.inter_phases, expected_inter, "rank {rank} inter phases");
        assert_eq!(stats.main_phases, 0, "rank {rank} main phases");
    });
}

#[test]
fn test_smp_allreduce_larger_world() {
    run_smp(2, 3, |engine, rank| {
        let src: Vec<i64> = vec![1i64; 8];
        let mut dst = vec![0i64; 8];
        let done = unsafe {
            engine.allreduce(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                8,
                DataType::I64,
                ReduceOp::Sum,
                8,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(dst, vec![6i64; 8], "rank {rank} smp allreduce failed");
    });
}

#[test]
fn test_reduce_scatter_4_ranks() {
    run_flat(4, |engine, rank| {
        // Rank r contributes [1,2,3,4] spread over the four chunks.
        let src: Vec<i32> = (1..=4).collect();
        let mut dst = vec![0i32; 1];
        let done = unsafe {
            engine.reduce_scatter(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                1,
                DataType::I32,
                ReduceOp::Sum,
                9,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(dst, vec![4 * (rank as i32 + 1)], "rank {rank} chunk");
    });
}
