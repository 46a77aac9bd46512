use starling::{DataType, DEFAULT_CQ};

use super::helpers::{run_flat, wait};

#[test]
fn test_scatter_from_root() {
    run_flat(4, |engine, rank| {
        let src: Vec<i32> = (0..8).collect();
        let src_ptr = if rank == 1 { src.as_ptr() as u64 } else { 0 };
        let mut dst = vec![-1i32; 2];
        let done = unsafe {
            engine.scatter(
                1,
                dst.as_mut_ptr() as u64,
                src_ptr,
                2,
                DataType::I32,
                1,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(
            dst,
            vec![rank as i32 * 2, rank as i32 * 2 + 1],
            "rank {rank} scatter failed"
        );
    });
}

#[test]
fn test_scatterv_varying_counts() {
    run_flat(3, |engine, rank| {
        let counts = [1usize, 2, 3];
        let src: Vec<i32> = vec![10, 20, 20, 30, 30, 30];
        let src_ptr = if rank == 0 { src.as_ptr() as u64 } else { 0 };
        let my_count = counts[rank as usize];
        let mut dst = vec![0i32; my_count];
        let done = unsafe {
            engine.scatterv(
                0,
                dst.as_mut_ptr() as u64,
                src_ptr,
                &counts,
                my_count,
                DataType::I32,
                2,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        let expect = vec![10 * (rank as i32 + 1); my_count];
        assert_eq!(dst, expect, "rank {rank} scatterv failed");
    });
}
