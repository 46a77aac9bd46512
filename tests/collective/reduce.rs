use starling::{DataType, ReduceOp, DEFAULT_CQ};

use super::helpers::{run_flat, wait};

#[test]
fn test_reduce_sum_to_root() {
    run_flat(4, |engine, rank| {
        let src: Vec<i32> = vec![rank as i32 + 1; 3];
        let mut dst = vec![0i32; 3];
        let dst_ptr = if rank == 0 { dst.as_mut_ptr() as u64 } else { 0 };
        let done = unsafe {
            engine.reduce(
                0,
                dst_ptr,
                src.as_ptr() as u64,
                3,
                DataType::I32,
                ReduceOp::Sum,
                1,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        if rank == 0 {
            assert_eq!(dst, vec![10; 3]);
        }
    });
}

#[test]
fn test_reduce_min_to_nonzero_root() {
    run_flat(3, |engine, rank| {
        let src: Vec<i64> = vec![(rank as i64) - 1];
        let mut dst = vec![99i64; 1];
        let dst_ptr = if rank == 1 { dst.as_mut_ptr() as u64 } else { 0 };
        let done = unsafe {
            engine.reduce(
                1,
                dst_ptr,
                src.as_ptr() as u64,
                1,
                DataType::I64,
                ReduceOp::Min,
                2,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        if rank == 1 {
            assert_eq!(dst, vec![-1]);
        }
    });
}
