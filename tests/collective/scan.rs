use starling::{DataType, ReduceOp, DEFAULT_CQ};

use super::helpers::{run_flat, wait};

#[test]
fn test_inclusive_scan_sum() {
    run_flat(4, |engine, rank| {
        let src: Vec<i32> = vec![rank as i32 + 1; 2];
        let mut dst = vec![0i32; 2];
        let done = unsafe {
            engine.scan(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                2,
                DataType::I32,
                ReduceOp::Sum,
                1,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        // Inclusive prefix: rank r holds 1 + 2 + ... + (r+1).
        let expect = ((rank as i32 + 1) * (rank as i32 + 2)) / 2;
        assert_eq!(dst, vec![expect; 2], "rank {rank} scan failed");
    });
}

#[test]
fn test_scan_prod() {
    run_flat(3, |engine, rank| {
        let src: Vec<u32> = vec![rank + 2];
        let mut dst = vec![0u32; 1];
        let done = unsafe {
            engine.scan(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                1,
                DataType::U32,
                ReduceOp::Prod,
                2,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        let expect: u32 = (2..=rank + 2).product();
        assert_eq!(dst, vec![expect], "rank {rank} scan failed");
    });
}
