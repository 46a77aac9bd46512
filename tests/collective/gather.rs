use starling::{DataType, DEFAULT_CQ};

use super::helpers::{run_flat, wait};

#[test]
fn test_gather_to_root() {
    run_flat(4, |engine, rank| {
        let src: Vec<i32> = vec![rank as i32 * 2, rank as i32 * 2 + 1];
        let mut dst = vec![-1i32; 8];
        let dst_ptr = if rank == 0 { dst.as_mut_ptr() as u64 } else { 0 };
        let done = unsafe {
            engine.gather(
                0,
                dst_ptr,
                src.as_ptr() as u64,
                2,
                DataType::I32,
                1,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        if rank == 0 {
            assert_eq!(dst, (0..8).collect::<Vec<i32>>());
        }
    });
}

#[test]
fn test_gather_to_nonzero_root() {
    run_flat(3, |engine, rank| {
        let src: Vec<u8> = vec![rank as u8 + 1];
        let mut dst = vec![0u8; 3];
        let dst_ptr = if rank == 2 { dst.as_mut_ptr() as u64 } else { 0 };
        let done = unsafe {
            engine.gather(
                2,
                dst_ptr,
                src.as_ptr() as u64,
                1,
                DataType::U8,
                2,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        if rank == 2 {
            assert_eq!(dst, vec![1, 2, 3]);
        }
    });
}

#[test]
fn test_gatherv_varying_counts() {
    run_flat(3, |engine, rank| {
        let counts = [2usize, 1, 3];
        let src: Vec<i32> = vec![rank as i32 + 1; counts[rank as usize]];
        let mut dst = vec![0i32; 6];
        let dst_ptr = if rank == 0 { dst.as_mut_ptr() as u64 } else { 0 };
        let done = unsafe {
            engine.gatherv(
                0,
                dst_ptr,
                src.as_ptr() as u64,
                counts[rank as usize],
                &counts,
                DataType::I32,
                3,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        if rank == 0 {
            assert_eq!(dst, vec![1, 1, 2, 3, 3, 3]);
        }
    });
}
