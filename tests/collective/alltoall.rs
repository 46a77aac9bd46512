use starling::{DataType, DEFAULT_CQ};

use super::helpers::{run_flat, wait};

#[test]
fn test_alltoall_4_ranks() {
    run_flat(4, |engine, rank| {
        // Block j of rank i's source is 10*i + j; after the exchange,
        // block i of rank j's destination must be 10*i + j.
        let src: Vec<i32> = (0..4).map(|j| 10 * rank as i32 + j).collect();
        let mut dst = vec![-1i32; 4];
        let done = unsafe {
            engine.alltoall(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                1,
                DataType::I32,
                1,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        let expect: Vec<i32> = (0..4).map(|i| 10 * i + rank as i32).collect();
        assert_eq!(dst, expect, "rank {rank} alltoall failed");
    });
}

#[test]
fn test_alltoall_multi_element_blocks() {
    run_flat(3, |engine, rank| {
        let src: Vec<u64> = (0..6).map(|k| (rank as u64) * 100 + k).collect();
        let mut dst = vec![0u64; 6];
        let done = unsafe {
            engine.alltoall(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                2,
                DataType::U64,
                2,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        let expect: Vec<u64> = (0..3u64)
            .flat_map(|i| {
                let base = i * 100 + rank as u64 * 2;
                [base, base + 1]
            })
            .collect();
        assert_eq!(dst, expect, "rank {rank} alltoall failed");
    });
}

#[test]
fn test_alltoallv_varying_counts() {
    run_flat(2, |engine, rank| {
        // Rank 0 sends 1 element to itself and 2 to rank 1;
        // rank 1 sends 3 to rank 0 and 1 to itself.
        let (send_counts, recv_counts, src) = if rank == 0 {
            (vec![1usize, 2], vec![1usize, 3], vec![1i32, 2, 2])
        } else {
            (vec![3usize, 1], vec![2usize, 1], vec![10i32, 10, 10, 20])
        };
        let total_recv: usize = recv_counts.iter().sum();
        let mut dst = vec![-1i32; total_recv];
        let done = unsafe {
            engine.alltoallv(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                &send_counts,
                &recv_counts,
                DataType::I32,
                3,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        let expect = if rank == 0 {
            vec![1, 10, 10, 10]
        } else {
            vec![2, 2, 20]
        };
        assert_eq!(dst, expect, "rank {rank} alltoallv failed");
    });
}
