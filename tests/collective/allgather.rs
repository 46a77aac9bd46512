use starling::{DataType, StarlingConfig, Topology, DEFAULT_CQ};

use super::helpers::{run_flat, run_smp, run_topology, wait};

#[test]
fn test_allgather_4_ranks() {
    // Per-rank inputs [10,20,30,40] yield the full vector everywhere.
    run_flat(4, |engine, rank| {
        let src: Vec<i32> = vec![10 * (rank as i32 + 1)];
        let mut dst = vec![0i32; 4];
        let done = unsafe {
            engine.allgather(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                1,
                DataType::I32,
                5,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(dst, vec![10, 20, 30, 40], "rank {rank} allgather failed");
    });
}

#[test]
fn test_allgather_5_ranks_bruck_partial_round() {
    run_flat(5, |engine, rank| {
        let src: Vec<i32> = vec![rank as i32, rank as i32 + 100];
        let mut dst = vec![0i32; 10];
        let done = unsafe {
            engine.allgather(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                2,
                DataType::I32,
                6,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        let expect: Vec<i32> = (0..5).flat_map(|r| [r, r + 100]).collect();
        assert_eq!(dst, expect, "rank {rank} allgather failed");
    });
}

#[test]
fn test_allgather_ring_variant() {
    let config = StarlingConfig {
        allgather_algorithm: "ring".into(),
        ..StarlingConfig::default()
    };
    run_topology(Topology::flat(4), config, |engine, rank| {
        let src: Vec<u8> = vec![rank as u8 + 1; 3];
        let mut dst = vec![0u8; 12];
        let done = unsafe {
            engine.allgather(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                3,
                DataType::U8,
                7,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        let expect: Vec<u8> = (1..=4).flat_map(|r| [r; 3]).collect();
        assert_eq!(dst, expect, "rank {rank} ring allgather failed");
    });
}

#[test]
fn test_smp_allgather() {
    run_smp(2, 2, |engine, rank| {
        let src: Vec<i32> = vec![rank as i32 + 1];
        let mut dst = vec![0i32; 4];
        let done = unsafe {
            engine.allgather(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                1,
                DataType::I32,
                8,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(dst, vec![1, 2, 3, 4], "rank {rank} smp allgather failed");

        let stats = engine.stats();
        assert_eq!(stats.intra_phases, 1);
        assert_eq!(stats.rebroadcast_phases, 1);
        let owner = rank == 0 || rank == 2;
        assert_eq!(stats.inter_phases, if owner { 1 } else { 0 });
    });
}

#[test]
fn test_allgatherv_varying_counts() {
    run_flat(3, |engine, rank| {
        // Rank r contributes r+1 elements, all equal to r.
        let counts = [1usize, 2, 3];
        let src: Vec<i32> = vec![rank as i32; counts[rank as usize]];
        let mut dst = vec![-1i32; 6];
        let done = unsafe {
            engine.allgatherv(
                dst.as_mut_ptr() as u64,
                src.as_ptr() as u64,
                &counts,
                DataType::I32,
                9,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(dst, vec![0, 1, 1, 2, 2, 2], "rank {rank} allgatherv failed");
    });
}
