use starling::{DataType, DEFAULT_CQ};

use super::helpers::{run_flat, wait};

#[test]
fn test_bcast_from_rank_0() {
    run_flat(4, |engine, rank| {
        let mut buf: Vec<i32> = if rank == 0 {
            vec![5, 6, 7]
        } else {
            vec![0, 0, 0]
        };
        let done = unsafe {
            engine.bcast(
                0,
                buf.as_mut_ptr() as u64,
                3,
                DataType::I32,
                1,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(buf, vec![5, 6, 7], "rank {rank} bcast failed");
    });
}

#[test]
fn test_bcast_from_nonzero_root() {
    run_flat(5, |engine, rank| {
        let mut buf: Vec<u8> = if rank == 3 { vec![0xAB; 8] } else { vec![0; 8] };
        let done = unsafe {
            engine.bcast(
                3,
                buf.as_mut_ptr() as u64,
                8,
                DataType::U8,
                2,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        wait(engine, done);
        assert_eq!(buf, vec![0xAB; 8], "rank {rank} bcast failed");
    });
}

#[test]
fn test_bcast_root_completes_synchronously() {
    run_flat(3, |engine, rank| {
        let mut buf = if rank == 0 { vec![9i32; 2] } else { vec![0i32; 2] };
        let done = unsafe {
            engine.bcast(
                0,
                buf.as_mut_ptr() as u64,
                2,
                DataType::I32,
                3,
                DEFAULT_CQ,
                None,
            )
        }
        .unwrap();
        if rank == 0 {
            // The root's participation ends with its initial sends.
            assert!(done.is_some());
        }
        wait(engine, done);
        assert_eq!(buf, vec![9, 9]);
    });
}
