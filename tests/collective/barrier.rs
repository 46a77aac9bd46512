use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use starling::{CollectiveKind, DEFAULT_CQ};

use super::helpers::{run_flat, wait};

#[test]
fn test_barrier_4_ranks() {
    run_flat(4, |engine, _rank| {
        let done = engine.barrier(1, DEFAULT_CQ, None).unwrap();
        let done = wait(engine, done);
        assert_eq!(done.kind(), CollectiveKind::Barrier);
        assert_eq!(done.tag(), 1);
    });
}

#[test]
fn test_barrier_5_ranks_non_power_of_two() {
    run_flat(5, |engine, _rank| {
        let done = engine.barrier(2, DEFAULT_CQ, None).unwrap();
        wait(engine, done);
    });
}

#[test]
fn test_barrier_gates_all_ranks() {
    // No rank may observe its completion before all ranks have arrived.
    let arrived = Arc::new(AtomicU32::new(0));
    let arrived2 = Arc::clone(&arrived);
    run_flat(4, move |engine, _rank| {
        arrived2.fetch_add(1, Ordering::SeqCst);
        let done = engine.barrier(7, DEFAULT_CQ, None).unwrap();
        wait(engine, done);
        assert_eq!(arrived2.load(Ordering::SeqCst), 4);
    });
}

#[test]
fn test_back_to_back_barriers_distinct_tags() {
    run_flat(3, |engine, _rank| {
        for tag in [10, 11, 12] {
            let done = engine.barrier(tag, DEFAULT_CQ, None).unwrap();
            let done = wait(engine, done);
            assert_eq!(done.tag(), tag);
        }
    });
}

#[test]
fn test_barrier_leaves_registry_empty() {
    run_flat(2, |engine, _rank| {
        let done = engine.barrier(3, DEFAULT_CQ, None).unwrap();
        wait(engine, done);
        // The completed instance left the registry at completion and is
        // reclaimed at the next entry.
        assert_eq!(engine.registry_size(), 0);
        let done = engine.barrier(4, DEFAULT_CQ, None).unwrap();
        wait(engine, done);
        assert_eq!(engine.registry_size(), 0);
    });
}
