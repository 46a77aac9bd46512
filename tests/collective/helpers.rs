use std::sync::Arc;

use starling::{
    CollectiveEngine, Communicator, DoneMessage, Fabric, Rank, SimTransport, StarlingConfig,
    Topology, DEFAULT_CQ,
};

/// Capture engine/transport traces in test output (`RUST_LOG` to filter).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Run a collective scenario: one engine per rank of `topo`, each driven
/// on its own thread over a shared fabric.
pub fn run_topology<F>(topo: Topology, config: StarlingConfig, f: F)
where
    F: Fn(&mut CollectiveEngine, Rank) + Send + Sync + 'static,
{
    init_tracing();
    let world = topo.nranks();
    let fabric = Fabric::new(world, &config);
    let topo = Arc::new(topo);
    let config = Arc::new(config);
    let f = Arc::new(f);

    let mut handles = Vec::new();
    for rank in 0..world {
        let fabric = Arc::clone(&fabric);
        let topo = Arc::clone(&topo);
        let config = Arc::clone(&config);
        let f = Arc::clone(&f);
        handles.push(std::thread::spawn(move || {
            let tport = SimTransport::new(rank, &fabric, &config).unwrap();
            let comm = Communicator::global(rank, &topo).unwrap();
            let mut engine = CollectiveEngine::new(tport, (*config).clone(), comm);
            f(&mut engine, rank);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

/// Every rank on its own node.
pub fn run_flat<F>(world: u32, f: F)
where
    F: Fn(&mut CollectiveEngine, Rank) + Send + Sync + 'static,
{
    run_topology(Topology::flat(world), StarlingConfig::default(), f);
}

/// `nodes` nodes with `per_node` ranks each.
pub fn run_smp<F>(nodes: u32, per_node: u32, f: F)
where
    F: Fn(&mut CollectiveEngine, Rank) + Send + Sync + 'static,
{
    run_topology(Topology::smp(nodes, per_node), StarlingConfig::default(), f);
}

/// Resolve an entry point's result: either it completed synchronously or
/// we block on the default cq until the completion notice surfaces.
pub fn wait(engine: &mut CollectiveEngine, done: Option<DoneMessage>) -> DoneMessage {
    match done {
        Some(d) => d,
        None => engine.block_until_next(DEFAULT_CQ).unwrap(),
    }
}
