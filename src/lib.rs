//! starling - a collective communication engine for a simulated
//! message-passing runtime.
//!
//! Multi-participant operations (barrier, broadcast, reduce/allreduce,
//! reduce-scatter, scan, gather(v), scatter(v), allgather(v), alltoall(v))
//! run on top of a point-to-point transport with completion-queue
//! delivery. Operations on locality-balanced communicators transparently
//! decompose into a node-local phase, a cross-node phase among node
//! owners, and a closing node-local broadcast, chained without returning
//! control to the caller.

pub mod collective;
pub mod comm;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod reduce;
pub mod transport;
pub mod types;

pub use comm::{Communicator, Topology};
pub use config::StarlingConfig;
pub use engine::{CollectiveEngine, EngineStats};
pub use error::{Result, StarlingError};
pub use memory::RawBuf;
pub use protocol::{DoneMessage, Message, MessageClass, WorkMessage};
pub use transport::{BufferPool, CqSink, Fabric, PooledBuf, SimTransport};
pub use types::{
    CollectiveKind, CqId, DataType, NodeId, Phase, Rank, ReduceOp, Tag, DEFAULT_CQ,
};
