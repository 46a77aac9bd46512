use crate::types::{CollectiveKind, CqId, Phase, Rank, Tag};

pub type Result<T> = std::result::Result<T, StarlingError>;

#[derive(Debug, thiserror::Error)]
pub enum StarlingError {
    #[error("rank {rank} already registered on the fabric")]
    RankTaken { rank: Rank },

    #[error("destination rank {rank} does not exist: world size is {world_size}")]
    UnknownPeer { rank: Rank, world_size: u32 },

    #[error("completion queue {cq} is not allocated on rank {rank}")]
    UnknownCq { rank: Rank, cq: CqId },

    #[error("completion queue {cq} has a callback sink and cannot be polled")]
    UnpollableCq { cq: CqId },

    #[error("poll on cq {cq} timed out after {timeout_ms}ms")]
    PollTimeout { cq: CqId, timeout_ms: u64 },

    #[error("cannot overwrite live {kind} collective with tag {tag} ({phase} phase)")]
    TagInUse {
        kind: CollectiveKind,
        tag: Tag,
        phase: Phase,
    },

    #[error("no {kind} collective with tag {tag} ({phase} phase) to complete")]
    NoSuchCollective {
        kind: CollectiveKind,
        tag: Tag,
        phase: Phase,
    },

    #[error("unrecognized {which} algorithm {name:?} (expected one of {valid})")]
    UnknownAlgorithm {
        which: &'static str,
        name: String,
        valid: &'static str,
    },

    #[error("bad owner comm configuration - rank 0 of the node-local comm should own the node")]
    BadOwnerComm,

    #[error("rank {rank} is not a member of the communicator")]
    NotInCommunicator { rank: Rank },

    #[error("{operation} failed at rank {rank}: {reason}")]
    CollectiveFailed {
        operation: &'static str,
        rank: Rank,
        reason: String,
    },

    #[error("count mismatch for {operation}: expected {expected} counts, got {actual}")]
    CountMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl StarlingError {
    /// Create a `CollectiveFailed` error with an owned reason.
    pub fn collective(operation: &'static str, rank: Rank, reason: impl Into<String>) -> Self {
        Self::CollectiveFailed {
            operation,
            rank,
            reason: reason.into(),
        }
    }
}
