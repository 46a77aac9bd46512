use std::sync::Arc;

use crate::comm::Communicator;
use crate::transport::PooledBuf;
use crate::types::{CollectiveKind, CqId, Phase, Rank, Tag};

/// Subtype of a work message, distinguishing header-only sends from bulk
/// transfers.
///
/// The class exists purely so the fabric can charge the right simulated
/// injection delay before delivery; it has no bearing on the engine's
/// correctness contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Small payload, sent eagerly with the header.
    Header,
    /// Payload at or above the eager cutoff, modeled as a bulk transfer.
    Bulk,
}

impl MessageClass {
    /// Classify a payload by size against the configured eager cutoff.
    pub fn for_payload(len: usize, eager_cutoff: usize) -> Self {
        if len < eager_cutoff {
            MessageClass::Header
        } else {
            MessageClass::Bulk
        }
    }
}

/// One partial-progress datagram of an in-flight collective.
///
/// Produced by an algorithm's send step and consumed by the matching
/// instance's fold step on the destination rank - or buffered there if the
/// matching instance does not exist yet.
#[derive(Debug)]
pub struct WorkMessage {
    pub kind: CollectiveKind,
    pub phase: Phase,
    pub tag: Tag,
    /// Sender's rank within the operation's communicator.
    pub sender: Rank,
    /// Algorithm-defined round number; folding is strictly round-ordered.
    pub round: u32,
    pub payload: PooledBuf,
    /// Completion queue acked on the sending side, if any.
    pub send_cq: Option<CqId>,
    /// Completion queue targeted on the receiving side, if any.
    pub recv_cq: Option<CqId>,
    pub class: MessageClass,
}

impl WorkMessage {
    /// The registry key this message matches.
    pub fn key(&self) -> (CollectiveKind, Tag, Phase) {
        (self.kind, self.tag, self.phase)
    }
}

impl std::fmt::Display for WorkMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "work {}:{} ({} phase) from rank {} round {} [{}B]",
            self.kind,
            self.tag,
            self.phase,
            self.sender,
            self.round,
            self.payload.len(),
        )
    }
}

/// The completion notice produced once an instance's local participation
/// is fully finished.
#[derive(Debug, Clone)]
pub struct DoneMessage {
    kind: CollectiveKind,
    tag: Tag,
    cq_id: CqId,
    comm: Arc<Communicator>,
}

impl DoneMessage {
    pub fn new(kind: CollectiveKind, tag: Tag, cq_id: CqId, comm: Arc<Communicator>) -> Self {
        Self {
            kind,
            tag,
            cq_id,
            comm,
        }
    }

    pub fn kind(&self) -> CollectiveKind {
        self.kind
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn cq_id(&self) -> CqId {
        self.cq_id
    }

    pub fn comm(&self) -> &Arc<Communicator> {
        &self.comm
    }
}

impl std::fmt::Display for DoneMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "done {}:{} on cq {} ({} ranks)",
            self.kind,
            self.tag,
            self.cq_id,
            self.comm.nproc(),
        )
    }
}

/// The two message shapes the engine exchanges over completion queues.
#[derive(Debug)]
pub enum Message {
    Work(WorkMessage),
    Done(DoneMessage),
}

impl Message {
    /// The completion queue this message should be delivered to on the
    /// receiving side.
    pub fn recv_cq(&self) -> Option<CqId> {
        match self {
            Message::Work(w) => w.recv_cq,
            Message::Done(d) => Some(d.cq_id),
        }
    }

    /// The sending-side completion queue, if any.
    pub fn send_cq(&self) -> Option<CqId> {
        match self {
            Message::Work(w) => w.send_cq,
            Message::Done(_) => None,
        }
    }

    pub fn class(&self) -> MessageClass {
        match self {
            Message::Work(w) => w.class,
            Message::Done(_) => MessageClass::Header,
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Work(w) => w.fmt(f),
            Message::Done(d) => d.fmt(f),
        }
    }
}
