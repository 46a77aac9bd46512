//! Collective instances: one live operation per (kind, tag, phase) key.
//!
//! Every algorithm variant is a state machine driven by the engine through
//! the uniform [`Collective`] contract: `start` issues the initial sends,
//! `recv` folds one incoming [`WorkMessage`] and reports completion of the
//! local participation by returning a [`DoneMessage`]. The engine never
//! needs to know which variant it is driving.

mod allgather;
mod allreduce;
mod alltoall;
mod barrier;
mod bcast;
mod donothing;
mod gather;
mod helpers;
mod reduce;
mod reduce_scatter;
mod scan;
mod scatter;

pub use allgather::{BruckAllgather, DirectAllgatherv, RingAllgather};
pub use allreduce::RecursiveDoublingAllreduce;
pub use alltoall::{DirectAlltoall, DirectAlltoallv};
pub use barrier::DisseminationBarrier;
pub use bcast::BinaryTreeBcast;
pub use donothing::DoNothing;
pub use gather::{DirectGather, DirectGatherv};
pub use reduce::DirectReduce;
pub use reduce_scatter::DirectReduceScatter;
pub use scan::ChainScan;
pub use scatter::{DirectScatter, DirectScatterv};

pub(crate) use helpers::{ceil_log2, prefix_offsets, RoundBuffer};

use std::collections::HashSet;
use std::sync::Arc;

use crate::comm::Communicator;
use crate::error::Result;
use crate::protocol::{DoneMessage, Message, MessageClass, WorkMessage};
use crate::transport::{PooledBuf, SimTransport};
use crate::types::{CollectiveKind, CqId, Phase, Rank, Tag};

/// Bookkeeping shared by every algorithm variant.
pub struct CollectiveCore {
    kind: CollectiveKind,
    phase: Phase,
    tag: Tag,
    cq_id: CqId,
    comm: Arc<Communicator>,
    tport: Arc<SimTransport>,
    eager_cutoff: usize,
    /// This rank's position within the operation's communicator.
    dom_me: Rank,
    dom_nproc: u32,
    complete: bool,
    persistent: bool,
    /// Concurrent local call sites merged into this instance.
    actors: u32,
    /// Remote ranks reported done, for quiescence diagnostics.
    done_ranks: HashSet<Rank>,
    subsequent: Option<Box<dyn Collective>>,
}

impl CollectiveCore {
    pub fn new(
        kind: CollectiveKind,
        phase: Phase,
        tag: Tag,
        cq_id: CqId,
        comm: Arc<Communicator>,
        tport: Arc<SimTransport>,
        eager_cutoff: usize,
    ) -> Self {
        let dom_me = comm.my_comm_rank();
        let dom_nproc = comm.nproc();
        Self {
            kind,
            phase,
            tag,
            cq_id,
            comm,
            tport,
            eager_cutoff,
            dom_me,
            dom_nproc,
            complete: false,
            persistent: false,
            actors: 1,
            done_ranks: HashSet::new(),
            subsequent: None,
        }
    }

    pub fn dom_me(&self) -> Rank {
        self.dom_me
    }

    pub fn dom_nproc(&self) -> u32 {
        self.dom_nproc
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    /// Stage an outgoing payload through the transport's buffer pool.
    pub fn payload_from(&self, data: &[u8]) -> PooledBuf {
        self.tport.pool().checkout_from(data)
    }

    pub fn empty_payload(&self) -> PooledBuf {
        self.tport.pool().checkout(0)
    }

    /// Send one work message to a communicator rank.
    pub fn send_work(&self, dest: Rank, round: u32, payload: PooledBuf) -> Result<()> {
        let class = MessageClass::for_payload(payload.len(), self.eager_cutoff);
        let global = self.comm.comm_to_global_rank(dest);
        tracing::trace!(
            rank = self.tport.rank(),
            kind = %self.kind,
            tag = self.tag,
            phase = %self.phase,
            dest,
            global,
            round,
            bytes = payload.len(),
            "sending collective work",
        );
        self.tport.send(
            global,
            Message::Work(WorkMessage {
                kind: self.kind,
                phase: self.phase,
                tag: self.tag,
                sender: self.dom_me,
                round,
                payload,
                send_cq: Some(self.cq_id),
                recv_cq: Some(self.cq_id),
                class,
            }),
        )
    }

    fn done_message(&self) -> DoneMessage {
        DoneMessage::new(self.kind, self.tag, self.cq_id, Arc::clone(&self.comm))
    }
}

/// The uniform contract every algorithm variant satisfies.
///
/// Instances are owned by the engine's registry and driven on a single
/// thread; `Send` lets the whole engine move onto its rank's thread.
pub trait Collective: Send {
    fn core(&self) -> &CollectiveCore;

    fn core_mut(&mut self) -> &mut CollectiveCore;

    /// Issue whatever initial sends the algorithm requires. Side effects
    /// only; a variant whose local participation finishes here marks
    /// itself complete and the engine synthesizes the completion notice.
    fn start(&mut self) -> Result<()>;

    /// Fold one incoming work message into algorithm state. Returns a
    /// [`DoneMessage`] iff this fold completes the local participation.
    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>>;

    // - descriptors -------------------------------------------------------

    fn kind(&self) -> CollectiveKind {
        self.core().kind
    }

    fn phase(&self) -> Phase {
        self.core().phase
    }

    fn tag(&self) -> Tag {
        self.core().tag
    }

    fn cq_id(&self) -> CqId {
        self.core().cq_id
    }

    fn comm(&self) -> &Arc<Communicator> {
        &self.core().comm
    }

    fn persistent(&self) -> bool {
        self.core().persistent
    }

    fn complete(&self) -> bool {
        self.core().complete
    }

    /// The completion notice this instance reports with. The chain
    /// terminator overrides this to report the logical kind of the whole
    /// decomposed operation.
    fn done_message(&self) -> DoneMessage {
        self.core().done_message()
    }

    // - actor bookkeeping -------------------------------------------------

    /// Reset actor bookkeeping before the instance goes live.
    fn init_actors(&mut self) {
        let core = self.core_mut();
        core.actors = core.actors.max(1);
        core.done_ranks.clear();
    }

    fn actor_count(&self) -> u32 {
        self.core().actors
    }

    /// Merge a second, concurrently-initiated local reference to the same
    /// key into this instance. May itself complete the operation when the
    /// instance already finished (persistent collectives).
    fn add_actors(&mut self, other: &dyn Collective) -> Option<DoneMessage> {
        let extra = other.actor_count();
        let core = self.core_mut();
        core.actors += extra;
        tracing::debug!(
            kind = %core.kind,
            tag = core.tag,
            actors = core.actors,
            "merged concurrent local reference",
        );
        if self.complete() {
            Some(self.done_message())
        } else {
            None
        }
    }

    /// Fold one rank's completion report. `deliver` is set when a
    /// completion should surface on the local cq; `can_delete` when the
    /// instance may be reclaimed.
    fn actor_done(&mut self, rank: Rank, deliver: &mut bool, can_delete: &mut bool) {
        let core = self.core_mut();
        core.done_ranks.insert(rank);
        let local = rank == core.dom_me;
        *deliver = local;
        *can_delete = local && core.complete;
    }

    // - phase chaining ----------------------------------------------------

    fn set_subsequent(&mut self, next: Box<dyn Collective>) {
        self.core_mut().subsequent = Some(next);
    }

    fn has_subsequent(&self) -> bool {
        self.core().subsequent.is_some()
    }

    fn take_subsequent(&mut self) -> Option<Box<dyn Collective>> {
        self.core_mut().subsequent.take()
    }

    // - diagnostics -------------------------------------------------------

    /// Self-report a suspected deadlock. Diagnostic only, never fatal.
    fn deadlock_check(&self) {
        let core = self.core();
        tracing::warn!(
            kind = %core.kind,
            tag = core.tag,
            phase = %core.phase,
            rank = core.dom_me,
            nproc = core.dom_nproc,
            done_ranks = core.done_ranks.len(),
            "incomplete collective at deadlock check",
        );
    }
}
