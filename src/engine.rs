//! The collective engine: creation, matching/merging, chaining, and
//! deferred teardown of collective instances.
//!
//! One engine exists per simulated rank, driven by that rank's single
//! cooperative thread of control. The same call stack handles
//! user-initiated collective calls and incoming-message processing;
//! handling one message can synchronously start the next phase of a
//! chain, which is a normal, expected call pattern.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::collective::{
    BinaryTreeBcast, BruckAllgather, ChainScan, Collective, CollectiveCore, DirectAllgatherv,
    DirectAlltoall, DirectAlltoallv, DirectGather, DirectGatherv, DirectReduce,
    DirectReduceScatter, DirectScatter, DirectScatterv, DisseminationBarrier, DoNothing,
    RecursiveDoublingAllreduce, RingAllgather,
};
use crate::comm::Communicator;
use crate::config::StarlingConfig;
use crate::error::{Result, StarlingError};
use crate::memory::{copy_raw, RawBuf};
use crate::protocol::{DoneMessage, Message, WorkMessage};
use crate::transport::SimTransport;
use crate::types::{CollectiveKind, CqId, DataType, Phase, Rank, ReduceOp, Tag, DEFAULT_CQ};

/// Registry key: at most one non-persistent instance is live per key.
type Key = (CollectiveKind, Tag, Phase);

/// Observable counters, mostly for tests and quiescence diagnostics.
#[derive(Debug, Default, Clone)]
pub struct EngineStats {
    /// Non-decomposed (or flat-phase) instances started.
    pub main_phases: u64,
    /// Node-local phases started.
    pub intra_phases: u64,
    /// Cross-node phases started (owner ranks only).
    pub inter_phases: u64,
    /// Closing node-local broadcast phases started.
    pub rebroadcast_phases: u64,
    /// Work messages buffered because their instance did not exist yet.
    pub messages_buffered: u64,
    /// Concurrent local references merged into an existing instance.
    pub merges: u64,
}

/// Orchestrates every collective operation of one simulated rank.
pub struct CollectiveEngine {
    tport: Arc<SimTransport>,
    config: StarlingConfig,
    global_domain: Arc<Communicator>,
    registry: HashMap<Key, Box<dyn Collective>>,
    /// Early arrivals: work messages whose (kind, tag, phase) has no
    /// instance yet, replayed in arrival order once it exists.
    pending: HashMap<Key, VecDeque<WorkMessage>>,
    /// Completed instances awaiting reclamation at the next safe point.
    retired: Vec<Box<dyn Collective>>,
    system_tag: Tag,
    stats: EngineStats,
}

impl CollectiveEngine {
    pub fn new(
        tport: Arc<SimTransport>,
        config: StarlingConfig,
        global_domain: Arc<Communicator>,
    ) -> Self {
        Self {
            tport,
            config,
            global_domain,
            registry: HashMap::new(),
            pending: HashMap::new(),
            retired: Vec::new(),
            system_tag: 0,
            stats: EngineStats::default(),
        }
    }

    pub fn tport(&self) -> &Arc<SimTransport> {
        &self.tport
    }

    pub fn global_domain(&self) -> &Arc<Communicator> {
        &self.global_domain
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn registry_size(&self) -> usize {
        self.registry.len()
    }

    pub fn pending_size(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    pub fn retired_size(&self) -> usize {
        self.retired.len()
    }

    /// Next tag from the reserved negative namespace for system-initiated
    /// collectives.
    pub fn allocate_system_tag(&mut self) -> Tag {
        self.system_tag -= 1;
        self.system_tag
    }

    /// Reclaim instances retired by earlier calls. Runs at the top of
    /// every top-level entry, never mid-call, so an instance finished
    /// while still on the call stack survives until the stack unwinds.
    fn clean_up(&mut self) {
        self.retired.clear();
    }

    fn resolve(&self, comm: Option<Arc<Communicator>>) -> Arc<Communicator> {
        comm.unwrap_or_else(|| Arc::clone(&self.global_domain))
    }

    fn make_core(
        &self,
        kind: CollectiveKind,
        phase: Phase,
        tag: Tag,
        cq_id: CqId,
        comm: Arc<Communicator>,
    ) -> CollectiveCore {
        CollectiveCore::new(
            kind,
            phase,
            tag,
            cq_id,
            comm,
            Arc::clone(&self.tport),
            self.config.eager_cutoff,
        )
    }

    /// Fast path: a single-participant communicator needs no instance and
    /// no network traffic - copy and report done.
    ///
    /// # Safety
    /// `dst`/`src`, when non-null, must be valid for `nbytes`.
    #[allow(clippy::too_many_arguments)]
    unsafe fn skip_collective(
        &mut self,
        kind: CollectiveKind,
        tag: Tag,
        cq_id: CqId,
        comm: &Arc<Communicator>,
        dst: RawBuf,
        src: RawBuf,
        nbytes: usize,
    ) -> Option<DoneMessage> {
        if comm.nproc() == 1 {
            unsafe { copy_raw(dst, src, nbytes) };
            return Some(DoneMessage::new(kind, tag, cq_id, Arc::clone(comm)));
        }
        None
    }

    fn count_phase(&mut self, phase: Phase) {
        match phase {
            Phase::Main => self.stats.main_phases += 1,
            Phase::Intra => self.stats.intra_phases += 1,
            Phase::Inter => self.stats.inter_phases += 1,
            Phase::Rebroadcast => self.stats.rebroadcast_phases += 1,
        }
    }

    // - creation / merge / chain advance ----------------------------------

    /// Install, start, and drive a collective instance (and, through chain
    /// advance, every subsequent phase it completes synchronously).
    ///
    /// Returns the final DoneMessage, or `None` while remote participants
    /// are still outstanding.
    pub fn start_collective(&mut self, mut coll: Box<dyn Collective>) -> Result<Option<DoneMessage>> {
        if coll.kind() == CollectiveKind::DoNothing {
            // Closes an SMP-decomposed chain without further transport
            // activity; reclaimed at the next safe point.
            let done = coll.done_message();
            self.retired.push(coll);
            return Ok(Some(done));
        }

        coll.init_actors();
        self.count_phase(coll.phase());
        let key = (coll.kind(), coll.tag(), coll.phase());

        let (mut dmsg, next) = if self.registry.contains_key(&key) {
            // A second concurrent local reference raced us here: start
            // it, fold its actors into the canonical instance, and
            // discard it.
            coll.start()?;
            self.stats.merges += 1;
            let mut active = self.registry.remove(&key).expect("checked registry entry");
            let done = active.add_actors(coll.as_ref());
            let next = if done.is_some() {
                self.finish_collective(key, active)
            } else {
                self.registry.insert(key, active);
                None
            };
            (done, next)
        } else {
            coll.start()?;
            let mut done = None;
            // Remote participants may have outrun this call; replay
            // their buffered messages in arrival order.
            let pending = self.pending.remove(&key).unwrap_or_default();
            for msg in pending {
                if let Some(d) = coll.recv(msg)? {
                    done = Some(d);
                }
            }
            if done.is_none() && coll.complete() {
                // Local participation ended inside start() (broadcast
                // root, scatter root, gather leaf, ...).
                done = Some(coll.done_message());
            }
            let next = if done.is_some() {
                self.finish_collective(key, coll)
            } else {
                self.registry.insert(key, coll);
                None
            };
            (done, next)
        };

        // Chain advance: discard the phase-internal completion and start
        // the subsequent phase without returning control to the caller.
        if dmsg.is_some() {
            if let Some(nxt) = next {
                dmsg = self.start_collective(nxt)?;
            }
        }
        Ok(dmsg)
    }

    /// Message dispatch: feed one incoming message to its instance, or
    /// buffer it when the instance has not been created yet.
    pub fn incoming(&mut self, msg: Message) -> Result<Option<DoneMessage>> {
        self.clean_up();

        let work = match msg {
            Message::Done(done) => return Ok(Some(done)),
            Message::Work(work) => work,
        };

        let key = work.key();
        let Some(mut coll) = self.registry.remove(&key) else {
            // A remote participant's message outran the local call that
            // will eventually create the matching instance.
            tracing::debug!(rank = self.tport.rank(), %work, "queuing early work message");
            self.stats.messages_buffered += 1;
            self.pending.entry(key).or_default().push_back(work);
            return Ok(None);
        };

        let mut dmsg = coll.recv(work)?;
        let next = if dmsg.is_some() {
            self.finish_collective(key, coll)
        } else {
            self.registry.insert(key, coll);
            None
        };
        if dmsg.is_some() {
            if let Some(nxt) = next {
                dmsg = self.start_collective(nxt)?;
            }
        }
        Ok(dmsg)
    }

    /// Completion bookkeeping: fold the local actor-done report, surface
    /// extra completions for merged call sites, retire the instance (or
    /// keep it registered when persistent), and hand back the subsequent
    /// phase for chain advance.
    fn finish_collective(&mut self, key: Key, mut coll: Box<dyn Collective>) -> Option<Box<dyn Collective>> {
        let local_rank = coll.comm().my_comm_rank();
        let mut deliver = false;
        let mut can_delete = false;
        coll.actor_done(local_rank, &mut deliver, &mut can_delete);

        if deliver {
            // One completion per merged local call site; the first is
            // returned through the call stack, extras go to the cq.
            for _ in 1..coll.actor_count() {
                self.tport.post_local(Message::Done(coll.done_message()));
            }
        }

        let next = coll.take_subsequent();
        self.pending.remove(&key);
        if can_delete && !coll.persistent() {
            tracing::debug!(
                kind = %coll.kind(),
                tag = coll.tag(),
                phase = %coll.phase(),
                "retiring completed collective",
            );
            self.retired.push(coll);
        } else {
            // Persistent collectives must outlive completion.
            self.registry.insert(key, coll);
        }
        next
    }

    /// Guard against tag-reuse bugs: starting a key that already maps to
    /// a live, non-persistent instance is a caller error.
    pub fn validate_collective(&self, kind: CollectiveKind, tag: Tag, phase: Phase) -> Result<()> {
        match self.registry.get(&(kind, tag, phase)) {
            None => Ok(()),
            Some(coll) if coll.persistent() && coll.complete() => Ok(()),
            Some(_) => Err(StarlingError::TagInUse { kind, tag, phase }),
        }
    }

    /// Fold one rank's completion report into an instance; errors if no
    /// such instance exists.
    pub fn notify_collective_done(
        &mut self,
        rank: Rank,
        kind: CollectiveKind,
        tag: Tag,
        phase: Phase,
    ) -> Result<Option<DoneMessage>> {
        let key = (kind, tag, phase);
        if !self.registry.contains_key(&key) {
            return Err(StarlingError::NoSuchCollective { kind, tag, phase });
        }
        let local = {
            let coll = self.registry.get(&key).expect("checked registry entry");
            coll.comm().my_comm_rank() == rank
        };
        if !local {
            // Remote completions only feed quiescence tracking.
            let coll = self.registry.get_mut(&key).expect("checked registry entry");
            let mut deliver = false;
            let mut can_delete = false;
            coll.actor_done(rank, &mut deliver, &mut can_delete);
            return Ok(None);
        }
        let coll = self.registry.remove(&key).expect("checked registry entry");
        let mut dmsg = Some(coll.done_message());
        if let Some(nxt) = self.finish_collective(key, coll) {
            dmsg = self.start_collective(nxt)?;
        }
        Ok(dmsg)
    }

    /// Ask every incomplete instance to self-report suspected deadlock.
    /// Diagnostic only, never fatal.
    pub fn deadlock_check(&self) {
        for coll in self.registry.values() {
            if !coll.complete() {
                coll.deadlock_check();
            }
        }
    }

    /// Cooperative poll loop: feed messages through `incoming` until a
    /// completion surfaces.
    pub fn block_until_next(&mut self, cq_id: CqId) -> Result<DoneMessage> {
        loop {
            let msg = self.tport.blocking_poll(cq_id)?;
            if let Some(done) = self.incoming(msg)? {
                return Ok(done);
            }
        }
    }

    /// Barrier on the default cq, waiting synchronously for completion.
    pub fn wait_barrier(&mut self, tag: Tag) -> Result<()> {
        if self.global_domain.nproc() == 1 {
            return Ok(());
        }
        if self.barrier(tag, DEFAULT_CQ, None)?.is_none() {
            self.block_until_next(DEFAULT_CQ)?;
        }
        Ok(())
    }

    // - entry points ------------------------------------------------------

    /// Barrier across the communicator. No payloads move.
    pub fn barrier(
        &mut self,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        if comm.nproc() == 1 {
            return Ok(Some(DoneMessage::new(
                CollectiveKind::Barrier,
                tag,
                cq_id,
                comm,
            )));
        }
        let core = self.make_core(CollectiveKind::Barrier, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(DisseminationBarrier::new(core)))
    }

    /// Broadcast `nelems` elements in `buf` from `root` to every rank.
    ///
    /// # Safety
    /// `buf`, when non-null, must be valid for `nelems * dtype` bytes and
    /// stay valid until the completion notice is observed.
    pub unsafe fn bcast(
        &mut self,
        root: Rank,
        buf: u64,
        nelems: usize,
        dtype: DataType,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        let nbytes = nelems * dtype.size_in_bytes();
        let buf = unsafe { RawBuf::new(buf, nbytes) };
        if comm.nproc() == 1 {
            return Ok(Some(DoneMessage::new(
                CollectiveKind::Bcast,
                tag,
                cq_id,
                comm,
            )));
        }
        let core = self.make_core(CollectiveKind::Bcast, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(BinaryTreeBcast::new(core, root, buf, nbytes)))
    }

    /// Reduce `nelems` elements from every rank into `dst` at `root`.
    ///
    /// # Safety
    /// Non-null buffers must be valid for `nelems * dtype` bytes and stay
    /// valid until the completion notice is observed.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn reduce(
        &mut self,
        root: Rank,
        dst: u64,
        src: u64,
        nelems: usize,
        dtype: DataType,
        op: ReduceOp,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        let nbytes = nelems * dtype.size_in_bytes();
        let dst = unsafe { RawBuf::new(dst, nbytes) };
        let src = unsafe { RawBuf::new(src, nbytes) };
        if let Some(done) =
            unsafe { self.skip_collective(CollectiveKind::Reduce, tag, cq_id, &comm, dst, src, nbytes) }
        {
            return Ok(Some(done));
        }
        let core = self.make_core(CollectiveKind::Reduce, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(DirectReduce::new(
            core, root, dst, src, nelems, dtype, op,
        )))
    }

    /// Allreduce `nelems` elements across the communicator.
    ///
    /// On a locality-balanced communicator the operation decomposes into a
    /// node-local reduce, a cross-node reduce among node owners, and a
    /// closing node-local broadcast, chained without caller intervention.
    ///
    /// # Safety
    /// Non-null buffers must be valid for `nelems * dtype` bytes and stay
    /// valid until the completion notice is observed.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn allreduce(
        &mut self,
        dst: u64,
        src: u64,
        nelems: usize,
        dtype: DataType,
        op: ReduceOp,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        let nbytes = nelems * dtype.size_in_bytes();
        let dst = unsafe { RawBuf::new(dst, nbytes) };
        let src = unsafe { RawBuf::new(src, nbytes) };
        if let Some(done) = unsafe {
            self.skip_collective(CollectiveKind::Allreduce, tag, cq_id, &comm, dst, src, nbytes)
        } {
            return Ok(Some(done));
        }

        if comm.smp_comm().is_some() && comm.smp_balanced() {
            let smp = Arc::clone(comm.smp_comm().expect("checked smp comm"));
            let kind = CollectiveKind::Allreduce;

            let mut intra: Box<dyn Collective> = Box::new(RecursiveDoublingAllreduce::new(
                self.make_core(kind, Phase::Intra, tag, cq_id, Arc::clone(&smp)),
                dst,
                src,
                nelems,
                dtype,
                op,
            ));

            let mut bcast: Box<dyn Collective> = Box::new(BinaryTreeBcast::new(
                self.make_core(CollectiveKind::Bcast, Phase::Rebroadcast, tag, cq_id, Arc::clone(&smp)),
                0,
                dst,
                nbytes,
            ));
            // This should report back as done on the original communicator.
            bcast.set_subsequent(Box::new(DoNothing::new(
                self.make_core(CollectiveKind::DoNothing, Phase::Main, tag, cq_id, Arc::clone(&comm)),
                kind,
            )));

            let node_owner = smp.comm_to_global_rank(0);
            if comm.my_global_rank() == node_owner {
                let owner_comm = match comm.owner_comm() {
                    Some(oc) => Arc::clone(oc),
                    None => return Err(StarlingError::BadOwnerComm),
                };
                let mut inter: Box<dyn Collective> = Box::new(RecursiveDoublingAllreduce::new(
                    self.make_core(kind, Phase::Inter, tag, cq_id, owner_comm),
                    dst,
                    dst,
                    nelems,
                    dtype,
                    op,
                ));
                inter.set_subsequent(bcast);
                intra.set_subsequent(inter);
            } else {
                intra.set_subsequent(bcast);
            }
            return self.start_collective(intra);
        }

        let core = self.make_core(CollectiveKind::Allreduce, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(RecursiveDoublingAllreduce::new(
            core, dst, src, nelems, dtype, op,
        )))
    }

    /// Reduce-scatter: fold across ranks, leaving chunk `r` of the result
    /// at rank `r`. `nelems` is the per-rank result length; `src` holds
    /// `nelems * nproc` elements.
    ///
    /// # Safety
    /// Non-null `src` must be valid for `nelems * nproc * dtype` bytes
    /// and `dst` for `nelems * dtype` bytes until completion.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn reduce_scatter(
        &mut self,
        dst: u64,
        src: u64,
        nelems: usize,
        dtype: DataType,
        op: ReduceOp,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        let chunk_bytes = nelems * dtype.size_in_bytes();
        let n = comm.nproc() as usize;
        let dst = unsafe { RawBuf::new(dst, chunk_bytes) };
        let src = unsafe { RawBuf::new(src, chunk_bytes * n) };
        if let Some(done) = unsafe {
            self.skip_collective(CollectiveKind::ReduceScatter, tag, cq_id, &comm, dst, src, chunk_bytes)
        } {
            return Ok(Some(done));
        }
        let core = self.make_core(CollectiveKind::ReduceScatter, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(DirectReduceScatter::new(
            core, dst, src, nelems, dtype, op,
        )))
    }

    /// Inclusive prefix scan across the communicator.
    ///
    /// # Safety
    /// Non-null buffers must be valid for `nelems * dtype` bytes and stay
    /// valid until the completion notice is observed.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn scan(
        &mut self,
        dst: u64,
        src: u64,
        nelems: usize,
        dtype: DataType,
        op: ReduceOp,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        let nbytes = nelems * dtype.size_in_bytes();
        let dst = unsafe { RawBuf::new(dst, nbytes) };
        let src = unsafe { RawBuf::new(src, nbytes) };
        if let Some(done) =
            unsafe { self.skip_collective(CollectiveKind::Scan, tag, cq_id, &comm, dst, src, nbytes) }
        {
            return Ok(Some(done));
        }
        let core = self.make_core(CollectiveKind::Scan, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(ChainScan::new(core, dst, src, nelems, dtype, op)))
    }

    /// Gather every rank's `nelems` elements to `root`.
    ///
    /// # Safety
    /// Non-null `src` must be valid for `nelems * dtype` bytes; non-null
    /// `dst` for `nelems * nproc * dtype` bytes; both until completion.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn gather(
        &mut self,
        root: Rank,
        dst: u64,
        src: u64,
        nelems: usize,
        dtype: DataType,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        let block_bytes = nelems * dtype.size_in_bytes();
        let n = comm.nproc() as usize;
        let dst = unsafe { RawBuf::new(dst, block_bytes * n) };
        let src = unsafe { RawBuf::new(src, block_bytes) };
        if let Some(done) = unsafe {
            self.skip_collective(CollectiveKind::Gather, tag, cq_id, &comm, dst, src, block_bytes)
        } {
            return Ok(Some(done));
        }
        let core = self.make_core(CollectiveKind::Gather, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(DirectGather::new(core, root, dst, src, block_bytes)))
    }

    /// Gatherv: gather `sendcnt` elements from each rank to `root`, with
    /// per-rank receive counts.
    ///
    /// # Safety
    /// Non-null `src` must be valid for `sendcnt * dtype` bytes; non-null
    /// `dst` for `sum(recv_counts) * dtype` bytes; both until completion.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn gatherv(
        &mut self,
        root: Rank,
        dst: u64,
        src: u64,
        sendcnt: usize,
        recv_counts: &[usize],
        dtype: DataType,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        self.check_counts("gatherv", recv_counts, comm.nproc())?;
        let esize = dtype.size_in_bytes();
        let recv_bytes: Vec<usize> = recv_counts.iter().map(|&c| c * esize).collect();
        let total: usize = recv_bytes.iter().sum();
        let dst = unsafe { RawBuf::new(dst, total) };
        let src = unsafe { RawBuf::new(src, sendcnt * esize) };
        if let Some(done) = unsafe {
            self.skip_collective(CollectiveKind::Gatherv, tag, cq_id, &comm, dst, src, sendcnt * esize)
        } {
            return Ok(Some(done));
        }
        let core = self.make_core(CollectiveKind::Gatherv, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(DirectGatherv::new(
            core,
            root,
            dst,
            src,
            sendcnt * esize,
            recv_bytes,
        )))
    }

    /// Scatter block `r` of `src` at `root` to rank `r`.
    ///
    /// # Safety
    /// Non-null `src` must be valid for `nelems * nproc * dtype` bytes at
    /// the root; non-null `dst` for `nelems * dtype` bytes; both until
    /// completion.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn scatter(
        &mut self,
        root: Rank,
        dst: u64,
        src: u64,
        nelems: usize,
        dtype: DataType,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        let block_bytes = nelems * dtype.size_in_bytes();
        let n = comm.nproc() as usize;
        let dst = unsafe { RawBuf::new(dst, block_bytes) };
        let src = unsafe { RawBuf::new(src, block_bytes * n) };
        if let Some(done) = unsafe {
            self.skip_collective(CollectiveKind::Scatter, tag, cq_id, &comm, dst, src, block_bytes)
        } {
            return Ok(Some(done));
        }
        let core = self.make_core(CollectiveKind::Scatter, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(DirectScatter::new(core, root, dst, src, block_bytes)))
    }

    /// Scatterv with per-destination send counts.
    ///
    /// # Safety
    /// Non-null `src` must be valid for `sum(send_counts) * dtype` bytes
    /// at the root; non-null `dst` for `recvcnt * dtype` bytes; both
    /// until completion.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn scatterv(
        &mut self,
        root: Rank,
        dst: u64,
        src: u64,
        send_counts: &[usize],
        recvcnt: usize,
        dtype: DataType,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        self.check_counts("scatterv", send_counts, comm.nproc())?;
        let esize = dtype.size_in_bytes();
        let send_bytes: Vec<usize> = send_counts.iter().map(|&c| c * esize).collect();
        let total: usize = send_bytes.iter().sum();
        let dst = unsafe { RawBuf::new(dst, recvcnt * esize) };
        let src = unsafe { RawBuf::new(src, total) };
        if let Some(done) = unsafe {
            self.skip_collective(CollectiveKind::Scatterv, tag, cq_id, &comm, dst, src, recvcnt * esize)
        } {
            return Ok(Some(done));
        }
        let core = self.make_core(CollectiveKind::Scatterv, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(DirectScatterv::new(
            core,
            root,
            dst,
            src,
            send_bytes,
            recvcnt * esize,
        )))
    }

    /// Allgather: every rank contributes `nelems` elements and receives
    /// the concatenation in rank order.
    ///
    /// On a locality-balanced communicator the operation decomposes into a
    /// node-local allgather into a workspace, a cross-node allgather among
    /// node owners, and a closing node-local broadcast.
    ///
    /// # Safety
    /// Non-null `src` must be valid for `nelems * dtype` bytes; non-null
    /// `dst` for `nelems * nproc * dtype` bytes; both until completion.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn allgather(
        &mut self,
        dst: u64,
        src: u64,
        nelems: usize,
        dtype: DataType,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        let block_bytes = nelems * dtype.size_in_bytes();
        let n = comm.nproc() as usize;
        let dst = unsafe { RawBuf::new(dst, block_bytes * n) };
        let src = unsafe { RawBuf::new(src, block_bytes) };
        if let Some(done) = unsafe {
            self.skip_collective(CollectiveKind::Allgather, tag, cq_id, &comm, dst, src, block_bytes)
        } {
            return Ok(Some(done));
        }

        if comm.smp_comm().is_some() && comm.smp_balanced() {
            let smp = Arc::clone(comm.smp_comm().expect("checked smp comm"));
            let smp_size = smp.nproc() as usize;
            let kind = CollectiveKind::Allgather;

            // Node-local blocks accumulate here before crossing nodes.
            let mut workspace = vec![0u8; block_bytes * smp_size];
            let ws = if dst.is_null() {
                RawBuf::null()
            } else {
                unsafe { RawBuf::new(workspace.as_mut_ptr() as u64, workspace.len()) }
            };

            let mut intra = self.allgather_variant(
                self.make_core(kind, Phase::Intra, tag, cq_id, Arc::clone(&smp)),
                ws,
                src,
                block_bytes,
            )?;

            let mut terminator = Box::new(DoNothing::new(
                self.make_core(CollectiveKind::DoNothing, Phase::Main, tag, cq_id, Arc::clone(&comm)),
                kind,
            ));
            terminator.adopt_workspace(workspace);

            let mut bcast: Box<dyn Collective> = Box::new(BinaryTreeBcast::new(
                self.make_core(CollectiveKind::Bcast, Phase::Rebroadcast, tag, cq_id, Arc::clone(&smp)),
                0,
                dst,
                block_bytes * n,
            ));
            bcast.set_subsequent(terminator);

            let node_owner = smp.comm_to_global_rank(0);
            if comm.my_global_rank() == node_owner {
                let owner_comm = match comm.owner_comm() {
                    Some(oc) => Arc::clone(oc),
                    None => return Err(StarlingError::BadOwnerComm),
                };
                // A genuine, distinct cross-node instance: the owners
                // exchange whole node-local aggregates.
                let mut inter = self.allgather_variant(
                    self.make_core(kind, Phase::Inter, tag, cq_id, owner_comm),
                    dst,
                    ws,
                    block_bytes * smp_size,
                )?;
                inter.set_subsequent(bcast);
                intra.set_subsequent(inter);
            } else {
                intra.set_subsequent(bcast);
            }
            return self.start_collective(intra);
        }

        let core = self.make_core(CollectiveKind::Allgather, Phase::Main, tag, cq_id, comm);
        let coll = self.allgather_variant(core, dst, src, block_bytes)?;
        self.start_collective(coll)
    }

    /// Allgatherv with per-rank counts.
    ///
    /// # Safety
    /// Non-null `src` must be valid for `recv_counts[me] * dtype` bytes;
    /// non-null `dst` for `sum(recv_counts) * dtype` bytes; both until
    /// completion.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn allgatherv(
        &mut self,
        dst: u64,
        src: u64,
        recv_counts: &[usize],
        dtype: DataType,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        self.check_counts("allgatherv", recv_counts, comm.nproc())?;
        let esize = dtype.size_in_bytes();
        let recv_bytes: Vec<usize> = recv_counts.iter().map(|&c| c * esize).collect();
        let total: usize = recv_bytes.iter().sum();
        // When the allgatherv is skipped there is a single receive count.
        let own_bytes = recv_bytes[comm.my_comm_rank() as usize];
        let dst = unsafe { RawBuf::new(dst, total) };
        let src = unsafe { RawBuf::new(src, own_bytes) };
        if let Some(done) = unsafe {
            self.skip_collective(CollectiveKind::Allgatherv, tag, cq_id, &comm, dst, src, own_bytes)
        } {
            return Ok(Some(done));
        }
        let core = self.make_core(CollectiveKind::Allgatherv, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(DirectAllgatherv::new(core, dst, src, recv_bytes)))
    }

    /// Alltoall: rank `i` sends block `j` of its source to rank `j`,
    /// receiving block `i` of every peer. `nelems` is the per-destination
    /// block length.
    ///
    /// # Safety
    /// Non-null buffers must be valid for `nelems * nproc * dtype` bytes
    /// and stay valid until completion.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn alltoall(
        &mut self,
        dst: u64,
        src: u64,
        nelems: usize,
        dtype: DataType,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        let block_bytes = nelems * dtype.size_in_bytes();
        let n = comm.nproc() as usize;
        let dst = unsafe { RawBuf::new(dst, block_bytes * n) };
        let src = unsafe { RawBuf::new(src, block_bytes * n) };
        if let Some(done) = unsafe {
            self.skip_collective(CollectiveKind::Alltoall, tag, cq_id, &comm, dst, src, block_bytes)
        } {
            return Ok(Some(done));
        }
        let coll = self.alltoall_variant(
            self.make_core(CollectiveKind::Alltoall, Phase::Main, tag, cq_id, comm),
            dst,
            src,
            block_bytes,
        )?;
        self.start_collective(coll)
    }

    /// Alltoallv with per-destination send counts and per-sender receive
    /// counts.
    ///
    /// # Safety
    /// Non-null `src` must be valid for `sum(send_counts) * dtype` bytes
    /// and `dst` for `sum(recv_counts) * dtype` bytes until completion.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn alltoallv(
        &mut self,
        dst: u64,
        src: u64,
        send_counts: &[usize],
        recv_counts: &[usize],
        dtype: DataType,
        tag: Tag,
        cq_id: CqId,
        comm: Option<Arc<Communicator>>,
    ) -> Result<Option<DoneMessage>> {
        self.clean_up();
        let comm = self.resolve(comm);
        self.check_counts("alltoallv", send_counts, comm.nproc())?;
        self.check_counts("alltoallv", recv_counts, comm.nproc())?;
        let esize = dtype.size_in_bytes();
        let send_bytes: Vec<usize> = send_counts.iter().map(|&c| c * esize).collect();
        let recv_bytes: Vec<usize> = recv_counts.iter().map(|&c| c * esize).collect();
        let dst = unsafe { RawBuf::new(dst, recv_bytes.iter().sum()) };
        let src = unsafe { RawBuf::new(src, send_bytes.iter().sum()) };
        if let Some(done) = unsafe {
            self.skip_collective(
                CollectiveKind::Alltoallv,
                tag,
                cq_id,
                &comm,
                dst,
                src,
                send_bytes.first().copied().unwrap_or_default(),
            )
        } {
            return Ok(Some(done));
        }
        let core = self.make_core(CollectiveKind::Alltoallv, Phase::Main, tag, cq_id, comm);
        self.start_collective(Box::new(DirectAlltoallv::new(
            core, dst, src, send_bytes, recv_bytes,
        )))
    }

    // - variant selection -------------------------------------------------

    fn allgather_variant(
        &self,
        core: CollectiveCore,
        dst: RawBuf,
        src: RawBuf,
        block_bytes: usize,
    ) -> Result<Box<dyn Collective>> {
        match self.config.allgather_algorithm.as_str() {
            "bruck" => Ok(Box::new(BruckAllgather::new(core, dst, src, block_bytes))),
            "ring" => Ok(Box::new(RingAllgather::new(core, dst, src, block_bytes))),
            other => Err(StarlingError::UnknownAlgorithm {
                which: "allgather",
                name: other.to_string(),
                valid: "bruck, ring",
            }),
        }
    }

    fn alltoall_variant(
        &self,
        core: CollectiveCore,
        dst: RawBuf,
        src: RawBuf,
        block_bytes: usize,
    ) -> Result<Box<dyn Collective>> {
        match self.config.alltoall_algorithm.as_str() {
            "direct" => Ok(Box::new(DirectAlltoall::new(core, dst, src, block_bytes))),
            other => Err(StarlingError::UnknownAlgorithm {
                which: "alltoall",
                name: other.to_string(),
                valid: "direct",
            }),
        }
    }

    fn check_counts(&self, operation: &'static str, counts: &[usize], nproc: u32) -> Result<()> {
        if counts.len() != nproc as usize {
            return Err(StarlingError::CountMismatch {
                operation,
                expected: nproc as usize,
                actual: counts.len(),
            });
        }
        Ok(())
    }
}
