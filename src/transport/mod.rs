//! The point-to-point transport under the collective engine: a per-rank
//! endpoint with completion queues, backed by the shared in-process
//! [`Fabric`].

mod buffer_pool;
mod fabric;

pub use buffer_pool::{BufferPool, PooledBuf};
pub use fabric::Fabric;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::config::StarlingConfig;
use crate::error::{Result, StarlingError};
use crate::protocol::Message;
use crate::types::{CqId, Rank, DEFAULT_CQ};

/// Where messages delivered to a completion queue end up.
pub enum CqSink {
    /// Messages queue up and are consumed by `recv`/`blocking_poll`.
    Queue,
    /// Messages are handed to the callback at delivery time.
    Callback(Box<dyn FnMut(Message) + Send>),
}

enum CqState {
    Queue(VecDeque<Message>),
    Callback(Box<dyn FnMut(Message) + Send>),
}

/// Per-rank delivery state: allocated completion queues plus messages held
/// for queues that do not exist yet.
pub(crate) struct Mailbox {
    rank: Rank,
    state: Mutex<MailboxState>,
    available: Condvar,
}

struct MailboxState {
    cqs: HashMap<CqId, CqState>,
    held: HashMap<CqId, Vec<Message>>,
    drop_notify: Option<Box<dyn FnMut(&Message) + Send>>,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").field("rank", &self.rank).finish_non_exhaustive()
    }
}

impl Mailbox {
    pub(crate) fn new(rank: Rank) -> Self {
        let mut cqs = HashMap::new();
        // cq 0 is the default progress queue, always present.
        cqs.insert(DEFAULT_CQ, CqState::Queue(VecDeque::new()));
        Self {
            rank,
            state: Mutex::new(MailboxState {
                cqs,
                held: HashMap::new(),
                drop_notify: None,
            }),
            available: Condvar::new(),
        }
    }

    /// Deliver one message into its destination cq.
    ///
    /// A message with no receive-side cq is dropped: the drop-notification
    /// callback runs and the message is reclaimed. Not fatal. A message for
    /// a cq that has not been allocated yet is held and replayed when
    /// `allocate_cq` runs.
    pub(crate) fn deliver(&self, msg: Message) {
        let mut state = self.state.lock().expect("mailbox state lock");
        let cq = match msg.recv_cq() {
            Some(cq) => cq,
            None => {
                // Invalid on the receive side; without a send-side cq to
                // fall back to either, the message is dropped and the
                // drop notification fires. Not fatal.
                if msg.send_cq().is_none() {
                    tracing::warn!(rank = self.rank, %msg, "dropping message with no valid cq");
                    if let Some(f) = state.drop_notify.as_mut() {
                        f(&msg);
                    }
                } else {
                    tracing::trace!(rank = self.rank, %msg, "message wants no receive ack");
                }
                return; // msg reclaimed here
            }
        };
        match state.cqs.get_mut(&cq) {
            Some(CqState::Queue(q)) => {
                q.push_back(msg);
                self.available.notify_all();
            }
            Some(CqState::Callback(f)) => f(msg),
            None => {
                tracing::debug!(rank = self.rank, cq, "no cq yet, holding message");
                state.held.entry(cq).or_default().push(msg);
            }
        }
    }

    /// Register a completion queue, replaying held messages in arrival
    /// order.
    pub(crate) fn allocate_cq(&self, cq: CqId, sink: CqSink) {
        let mut state = self.state.lock().expect("mailbox state lock");
        let replay = state.held.remove(&cq).unwrap_or_default();
        let mut cq_state = match sink {
            CqSink::Queue => CqState::Queue(VecDeque::new()),
            CqSink::Callback(f) => CqState::Callback(f),
        };
        match &mut cq_state {
            CqState::Queue(q) => {
                q.extend(replay);
                if !q.is_empty() {
                    self.available.notify_all();
                }
            }
            CqState::Callback(f) => {
                for msg in replay {
                    f(msg);
                }
            }
        }
        state.cqs.insert(cq, cq_state);
    }

    pub(crate) fn set_drop_notify(&self, f: Box<dyn FnMut(&Message) + Send>) {
        let mut state = self.state.lock().expect("mailbox state lock");
        state.drop_notify = Some(f);
    }

    pub(crate) fn recv(&self, cq: CqId) -> Result<Option<Message>> {
        let mut state = self.state.lock().expect("mailbox state lock");
        match state.cqs.get_mut(&cq) {
            Some(CqState::Queue(q)) => Ok(q.pop_front()),
            Some(CqState::Callback(_)) => Err(StarlingError::UnpollableCq { cq }),
            None => Err(StarlingError::UnknownCq {
                rank: self.rank,
                cq,
            }),
        }
    }

    pub(crate) fn blocking_poll(&self, cq: CqId, timeout: Duration) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().expect("mailbox state lock");
        loop {
            match state.cqs.get_mut(&cq) {
                Some(CqState::Queue(q)) => {
                    if let Some(msg) = q.pop_front() {
                        return Ok(msg);
                    }
                }
                Some(CqState::Callback(_)) => return Err(StarlingError::UnpollableCq { cq }),
                None => {
                    return Err(StarlingError::UnknownCq {
                        rank: self.rank,
                        cq,
                    })
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StarlingError::PollTimeout {
                    cq,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, remaining)
                .expect("mailbox state lock");
            state = guard;
        }
    }
}

/// The per-rank endpoint of the simulated transport.
///
/// Self-sends deliver straight into the local mailbox; everything else is
/// routed through the fabric. One `SimTransport` exists per simulated rank
/// and is driven by that rank's single cooperative thread of control.
pub struct SimTransport {
    rank: Rank,
    fabric: Arc<Fabric>,
    mailbox: Arc<Mailbox>,
    pool: Arc<BufferPool>,
    poll_timeout: Duration,
}

impl SimTransport {
    /// Register `rank` on the fabric and build its endpoint. cq 0 exists
    /// from the start as the default progress queue.
    pub fn new(rank: Rank, fabric: &Arc<Fabric>, config: &StarlingConfig) -> Result<Arc<Self>> {
        let mailbox = fabric.register(rank)?;
        Ok(Arc::new(Self {
            rank,
            fabric: Arc::clone(fabric),
            mailbox,
            pool: BufferPool::new(),
            poll_timeout: config.poll_timeout,
        }))
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> u32 {
        self.fabric.world_size()
    }

    /// The payload pool collective algorithms stage outgoing data through.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Send one message to a global rank.
    pub fn send(&self, dest: Rank, msg: Message) -> Result<()> {
        if dest == self.rank {
            tracing::trace!(rank = self.rank, %msg, "delivering self message");
            self.mailbox.deliver(msg);
            return Ok(());
        }
        self.fabric.route(dest, msg)
    }

    /// Deliver a message straight into a local completion queue, bypassing
    /// the fabric (completion notices, merged-actor extras).
    pub fn post_local(&self, msg: Message) {
        self.mailbox.deliver(msg);
    }

    /// Non-blocking poll of one completion queue.
    pub fn recv(&self, cq: CqId) -> Result<Option<Message>> {
        self.mailbox.recv(cq)
    }

    /// Block the calling thread until a message arrives on `cq`, up to the
    /// configured poll timeout.
    pub fn blocking_poll(&self, cq: CqId) -> Result<Message> {
        self.mailbox.blocking_poll(cq, self.poll_timeout)
    }

    /// Block with an explicit timeout.
    pub fn blocking_poll_timeout(&self, cq: CqId, timeout: Duration) -> Result<Message> {
        self.mailbox.blocking_poll(cq, timeout)
    }

    /// Register a completion queue and immediately replay any messages
    /// held because the queue did not exist yet.
    pub fn allocate_cq(&self, cq: CqId, sink: CqSink) {
        self.mailbox.allocate_cq(cq, sink);
    }

    /// Install the callback run when a message with no valid cq is
    /// dropped.
    pub fn set_drop_notify(&self, f: impl FnMut(&Message) + Send + 'static) {
        self.mailbox.set_drop_notify(Box::new(f));
    }
}

impl Drop for SimTransport {
    fn drop(&mut self) {
        self.fabric.unregister(self.rank);
    }
}
