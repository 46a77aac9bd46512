use crossbeam_queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Small tier: 64 buffers x 4 KiB - header-class collective payloads.
const SMALL_POOL_SIZE: usize = 64;
const SMALL_BUF_CAPACITY: usize = 4 * 1024;

/// Large tier capacity: 1 MiB - bulk-class payloads (gathered blocks,
/// full reduce buffers).
const LARGE_POOL_SIZE: usize = 8;
const LARGE_BUF_CAPACITY: usize = 1024 * 1024;

/// A two-tier lock-free buffer pool for collective message payloads.
///
/// Checkout picks the tier by requested size; return goes back to the
/// matching tier. Buffers that have grown beyond 4x their tier's capacity
/// are dropped instead of returned.
pub struct BufferPool {
    small: ArrayQueue<Vec<u8>>,
    large: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    /// Create a pool with the default tier sizes.
    pub fn new() -> Arc<Self> {
        Self::with_tier_sizes(SMALL_POOL_SIZE, LARGE_POOL_SIZE)
    }

    /// Create a pool with custom tier counts (primarily for testing).
    pub fn with_tier_sizes(small_count: usize, large_count: usize) -> Arc<Self> {
        fn fill_tier(count: usize, capacity: usize) -> ArrayQueue<Vec<u8>> {
            let queue = ArrayQueue::new(count.max(1));
            for _ in 0..count {
                let _ = queue.push(Vec::with_capacity(capacity));
            }
            queue
        }

        Arc::new(Self {
            small: fill_tier(small_count, SMALL_BUF_CAPACITY),
            large: fill_tier(large_count, LARGE_BUF_CAPACITY),
        })
    }

    /// Check out a buffer, resized to `len` bytes (zeroed).
    ///
    /// - `len <= 4 KiB`: small tier
    /// - `len <= 1 MiB`: large tier
    /// - larger: allocated fresh, never pooled
    pub fn checkout(self: &Arc<Self>, len: usize) -> PooledBuf {
        let (queue, tier, capacity) = self.tier_for_size(len);
        let mut buf = match queue {
            Some(q) => q.pop().unwrap_or_else(|| Vec::with_capacity(capacity)),
            None => Vec::with_capacity(len),
        };
        buf.resize(len, 0);
        PooledBuf {
            buf: Some(buf),
            pool: Arc::clone(self),
            tier,
        }
    }

    /// Check out a buffer initialized with a copy of `data`.
    pub fn checkout_from(self: &Arc<Self>, data: &[u8]) -> PooledBuf {
        let mut buf = self.checkout(data.len());
        buf.copy_from_slice(data);
        buf
    }

    fn tier_for_size(&self, len: usize) -> (Option<&ArrayQueue<Vec<u8>>>, PoolTier, usize) {
        if len <= SMALL_BUF_CAPACITY {
            (Some(&self.small), PoolTier::Small, SMALL_BUF_CAPACITY)
        } else if len <= LARGE_BUF_CAPACITY {
            (Some(&self.large), PoolTier::Large, LARGE_BUF_CAPACITY)
        } else {
            (None, PoolTier::Unpooled, len)
        }
    }

    fn return_buf(&self, mut buf: Vec<u8>, tier: PoolTier) {
        let (queue, max_cap) = match tier {
            PoolTier::Small => (Some(&self.small), SMALL_BUF_CAPACITY * 4),
            PoolTier::Large => (Some(&self.large), LARGE_BUF_CAPACITY * 4),
            PoolTier::Unpooled => (None, 0),
        };
        if let Some(q) = queue {
            if buf.capacity() <= max_cap {
                buf.clear();
                let _ = q.push(buf);
            }
        }
    }
}

/// Which pool tier a buffer belongs to.
#[derive(Debug, Clone, Copy)]
enum PoolTier {
    Small,
    Large,
    Unpooled,
}

/// A buffer checked out from a `BufferPool`. Derefs to `[u8]`.
/// On drop, the underlying `Vec` is cleared and returned to its tier.
pub struct PooledBuf {
    buf: Option<Vec<u8>>,
    pool: Arc<BufferPool>,
    tier: PoolTier,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Invariant: `buf` is `Some` from construction until `Drop`.
        self.buf.as_ref().expect("PooledBuf used after drop")
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut().expect("PooledBuf used after drop")
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.return_buf(buf, self.tier);
        }
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PooledBuf({}B)", self.len())
    }
}
