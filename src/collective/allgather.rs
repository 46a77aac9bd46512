use crate::collective::{ceil_log2, prefix_offsets, Collective, CollectiveCore, RoundBuffer};
use crate::error::Result;
use crate::memory::RawBuf;
use crate::protocol::{DoneMessage, WorkMessage};

/// Ring allgather: `n-1` rounds; in round `r` each rank forwards to its
/// successor the block it received in round `r-1` (round 0 forwards its
/// own block). The block index is implied by the round, so payloads carry
/// no framing.
pub struct RingAllgather {
    core: CollectiveCore,
    dst: RawBuf,
    src: RawBuf,
    block_bytes: usize,
    received: u32,
}

impl RingAllgather {
    pub fn new(core: CollectiveCore, dst: RawBuf, src: RawBuf, block_bytes: usize) -> Self {
        Self {
            core,
            dst,
            src,
            block_bytes,
            received: 0,
        }
    }
}

impl Collective for RingAllgather {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let me = self.core.dom_me() as usize;
        let n = self.core.dom_nproc();
        if !self.dst.is_null() && !self.src.is_null() {
            unsafe { self.dst.slice_mut(me * self.block_bytes, self.block_bytes) }
                .copy_from_slice(unsafe { self.src.as_slice() });
        }
        if n == 1 {
            self.core.mark_complete();
            return Ok(());
        }
        let next = (self.core.dom_me() + 1) % n;
        let payload = if self.src.is_null() {
            self.core.empty_payload()
        } else {
            self.core.payload_from(unsafe { self.src.as_slice() })
        };
        self.core.send_work(next, 0, payload)
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        let n = self.core.dom_nproc();
        let me = self.core.dom_me();
        let prev = (me + n - 1) % n;
        // The block my predecessor forwards in round r originated at the
        // rank r hops behind it.
        let origin = ((prev + n - msg.round % n) % n) as usize;
        if !self.dst.is_null() && msg.payload.len() == self.block_bytes {
            unsafe {
                self.dst
                    .slice_mut(origin * self.block_bytes, self.block_bytes)
            }
            .copy_from_slice(&msg.payload);
        }
        if msg.round + 2 < n {
            let next = (me + 1) % n;
            self.core.send_work(next, msg.round + 1, msg.payload)?;
        }
        self.received += 1;
        if self.received == n - 1 {
            self.core.mark_complete();
            return Ok(Some(self.done_message()));
        }
        Ok(None)
    }
}

/// Bruck allgather: `ceil(log2 n)` rounds of block doubling. Round `k`
/// sends the first `min(2^k, n - 2^k)` accumulated blocks to the rank
/// `2^k` behind and appends the same count received from the rank `2^k`
/// ahead; a final rotation restores rank order into the destination.
pub struct BruckAllgather {
    core: CollectiveCore,
    dst: RawBuf,
    src: RawBuf,
    block_bytes: usize,
    /// Accumulated blocks in Bruck order: position j holds the block of
    /// rank me+j (mod n). Seeded from `src` when the phase starts - a
    /// chained phase's source is written by its predecessor.
    work: Vec<u8>,
    rounds: u32,
    cur_round: u32,
    stash: RoundBuffer,
}

impl BruckAllgather {
    pub fn new(core: CollectiveCore, dst: RawBuf, src: RawBuf, block_bytes: usize) -> Self {
        let rounds = ceil_log2(core.dom_nproc());
        Self {
            core,
            dst,
            src,
            block_bytes,
            work: Vec::new(),
            rounds,
            cur_round: 0,
            stash: RoundBuffer::new(),
        }
    }

    fn blocks_in_round(&self, round: u32) -> usize {
        let n = self.core.dom_nproc() as usize;
        let have = 1usize << round;
        have.min(n - have)
    }

    fn send_round(&self, round: u32) -> Result<()> {
        let n = self.core.dom_nproc();
        let dest = (self.core.dom_me() + n - (1u32 << round) % n) % n;
        let bytes = self.blocks_in_round(round) * self.block_bytes;
        let payload = self.core.payload_from(&self.work[..bytes]);
        self.core.send_work(dest, round, payload)
    }

    /// Unwind the Bruck ordering: accumulated position j holds the block
    /// of rank me+j (mod n).
    fn rotate_into_dst(&self) {
        if self.dst.is_null() {
            return;
        }
        let n = self.core.dom_nproc() as usize;
        let me = self.core.dom_me() as usize;
        for j in 0..n {
            let rank = (me + j) % n;
            unsafe {
                self.dst
                    .slice_mut(rank * self.block_bytes, self.block_bytes)
            }
            .copy_from_slice(&self.work[j * self.block_bytes..(j + 1) * self.block_bytes]);
        }
    }
}

impl Collective for BruckAllgather {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let n = self.core.dom_nproc() as usize;
        self.work = vec![0u8; n * self.block_bytes];
        if !self.src.is_null() {
            self.work[..self.block_bytes].copy_from_slice(unsafe { self.src.as_slice() });
        }
        if self.rounds == 0 {
            self.rotate_into_dst();
            self.core.mark_complete();
            return Ok(());
        }
        self.send_round(0)
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        self.stash.push(msg);
        while let Some(m) = self.stash.take(self.cur_round) {
            let count = self.blocks_in_round(self.cur_round);
            let offset = (1usize << self.cur_round) * self.block_bytes;
            let bytes = count * self.block_bytes;
            if m.payload.len() == bytes {
                self.work[offset..offset + bytes].copy_from_slice(&m.payload);
            }
            self.cur_round += 1;
            if self.cur_round < self.rounds {
                self.send_round(self.cur_round)?;
            } else {
                self.rotate_into_dst();
                self.core.mark_complete();
                return Ok(Some(self.done_message()));
            }
        }
        Ok(None)
    }
}

/// Direct allgatherv: every rank sends its block to every other rank;
/// blocks land at the offset implied by the sender's rank.
pub struct DirectAllgatherv {
    core: CollectiveCore,
    dst: RawBuf,
    src: RawBuf,
    recv_bytes: Vec<usize>,
    recv_offsets: Vec<usize>,
    received: u32,
}

impl DirectAllgatherv {
    pub fn new(core: CollectiveCore, dst: RawBuf, src: RawBuf, recv_bytes: Vec<usize>) -> Self {
        let recv_offsets = prefix_offsets(&recv_bytes);
        Self {
            core,
            dst,
            src,
            recv_bytes,
            recv_offsets,
            received: 0,
        }
    }
}

impl Collective for DirectAllgatherv {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let me = self.core.dom_me() as usize;
        let n = self.core.dom_nproc();
        if !self.dst.is_null() && !self.src.is_null() {
            unsafe {
                self.dst
                    .slice_mut(self.recv_offsets[me], self.recv_bytes[me])
            }
            .copy_from_slice(&unsafe { self.src.as_slice() }[..self.recv_bytes[me]]);
        }
        if n == 1 {
            self.core.mark_complete();
            return Ok(());
        }
        for dest in 0..n {
            if dest == self.core.dom_me() {
                continue;
            }
            let payload = if self.src.is_null() {
                self.core.empty_payload()
            } else {
                self.core
                    .payload_from(&unsafe { self.src.as_slice() }[..self.recv_bytes[me]])
            };
            self.core.send_work(dest, 0, payload)?;
        }
        Ok(())
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        let sender = msg.sender as usize;
        let expect = self.recv_bytes[sender];
        if !self.dst.is_null() && msg.payload.len() == expect {
            unsafe { self.dst.slice_mut(self.recv_offsets[sender], expect) }
                .copy_from_slice(&msg.payload);
        }
        self.received += 1;
        if self.received == self.core.dom_nproc() - 1 {
            self.core.mark_complete();
            return Ok(Some(self.done_message()));
        }
        Ok(None)
    }
}
