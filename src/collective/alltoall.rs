use crate::collective::{prefix_offsets, Collective, CollectiveCore};
use crate::error::Result;
use crate::memory::RawBuf;
use crate::protocol::{DoneMessage, WorkMessage};

/// Direct alltoall: every rank sends block `j` of its source straight to
/// rank `j` and places arrivals by sender rank.
pub struct DirectAlltoall {
    core: CollectiveCore,
    dst: RawBuf,
    src: RawBuf,
    block_bytes: usize,
    received: u32,
}

impl DirectAlltoall {
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

impl Collective for DirectAlltoall {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let me = self.core.dom_me();
        let n = self.core.dom_nproc();
        if !self.dst.is_null() && !self.src.is_null() {
            let off = me as usize * self.block_bytes;
            unsafe { self.dst.slice_mut(off, self.block_bytes) }
                .copy_from_slice(&unsafe { self.src.as_slice() }[off..off + self.block_bytes]);
        }
        if n == 1 {
            self.core.mark_complete();
            return Ok(());
        }
        for dest in 0..n {
            if dest == me {
                continue;
            }
            let payload = if self.src.is_null() {
                self.core.empty_payload()
            } else {
                let off = dest as usize * self.block_bytes;
                self.core
                    .payload_from(&unsafe { self.src.as_slice() }[off..off + self.block_bytes])
            };
            self.core.send_work(dest, 0, payload)?;
        }
        Ok(())
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        if !self.dst.is_null() && msg.payload.len() == self.block_bytes {
            unsafe {
                self.dst
                    .slice_mut(msg.sender as usize * self.block_bytes, self.block_bytes)
            }
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

/// Direct alltoallv: as [`DirectAlltoall`] with per-destination send
/// counts and per-sender receive counts.
pub struct DirectAlltoallv {
    core: CollectiveCore,
    dst: RawBuf,
    src: RawBuf,
    send_bytes: Vec<usize>,
    send_offsets: Vec<usize>,
    recv_bytes: Vec<usize>,
    recv_offsets: Vec<usize>,
    received: u32,
}

impl DirectAlltoallv {
    pub fn new(
        core: CollectiveCore,
        dst: RawBuf,
        src: RawBuf,
        send_bytes: Vec<usize>,
        recv_bytes: Vec<usize>,
    ) -> Self {
        let send_offsets = prefix_offsets(&send_bytes);
        let recv_offsets = prefix_offsets(&recv_bytes);
        Self {
            core,
            dst,
            src,
            send_bytes,
            send_offsets,
            recv_bytes,
            recv_offsets,
            received: 0,
        }
    }
}

impl Collective for DirectAlltoallv {
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
            let len = self.send_bytes[me].min(self.recv_bytes[me]);
            unsafe { self.dst.slice_mut(self.recv_offsets[me], len) }.copy_from_slice(
                &unsafe { self.src.as_slice() }[self.send_offsets[me]..self.send_offsets[me] + len],
            );
        }
        if n == 1 {
            self.core.mark_complete();
            return Ok(());
        }
        for dest in 0..n {
            if dest as usize == me {
                continue;
            }
            let d = dest as usize;
            let payload = if self.src.is_null() {
                self.core.empty_payload()
            } else {
                let off = self.send_offsets[d];
                self.core
                    .payload_from(&unsafe { self.src.as_slice() }[off..off + self.send_bytes[d]])
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
