use crate::collective::{prefix_offsets, Collective, CollectiveCore};
use crate::error::Result;
use crate::memory::RawBuf;
use crate::protocol::{DoneMessage, WorkMessage};
use crate::types::Rank;

/// Direct scatter: the root sends each rank its block; non-roots finish
/// on the single receive.
pub struct DirectScatter {
    core: CollectiveCore,
    root: Rank,
    dst: RawBuf,
    src: RawBuf,
    block_bytes: usize,
}

impl DirectScatter {
    pub fn new(
        core: CollectiveCore,
        root: Rank,
        dst: RawBuf,
        src: RawBuf,
        block_bytes: usize,
    ) -> Self {
        Self {
            core,
            root,
            dst,
            src,
            block_bytes,
        }
    }
}

impl Collective for DirectScatter {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let me = self.core.dom_me();
        if me != self.root {
            return Ok(());
        }
        for dest in 0..self.core.dom_nproc() {
            if dest == me {
                continue;
            }
            let payload = if self.src.is_null() {
                self.core.empty_payload()
            } else {
                let src = unsafe { self.src.as_slice() };
                let off = dest as usize * self.block_bytes;
                self.core.payload_from(&src[off..off + self.block_bytes])
            };
            self.core.send_work(dest, 0, payload)?;
        }
        if !self.dst.is_null() && !self.src.is_null() {
            let src = unsafe { self.src.as_slice() };
            let off = me as usize * self.block_bytes;
            unsafe { self.dst.slice_mut(0, self.block_bytes) }
                .copy_from_slice(&src[off..off + self.block_bytes]);
        }
        self.core.mark_complete();
        Ok(())
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        if !self.dst.is_null() && msg.payload.len() == self.block_bytes {
            unsafe { self.dst.slice_mut(0, self.block_bytes) }.copy_from_slice(&msg.payload);
        }
        self.core.mark_complete();
        Ok(Some(self.done_message()))
    }
}

/// Direct scatterv: as [`DirectScatter`] but with per-rank block sizes.
pub struct DirectScatterv {
    core: CollectiveCore,
    root: Rank,
    dst: RawBuf,
    src: RawBuf,
    send_bytes: Vec<usize>,
    send_offsets: Vec<usize>,
    recv_bytes: usize,
}

impl DirectScatterv {
    pub fn new(
        core: CollectiveCore,
        root: Rank,
        dst: RawBuf,
        src: RawBuf,
        send_bytes: Vec<usize>,
        recv_bytes: usize,
    ) -> Self {
        let send_offsets = prefix_offsets(&send_bytes);
        Self {
            core,
            root,
            dst,
            src,
            send_bytes,
            send_offsets,
            recv_bytes,
        }
    }
}

impl Collective for DirectScatterv {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let me = self.core.dom_me();
        if me != self.root {
            return Ok(());
        }
        for dest in 0..self.core.dom_nproc() {
            if dest == me {
                continue;
            }
            let d = dest as usize;
            let payload = if self.src.is_null() {
                self.core.empty_payload()
            } else {
                let src = unsafe { self.src.as_slice() };
                let off = self.send_offsets[d];
                self.core.payload_from(&src[off..off + self.send_bytes[d]])
            };
            self.core.send_work(dest, 0, payload)?;
        }
        if !self.dst.is_null() && !self.src.is_null() {
            let src = unsafe { self.src.as_slice() };
            let off = self.send_offsets[me as usize];
            let len = self.send_bytes[me as usize];
            unsafe { self.dst.slice_mut(0, len) }.copy_from_slice(&src[off..off + len]);
        }
        self.core.mark_complete();
        Ok(())
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        if !self.dst.is_null() && msg.payload.len() == self.recv_bytes {
            unsafe { self.dst.slice_mut(0, self.recv_bytes) }.copy_from_slice(&msg.payload);
        }
        self.core.mark_complete();
        Ok(Some(self.done_message()))
    }
}
