use crate::collective::{prefix_offsets, Collective, CollectiveCore};
use crate::error::Result;
use crate::memory::RawBuf;
use crate::protocol::{DoneMessage, WorkMessage};
use crate::types::Rank;

/// Direct gather: every non-root rank sends its block straight to the
/// root, which assembles blocks by sender rank.
pub struct DirectGather {
    core: CollectiveCore,
    root: Rank,
    dst: RawBuf,
    src: RawBuf,
    block_bytes: usize,
    received: u32,
}

impl DirectGather {
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
            received: 0,
        }
    }
}

impl Collective for DirectGather {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let me = self.core.dom_me();
        if me == self.root {
            if !self.dst.is_null() && !self.src.is_null() {
                unsafe {
                    self.dst
                        .slice_mut(me as usize * self.block_bytes, self.block_bytes)
                }
                .copy_from_slice(unsafe { self.src.as_slice() });
            }
            if self.core.dom_nproc() == 1 {
                self.core.mark_complete();
            }
        } else {
            let payload = if self.src.is_null() {
                self.core.empty_payload()
            } else {
                self.core.payload_from(unsafe { self.src.as_slice() })
            };
            self.core.send_work(self.root, 0, payload)?;
            self.core.mark_complete();
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

/// Direct gatherv: as [`DirectGather`] but with per-rank block sizes.
pub struct DirectGatherv {
    core: CollectiveCore,
    root: Rank,
    dst: RawBuf,
    src: RawBuf,
    send_bytes: usize,
    recv_bytes: Vec<usize>,
    recv_offsets: Vec<usize>,
    received: u32,
}

impl DirectGatherv {
    pub fn new(
        core: CollectiveCore,
        root: Rank,
        dst: RawBuf,
        src: RawBuf,
        send_bytes: usize,
        recv_bytes: Vec<usize>,
    ) -> Self {
        let recv_offsets = prefix_offsets(&recv_bytes);
        Self {
            core,
            root,
            dst,
            src,
            send_bytes,
            recv_bytes,
            recv_offsets,
            received: 0,
        }
    }
}

impl Collective for DirectGatherv {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let me = self.core.dom_me() as usize;
        if self.core.dom_me() == self.root {
            if !self.dst.is_null() && !self.src.is_null() {
                unsafe { self.dst.slice_mut(self.recv_offsets[me], self.recv_bytes[me]) }
                    .copy_from_slice(&unsafe { self.src.as_slice() }[..self.recv_bytes[me]]);
            }
            if self.core.dom_nproc() == 1 {
                self.core.mark_complete();
            }
        } else {
            let payload = if self.src.is_null() {
                self.core.empty_payload()
            } else {
                self.core
                    .payload_from(&unsafe { self.src.as_slice() }[..self.send_bytes])
            };
            self.core.send_work(self.root, 0, payload)?;
            self.core.mark_complete();
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
