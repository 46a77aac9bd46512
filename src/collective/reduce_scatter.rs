use crate::collective::{Collective, CollectiveCore};
use crate::error::Result;
use crate::memory::RawBuf;
use crate::protocol::{DoneMessage, WorkMessage};
use crate::reduce::reduce_slice;
use crate::types::{DataType, ReduceOp};

/// Direct reduce-scatter: every rank sends chunk `j` of its source to
/// rank `j` and folds the `n-1` contributions for its own chunk.
pub struct DirectReduceScatter {
    core: CollectiveCore,
    dst: RawBuf,
    src: RawBuf,
    /// Per-rank result length in elements.
    nelems: usize,
    dtype: DataType,
    op: ReduceOp,
    /// Running fold of this rank's chunk.
    work: Vec<u8>,
    received: u32,
}

impl DirectReduceScatter {
    pub fn new(
        core: CollectiveCore,
        dst: RawBuf,
        src: RawBuf,
        nelems: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Self {
        let chunk_bytes = nelems * dtype.size_in_bytes();
        let me = core.dom_me() as usize;
        let work = if src.is_null() {
            vec![0u8; chunk_bytes]
        } else {
            let all = unsafe { src.as_slice() };
            all[me * chunk_bytes..(me + 1) * chunk_bytes].to_vec()
        };
        Self {
            core,
            dst,
            src,
            nelems,
            dtype,
            op,
            work,
            received: 0,
        }
    }

    fn write_result(&self) {
        if !self.dst.is_null() {
            unsafe { self.dst.slice_mut(0, self.work.len()) }.copy_from_slice(&self.work);
        }
    }
}

impl Collective for DirectReduceScatter {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let me = self.core.dom_me();
        let n = self.core.dom_nproc();
        if n == 1 {
            self.write_result();
            self.core.mark_complete();
            return Ok(());
        }
        let chunk_bytes = self.nelems * self.dtype.size_in_bytes();
        for dest in 0..n {
            if dest == me {
                continue;
            }
            let payload = if self.src.is_null() {
                self.core.empty_payload()
            } else {
                let all = unsafe { self.src.as_slice() };
                let off = dest as usize * chunk_bytes;
                self.core.payload_from(&all[off..off + chunk_bytes])
            };
            self.core.send_work(dest, 0, payload)?;
        }
        Ok(())
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        if msg.payload.len() == self.work.len() {
            reduce_slice(
                &mut self.work,
                &msg.payload,
                self.nelems,
                self.dtype,
                self.op,
            );
        }
        self.received += 1;
        if self.received == self.core.dom_nproc() - 1 {
            self.write_result();
            self.core.mark_complete();
            return Ok(Some(self.done_message()));
        }
        Ok(None)
    }
}
