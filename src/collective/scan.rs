use crate::collective::{Collective, CollectiveCore};
use crate::error::Result;
use crate::memory::RawBuf;
use crate::protocol::{DoneMessage, WorkMessage};
use crate::reduce::reduce_slice;
use crate::types::{DataType, ReduceOp};

/// Inclusive prefix scan along the rank chain: rank `r` folds the prefix
/// arriving from `r-1` into its own contribution and forwards the result
/// to `r+1`. Rank `r`'s destination ends with `src_0 op ... op src_r`.
pub struct ChainScan {
    core: CollectiveCore,
    dst: RawBuf,
    nelems: usize,
    dtype: DataType,
    op: ReduceOp,
    work: Vec<u8>,
}

impl ChainScan {
    pub fn new(
        core: CollectiveCore,
        dst: RawBuf,
        src: RawBuf,
        nelems: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Self {
        let nbytes = nelems * dtype.size_in_bytes();
        let work = if src.is_null() {
            vec![0u8; nbytes]
        } else {
            unsafe { src.as_slice() }.to_vec()
        };
        Self {
            core,
            dst,
            nelems,
            dtype,
            op,
            work,
        }
    }

    fn finish(&mut self) -> Result<Option<DoneMessage>> {
        let me = self.core.dom_me();
        if me + 1 < self.core.dom_nproc() {
            let payload = self.core.payload_from(&self.work);
            self.core.send_work(me + 1, 0, payload)?;
        }
        if !self.dst.is_null() {
            unsafe { self.dst.slice_mut(0, self.work.len()) }.copy_from_slice(&self.work);
        }
        self.core.mark_complete();
        Ok(Some(self.done_message()))
    }
}

impl Collective for ChainScan {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        if self.core.dom_me() == 0 {
            // The head of the chain holds its prefix already.
            self.finish()?;
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
        self.finish()
    }
}
