use crate::collective::{Collective, CollectiveCore};
use crate::error::Result;
use crate::memory::RawBuf;
use crate::protocol::{DoneMessage, WorkMessage};
use crate::reduce::reduce_slice;
use crate::types::{DataType, Rank, ReduceOp};

/// Direct reduce: every non-root rank sends its contribution straight to
/// the root, which folds them element-wise into its own.
pub struct DirectReduce {
    core: CollectiveCore,
    root: Rank,
    dst: RawBuf,
    src: RawBuf,
    nelems: usize,
    dtype: DataType,
    op: ReduceOp,
    /// Root's running fold; starts as a copy of the root's source.
    work: Vec<u8>,
    received: u32,
}

impl DirectReduce {
    pub fn new(
        core: CollectiveCore,
        root: Rank,
        dst: RawBuf,
        src: RawBuf,
        nelems: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Self {
        let nbytes = nelems * dtype.size_in_bytes();
        let work = if core.dom_me() == root {
            if src.is_null() {
                vec![0u8; nbytes]
            } else {
                unsafe { src.as_slice() }.to_vec()
            }
        } else {
            Vec::new()
        };
        Self {
            core,
            root,
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

impl Collective for DirectReduce {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        if self.core.dom_me() == self.root {
            if self.core.dom_nproc() == 1 {
                self.write_result();
                self.core.mark_complete();
            }
            return Ok(());
        }
        let payload = if self.src.is_null() {
            self.core.empty_payload()
        } else {
            self.core.payload_from(unsafe { self.src.as_slice() })
        };
        self.core.send_work(self.root, 0, payload)?;
        self.core.mark_complete();
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
