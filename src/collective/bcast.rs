use crate::collective::{Collective, CollectiveCore};
use crate::error::Result;
use crate::memory::RawBuf;
use crate::protocol::{DoneMessage, WorkMessage};
use crate::types::Rank;

/// Binary-tree broadcast rooted at an arbitrary communicator rank.
///
/// Ranks are relabeled so the root sits at position 0 of a heap-indexed
/// binary tree; every rank forwards the payload to its two children as
/// soon as it holds the data.
pub struct BinaryTreeBcast {
    core: CollectiveCore,
    root: Rank,
    buf: RawBuf,
    nbytes: usize,
}

impl BinaryTreeBcast {
    pub fn new(core: CollectiveCore, root: Rank, buf: RawBuf, nbytes: usize) -> Self {
        Self {
            core,
            root,
            buf,
            nbytes,
        }
    }

    /// Heap position of this rank in the tree rooted at `root`.
    fn tree_pos(&self) -> u32 {
        let n = self.core.dom_nproc();
        (self.core.dom_me() + n - self.root) % n
    }

    fn forward_to_children(&self) -> Result<()> {
        let n = self.core.dom_nproc();
        let pos = self.tree_pos();
        for child_pos in [pos * 2 + 1, pos * 2 + 2] {
            if child_pos < n {
                let child = (child_pos + self.root) % n;
                let payload = if self.buf.is_null() {
                    self.core.empty_payload()
                } else {
                    self.core.payload_from(unsafe { self.buf.as_slice() })
                };
                self.core.send_work(child, 0, payload)?;
            }
        }
        Ok(())
    }
}

impl Collective for BinaryTreeBcast {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        if self.core.dom_me() == self.root {
            self.forward_to_children()?;
            self.core.mark_complete();
        }
        Ok(())
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        if !self.buf.is_null() && msg.payload.len() == self.nbytes {
            unsafe { self.buf.slice_mut(0, self.nbytes) }.copy_from_slice(&msg.payload);
        }
        self.forward_to_children()?;
        self.core.mark_complete();
        Ok(Some(self.done_message()))
    }
}
