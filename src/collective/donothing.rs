use std::sync::Arc;

use crate::collective::{Collective, CollectiveCore};
use crate::error::Result;
use crate::protocol::{DoneMessage, WorkMessage};
use crate::types::CollectiveKind;

/// Chain terminator: closes a locality-decomposed chain on the original
/// communicator without any further transport activity.
///
/// The terminator reports the logical kind of the whole chain (the fast
/// path and the flat path already report the real kind, so callers see one
/// consistent kind either way) and owns any workspace buffers the earlier
/// phases staged intermediate results in - they are reclaimed with it.
pub struct DoNothing {
    core: CollectiveCore,
    reported_kind: CollectiveKind,
    /// Keeps decomposition workspaces alive until the chain is reclaimed.
    _workspaces: Vec<Vec<u8>>,
}

impl DoNothing {
    pub fn new(core: CollectiveCore, reported_kind: CollectiveKind) -> Self {
        Self {
            core,
            reported_kind,
            _workspaces: Vec::new(),
        }
    }

    /// Transfer ownership of a workspace buffer to this terminator.
    pub fn adopt_workspace(&mut self, workspace: Vec<u8>) {
        self._workspaces.push(workspace);
    }
}

impl Collective for DoNothing {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        self.core.mark_complete();
        Ok(())
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        tracing::warn!(%msg, "donothing collective received a work message");
        Ok(None)
    }

    fn done_message(&self) -> DoneMessage {
        DoneMessage::new(
            self.reported_kind,
            self.tag(),
            self.cq_id(),
            Arc::clone(self.comm()),
        )
    }
}
