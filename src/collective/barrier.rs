use crate::collective::{ceil_log2, Collective, CollectiveCore};
use crate::error::Result;
use crate::protocol::{DoneMessage, WorkMessage};

/// Dissemination barrier: in round `r` each rank signals the rank `2^r`
/// ahead of it and waits for the signal from the rank `2^r` behind. After
/// `ceil(log2 n)` rounds every rank has transitively heard from every
/// other, so nobody leaves before everybody has arrived.
pub struct DisseminationBarrier {
    core: CollectiveCore,
    rounds: u32,
    /// The next round whose incoming signal we are waiting on.
    cur_round: u32,
    got: Vec<bool>,
}

impl DisseminationBarrier {
    pub fn new(core: CollectiveCore) -> Self {
        let rounds = ceil_log2(core.dom_nproc());
        Self {
            core,
            rounds,
            cur_round: 0,
            got: vec![false; rounds as usize],
        }
    }

    fn send_round(&self, round: u32) -> Result<()> {
        let n = self.core.dom_nproc();
        let dest = (self.core.dom_me() + (1u32 << round)) % n;
        self.core.send_work(dest, round, self.core.empty_payload())
    }
}

impl Collective for DisseminationBarrier {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        if self.rounds == 0 {
            self.core.mark_complete();
            return Ok(());
        }
        self.send_round(0)
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        let round = msg.round as usize;
        if round < self.got.len() {
            self.got[round] = true;
        }
        // A later-round signal can arrive before the one we are waiting
        // on; round r+1 is only sent once we have cleared round r.
        while self.cur_round < self.rounds && self.got[self.cur_round as usize] {
            self.cur_round += 1;
            if self.cur_round < self.rounds {
                self.send_round(self.cur_round)?;
            }
        }
        if self.cur_round == self.rounds {
            self.core.mark_complete();
            return Ok(Some(self.done_message()));
        }
        Ok(None)
    }
}
