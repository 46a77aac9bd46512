use crate::collective::{ceil_log2, Collective, CollectiveCore, RoundBuffer};
use crate::error::Result;
use crate::memory::RawBuf;
use crate::protocol::{DoneMessage, WorkMessage};
use crate::reduce::reduce_slice;
use crate::types::{DataType, Rank, ReduceOp};

/// How this rank participates in the recursive-doubling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// A rank in `[0, excess)`: folds in one excess partner's data before
    /// the exchange rounds and sends the result back after them.
    Partnered,
    /// A rank in `[excess, p2)`: runs the exchange rounds directly.
    Direct,
    /// A rank in `[p2, n)`: contributes its data up front and sits out
    /// until the result comes back.
    Extra,
}

/// Recursive-doubling allreduce.
///
/// For a power-of-two world, `log2(n)` rounds where rank `i` exchanges its
/// full working buffer with rank `i XOR 2^r` and both sides fold. For
/// non-power-of-two worlds, the excess ranks above the largest power of
/// two first fold their data into a partner in the lower range and receive
/// the finished result back at the end.
///
/// Round numbering: round 0 is the excess fold-in, rounds `1..=log2(p2)`
/// are the exchanges, and the final round is the excess fold-out.
pub struct RecursiveDoublingAllreduce {
    core: CollectiveCore,
    dst: RawBuf,
    src: RawBuf,
    nelems: usize,
    dtype: DataType,
    op: ReduceOp,
    /// Running fold; captured from `src` when the phase starts, not at
    /// construction - a chained phase's source is written by its
    /// predecessor.
    work: Vec<u8>,
    role: Role,
    p2: u32,
    log2: u32,
    /// The next round whose arrival we are waiting on.
    cur_round: u32,
    stash: RoundBuffer,
}

impl RecursiveDoublingAllreduce {
    pub fn new(
        core: CollectiveCore,
        dst: RawBuf,
        src: RawBuf,
        nelems: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Self {
        let n = core.dom_nproc();

        // Largest power of two at most n.
        let p2 = if n.is_power_of_two() {
            n
        } else {
            n.next_power_of_two() >> 1
        };
        let excess = n - p2;
        let me = core.dom_me();
        let role = if me >= p2 {
            Role::Extra
        } else if me < excess {
            Role::Partnered
        } else {
            Role::Direct
        };

        Self {
            core,
            dst,
            src,
            nelems,
            dtype,
            op,
            work: Vec::new(),
            role,
            p2,
            log2: ceil_log2(p2),
            cur_round: 0,
            stash: RoundBuffer::new(),
        }
    }

    fn fold_out_round(&self) -> u32 {
        self.log2 + 1
    }

    fn partner_for(&self, exchange_round: u32) -> Rank {
        self.core.dom_me() ^ (1u32 << (exchange_round - 1))
    }

    fn send_work_buffer(&self, dest: Rank, round: u32) -> Result<()> {
        let payload = self.core.payload_from(&self.work);
        self.core.send_work(dest, round, payload)
    }

    fn finish(&mut self) -> Option<DoneMessage> {
        if !self.dst.is_null() {
            unsafe { self.dst.slice_mut(0, self.work.len()) }.copy_from_slice(&self.work);
        }
        self.core.mark_complete();
        Some(self.done_message())
    }

    fn fold(&mut self, payload: &[u8]) {
        if payload.len() == self.work.len() {
            reduce_slice(&mut self.work, payload, self.nelems, self.dtype, self.op);
        }
    }

    /// Fold every stashed round we are ready for; returns the completion
    /// notice once the schedule is exhausted.
    fn advance(&mut self) -> Result<Option<DoneMessage>> {
        while let Some(msg) = self.stash.take(self.cur_round) {
            match self.role {
                Role::Extra => {
                    // The finished result coming back from our partner.
                    if msg.payload.len() == self.work.len() {
                        self.work.copy_from_slice(&msg.payload);
                    }
                    return Ok(self.finish());
                }
                Role::Partnered if self.cur_round == 0 => {
                    self.fold(&msg.payload);
                    self.enter_exchanges()?;
                }
                _ => {
                    // An exchange round: both sides sent before folding,
                    // so the fold is symmetric.
                    self.fold(&msg.payload);
                    self.cur_round += 1;
                    if self.cur_round <= self.log2 {
                        self.send_work_buffer(self.partner_for(self.cur_round), self.cur_round)?;
                    } else {
                        if self.role == Role::Partnered {
                            let extra = self.core.dom_me() + self.p2;
                            self.send_work_buffer(extra, self.fold_out_round())?;
                        }
                        return Ok(self.finish());
                    }
                }
            }
        }
        Ok(None)
    }

    fn enter_exchanges(&mut self) -> Result<()> {
        self.cur_round = 1;
        self.send_work_buffer(self.partner_for(1), 1)
    }
}

impl Collective for RecursiveDoublingAllreduce {
    fn core(&self) -> &CollectiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CollectiveCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<()> {
        let nbytes = self.nelems * self.dtype.size_in_bytes();
        self.work = if self.src.is_null() {
            vec![0u8; nbytes]
        } else {
            unsafe { self.src.as_slice() }.to_vec()
        };
        if self.core.dom_nproc() == 1 {
            self.finish();
            return Ok(());
        }
        match self.role {
            Role::Extra => {
                let partner = self.core.dom_me() - self.p2;
                self.send_work_buffer(partner, 0)?;
                self.cur_round = self.fold_out_round();
            }
            Role::Partnered => {
                // Wait for the excess partner's round-0 contribution.
                self.cur_round = 0;
            }
            Role::Direct => {
                self.enter_exchanges()?;
            }
        }
        Ok(())
    }

    fn recv(&mut self, msg: WorkMessage) -> Result<Option<DoneMessage>> {
        self.stash.push(msg);
        self.advance()
    }
}
