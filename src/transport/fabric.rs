use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::StarlingConfig;
use crate::error::{Result, StarlingError};
use crate::protocol::{Message, MessageClass};
use crate::transport::Mailbox;
use crate::types::Rank;

/// The in-process interconnect shared by every rank of a simulated world.
///
/// The fabric doubles as the endpoint-registration service: ranks register
/// at startup, messages routed to a rank that has not registered yet are
/// held and replayed the moment it does, and registering a rank twice is a
/// configuration error. The addressing topology is fixed at construction -
/// routing to a rank outside the world is fatal.
///
/// Delivery charges a simulated injection delay by message class
/// (header-only vs. bulk); this is the only thing the class controls.
pub struct Fabric {
    world_size: u32,
    header_delay: Duration,
    bulk_delay: Duration,
    state: Mutex<FabricState>,
}

struct FabricState {
    endpoints: HashMap<Rank, Arc<Mailbox>>,
    /// Messages addressed to ranks that have not registered yet.
    pending: HashMap<Rank, Vec<Message>>,
}

impl Fabric {
    pub fn new(world_size: u32, config: &StarlingConfig) -> Arc<Self> {
        Arc::new(Self {
            world_size,
            header_delay: config.header_delay,
            bulk_delay: config.bulk_delay,
            state: Mutex::new(FabricState {
                endpoints: HashMap::new(),
                pending: HashMap::new(),
            }),
        })
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Register `rank` and return its mailbox, replaying any messages that
    /// arrived before registration, in arrival order.
    pub(crate) fn register(&self, rank: Rank) -> Result<Arc<Mailbox>> {
        if rank >= self.world_size {
            return Err(StarlingError::UnknownPeer {
                rank,
                world_size: self.world_size,
            });
        }
        let (mailbox, replay) = {
            let mut state = self.state.lock().expect("fabric state lock");
            if state.endpoints.contains_key(&rank) {
                return Err(StarlingError::RankTaken { rank });
            }
            let mailbox = Arc::new(Mailbox::new(rank));
            state.endpoints.insert(rank, Arc::clone(&mailbox));
            let replay = state.pending.remove(&rank).unwrap_or_default();
            (mailbox, replay)
        };
        for msg in replay {
            tracing::debug!(rank, "fabric: replaying message held for late registration");
            mailbox.deliver(msg);
        }
        Ok(mailbox)
    }

    /// Remove `rank` from the fabric. Messages already held for it are
    /// kept and replayed if it registers again.
    pub fn unregister(&self, rank: Rank) {
        let mut state = self.state.lock().expect("fabric state lock");
        state.endpoints.remove(&rank);
    }

    /// Route one message to `dest`, charging the injection delay for its
    /// class before delivery.
    pub(crate) fn route(&self, dest: Rank, msg: Message) -> Result<()> {
        if dest >= self.world_size {
            return Err(StarlingError::UnknownPeer {
                rank: dest,
                world_size: self.world_size,
            });
        }

        let delay = match msg.class() {
            MessageClass::Header => self.header_delay,
            MessageClass::Bulk => self.bulk_delay,
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mailbox = {
            let mut state = self.state.lock().expect("fabric state lock");
            match state.endpoints.get(&dest) {
                Some(mb) => Arc::clone(mb),
                None => {
                    tracing::debug!(dest, "fabric: holding message for unregistered rank");
                    state.pending.entry(dest).or_default().push(msg);
                    return Ok(());
                }
            }
        };
        mailbox.deliver(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{Communicator, Topology};
    use crate::protocol::DoneMessage;
    use crate::types::{CollectiveKind, DEFAULT_CQ};

    fn done_msg(tag: i64) -> Message {
        let comm = Communicator::global(0, &Topology::flat(2)).unwrap();
        Message::Done(DoneMessage::new(
            CollectiveKind::Barrier,
            tag,
            DEFAULT_CQ,
            comm,
        ))
    }

    #[test]
    fn test_register_twice_fails() {
        let fabric = Fabric::new(2, &StarlingConfig::default());
        fabric.register(0).unwrap();
        let err = fabric.register(0).unwrap_err();
        assert!(matches!(err, StarlingError::RankTaken { rank: 0 }));
    }

    #[test]
    fn test_route_out_of_world_fails() {
        let fabric = Fabric::new(2, &StarlingConfig::default());
        let err = fabric.route(7, done_msg(1)).unwrap_err();
        assert!(matches!(
            err,
            StarlingError::UnknownPeer {
                rank: 7,
                world_size: 2
            }
        ));
    }

    #[test]
    fn test_message_held_until_registration() {
        let fabric = Fabric::new(2, &StarlingConfig::default());
        fabric.route(1, done_msg(1)).unwrap();
        fabric.route(1, done_msg(2)).unwrap();

        let mailbox = fabric.register(1).unwrap();
        let m1 = mailbox.recv(DEFAULT_CQ).unwrap().expect("first held message");
        let m2 = mailbox.recv(DEFAULT_CQ).unwrap().expect("second held message");
        match (m1, m2) {
            (Message::Done(a), Message::Done(b)) => {
                assert_eq!(a.tag(), 1);
                assert_eq!(b.tag(), 2);
            }
            other => panic!("unexpected messages: {other:?}"),
        }
    }

    #[test]
    fn test_unregister_frees_rank() {
        let fabric = Fabric::new(1, &StarlingConfig::default());
        fabric.register(0).unwrap();
        fabric.unregister(0);
        fabric.register(0).unwrap();
    }
}
