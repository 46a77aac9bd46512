//! Communicators over the simulated topology.
//!
//! A [`Communicator`] names an ordered set of global ranks; position in the
//! set is the communicator-local rank. The global communicator derives two
//! optional subcommunicators from the node layout: the node-local group of
//! this rank, and the per-node owner group (lowest rank of every node),
//! which together drive the locality decomposition of collectives.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Result, StarlingError};
use crate::types::{NodeId, Rank};

/// Placement of every rank onto physical nodes: index = global rank.
#[derive(Debug, Clone)]
pub struct Topology {
    node_of: Vec<NodeId>,
}

impl Topology {
    /// Explicit rank-to-node map.
    pub fn new(node_of: Vec<NodeId>) -> Self {
        Self { node_of }
    }

    /// Every rank on its own node.
    pub fn flat(nranks: u32) -> Self {
        Self {
            node_of: (0..nranks).collect(),
        }
    }

    /// `nodes` nodes with `per_node` consecutive ranks each.
    pub fn smp(nodes: u32, per_node: u32) -> Self {
        Self {
            node_of: (0..nodes * per_node).map(|r| r / per_node).collect(),
        }
    }

    pub fn nranks(&self) -> u32 {
        self.node_of.len() as u32
    }

    pub fn node_of(&self, rank: Rank) -> NodeId {
        self.node_of[rank as usize]
    }

    /// Ranks grouped by node, in node order of first appearance.
    fn groups(&self) -> IndexMap<NodeId, Vec<Rank>> {
        let mut groups: IndexMap<NodeId, Vec<Rank>> = IndexMap::new();
        for (rank, &node) in self.node_of.iter().enumerate() {
            groups.entry(node).or_default().push(rank as Rank);
        }
        groups
    }
}

/// An ordered set of global ranks participating in collectives together.
#[derive(Debug)]
pub struct Communicator {
    /// Global ranks; the position of a rank here is its communicator rank.
    ranks: Vec<Rank>,
    my_global: Rank,
    /// This rank's node-local subcommunicator, when the topology places
    /// more than one node and more than one rank somewhere on a node.
    smp: Option<Arc<Communicator>>,
    /// The per-node owner subcommunicator; present only on owner ranks.
    owner: Option<Arc<Communicator>>,
    /// Whether every node hosts the same number of participant ranks.
    smp_balanced: bool,
}

impl Communicator {
    /// Build the global communicator spanning all ranks of `topo`, from
    /// the perspective of `my_rank`.
    pub fn global(my_rank: Rank, topo: &Topology) -> Result<Arc<Self>> {
        if my_rank >= topo.nranks() {
            return Err(StarlingError::NotInCommunicator { rank: my_rank });
        }

        let groups = topo.groups();
        let multi_node = groups.len() > 1;
        let any_shared_node = groups.values().any(|g| g.len() > 1);

        let first = groups
            .values()
            .next()
            .map(|g| g.len())
            .unwrap_or_default();
        let smp_balanced = groups.values().all(|g| g.len() == first);

        let mut smp = None;
        let mut owner = None;
        if multi_node && any_shared_node {
            let my_node = topo.node_of(my_rank);
            let local = groups[&my_node].clone();
            let my_lead = local[0];
            smp = Some(Self::subset(local, my_rank));
            if my_rank == my_lead {
                let leads: Vec<Rank> = groups.values().map(|g| g[0]).collect();
                owner = Some(Self::subset(leads, my_rank));
            }
        }

        Ok(Arc::new(Self {
            ranks: (0..topo.nranks()).collect(),
            my_global: my_rank,
            smp,
            owner,
            smp_balanced,
        }))
    }

    /// A subcommunicator over an explicit rank set; `my_global` must be a
    /// member.
    pub fn subset(ranks: Vec<Rank>, my_global: Rank) -> Arc<Self> {
        debug_assert!(ranks.contains(&my_global));
        Arc::new(Self {
            ranks,
            my_global,
            smp: None,
            owner: None,
            smp_balanced: false,
        })
    }

    /// Number of participants.
    pub fn nproc(&self) -> u32 {
        self.ranks.len() as u32
    }

    /// This rank's position within the communicator.
    pub fn my_comm_rank(&self) -> Rank {
        self.ranks
            .iter()
            .position(|&r| r == self.my_global)
            .expect("own rank is a member of the communicator") as Rank
    }

    /// This rank's global rank.
    pub fn my_global_rank(&self) -> Rank {
        self.my_global
    }

    /// Map a communicator rank to its global rank.
    pub fn comm_to_global_rank(&self, comm_rank: Rank) -> Rank {
        self.ranks[comm_rank as usize]
    }

    /// Map a global rank to its communicator rank, if it is a member.
    pub fn global_to_comm_rank(&self, global: Rank) -> Option<Rank> {
        self.ranks.iter().position(|&r| r == global).map(|p| p as Rank)
    }

    /// The node-local subcommunicator, if the topology has one for this
    /// rank.
    pub fn smp_comm(&self) -> Option<&Arc<Communicator>> {
        self.smp.as_ref()
    }

    /// The per-node owner subcommunicator; `Some` only when this rank owns
    /// its node.
    pub fn owner_comm(&self) -> Option<&Arc<Communicator>> {
        self.owner.as_ref()
    }

    /// True when every node hosts the same number of participants.
    pub fn smp_balanced(&self) -> bool {
        self.smp_balanced
    }
}
