//! Registered storage nodes and placement.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use treefs_types::{CommandHandle, Endpoint, NamingError, NamingResult, NodeId, StorageHandle};

use crate::config::Placement;

/// A registered storage node.
#[derive(Debug)]
pub struct NodeRecord {
    pub id: NodeId,
    pub storage: StorageHandle,
    pub command: CommandHandle,
}

/// Storage node registry, keyed by stable node identity.
///
/// Reads are lock-free through the `DashMap`; inserts are serialized so that
/// the identity and command-endpoint checks happen together.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: DashMap<NodeId, Arc<NodeRecord>>,
    commands: DashMap<Endpoint, NodeId>,
    insert_gate: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node.
    ///
    /// Fails with `AlreadyRegistered` if its identity, or the endpoint of its
    /// command surface, is already known.
    pub fn insert(
        &self,
        storage: StorageHandle,
        command: CommandHandle,
    ) -> NamingResult<Arc<NodeRecord>> {
        let id = storage.node_id();
        let _gate = self.insert_gate.lock();

        if self.nodes.contains_key(&id) {
            return Err(NamingError::already_registered(&id));
        }
        if let Some(owner) = self.commands.get(command.endpoint()) {
            return Err(NamingError::already_registered(format!(
                "command endpoint {} is in use by {}",
                command.endpoint(),
                owner.value()
            )));
        }

        let record = Arc::new(NodeRecord {
            id: id.clone(),
            storage,
            command,
        });
        self.commands
            .insert(record.command.endpoint().clone(), id.clone());
        self.nodes.insert(id, Arc::clone(&record));
        Ok(record)
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<NodeRecord>> {
        self.nodes.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Registered node ids, sorted.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pick a node for a new file.
    ///
    /// `load` reports how many files a node currently serves; only
    /// [`Placement::FewestFiles`] consults it.
    pub fn choose(
        &self,
        placement: Placement,
        load: impl Fn(&NodeId) -> usize,
    ) -> Option<Arc<NodeRecord>> {
        let mut candidates: Vec<Arc<NodeRecord>> =
            self.nodes.iter().map(|r| Arc::clone(r.value())).collect();

        match placement {
            Placement::Random => candidates.choose(&mut rand::thread_rng()).cloned(),
            Placement::FewestFiles => {
                // Ties go to the lowest id, so placement is deterministic.
                candidates.sort_by(|a, b| a.id.cmp(&b.id));
                candidates.into_iter().min_by_key(|r| load(&r.id))
            }
        }
    }
}
