//! The one process-wide mutable structure: a name → partition map behind
//! a single reader-writer lock, per `spec.md` §5.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bitindex_base::{kind_err, Kind, Result};

use crate::partition::Partition;

/// Holds every partition a process has loaded, keyed by name. Readers
/// take a shared lock for the lifetime of a query; a rebuild takes the
/// exclusive lock only long enough to swap in a new `Arc<Partition>` —
/// evaluators already holding a clone of the old `Arc` keep running
/// against it undisturbed.
#[derive(Default)]
pub struct PartitionRegistry {
    partitions: RwLock<HashMap<String, Arc<Partition>>>,
}

impl PartitionRegistry {
    pub fn new() -> Self {
        PartitionRegistry::default()
    }

    pub fn insert(&self, name: impl Into<String>, partition: Partition) {
        let name = name.into();
        tracing::debug!(partition = %name, "registering partition");
        self.partitions.write().expect("partition registry lock poisoned").insert(name, Arc::new(partition));
    }

    /// Atomically replace an existing partition, e.g. after a rebuild.
    /// Readers that already hold a clone of the old `Arc` are unaffected.
    pub fn replace(&self, name: impl Into<String>, partition: Partition) {
        self.insert(name, partition);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Partition>> {
        self.partitions.write().expect("partition registry lock poisoned").remove(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Partition>> {
        self.partitions
            .read()
            .expect("partition registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| kind_err(Kind::InvalidState, format!("no partition named {name}")))
    }

    pub fn names(&self) -> Vec<String> {
        self.partitions.read().expect("partition registry lock poisoned").keys().cloned().collect()
    }
}
