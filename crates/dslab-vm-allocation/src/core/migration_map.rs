//! Result of a consolidation round.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::common::{HostId, VmId};

/// Mapping from VMs to their destination hosts produced by one consolidation round.
///
/// Each VM appears at most once. The map also holds hosts which can be switched off once all planned migrations
/// from them are completed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MigrationMap {
    migrations: IndexMap<VmId, HostId>,
    hosts_to_deactivate: BTreeSet<HostId>,
}

impl MigrationMap {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds migration of `vm_id` to `host_id`. Returns false if the VM is already in the map.
    pub fn insert(&mut self, vm_id: VmId, host_id: HostId) -> bool {
        if self.migrations.contains_key(&vm_id) {
            return false;
        }
        self.migrations.insert(vm_id, host_id);
        true
    }

    pub fn get(&self, vm_id: VmId) -> Option<HostId> {
        self.migrations.get(&vm_id).copied()
    }

    pub fn contains_vm(&self, vm_id: VmId) -> bool {
        self.migrations.contains_key(&vm_id)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Iterates over `(vm, destination host)` pairs in the order they were planned.
    pub fn iter(&self) -> impl Iterator<Item = (VmId, HostId)> + '_ {
        self.migrations.iter().map(|(vm, host)| (*vm, *host))
    }

    /// Returns the set of destination hosts.
    pub fn target_hosts(&self) -> BTreeSet<HostId> {
        self.migrations.values().copied().collect()
    }

    pub fn mark_host_for_deactivation(&mut self, host_id: HostId) {
        self.hosts_to_deactivate.insert(host_id);
    }

    pub fn hosts_to_deactivate(&self) -> &BTreeSet<HostId> {
        &self.hosts_to_deactivate
    }
}
