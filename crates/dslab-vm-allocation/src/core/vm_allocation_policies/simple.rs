//! Simple (worst fit) allocation policy.

use crate::core::common::HostId;
use crate::core::resource_pool::ResourcePool;
use crate::core::vm::Vm;
use crate::core::vm_allocation_policy::{HostSearch, VmAllocationPolicy};

/// Uses the suitable host with the most free cores. Active hosts are preferred, an inactive host is selected
/// only if no active host fits and is activated by the placement.
#[derive(Clone)]
pub struct Simple {
    search: HostSearch,
}

impl Simple {
    pub fn new(search: HostSearch) -> Self {
        Self { search }
    }
}

impl VmAllocationPolicy for Simple {
    fn find_host_for_vm(&self, pool: &ResourcePool, vm: &Vm) -> Option<HostId> {
        self.search.find_host(pool, |host| {
            host.is_suitable_for_vm(vm)
                .then(|| (host.is_active(), host.free_pes_count()))
        })
    }
}
