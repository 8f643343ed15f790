//! Best Fit allocation policy.

use std::cmp::Reverse;

use crate::core::common::HostId;
use crate::core::resource_pool::ResourcePool;
use crate::core::vm::Vm;
use crate::core::vm_allocation_policy::{HostSearch, VmAllocationPolicy};

/// Uses the suitable host with the fewest free cores, active hosts are preferred.
#[derive(Clone)]
pub struct BestFit {
    search: HostSearch,
}

impl BestFit {
    pub fn new(search: HostSearch) -> Self {
        Self { search }
    }
}

impl VmAllocationPolicy for BestFit {
    fn find_host_for_vm(&self, pool: &ResourcePool, vm: &Vm) -> Option<HostId> {
        self.search.find_host(pool, |host| {
            host.is_suitable_for_vm(vm)
                .then(|| (host.is_active(), Reverse(host.free_pes_count())))
        })
    }
}
