//! First Fit allocation policy.

use crate::core::common::HostId;
use crate::core::resource_pool::ResourcePool;
use crate::core::vm::Vm;
use crate::core::vm_allocation_policy::{HostSearch, VmAllocationPolicy};

/// Uses the first suitable active host, or the first suitable inactive one if no active host fits.
#[derive(Clone)]
pub struct FirstFit {
    search: HostSearch,
}

impl FirstFit {
    pub fn new(search: HostSearch) -> Self {
        Self { search }
    }
}

impl VmAllocationPolicy for FirstFit {
    fn find_host_for_vm(&self, pool: &ResourcePool, vm: &Vm) -> Option<HostId> {
        self.search
            .find_host(pool, |host| host.is_suitable_for_vm(vm).then(|| host.is_active()))
    }
}
