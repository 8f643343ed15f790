//! Minimum Migration Time selection policy.

use crate::core::common::VmId;
use crate::core::vm::Vm;
use crate::core::vm_selection_policy::VmSelectionPolicy;

/// Selects the VM which is the fastest to migrate, the migration time is estimated by the amount of VM memory.
#[derive(Clone, Default)]
pub struct MinimumMigrationTime;

impl MinimumMigrationTime {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmSelectionPolicy for MinimumMigrationTime {
    fn select_vm(&mut self, candidates: &[&Vm], _time: f64) -> Option<VmId> {
        let mut result: Option<VmId> = None;
        let mut min_ram = u64::MAX;

        for vm in candidates {
            if result.is_none() || vm.ram() < min_ram {
                min_ram = vm.ram();
                result = Some(vm.id);
            }
        }
        result
    }
}
