//! Minimum Utilization selection policy.

use crate::core::common::VmId;
use crate::core::vm::Vm;
use crate::core::vm_selection_policy::VmSelectionPolicy;

/// Selects the VM with the lowest current CPU utilization.
#[derive(Clone, Default)]
pub struct MinimumUtilization;

impl MinimumUtilization {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmSelectionPolicy for MinimumUtilization {
    fn select_vm(&mut self, candidates: &[&Vm], time: f64) -> Option<VmId> {
        let mut result: Option<VmId> = None;
        let mut min_utilization = f64::MAX;

        for vm in candidates {
            let utilization = vm.cpu_utilization(time);
            if utilization < min_utilization {
                min_utilization = utilization;
                result = Some(vm.id);
            }
        }
        result
    }
}
