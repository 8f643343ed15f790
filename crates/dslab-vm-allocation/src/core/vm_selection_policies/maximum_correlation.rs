//! Maximum Correlation selection policy.

use log::debug;

use crate::core::common::VmId;
use crate::core::stats::correlation_coefficients;
use crate::core::vm::Vm;
use crate::core::vm_selection_policy::VmSelectionPolicy;

/// Selects the VM whose CPU utilization is the most correlated with the utilization of other candidates.
///
/// For each candidate the utilization history is regressed on the histories of all other candidates
/// (histories are truncated to the shortest one) and the VM with the highest coefficient of determination wins.
/// If the regression can't be computed, for example because the histories are too short, the choice is made by the
/// fallback policy.
#[derive(Clone)]
pub struct MaximumCorrelation {
    fallback: Box<dyn VmSelectionPolicy>,
}

impl MaximumCorrelation {
    pub fn new(fallback: Box<dyn VmSelectionPolicy>) -> Self {
        Self { fallback }
    }
}

impl VmSelectionPolicy for MaximumCorrelation {
    fn select_vm(&mut self, candidates: &[&Vm], time: f64) -> Option<VmId> {
        if candidates.is_empty() {
            return None;
        }
        let series: Vec<Vec<f64>> = candidates
            .iter()
            .map(|vm| vm.utilization_history().values_newest_first())
            .collect();
        match correlation_coefficients(&series) {
            Some(coefficients) => {
                let mut best = 0;
                let mut max_coefficient = 0.;
                for (i, coefficient) in coefficients.iter().enumerate() {
                    if *coefficient > max_coefficient {
                        max_coefficient = *coefficient;
                        best = i;
                    }
                }
                Some(candidates[best].id)
            }
            None => {
                debug!("[{:.3}] correlation can't be computed, using fallback policy", time);
                self.fallback.select_vm(candidates, time)
            }
        }
    }
}
