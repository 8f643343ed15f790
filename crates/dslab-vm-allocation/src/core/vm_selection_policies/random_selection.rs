//! Random selection policy.

use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::core::common::VmId;
use crate::core::vm::Vm;
use crate::core::vm_selection_policy::VmSelectionPolicy;

/// Selects a random migratable VM, the generator is seeded so that runs are reproducible.
#[derive(Clone)]
pub struct RandomSelection {
    rand: Pcg64,
}

impl RandomSelection {
    pub fn new(seed: u64) -> Self {
        Self {
            rand: Pcg64::seed_from_u64(seed),
        }
    }
}

impl VmSelectionPolicy for RandomSelection {
    fn select_vm(&mut self, candidates: &[&Vm], _time: f64) -> Option<VmId> {
        candidates.choose(&mut self.rand).map(|vm| vm.id)
    }
}
