//! Space-shared VM scheduler.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::core::common::{MipsShare, VmId};
use crate::core::error::ConfigError;
use crate::core::pe::Pe;
use crate::core::vm::Vm;
use crate::core::vm_scheduler::{VmScheduler, VmSchedulerState};

/// Gives each vPE a whole free core whose capacity covers the vPE request.
///
/// Cores are never shared between VMs, so a VM is rejected when there are not enough free cores.
/// The cores assigned to a VM are kept while the number of its vPEs doesn't change.
#[derive(Clone)]
pub struct VmSchedulerSpaceShared {
    state: VmSchedulerState,
    assigned: BTreeMap<VmId, Vec<usize>>,
}

impl VmSchedulerSpaceShared {
    pub fn new(migration_overhead: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            state: VmSchedulerState::new(migration_overhead)?,
            assigned: BTreeMap::new(),
        })
    }

    /// Returns indices of cores assigned to the VM.
    pub fn assigned_pes(&self, vm_id: VmId) -> &[usize] {
        self.assigned.get(&vm_id).map_or(&[], |pes| pes.as_slice())
    }

    fn taken_pes(&self, except: VmId) -> BTreeSet<usize> {
        self.assigned
            .iter()
            .filter(|(vm_id, _)| **vm_id != except)
            .flat_map(|(_, pes)| pes.iter().copied())
            .collect()
    }

    fn free_pes(&self, pes: &[Pe], except: VmId, min_capacity: f64) -> Vec<usize> {
        let taken = self.taken_pes(except);
        (0..pes.len())
            .filter(|idx| !taken.contains(idx) && pes[*idx].is_working() && pes[*idx].capacity() >= min_capacity)
            .collect()
    }
}

impl VmScheduler for VmSchedulerSpaceShared {
    fn is_suitable_for_vm(&self, pes: &[Pe], vm: &Vm) -> bool {
        self.free_pes(pes, vm.id, vm.mips_per_pe()).len() >= vm.pes() as usize
    }

    fn allocate_pes_for_vm(&mut self, pes: &mut [Pe], vm: &Vm, requested: &[f64]) -> bool {
        let needed = requested.len();
        let keeps_pes = self.assigned.get(&vm.id).map_or(false, |assigned| assigned.len() == needed);
        if !keeps_pes {
            let max_request = requested.iter().copied().fold(0., f64::max);
            let free = self.free_pes(pes, vm.id, max_request);
            if free.len() < needed {
                trace!(
                    "vm {} needs {} free cores of {} MIPS, only {} available",
                    vm.id,
                    needed,
                    max_request,
                    free.len()
                );
                return false;
            }
            self.assigned.insert(vm.id, free.into_iter().take(needed).collect());
        }
        self.state.set_request(vm, requested);
        self.reallocate(pes);
        true
    }

    fn reallocate(&mut self, pes: &mut [Pe]) {
        for pe in pes.iter_mut() {
            pe.reset();
        }
        self.assigned.retain(|vm_id, _| self.state.contains(*vm_id));
        self.state.allocations.clear();
        for (vm_id, request) in &self.state.requests {
            let factor = self.state.overhead_factor(*vm_id);
            let mut share = MipsShare::new();
            if let Some(assigned) = self.assigned.get(vm_id) {
                for (mips, idx) in request.share.iter().zip(assigned) {
                    let pe = &mut pes[*idx];
                    pe.reserve();
                    share.push(pe.allocate(mips.clamp(0., pe.capacity()) * factor));
                }
            }
            self.state.allocations.insert(*vm_id, share);
        }
    }

    fn state(&self) -> &VmSchedulerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut VmSchedulerState {
        &mut self.state
    }

    fn dedicates_pes(&self) -> bool {
        true
    }

    fn available_mips(&self, pes: &[Pe]) -> f64 {
        self.free_pes(pes, VmId::MAX, 0.)
            .iter()
            .map(|idx| pes[*idx].capacity())
            .sum()
    }

    fn max_available_mips(&self, pes: &[Pe]) -> f64 {
        self.free_pes(pes, VmId::MAX, 0.)
            .iter()
            .map(|idx| pes[*idx].capacity())
            .fold(0., f64::max)
    }
}
