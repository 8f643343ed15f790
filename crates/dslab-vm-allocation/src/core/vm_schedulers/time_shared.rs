//! Time-shared VM scheduler.

use log::trace;

use crate::core::common::{MipsShare, VmId};
use crate::core::error::ConfigError;
use crate::core::pe::Pe;
use crate::core::vm::Vm;
use crate::core::vm_scheduler::{VmScheduler, VmSchedulerState};

const EPS: f64 = 1e-9;

/// Shares host cores among all vPEs requesting them.
///
/// Each vPE receives at most the capacity of a single core. While the total request fits into the host capacity,
/// every vPE gets exactly its request. Otherwise the capacity is divided by [`share_capacity`].
/// The resulting amounts are laid out on the cores in order, so a vPE share may span two neighboring cores.
///
/// A VM is rejected only if it has more vPEs than the host has working cores.
#[derive(Clone)]
pub struct VmSchedulerTimeShared {
    state: VmSchedulerState,
}

impl VmSchedulerTimeShared {
    pub fn new(migration_overhead: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            state: VmSchedulerState::new(migration_overhead)?,
        })
    }
}

impl VmScheduler for VmSchedulerTimeShared {
    fn is_suitable_for_vm(&self, pes: &[Pe], vm: &Vm) -> bool {
        let working = pes.iter().filter(|pe| pe.is_working()).count();
        let max_capacity = pes
            .iter()
            .filter(|pe| pe.is_working())
            .map(|pe| pe.capacity())
            .fold(0., f64::max);
        vm.pes() as usize <= working
            && vm.mips_per_pe() <= max_capacity
            && vm.total_mips_capacity() <= self.available_mips(pes) + EPS
    }

    fn allocate_pes_for_vm(&mut self, pes: &mut [Pe], vm: &Vm, requested: &[f64]) -> bool {
        let working = pes.iter().filter(|pe| pe.is_working()).count();
        if requested.len() > working || vm.pes() as usize > working {
            trace!(
                "vm {} requests {} vPEs but only {} cores are working",
                vm.id,
                requested.len().max(vm.pes() as usize),
                working
            );
            return false;
        }
        self.state.set_request(vm, requested);
        self.reallocate(pes);
        true
    }

    fn reallocate(&mut self, pes: &mut [Pe]) {
        for pe in pes.iter_mut() {
            pe.reset();
        }
        let working = || pes.iter().filter(|pe| pe.is_working());
        let capacity: f64 = working().map(|pe| pe.capacity()).sum();
        let max_pe_capacity = working().map(|pe| pe.capacity()).fold(0., f64::max);

        let mut owners: Vec<VmId> = Vec::new();
        let mut demands: Vec<f64> = Vec::new();
        for (vm_id, request) in &self.state.requests {
            for mips in &request.share {
                owners.push(*vm_id);
                demands.push(mips.clamp(0., max_pe_capacity));
            }
        }
        let total_demand: f64 = demands.iter().sum();
        if total_demand > capacity {
            trace!(
                "oversubscribed host: {:.3} MIPS requested, {:.3} MIPS available",
                total_demand,
                capacity
            );
        }
        let shares = share_capacity(&demands, capacity);

        self.state.allocations.clear();
        let mut cursor = 0;
        for (vm_id, share) in owners.iter().zip(shares) {
            let mut remaining = share * self.state.overhead_factor(*vm_id);
            let wanted = remaining;
            while remaining > EPS && cursor < pes.len() {
                if pes[cursor].available_mips() <= EPS {
                    cursor += 1;
                    continue;
                }
                remaining -= pes[cursor].allocate(remaining);
            }
            let allocated = if remaining > EPS { wanted - remaining } else { wanted };
            self.state
                .allocations
                .entry(*vm_id)
                .or_insert_with(MipsShare::new)
                .push(allocated);
        }
    }

    fn state(&self) -> &VmSchedulerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut VmSchedulerState {
        &mut self.state
    }
}

/// Divides `capacity` among `requests`.
///
/// If the total request fits, every request is satisfied. Otherwise the division is iterative: the capacity left
/// is split equally among the unsatisfied requests, every request not exceeding this fair share is satisfied in full
/// and leaves the pool. When no remaining request fits into the fair share, the capacity left is divided
/// proportionally to the remaining requests.
pub fn share_capacity(requests: &[f64], capacity: f64) -> Vec<f64> {
    let total: f64 = requests.iter().sum();
    if total <= capacity {
        return requests.to_vec();
    }
    let mut shares = vec![0.; requests.len()];
    let mut remaining = capacity.max(0.);
    let mut active: Vec<usize> = (0..requests.len()).filter(|i| requests[*i] > 0.).collect();
    while !active.is_empty() {
        let fair_share = remaining / active.len() as f64;
        let (satisfied, unsatisfied): (Vec<usize>, Vec<usize>) =
            active.into_iter().partition(|i| requests[*i] <= fair_share);
        if satisfied.is_empty() {
            let demand: f64 = unsatisfied.iter().map(|i| requests[*i]).sum();
            let scale = remaining / demand;
            for i in unsatisfied {
                shares[i] = requests[i] * scale;
            }
            break;
        }
        for i in satisfied {
            shares[i] = requests[i];
            remaining -= requests[i];
        }
        active = unsatisfied;
    }
    shares
}
