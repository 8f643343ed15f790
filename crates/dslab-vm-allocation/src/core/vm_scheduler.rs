//! VM schedulers converting VM CPU requests into MIPS allocated on host cores.

use std::collections::{BTreeMap, BTreeSet};

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::common::{total_mips, MipsShare, VmId};
use crate::core::config::options::{check_options, parse_config_value, parse_value_options};
use crate::core::error::{check_fraction, ConfigError};
use crate::core::pe::Pe;
use crate::core::vm::Vm;
use crate::core::vm_schedulers::space_shared::VmSchedulerSpaceShared;
use crate::core::vm_schedulers::time_shared::VmSchedulerTimeShared;

/// Trait for implementation of VM schedulers.
///
/// Each host owns exactly one scheduler, which is the only component changing the allocation state of its cores.
/// The cores are passed to the scheduler by the host on every call.
///
/// Schedulers recompute the shares of all registered VMs on every change, so the result never depends on the order
/// in which VMs were registered. VMs which are being migrated receive only `1 - migration_overhead` of their
/// computed share.
pub trait VmScheduler: DynClone + Send + Sync {
    /// Checks whether the host cores can serve the peak request of the VM without reshuffling current allocations.
    fn is_suitable_for_vm(&self, pes: &[Pe], vm: &Vm) -> bool;

    /// Registers or updates the VM request and recomputes allocations of all VMs.
    ///
    /// Returns false if the VM can't be admitted at all, the current allocations are left intact in this case.
    /// Returns true if the VM is admitted, even if it receives less than requested.
    fn allocate_pes_for_vm(&mut self, pes: &mut [Pe], vm: &Vm, requested: &[f64]) -> bool;

    /// Recomputes allocations of all registered VMs.
    fn reallocate(&mut self, pes: &mut [Pe]);

    fn state(&self) -> &VmSchedulerState;

    fn state_mut(&mut self) -> &mut VmSchedulerState;

    /// Whether each vPE holds a whole core exclusively.
    fn dedicates_pes(&self) -> bool {
        false
    }

    /// Releases the allocation of the VM and recomputes shares of the remaining VMs.
    fn deallocate_pes_for_vm(&mut self, pes: &mut [Pe], vm_id: VmId) {
        self.state_mut().remove(vm_id);
        self.reallocate(pes);
    }

    fn deallocate_pes_for_all_vms(&mut self, pes: &mut [Pe]) {
        self.state_mut().clear();
        self.reallocate(pes);
    }

    /// Returns MIPS which are not allocated to any VM.
    fn available_mips(&self, pes: &[Pe]) -> f64 {
        pes.iter().map(|pe| pe.available_mips()).sum()
    }

    /// Returns the largest amount of MIPS available on a single core.
    fn max_available_mips(&self, pes: &[Pe]) -> f64 {
        pes.iter().map(|pe| pe.available_mips()).fold(0., f64::max)
    }

    fn allocated_mips(&self, vm_id: VmId) -> MipsShare {
        self.state().allocations.get(&vm_id).cloned().unwrap_or_default()
    }

    fn total_allocated_mips_for_vm(&self, vm_id: VmId) -> f64 {
        self.state().allocations.get(&vm_id).map_or(0., |share| total_mips(share))
    }

    fn requested_mips(&self, vm_id: VmId) -> MipsShare {
        self.state()
            .requests
            .get(&vm_id)
            .map(|r| r.share.clone())
            .unwrap_or_default()
    }

    fn total_requested_mips_for_vm(&self, vm_id: VmId) -> f64 {
        self.state().requests.get(&vm_id).map_or(0., |r| total_mips(&r.share))
    }

    /// Returns the sum of requests of all registered VMs, which may exceed the host capacity.
    fn total_requested_mips(&self) -> f64 {
        self.state().requests.values().map(|r| total_mips(&r.share)).sum()
    }

    fn total_allocated_mips(&self) -> f64 {
        self.state().allocations.values().map(|share| total_mips(share)).sum()
    }

    fn add_vm_migrating_in(&mut self, pes: &mut [Pe], vm_id: VmId) {
        if self.state_mut().migrating_in.insert(vm_id) {
            self.reallocate(pes);
        }
    }

    fn remove_vm_migrating_in(&mut self, pes: &mut [Pe], vm_id: VmId) {
        let state = self.state_mut();
        state.migrating_in.remove(&vm_id);
        state.clear_migration_flag(vm_id);
        self.reallocate(pes);
    }

    /// Marks the VM as being migrated away from this host.
    fn add_vm_migrating_out(&mut self, pes: &mut [Pe], vm_id: VmId) {
        if self.state_mut().migrating_out.insert(vm_id) {
            self.reallocate(pes);
        }
    }

    fn remove_vm_migrating_out(&mut self, pes: &mut [Pe], vm_id: VmId) {
        let state = self.state_mut();
        state.migrating_out.remove(&vm_id);
        state.clear_migration_flag(vm_id);
        self.reallocate(pes);
    }

    fn vms_migrating_out(&self) -> &BTreeSet<VmId> {
        &self.state().migrating_out
    }

    fn vms_migrating_in(&self) -> &BTreeSet<VmId> {
        &self.state().migrating_in
    }

    fn migration_overhead(&self) -> f64 {
        self.state().migration_overhead
    }
}

clone_trait_object!(VmScheduler);

#[derive(Clone, Debug)]
pub(crate) struct VmRequest {
    pub share: MipsShare,
    pub in_migration: bool,
}

/// Bookkeeping shared by all scheduler implementations: requests, resulting allocations and migration flags.
#[derive(Clone, Debug)]
pub struct VmSchedulerState {
    pub(crate) requests: BTreeMap<VmId, VmRequest>,
    pub(crate) allocations: BTreeMap<VmId, MipsShare>,
    migrating_in: BTreeSet<VmId>,
    migrating_out: BTreeSet<VmId>,
    migration_overhead: f64,
}

impl VmSchedulerState {
    pub fn new(migration_overhead: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            requests: BTreeMap::new(),
            allocations: BTreeMap::new(),
            migrating_in: BTreeSet::new(),
            migrating_out: BTreeSet::new(),
            migration_overhead: check_fraction("vm_migration_cpu_overhead", migration_overhead)?,
        })
    }

    pub fn contains(&self, vm_id: VmId) -> bool {
        self.requests.contains_key(&vm_id)
    }

    pub fn vm_count(&self) -> usize {
        self.requests.len()
    }

    pub fn is_migrating(&self, vm_id: VmId) -> bool {
        self.migrating_in.contains(&vm_id)
            || self.migrating_out.contains(&vm_id)
            || self.requests.get(&vm_id).map_or(false, |r| r.in_migration)
    }

    /// Fraction of the computed share which is actually given to the VM.
    pub fn overhead_factor(&self, vm_id: VmId) -> f64 {
        if self.is_migrating(vm_id) {
            1. - self.migration_overhead
        } else {
            1.
        }
    }

    pub(crate) fn set_request(&mut self, vm: &Vm, requested: &[f64]) {
        self.requests.insert(
            vm.id,
            VmRequest {
                share: requested.to_vec(),
                in_migration: vm.is_in_migration(),
            },
        );
    }

    pub(crate) fn clear_migration_flag(&mut self, vm_id: VmId) {
        if let Some(request) = self.requests.get_mut(&vm_id) {
            request.in_migration = false;
        }
    }

    pub(crate) fn remove(&mut self, vm_id: VmId) {
        self.requests.remove(&vm_id);
        self.allocations.remove(&vm_id);
        self.migrating_in.remove(&vm_id);
        self.migrating_out.remove(&vm_id);
    }

    pub(crate) fn clear(&mut self) {
        self.requests.clear();
        self.allocations.clear();
        self.migrating_in.clear();
        self.migrating_out.clear();
    }
}

/// Creates VM scheduler from its config string, e.g. `TimeShared` or `SpaceShared`.
pub fn vm_scheduler_resolver(config_str: &str, migration_overhead: f64) -> Result<Box<dyn VmScheduler>, ConfigError> {
    let (name, options) = parse_config_value(config_str);
    let options = parse_value_options(&options)?;
    match name.as_str() {
        "TimeShared" => {
            check_options(&options, &[])?;
            Ok(Box::new(VmSchedulerTimeShared::new(migration_overhead)?))
        }
        "SpaceShared" => {
            check_options(&options, &[])?;
            Ok(Box::new(VmSchedulerSpaceShared::new(migration_overhead)?))
        }
        _ => Err(ConfigError::UnknownName {
            kind: "vm scheduler",
            name,
        }),
    }
}
