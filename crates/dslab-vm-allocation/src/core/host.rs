//! Physical host: cores, memory, bandwidth and storage shared by resident VMs.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::common::{AllocationVerdict, HostId, MipsShare, VmId};
use crate::core::config::DEFAULT_UTILIZATION_HISTORY_SIZE;
use crate::core::pe::{Pe, PeStatus};
use crate::core::utilization_history::UtilizationHistory;
use crate::core::vm::Vm;
use crate::core::vm_scheduler::VmScheduler;

#[derive(Clone, Copy, Debug, Default)]
struct Provision {
    ram: u64,
    bw: u64,
    storage: u64,
}

impl Provision {
    fn of(vm: &Vm) -> Self {
        Self {
            ram: vm.ram(),
            bw: vm.bw(),
            storage: vm.storage(),
        }
    }
}

/// Represents physical host.
///
/// Host owns a fixed list of cores and the VM scheduler which distributes them among VMs. Memory, bandwidth and
/// storage are provisioned to VMs without sharing. Resident VMs and VMs migrating in are stored by their IDs,
/// the VMs themselves are owned by the resource pool.
#[derive(Clone)]
pub struct Host {
    id: HostId,
    name: String,
    pes: Vec<Pe>,
    ram: u64,
    bw: u64,
    storage: u64,
    provisions: BTreeMap<VmId, Provision>,
    vms: BTreeSet<VmId>,
    vms_migrating_in: BTreeSet<VmId>,
    active: bool,
    utilization_history: UtilizationHistory,
    vm_scheduler: Box<dyn VmScheduler>,
}

impl Host {
    /// Creates an active host. Its ID is assigned when it is added to the resource pool.
    pub fn new(name: &str, pes: Vec<Pe>, ram: u64, bw: u64, storage: u64, vm_scheduler: Box<dyn VmScheduler>) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            pes,
            ram,
            bw,
            storage,
            provisions: BTreeMap::new(),
            vms: BTreeSet::new(),
            vms_migrating_in: BTreeSet::new(),
            active: true,
            utilization_history: UtilizationHistory::new(DEFAULT_UTILIZATION_HISTORY_SIZE),
            vm_scheduler,
        }
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pes(&self) -> &[Pe] {
        &self.pes
    }

    pub fn vm_scheduler(&self) -> &dyn VmScheduler {
        self.vm_scheduler.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns IDs of resident VMs (including the ones being migrated out).
    pub fn vms(&self) -> &BTreeSet<VmId> {
        &self.vms
    }

    pub fn vms_migrating_in(&self) -> &BTreeSet<VmId> {
        &self.vms_migrating_in
    }

    pub fn vms_migrating_out(&self) -> &BTreeSet<VmId> {
        self.vm_scheduler.vms_migrating_out()
    }

    pub fn has_migrations(&self) -> bool {
        !self.vms_migrating_in.is_empty() || !self.vms_migrating_out().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.vms.is_empty() && self.vms_migrating_in.is_empty()
    }

    pub fn pe_count(&self) -> u32 {
        self.pes.len() as u32
    }

    pub fn working_pes_count(&self) -> u32 {
        self.pes.iter().filter(|pe| pe.is_working()).count() as u32
    }

    pub fn free_pes_count(&self) -> u32 {
        self.pes.iter().filter(|pe| pe.status() == PeStatus::Free).count() as u32
    }

    pub fn busy_pes_count(&self) -> u32 {
        self.pes.iter().filter(|pe| pe.status() == PeStatus::Busy).count() as u32
    }

    /// Returns the total capacity of working cores.
    pub fn total_mips_capacity(&self) -> f64 {
        self.pes
            .iter()
            .filter(|pe| pe.is_working())
            .map(|pe| pe.capacity())
            .sum()
    }

    pub fn max_pe_capacity(&self) -> f64 {
        self.pes
            .iter()
            .filter(|pe| pe.is_working())
            .map(|pe| pe.capacity())
            .fold(0., f64::max)
    }

    pub fn available_mips(&self) -> f64 {
        self.vm_scheduler.available_mips(&self.pes)
    }

    pub fn max_available_mips(&self) -> f64 {
        self.vm_scheduler.max_available_mips(&self.pes)
    }

    pub fn allocated_mips_for_vm(&self, vm_id: VmId) -> MipsShare {
        self.vm_scheduler.allocated_mips(vm_id)
    }

    pub fn total_allocated_mips_for_vm(&self, vm_id: VmId) -> f64 {
        self.vm_scheduler.total_allocated_mips_for_vm(vm_id)
    }

    pub fn total_allocated_mips(&self) -> f64 {
        self.vm_scheduler.total_allocated_mips()
    }

    /// Returns MIPS currently requested by all VMs on this host.
    pub fn cpu_mips_utilization(&self) -> f64 {
        self.vm_scheduler.total_requested_mips()
    }

    /// Returns the ratio of requested MIPS to the host capacity, it exceeds 1 on oversubscribed host.
    pub fn cpu_utilization(&self) -> f64 {
        let capacity = self.total_mips_capacity();
        if capacity == 0. {
            return 0.;
        }
        self.cpu_mips_utilization() / capacity
    }

    pub fn ram_capacity(&self) -> u64 {
        self.ram
    }

    pub fn bw_capacity(&self) -> u64 {
        self.bw
    }

    pub fn storage_capacity(&self) -> u64 {
        self.storage
    }

    pub fn available_ram(&self) -> u64 {
        self.ram.saturating_sub(self.provisions.values().map(|p| p.ram).sum::<u64>())
    }

    pub fn available_bw(&self) -> u64 {
        self.bw.saturating_sub(self.provisions.values().map(|p| p.bw).sum::<u64>())
    }

    pub fn available_storage(&self) -> u64 {
        self.storage.saturating_sub(self.provisions.values().map(|p| p.storage).sum::<u64>())
    }

    pub fn utilization_history(&self) -> &UtilizationHistory {
        &self.utilization_history
    }

    /// Checks whether the VM can be created on this host.
    pub fn check_vm(&self, vm: &Vm) -> AllocationVerdict {
        let own = self.provisions.get(&vm.id).copied().unwrap_or_default();
        if vm.pes() > self.working_pes_count() {
            return AllocationVerdict::NotEnoughPes;
        }
        if !self.vm_scheduler.is_suitable_for_vm(&self.pes, vm) {
            return AllocationVerdict::NotEnoughMips;
        }
        if self.available_ram() + own.ram < vm.ram() {
            return AllocationVerdict::NotEnoughMemory;
        }
        if self.available_bw() + own.bw < vm.bw() {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        if self.available_storage() + own.storage < vm.storage() {
            return AllocationVerdict::NotEnoughStorage;
        }
        AllocationVerdict::Success
    }

    pub fn is_suitable_for_vm(&self, vm: &Vm) -> bool {
        self.check_vm(vm) == AllocationVerdict::Success
    }

    /// Updates the CPU request of a VM placed on this host.
    pub fn allocate_pes_for_vm(&mut self, vm: &Vm, requested: &[f64]) -> bool {
        self.vm_scheduler.allocate_pes_for_vm(&mut self.pes, vm, requested)
    }

    pub fn deallocate_pes_for_all_vms(&mut self) {
        self.vm_scheduler.deallocate_pes_for_all_vms(&mut self.pes);
    }

    pub(crate) fn set_id(&mut self, id: HostId) {
        self.id = id;
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn set_history_size(&mut self, size: usize) {
        self.utilization_history = UtilizationHistory::new(size);
    }

    /// Makes the VM resident, the host becomes active.
    pub(crate) fn create_vm(&mut self, vm: &Vm, requested: &[f64]) -> bool {
        if !self.allocate_pes_for_vm(vm, requested) {
            return false;
        }
        self.provisions.insert(vm.id, Provision::of(vm));
        self.vms.insert(vm.id);
        self.active = true;
        true
    }

    /// Reserves resources for a VM migrating to this host, the host becomes active.
    pub(crate) fn add_migrating_in_vm(&mut self, vm: &Vm, requested: &[f64]) -> bool {
        self.vm_scheduler.add_vm_migrating_in(&mut self.pes, vm.id);
        if !self.allocate_pes_for_vm(vm, requested) {
            self.vm_scheduler.deallocate_pes_for_vm(&mut self.pes, vm.id);
            return false;
        }
        self.provisions.insert(vm.id, Provision::of(vm));
        self.vms_migrating_in.insert(vm.id);
        self.active = true;
        true
    }

    pub(crate) fn add_vm_migrating_out(&mut self, vm_id: VmId) {
        self.vm_scheduler.add_vm_migrating_out(&mut self.pes, vm_id);
    }

    /// Turns a VM migrating in into a resident one.
    pub(crate) fn finish_migrating_in(&mut self, vm_id: VmId) {
        if self.vms_migrating_in.remove(&vm_id) {
            self.vms.insert(vm_id);
            self.vm_scheduler.remove_vm_migrating_in(&mut self.pes, vm_id);
        }
    }

    /// Releases all resources of the VM.
    pub(crate) fn destroy_vm(&mut self, vm_id: VmId) {
        self.vm_scheduler.deallocate_pes_for_vm(&mut self.pes, vm_id);
        self.provisions.remove(&vm_id);
        self.vms.remove(&vm_id);
        self.vms_migrating_in.remove(&vm_id);
    }

    /// Updates memory, bandwidth and storage provisioned to the VM.
    pub(crate) fn reprovision(&mut self, vm: &Vm) {
        if self.provisions.contains_key(&vm.id) {
            self.provisions.insert(vm.id, Provision::of(vm));
        }
    }

    pub(crate) fn set_pe_failed(&mut self, index: usize) {
        self.pes[index].set_failed();
        self.vm_scheduler.reallocate(&mut self.pes);
    }

    /// Appends the current CPU utilization (capped at 1) to the history.
    pub(crate) fn record_utilization(&mut self, time: f64) {
        let utilization = self.cpu_utilization().min(1.);
        self.utilization_history.add(time, utilization);
    }
}
