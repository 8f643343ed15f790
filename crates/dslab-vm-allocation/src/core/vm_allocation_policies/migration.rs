//! Allocation policy with dynamic VM consolidation.

use std::collections::BTreeSet;
use std::str::FromStr;

use log::{debug, info};

use crate::core::common::{total_mips, HostId, VmId};
use crate::core::error::{check_fraction, ConfigError};
use crate::core::host::Host;
use crate::core::migration_map::MigrationMap;
use crate::core::resource_pool::ResourcePool;
use crate::core::vm::Vm;
use crate::core::vm_allocation_policy::{HostSearch, Mips, VmAllocationPolicy};
use crate::core::vm_allocation_policies::threshold::UpperThreshold;
use crate::core::vm_selection_policy::{migratable_vms, VmSelectionPolicy};

const EPS: f64 = 1e-9;

/// Rule for choosing the destination of a migrating VM among suitable hosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetHostFit {
    /// The most loaded host (by requested MIPS).
    BestFit,
    /// The host with the most free cores.
    WorstFit,
}

impl FromStr for TargetHostFit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BestFit" => Ok(Self::BestFit),
            "WorstFit" => Ok(Self::WorstFit),
            _ => Err(ConfigError::UnknownName {
                kind: "target host fit",
                name: s.to_string(),
            }),
        }
    }
}

/// Host state as seen by a consolidation round.
///
/// The round works on these copies only, so the effect of planned migrations is visible to the later steps
/// of the round while hosts stay untouched.
#[derive(Clone, Debug)]
struct HostEstimate {
    id: HostId,
    active: bool,
    dedicated_pes: bool,
    capacity: f64,
    max_pe_capacity: f64,
    working_pes: u32,
    free_pes: u32,
    allocated_mips: f64,
    load_mips: f64,
    available_ram: u64,
    available_bw: u64,
    available_storage: u64,
    over_threshold: f64,
    has_migrations: bool,
}

impl HostEstimate {
    fn new(host: &Host, over_threshold: f64) -> Self {
        Self {
            id: host.id(),
            active: host.is_active(),
            dedicated_pes: host.vm_scheduler().dedicates_pes(),
            capacity: host.total_mips_capacity(),
            max_pe_capacity: host.max_pe_capacity(),
            working_pes: host.working_pes_count(),
            free_pes: host.free_pes_count(),
            allocated_mips: host.total_allocated_mips(),
            load_mips: host.cpu_mips_utilization(),
            available_ram: host.available_ram(),
            available_bw: host.available_bw(),
            available_storage: host.available_storage(),
            over_threshold,
            has_migrations: host.has_migrations(),
        }
    }

    fn utilization(&self) -> f64 {
        if self.capacity == 0. {
            return 0.;
        }
        self.load_mips / self.capacity
    }

    fn is_overloaded(&self) -> bool {
        self.utilization() > self.over_threshold
    }

    fn is_underloaded(&self, under_threshold: f64) -> bool {
        self.utilization() < under_threshold
    }

    /// Checks that the VM fits into the host and doesn't make it overloaded.
    fn can_accept(&self, vm: &Vm, load: f64) -> bool {
        let cpu_fits = if self.dedicated_pes {
            vm.pes() <= self.free_pes
        } else {
            vm.total_mips_capacity() <= self.capacity - self.allocated_mips + EPS
        };
        vm.pes() <= self.working_pes
            && vm.mips_per_pe() <= self.max_pe_capacity
            && cpu_fits
            && vm.ram() <= self.available_ram
            && vm.bw() <= self.available_bw
            && vm.storage() <= self.available_storage
            && self.capacity > 0.
            && (self.load_mips + load) / self.capacity <= self.over_threshold
    }

    fn add_vm(&mut self, vm: &Vm, load: f64) {
        self.allocated_mips += vm.total_mips_capacity();
        self.load_mips += load;
        self.free_pes = self.free_pes.saturating_sub(vm.pes());
        self.available_ram = self.available_ram.saturating_sub(vm.ram());
        self.available_bw = self.available_bw.saturating_sub(vm.bw());
        self.available_storage = self.available_storage.saturating_sub(vm.storage());
    }

    fn remove_vm(&mut self, vm: &Vm, host: &Host) {
        self.allocated_mips -= host.total_allocated_mips_for_vm(vm.id);
        self.load_mips -= host.vm_scheduler().total_requested_mips_for_vm(vm.id);
        if self.dedicated_pes {
            self.free_pes = (self.free_pes + vm.pes()).min(self.working_pes);
        }
        self.available_ram += vm.ram();
        self.available_bw += vm.bw();
        self.available_storage += vm.storage();
    }
}

/// Allocation policy which consolidates VMs by migrating them from overloaded and underloaded hosts.
///
/// Initial placement follows the target host fit. A consolidation round works in two steps:
///
/// 1. VMs are selected for migration from every overloaded host until its estimated utilization drops to the
///    threshold. The selected VMs, the most loaded first, are placed on hosts which are not overloaded and stay
///    below their threshold after the placement.
/// 2. Underloaded hosts, the least utilized first, are evacuated. A host is evacuated only if all its VMs find
///    destinations, otherwise none of its VMs is migrated. Evacuated hosts are marked for deactivation.
///
/// Hosts receiving VMs in the first step are not evacuated in the second one, and hosts receiving VMs in the
/// second step are not evacuated in the same round.
#[derive(Clone)]
pub struct VmAllocationPolicyMigration {
    search: HostSearch,
    selection: Box<dyn VmSelectionPolicy>,
    upper: Box<dyn UpperThreshold>,
    under_threshold: f64,
    fit: TargetHostFit,
}

impl VmAllocationPolicyMigration {
    pub fn new(
        search: HostSearch,
        selection: Box<dyn VmSelectionPolicy>,
        upper: Box<dyn UpperThreshold>,
        under_threshold: f64,
        fit: TargetHostFit,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            search,
            selection,
            upper,
            under_threshold: check_fraction("under_utilization_threshold", under_threshold)?,
            fit,
        })
    }

    pub fn under_threshold(&self) -> f64 {
        self.under_threshold
    }

    pub fn over_threshold(&self, host: &Host) -> f64 {
        self.upper.over_utilization_threshold(host)
    }

    fn find_target(
        &self,
        estimates: &[HostEstimate],
        vm: &Vm,
        load: f64,
        excluded: &BTreeSet<HostId>,
        allow_inactive: bool,
    ) -> Option<HostId> {
        let fit = self.fit;
        self.search.find_max(estimates, |estimate: &HostEstimate| {
            if excluded.contains(&estimate.id) || (!allow_inactive && !estimate.active) || !estimate.can_accept(vm, load) {
                return None;
            }
            let score = match fit {
                TargetHostFit::BestFit => Mips(estimate.load_mips),
                TargetHostFit::WorstFit => Mips(estimate.free_pes as f64),
            };
            Some(((estimate.active, score), estimate.id))
        })
    }

    /// Selects VMs to migrate from overloaded hosts and updates their estimates.
    fn select_vms_from_overloaded_hosts(
        &mut self,
        pool: &ResourcePool,
        estimates: &mut [HostEstimate],
        overloaded: &BTreeSet<HostId>,
        eligible: &BTreeSet<VmId>,
    ) -> Vec<VmId> {
        let time = pool.time();
        let mut selected = Vec::new();
        for host_id in overloaded {
            let host = pool.host(*host_id);
            debug!(
                "[{:.3}] host {} is overloaded: utilization {:.3} > {:.3}",
                time,
                host.name(),
                estimates[*host_id as usize].utilization(),
                estimates[*host_id as usize].over_threshold
            );
            while estimates[*host_id as usize].is_overloaded() {
                let candidates: Vec<&Vm> = migratable_vms(host, pool)
                    .into_iter()
                    .filter(|vm| eligible.contains(&vm.id) && !selected.contains(&vm.id))
                    .collect();
                let vm_id = match self.selection.select_vm(&candidates, time) {
                    Some(vm_id) => vm_id,
                    None => break,
                };
                debug!("[{:.3}] vm {} is selected to leave host {}", time, vm_id, host.name());
                estimates[*host_id as usize].remove_vm(pool.vm(vm_id), host);
                selected.push(vm_id);
            }
        }
        selected
    }
}

impl VmAllocationPolicy for VmAllocationPolicyMigration {
    fn find_host_for_vm(&self, pool: &ResourcePool, vm: &Vm) -> Option<HostId> {
        let fit = self.fit;
        self.search.find_host(pool, |host| {
            if !host.is_suitable_for_vm(vm) {
                return None;
            }
            let score = match fit {
                TargetHostFit::BestFit => Mips(host.cpu_mips_utilization()),
                TargetHostFit::WorstFit => Mips(host.free_pes_count() as f64),
            };
            Some((host.is_active(), score))
        })
    }

    fn get_optimized_allocation_map(&mut self, pool: &ResourcePool, vms: &[VmId]) -> MigrationMap {
        let time = pool.time();
        let eligible: BTreeSet<VmId> = vms.iter().copied().collect();
        let load = |vm: &Vm| total_mips(&vm.current_requested_mips(time));
        let mut estimates: Vec<HostEstimate> = pool
            .hosts()
            .iter()
            .map(|host| HostEstimate::new(host, self.upper.over_utilization_threshold(host)))
            .collect();
        let mut map = MigrationMap::new();

        let overloaded: BTreeSet<HostId> = estimates
            .iter()
            .filter(|e| e.active && e.is_overloaded())
            .map(|e| e.id)
            .collect();
        let mut selected = self.select_vms_from_overloaded_hosts(pool, &mut estimates, &overloaded, &eligible);
        selected.sort_by(|a, b| load(pool.vm(*b)).total_cmp(&load(pool.vm(*a))).then(a.cmp(b)));

        let mut ignored_sources = overloaded.clone();
        for vm_id in selected {
            let vm = pool.vm(vm_id);
            match self.find_target(&estimates, vm, load(vm), &overloaded, true) {
                Some(target) => {
                    estimates[target as usize].add_vm(vm, load(vm));
                    map.insert(vm_id, target);
                    ignored_sources.insert(target);
                    info!(
                        "[{:.3}] vm {} will migrate from overloaded host {} to host {}",
                        time,
                        vm_id,
                        pool.vm_location(vm_id).map_or("-", |h| pool.host(h).name()),
                        pool.host(target).name()
                    );
                }
                None => debug!("[{:.3}] no destination for vm {} from overloaded host", time, vm_id),
            }
        }

        let mut ignored_targets = overloaded;
        for estimate in &estimates {
            if !estimate.active {
                ignored_sources.insert(estimate.id);
                ignored_targets.insert(estimate.id);
            }
            if estimate.has_migrations {
                ignored_sources.insert(estimate.id);
            }
        }
        loop {
            let host_id = match estimates
                .iter()
                .filter(|e| !ignored_sources.contains(&e.id) && e.is_underloaded(self.under_threshold))
                .min_by(|a, b| a.utilization().total_cmp(&b.utilization()).then(a.id.cmp(&b.id)))
            {
                Some(estimate) => estimate.id,
                None => break,
            };
            ignored_sources.insert(host_id);
            ignored_targets.insert(host_id);
            let host = pool.host(host_id);
            debug!(
                "[{:.3}] host {} is underloaded: utilization {:.3} < {:.3}",
                time,
                host.name(),
                estimates[host_id as usize].utilization(),
                self.under_threshold
            );

            let mut resident: Vec<&Vm> = host.vms().iter().map(|vm_id| pool.vm(*vm_id)).collect();
            if resident.iter().any(|vm| vm.is_in_migration() || !eligible.contains(&vm.id)) {
                debug!("[{:.3}] host {} has vms which can't be migrated", time, host.name());
                continue;
            }
            resident.sort_by(|a, b| load(*b).total_cmp(&load(*a)).then(a.id.cmp(&b.id)));

            let mut trial = estimates.clone();
            let mut planned = Vec::new();
            for vm in resident.iter().copied() {
                match self.find_target(&trial, vm, load(vm), &ignored_targets, false) {
                    Some(target) => {
                        trial[target as usize].add_vm(vm, load(vm));
                        planned.push((vm.id, target));
                    }
                    None => break,
                }
            }
            if planned.len() < resident.len() {
                debug!("[{:.3}] host {} can't be evacuated", time, host.name());
                continue;
            }
            estimates = trial;
            for (vm_id, target) in planned {
                map.insert(vm_id, target);
                ignored_sources.insert(target);
                info!(
                    "[{:.3}] vm {} will migrate from underloaded host {} to host {}",
                    time,
                    vm_id,
                    host.name(),
                    pool.host(target).name()
                );
            }
            map.mark_host_for_deactivation(host_id);
            info!("[{:.3}] host {} will be deactivated", time, host.name());
        }
        map
    }

    fn is_overloaded(&self, host: &Host) -> bool {
        host.is_active() && host.cpu_utilization() > self.upper.over_utilization_threshold(host)
    }

    fn is_underloaded(&self, host: &Host) -> bool {
        host.is_active() && host.cpu_utilization() < self.under_threshold
    }
}
