//! Registry of hosts and VMs.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::core::clock::Clock;
use crate::core::common::{AllocationVerdict, HostId, VmId};
use crate::core::config::AllocationConfig;
use crate::core::error::ConfigError;
use crate::core::host::Host;
use crate::core::migration_map::MigrationMap;
use crate::core::pe::make_pes;
use crate::core::vm::{MigrationState, Vm};
use crate::core::vm_scheduler::vm_scheduler_resolver;

/// Resource of a placed VM which can be changed in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ScalableResource {
    Pes,
    Ram,
    Bw,
}

/// Request to grow (positive `delta`) or shrink (negative `delta`) a resource of a placed VM.
#[derive(Clone, Debug, Serialize)]
pub struct VerticalScaling {
    pub vm_id: VmId,
    pub resource: ScalableResource,
    pub delta: i64,
}

impl VerticalScaling {
    pub fn new(vm_id: VmId, resource: ScalableResource, delta: i64) -> Self {
        Self { vm_id, resource, delta }
    }
}

/// Stores all hosts and VMs of the datacenter and performs the state changes requested by allocation policies and
/// by the external migration executor.
///
/// Hosts are addressed by their index in the pool, VMs by their IDs. A VM refers to its host by ID and a host keeps
/// the IDs of its VMs, so moving a VM between hosts is a plain update of these fields.
pub struct ResourcePool {
    hosts: Vec<Host>,
    vms: BTreeMap<VmId, Vm>,
    migrations: BTreeMap<VmId, HostId>,
    pending_deactivation: BTreeSet<HostId>,
    clock: Rc<dyn Clock>,
    config: AllocationConfig,
}

impl ResourcePool {
    /// Creates empty resource pool.
    pub fn new(clock: Rc<dyn Clock>, config: AllocationConfig) -> Self {
        Self {
            hosts: Vec::new(),
            vms: BTreeMap::new(),
            migrations: BTreeMap::new(),
            pending_deactivation: BTreeSet::new(),
            clock,
            config,
        }
    }

    /// Creates resource pool with hosts described in the config.
    pub fn from_config(clock: Rc<dyn Clock>, config: AllocationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut pool = Self::new(clock, config.clone());
        for host_config in &config.hosts {
            let count = host_config.count.unwrap_or(1);
            for i in 0..count {
                let name = if count == 1 {
                    host_config.name.clone().unwrap_or_else(|| format!("host{}", pool.hosts.len()))
                } else {
                    let prefix = host_config.name_prefix.clone().unwrap_or_else(|| "host".to_string());
                    format!("{}{}", prefix, i + 1)
                };
                let scheduler = vm_scheduler_resolver(
                    host_config.scheduler.as_deref().unwrap_or("TimeShared"),
                    config.vm_migration_cpu_overhead,
                )?;
                pool.add_host(Host::new(
                    &name,
                    make_pes(host_config.pes, host_config.mips_per_pe),
                    host_config.ram,
                    host_config.bw,
                    host_config.storage,
                    scheduler,
                ));
            }
        }
        Ok(pool)
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Adds host to the pool and returns its ID.
    pub fn add_host(&mut self, mut host: Host) -> HostId {
        let id = self.hosts.len() as HostId;
        host.set_id(id);
        host.set_history_size(self.config.utilization_history_size);
        self.hosts.push(host);
        id
    }

    /// Registers VM waiting for placement. Returns false if a VM with the same ID is already registered.
    pub fn add_vm(&mut self, mut vm: Vm) -> bool {
        if self.vms.contains_key(&vm.id) {
            warn!("[{:.3}] vm {} is already registered", self.time(), vm.id);
            return false;
        }
        vm.set_history_size(self.config.utilization_history_size);
        self.vms.insert(vm.id, vm);
        true
    }

    pub fn host(&self, id: HostId) -> &Host {
        self.hosts
            .get(id as usize)
            .unwrap_or_else(|| panic!("unknown host {}", id))
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn host_by_name(&self, name: &str) -> Option<HostId> {
        self.hosts.iter().find(|host| host.name() == name).map(|host| host.id())
    }

    pub fn vm(&self, id: VmId) -> &Vm {
        self.vms.get(&id).unwrap_or_else(|| panic!("unknown vm {}", id))
    }

    pub fn vms(&self) -> impl Iterator<Item = &Vm> {
        self.vms.values()
    }

    pub fn vm_ids(&self) -> Vec<VmId> {
        self.vms.keys().copied().collect()
    }

    /// Returns host where the VM resides (the source host during migration).
    pub fn vm_location(&self, vm_id: VmId) -> Option<HostId> {
        self.vms.get(&vm_id).and_then(|vm| vm.host())
    }

    /// Returns destination host of the VM migration in progress.
    pub fn migration_target(&self, vm_id: VmId) -> Option<HostId> {
        self.migrations.get(&vm_id).copied()
    }

    pub fn migrations_in_progress(&self) -> usize {
        self.migrations.len()
    }

    pub fn active_hosts_count(&self) -> usize {
        self.hosts.iter().filter(|host| host.is_active()).count()
    }

    pub fn is_pending_deactivation(&self, host_id: HostId) -> bool {
        self.pending_deactivation.contains(&host_id)
    }

    /// Switches host on or off. An occupied host can't be switched off.
    pub fn set_host_active(&mut self, host_id: HostId, active: bool) -> bool {
        let time = self.time();
        let host = &mut self.hosts[host_id as usize];
        if !active && !host.is_empty() {
            warn!(
                "[{:.3}] host {} can't be deactivated, it still runs vms",
                time,
                host.name()
            );
            return false;
        }
        if host.is_active() != active {
            info!(
                "[{:.3}] host {} is {}",
                time,
                host.name(),
                if active { "activated" } else { "deactivated" }
            );
        }
        host.set_active(active);
        if active {
            self.pending_deactivation.remove(&host_id);
        }
        true
    }

    /// Marks core `pe_index` of the host as failed, the shares of its VMs are recomputed.
    pub fn set_pe_failed(&mut self, host_id: HostId, pe_index: usize) {
        let time = self.time();
        let host = &mut self.hosts[host_id as usize];
        host.set_pe_failed(pe_index);
        warn!("[{:.3}] pe {} of host {} failed", time, pe_index, host.name());
    }

    /// Checks whether the VM can be created on the host.
    pub fn check_vm_on_host(&self, vm_id: VmId, host_id: HostId) -> AllocationVerdict {
        self.host(host_id).check_vm(self.vm(vm_id))
    }

    /// Creates VM on the specified host. Returns false if the VM is unknown, already created or does not fit.
    pub fn create_vm(&mut self, vm_id: VmId, host_id: HostId) -> bool {
        let time = self.time();
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm,
            None => {
                warn!("[{:.3}] can't create unknown vm {}", time, vm_id);
                return false;
            }
        };
        if vm.is_created() {
            warn!("[{:.3}] vm {} is already created", time, vm_id);
            return false;
        }
        let host = match self.hosts.get_mut(host_id as usize) {
            Some(host) => host,
            None => {
                warn!("[{:.3}] can't create vm {} on unknown host {}", time, vm_id, host_id);
                return false;
            }
        };
        let verdict = host.check_vm(vm);
        if verdict != AllocationVerdict::Success {
            warn!(
                "[{:.3}] vm {} can't be created on host {}: {:?}",
                time,
                vm_id,
                host.name(),
                verdict
            );
            return false;
        }
        let was_active = host.is_active();
        if !host.create_vm(vm, &vm.current_requested_mips(time)) {
            warn!("[{:.3}] host {} rejected vm {}", time, host.name(), vm_id);
            return false;
        }
        if !was_active {
            info!("[{:.3}] host {} is activated", time, host.name());
        }
        vm.set_host(Some(host_id), time);
        self.pending_deactivation.remove(&host_id);
        info!("[{:.3}] vm {} created on host {}", time, vm_id, host.name());
        true
    }

    /// Destroys VM releasing all its resources, including the ones reserved by unfinished migration.
    pub fn destroy_vm(&mut self, vm_id: VmId) -> bool {
        let time = self.time();
        let host_id = match self.vms.get(&vm_id).and_then(|vm| vm.host()) {
            Some(host_id) => host_id,
            None => return false,
        };
        self.hosts[host_id as usize].destroy_vm(vm_id);
        if let Some(target) = self.migrations.remove(&vm_id) {
            self.hosts[target as usize].destroy_vm(vm_id);
        }
        if let Some(vm) = self.vms.get_mut(&vm_id) {
            vm.set_host(None, time);
            vm.set_migration_state(MigrationState::None);
        }
        info!("[{:.3}] vm {} destroyed on host {}", time, vm_id, self.hosts[host_id as usize].name());
        self.deactivate_if_pending(host_id);
        true
    }

    /// Starts migration of the VM: resources are reserved on the target host and the VM runs with
    /// migration overhead on both hosts until [`finish_migration`](Self::finish_migration) is called.
    pub fn start_migration(&mut self, vm_id: VmId, target_id: HostId) -> bool {
        let time = self.time();
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm,
            None => return false,
        };
        let source_id = match vm.host() {
            Some(host_id) => host_id,
            None => {
                warn!("[{:.3}] can't migrate vm {} which is not created", time, vm_id);
                return false;
            }
        };
        if vm.is_in_migration() || source_id == target_id || target_id as usize >= self.hosts.len() {
            warn!(
                "[{:.3}] migration of vm {} to host {} is refused",
                time, vm_id, target_id
            );
            return false;
        }
        let target = &mut self.hosts[target_id as usize];
        let verdict = target.check_vm(vm);
        if verdict != AllocationVerdict::Success {
            warn!(
                "[{:.3}] vm {} can't be migrated to host {}: {:?}",
                time,
                vm_id,
                target.name(),
                verdict
            );
            return false;
        }
        vm.set_migration_state(MigrationState::MigratingOut);
        if !target.add_migrating_in_vm(vm, &vm.current_requested_mips(time)) {
            vm.set_migration_state(MigrationState::None);
            warn!("[{:.3}] host {} rejected migrating vm {}", time, target.name(), vm_id);
            return false;
        }
        self.pending_deactivation.remove(&target_id);
        self.hosts[source_id as usize].add_vm_migrating_out(vm_id);
        self.migrations.insert(vm_id, target_id);
        info!(
            "[{:.3}] started migration of vm {} from host {} to host {}",
            time,
            vm_id,
            self.hosts[source_id as usize].name(),
            self.hosts[target_id as usize].name()
        );
        true
    }

    /// Completes migration of the VM: the VM leaves the source host and becomes resident on the target host.
    pub fn finish_migration(&mut self, vm_id: VmId) -> bool {
        let time = self.time();
        let target_id = match self.migrations.remove(&vm_id) {
            Some(target_id) => target_id,
            None => return false,
        };
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm,
            None => return false,
        };
        let source_id = vm.host();
        vm.set_migration_state(MigrationState::None);
        vm.set_host(Some(target_id), time);
        if let Some(source_id) = source_id {
            self.hosts[source_id as usize].destroy_vm(vm_id);
        }
        self.hosts[target_id as usize].finish_migrating_in(vm_id);
        info!(
            "[{:.3}] finished migration of vm {} to host {}",
            time,
            vm_id,
            self.hosts[target_id as usize].name()
        );
        if let Some(source_id) = source_id {
            self.deactivate_if_pending(source_id);
        }
        true
    }

    /// Starts all migrations of the map and remembers hosts to switch off once they become empty.
    ///
    /// Entries whose preconditions no longer hold are skipped. A host with a skipped outgoing migration
    /// stays on. Returns the number of started migrations.
    pub fn execute_migration_map(&mut self, map: &MigrationMap) -> usize {
        let mut started = 0;
        let mut kept_on = BTreeSet::new();
        for (vm_id, host_id) in map.iter() {
            let source = self.vm_location(vm_id);
            if self.start_migration(vm_id, host_id) {
                started += 1;
            } else {
                debug!("[{:.3}] planned migration of vm {} is dropped", self.time(), vm_id);
                kept_on.extend(source);
            }
        }
        for host_id in map.hosts_to_deactivate() {
            if kept_on.contains(host_id) {
                debug!(
                    "[{:.3}] host {} is kept on as not all of its vms are migrating",
                    self.time(),
                    self.hosts[*host_id as usize].name()
                );
                continue;
            }
            self.pending_deactivation.insert(*host_id);
            self.deactivate_if_pending(*host_id);
        }
        started
    }

    /// Changes a resource of a placed VM in place.
    ///
    /// Growing requires the host to have the additional resource, for vPEs this is confirmed by the host VM
    /// scheduler before the change is committed. Shrinking never goes below one unit.
    pub fn scale_vm_vertically(&mut self, scaling: &VerticalScaling) -> bool {
        let time = self.time();
        let vm = match self.vms.get_mut(&scaling.vm_id) {
            Some(vm) => vm,
            None => return false,
        };
        let host_id = match vm.host() {
            Some(host_id) if !vm.is_in_migration() => host_id,
            _ => {
                warn!(
                    "[{:.3}] vm {} can't be scaled as it is not placed or is migrating",
                    time, scaling.vm_id
                );
                return false;
            }
        };
        if scaling.delta == 0 {
            return true;
        }
        let host = &mut self.hosts[host_id as usize];
        let grow = u64::try_from(scaling.delta).ok();
        let shrink = scaling.delta.unsigned_abs();
        match scaling.resource {
            ScalableResource::Pes => {
                let old_pes = vm.pes();
                let new_pes = match grow {
                    Some(extra) => {
                        let extra = u32::try_from(extra).unwrap_or(u32::MAX);
                        let new_pes = old_pes.saturating_add(extra);
                        let probe = vm.with_pes(extra);
                        if new_pes > host.working_pes_count() || !host.vm_scheduler().is_suitable_for_vm(host.pes(), &probe)
                        {
                            debug!(
                                "[{:.3}] host {} can't give {} more vPEs to vm {}",
                                time,
                                host.name(),
                                extra,
                                vm.id
                            );
                            return false;
                        }
                        new_pes
                    }
                    None => old_pes
                        .saturating_sub(u32::try_from(shrink).unwrap_or(u32::MAX))
                        .max(1),
                };
                vm.set_pes(new_pes);
                if !host.allocate_pes_for_vm(vm, &vm.current_requested_mips(time)) {
                    vm.set_pes(old_pes);
                    host.allocate_pes_for_vm(vm, &vm.current_requested_mips(time));
                    return false;
                }
            }
            ScalableResource::Ram => {
                let new_ram = match grow {
                    Some(extra) if host.available_ram() < extra => return false,
                    Some(extra) => vm.ram() + extra,
                    None => vm.ram().saturating_sub(shrink).max(1),
                };
                vm.set_ram(new_ram);
                host.reprovision(vm);
            }
            ScalableResource::Bw => {
                let new_bw = match grow {
                    Some(extra) if host.available_bw() < extra => return false,
                    Some(extra) => vm.bw() + extra,
                    None => vm.bw().saturating_sub(shrink).max(1),
                };
                vm.set_bw(new_bw);
                host.reprovision(vm);
            }
        }
        info!(
            "[{:.3}] vm {} scaled {:?} by {}",
            time, scaling.vm_id, scaling.resource, scaling.delta
        );
        true
    }

    /// Updates CPU requests of all placed VMs according to their load models and records utilization of hosts and
    /// VMs at the current time. Should be invoked on every scheduling interval.
    pub fn update_processing(&mut self) {
        let time = self.time();
        for (vm_id, vm) in &self.vms {
            let host_id = match vm.host() {
                Some(host_id) => host_id,
                None => continue,
            };
            let requested = vm.current_requested_mips(time);
            let mut hosts = vec![host_id];
            hosts.extend(self.migrations.get(vm_id));
            for host_id in hosts {
                let host = &mut self.hosts[host_id as usize];
                if !host.allocate_pes_for_vm(vm, &requested) {
                    warn!(
                        "[{:.3}] host {} can't serve {} vPEs of vm {}",
                        time,
                        host.name(),
                        requested.len(),
                        vm_id
                    );
                }
            }
        }
        for vm in self.vms.values_mut().filter(|vm| vm.is_created()) {
            let utilization = vm.cpu_utilization(time);
            vm.record_utilization(time, utilization);
        }
        for host in &mut self.hosts {
            host.record_utilization(time);
        }
    }

    fn deactivate_if_pending(&mut self, host_id: HostId) {
        if self.pending_deactivation.contains(&host_id) && self.hosts[host_id as usize].is_empty() {
            self.pending_deactivation.remove(&host_id);
            self.hosts[host_id as usize].set_active(false);
            info!(
                "[{:.3}] host {} is deactivated",
                self.time(),
                self.hosts[host_id as usize].name()
            );
        }
    }
}
