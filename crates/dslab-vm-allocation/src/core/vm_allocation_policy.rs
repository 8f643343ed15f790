//! VM allocation policies.

use std::cmp::{Ordering, Reverse};

use log::warn;
use rayon::prelude::*;

use crate::core::common::{HostId, VmId};
use crate::core::config::options::{check_options, get_option, parse_config_value, parse_value_options};
use crate::core::config::AllocationConfig;
use crate::core::error::{check_fraction, ConfigError};
use crate::core::host::Host;
use crate::core::migration_map::MigrationMap;
use crate::core::resource_pool::{ResourcePool, VerticalScaling};
use crate::core::vm::Vm;
use crate::core::vm_allocation_policies::best_fit::BestFit;
use crate::core::vm_allocation_policies::first_fit::FirstFit;
use crate::core::vm_allocation_policies::migration::{TargetHostFit, VmAllocationPolicyMigration};
use crate::core::vm_allocation_policies::simple::Simple;
use crate::core::vm_allocation_policies::threshold::{
    DynamicUpperThreshold, StaticThreshold, UpperThreshold, UtilizationMeasure,
};
use crate::core::vm_selection_policy::vm_selection_policy_resolver;

/// Trait for implementation of VM allocation policies.
///
/// The policy selects hosts for new VMs and may periodically propose migrations improving the VM placement.
/// Only host search is required to implement, the other operations have default implementations
/// which perform the placement in the resource pool.
pub trait VmAllocationPolicy {
    /// Returns ID of host selected for the VM or `None` if there is no suitable host.
    fn find_host_for_vm(&self, pool: &ResourcePool, vm: &Vm) -> Option<HostId>;

    /// Places the VM on the host found by [`find_host_for_vm`](Self::find_host_for_vm).
    /// Returns false if there is no suitable host, the VM then stays unplaced.
    fn allocate_host_for_vm(&mut self, pool: &mut ResourcePool, vm_id: VmId) -> bool {
        match self.find_host_for_vm(pool, pool.vm(vm_id)) {
            Some(host_id) => pool.create_vm(vm_id, host_id),
            None => {
                warn!("[{:.3}] no suitable host for vm {}", pool.time(), vm_id);
                false
            }
        }
    }

    /// Places the VM on the specified host.
    fn allocate_host_for_vm_on(&mut self, pool: &mut ResourcePool, vm_id: VmId, host_id: HostId) -> bool {
        pool.create_vm(vm_id, host_id)
    }

    fn deallocate_host_for_vm(&mut self, pool: &mut ResourcePool, vm_id: VmId) -> bool {
        pool.destroy_vm(vm_id)
    }

    fn scale_vm_vertically(&mut self, pool: &mut ResourcePool, scaling: &VerticalScaling) -> bool {
        pool.scale_vm_vertically(scaling)
    }

    /// Computes migrations of the given VMs improving the current placement.
    /// The pool is not modified, the returned map is executed by the caller.
    fn get_optimized_allocation_map(&mut self, _pool: &ResourcePool, _vms: &[VmId]) -> MigrationMap {
        MigrationMap::new()
    }

    fn is_overloaded(&self, _host: &Host) -> bool {
        false
    }

    fn is_underloaded(&self, _host: &Host) -> bool {
        false
    }
}

/// MIPS value ordered with [`f64::total_cmp`], so that it can be used in host search keys.
#[derive(Clone, Copy, Debug)]
pub struct Mips(pub f64);

impl PartialEq for Mips {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Mips {}

impl PartialOrd for Mips {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Mips {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Searches the host with the maximum key.
///
/// Hosts with equal keys are ordered by ID, the host with the lowest ID wins. Hence the result doesn't depend on
/// the search order and the parallel search, used for large pools, always returns the same host as the sequential one.
#[derive(Clone, Copy, Debug)]
pub struct HostSearch {
    parallel: bool,
    threshold: usize,
}

impl HostSearch {
    pub fn new(parallel: bool, threshold: usize) -> Self {
        Self { parallel, threshold }
    }

    pub fn from_config(config: &AllocationConfig) -> Self {
        Self::new(config.parallel_host_search, config.parallel_search_threshold)
    }

    pub fn sequential() -> Self {
        Self::new(false, usize::MAX)
    }

    pub fn is_parallel_for(&self, items: usize) -> bool {
        self.parallel && items >= self.threshold
    }

    /// Returns ID of the item with the maximum key, `key` returns `None` for unsuitable items.
    pub fn find_max<T, K, F>(&self, items: &[T], key: F) -> Option<HostId>
    where
        T: Sync,
        K: Ord + Send,
        F: Fn(&T) -> Option<(K, HostId)> + Sync + Send,
    {
        let with_tie_break = |item: &T| key(item).map(|(k, id)| (k, Reverse(id)));
        let best = if self.is_parallel_for(items.len()) {
            items.par_iter().filter_map(with_tie_break).max()
        } else {
            items.iter().filter_map(with_tie_break).max()
        };
        best.map(|(_, Reverse(id))| id)
    }

    pub fn find_host<K, F>(&self, pool: &ResourcePool, key: F) -> Option<HostId>
    where
        K: Ord + Send,
        F: Fn(&Host) -> Option<K> + Sync + Send,
    {
        self.find_max(pool.hosts(), |host: &Host| key(host).map(|k| (k, host.id())))
    }
}

pub fn vm_allocation_policy_resolver(
    config_str: &str,
    config: &AllocationConfig,
) -> Result<Box<dyn VmAllocationPolicy>, ConfigError> {
    let (policy_name, options) = parse_config_value(config_str);
    let options = parse_value_options(&options)?;
    let search = HostSearch::from_config(config);
    match policy_name.as_str() {
        "Simple" | "FirstFit" | "BestFit" => {
            check_options(&options, &[])?;
            match policy_name.as_str() {
                "Simple" => Ok(Box::new(Simple::new(search))),
                "FirstFit" => Ok(Box::new(FirstFit::new(search))),
                _ => Ok(Box::new(BestFit::new(search))),
            }
        }
        "StaticThreshold" | "MigrationBestFit" | "MigrationWorstFit" | "DynamicUpperThreshold" => {
            if policy_name == "DynamicUpperThreshold" {
                check_options(
                    &options,
                    &["fit", "over", "under", "measure", "safety", "min_history", "fallback"],
                )?;
            } else {
                check_options(&options, &["fit", "over", "under"])?;
            }
            let default_fit = if policy_name == "MigrationBestFit" {
                TargetHostFit::BestFit
            } else {
                TargetHostFit::WorstFit
            };
            let fit = get_option(&options, "fit", default_fit)?;
            let over = get_option(&options, "over", config.over_utilization_threshold)?;
            let under = check_fraction(
                "under_utilization_threshold",
                get_option(&options, "under", config.under_utilization_threshold)?,
            )?;
            if under >= check_fraction("over_utilization_threshold", over)? {
                return Err(ConfigError::ThresholdsOverlap { under, over });
            }
            let upper: Box<dyn UpperThreshold> = if policy_name == "DynamicUpperThreshold" {
                let fallback = get_option(&options, "fallback", "StaticThreshold".to_string())?;
                Box::new(DynamicUpperThreshold::new(
                    get_option(&options, "measure", UtilizationMeasure::Mad)?,
                    get_option(&options, "safety", config.safety_parameter)?,
                    get_option(&options, "min_history", config.min_history_size_for_measure)?,
                    fallback_threshold_resolver(&fallback, over)?,
                )?)
            } else {
                Box::new(StaticThreshold::new(over)?)
            };
            let selection = vm_selection_policy_resolver(&config.vm_selection_policy)?;
            Ok(Box::new(VmAllocationPolicyMigration::new(
                search, selection, upper, under, fit,
            )?))
        }
        _ => Err(ConfigError::UnknownName {
            kind: "vm allocation policy",
            name: config_str.to_string(),
        }),
    }
}

/// Resolves the threshold used by a dynamic threshold while host history is too short.
fn fallback_threshold_resolver(name: &str, over: f64) -> Result<Box<dyn UpperThreshold>, ConfigError> {
    match name {
        "StaticThreshold" => Ok(Box::new(StaticThreshold::new(over)?)),
        _ => Err(ConfigError::UnknownName {
            kind: "fallback threshold",
            name: name.to_string(),
        }),
    }
}
