//! VM selection policies.

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::common::VmId;
use crate::core::config::options::{check_options, get_option, parse_config_value, parse_value_options};
use crate::core::error::ConfigError;
use crate::core::host::Host;
use crate::core::resource_pool::ResourcePool;
use crate::core::vm::Vm;
use crate::core::vm_selection_policies::maximum_correlation::MaximumCorrelation;
use crate::core::vm_selection_policies::minimum_migration_time::MinimumMigrationTime;
use crate::core::vm_selection_policies::minimum_utilization::MinimumUtilization;
use crate::core::vm_selection_policies::random_selection::RandomSelection;

/// Trait for implementation of VM selection policies.
///
/// The policy is asked to choose a VM to migrate out of an overloaded host. It is defined as a function of the list
/// of candidate VMs, which contains only VMs that can be migrated (resident on the host and not migrating),
/// and of the current time. `None` means that there is no VM to migrate.
pub trait VmSelectionPolicy: DynClone + Send + Sync {
    fn select_vm(&mut self, candidates: &[&Vm], time: f64) -> Option<VmId>;

    /// Selects a VM to migrate among all migratable VMs of the host.
    fn get_vm_to_migrate(&mut self, host: &Host, pool: &ResourcePool) -> Option<VmId> {
        let candidates = migratable_vms(host, pool);
        self.select_vm(&candidates, pool.time())
    }
}

clone_trait_object!(VmSelectionPolicy);

/// Returns resident VMs of the host which are not being migrated.
pub fn migratable_vms<'a>(host: &Host, pool: &'a ResourcePool) -> Vec<&'a Vm> {
    host.vms()
        .iter()
        .filter(|vm_id| !host.vms_migrating_out().contains(vm_id))
        .map(|vm_id| pool.vm(*vm_id))
        .filter(|vm| !vm.is_in_migration())
        .collect()
}

pub fn vm_selection_policy_resolver(config_str: &str) -> Result<Box<dyn VmSelectionPolicy>, ConfigError> {
    let (policy_name, options) = parse_config_value(config_str);
    let options = parse_value_options(&options)?;
    match policy_name.as_str() {
        "MinimumUtilization" => {
            check_options(&options, &[])?;
            Ok(Box::new(MinimumUtilization::new()))
        }
        "MinimumMigrationTime" => {
            check_options(&options, &[])?;
            Ok(Box::new(MinimumMigrationTime::new()))
        }
        "MaximumCorrelation" => {
            check_options(&options, &["fallback"])?;
            let fallback = get_option(&options, "fallback", "MinimumUtilization".to_string())?;
            Ok(Box::new(MaximumCorrelation::new(vm_selection_policy_resolver(&fallback)?)))
        }
        "RandomSelection" => {
            check_options(&options, &["seed"])?;
            Ok(Box::new(RandomSelection::new(get_option(&options, "seed", 123)?)))
        }
        _ => Err(ConfigError::UnknownName {
            kind: "vm selection policy",
            name: config_str.to_string(),
        }),
    }
}
