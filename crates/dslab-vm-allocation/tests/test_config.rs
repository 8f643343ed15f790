use sugars::rc;

use dslab_vm_allocation::core::clock::ManualClock;
use dslab_vm_allocation::core::config::{AllocationConfig, DEFAULT_UTILIZATION_HISTORY_SIZE};
use dslab_vm_allocation::core::error::ConfigError;
use dslab_vm_allocation::core::resource_pool::ResourcePool;
use dslab_vm_allocation::core::vm::Vm;
use dslab_vm_allocation::core::vm_allocation_policy::{vm_allocation_policy_resolver, VmAllocationPolicy};
use dslab_vm_allocation::core::vm_scheduler::vm_scheduler_resolver;
use dslab_vm_allocation::core::vm_selection_policy::vm_selection_policy_resolver;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn allocation_policy_error(config_str: &str) -> ConfigError {
    match vm_allocation_policy_resolver(config_str, &AllocationConfig::default()) {
        Ok(_) => panic!("{} is resolved", config_str),
        Err(e) => e,
    }
}

fn selection_policy_error(config_str: &str) -> ConfigError {
    match vm_selection_policy_resolver(config_str) {
        Ok(_) => panic!("{} is resolved", config_str),
        Err(e) => e,
    }
}

#[test]
fn test_config_from_file() {
    let config = AllocationConfig::from_file(&name_wrapper("config.yaml")).unwrap();
    assert_eq!(config.vm_migration_cpu_overhead, 0.2);
    assert!(config.parallel_host_search);
    assert_eq!(config.parallel_search_threshold, 2);
    assert_eq!(config.utilization_history_size, 20);
    assert_eq!(config.min_history_size_for_measure, 12);
    assert_eq!(config.over_utilization_threshold, 0.8);
    assert_eq!(config.under_utilization_threshold, 0.3);
    assert_eq!(config.safety_parameter, 1.5);
    assert_eq!(config.hosts.len(), 2);

    let clock = rc!(ManualClock::new(0.));
    let mut pool = ResourcePool::from_config(clock, config.clone()).unwrap();
    assert_eq!(pool.host_count(), 4);
    assert_eq!(pool.host(0).name(), "big");
    assert_eq!(pool.host_by_name("small2"), Some(2));
    assert_eq!(pool.host(0).total_mips_capacity(), 32000.);
    assert!(!pool.host(0).vm_scheduler().dedicates_pes());
    assert!(pool.host(3).vm_scheduler().dedicates_pes());
    assert_eq!(pool.host(3).vm_scheduler().migration_overhead(), 0.2);
    assert_eq!(pool.host(1).utilization_history().max_size(), 20);

    let mut policy = vm_allocation_policy_resolver(&config.vm_allocation_policy, &config).unwrap();
    pool.add_vm(Vm::new(0, 4, 1000., 4096, 100, 1000));
    assert!(policy.allocate_host_for_vm(&mut pool, 0));
    pool.update_processing();
    assert!(policy
        .get_optimized_allocation_map(&pool, &pool.vm_ids())
        .iter()
        .all(|(vm_id, _)| vm_id == 0));
}

#[test]
fn test_default_values() {
    let config = AllocationConfig::from_file(&name_wrapper("config_with_defaults.yaml")).unwrap();
    let default = AllocationConfig::default();
    assert_eq!(config.vm_migration_cpu_overhead, 0.1);
    assert!(!config.parallel_host_search);
    assert_eq!(config.parallel_search_threshold, 1000);
    assert_eq!(config.utilization_history_size, 30);
    assert_eq!(config.over_utilization_threshold, 0.9);
    assert_eq!(config.under_utilization_threshold, 0.35);
    assert_eq!(config.safety_parameter, 2.5);
    assert_eq!(config.vm_selection_policy, "MinimumUtilization");
    assert_eq!(config.vm_allocation_policy, "Simple");
    assert_eq!(config.hosts.len(), 1);
    assert!(default.hosts.is_empty());
    assert_eq!(config.vm_selection_policy, default.vm_selection_policy);

    assert_eq!(config.utilization_history_size, DEFAULT_UTILIZATION_HISTORY_SIZE);

    let clock = rc!(ManualClock::new(0.));
    let mut pool = ResourcePool::from_config(clock, config).unwrap();
    assert_eq!(pool.host(0).name(), "host");
    assert!(pool.host(0).is_active());
    assert_eq!(pool.host(0).utilization_history().max_size(), DEFAULT_UTILIZATION_HISTORY_SIZE);
    let vm = Vm::new(0, 1, 1000., 1024, 100, 1000);
    assert_eq!(vm.utilization_history().max_size(), DEFAULT_UTILIZATION_HISTORY_SIZE);
    assert!(pool.add_vm(vm));
    assert_eq!(pool.vm(0).utilization_history().max_size(), DEFAULT_UTILIZATION_HISTORY_SIZE);
}

#[test]
fn test_invalid_config() {
    let err = AllocationConfig::from_file(&name_wrapper("config_bad_thresholds.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::ThresholdsOverlap { .. }));
    let err = AllocationConfig::from_file(&name_wrapper("config_bad_overhead.yaml")).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::NotAFraction {
            name: "vm_migration_cpu_overhead",
            ..
        }
    ));
    let err = AllocationConfig::from_file(&name_wrapper("missing.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    let err = AllocationConfig::from_yaml("hosts: 5").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    let err = AllocationConfig::from_yaml("safety_parameter: -1").unwrap_err();
    assert!(matches!(err, ConfigError::Negative { .. }));
    let err = AllocationConfig::from_yaml("utilization_history_size: 0").unwrap_err();
    assert!(matches!(err, ConfigError::Zero { .. }));

    let mut config = AllocationConfig::default();
    config.hosts = AllocationConfig::from_file(&name_wrapper("config_with_defaults.yaml"))
        .unwrap()
        .hosts;
    config.hosts[0].scheduler = Some("Fancy".to_string());
    let clock = rc!(ManualClock::new(0.));
    assert!(matches!(
        ResourcePool::from_config(clock, config),
        Err(ConfigError::UnknownName { .. })
    ));
    assert!(vm_scheduler_resolver("TimeShared", 0.1).is_ok());
    assert!(vm_scheduler_resolver("SpaceShared", 2.).is_err());
    assert!(matches!(
        vm_scheduler_resolver("TimeShared[overhead=0.2]", 0.1),
        Err(ConfigError::BadOption { .. })
    ));
}

#[test]
fn test_allocation_policy_resolver() {
    let config = AllocationConfig::default();
    for config_str in [
        "Simple",
        "FirstFit",
        "BestFit",
        "StaticThreshold",
        "StaticThreshold[over=0.8,under=0.2,fit=BestFit]",
        "MigrationBestFit",
        "MigrationWorstFit[over=0.7]",
        "DynamicUpperThreshold[measure=Iqr,safety=1.5,min_history=5]",
        "DynamicUpperThreshold[measure=Mad,safety=2.5,fallback=StaticThreshold]",
    ] {
        assert!(vm_allocation_policy_resolver(config_str, &config).is_ok(), "{}", config_str);
    }
    assert!(matches!(allocation_policy_error("Fancy"), ConfigError::UnknownName { .. }));
    assert!(matches!(
        allocation_policy_error("StaticThreshold[over=1.5]"),
        ConfigError::NotAFraction { .. }
    ));
    assert!(matches!(
        allocation_policy_error("StaticThreshold[over=0.3,under=0.5]"),
        ConfigError::ThresholdsOverlap { .. }
    ));
    assert!(matches!(
        allocation_policy_error("StaticThreshold[over=high]"),
        ConfigError::BadOption { .. }
    ));
    assert!(matches!(
        allocation_policy_error("StaticThreshold[fit=Tight]"),
        ConfigError::BadOption { .. }
    ));
    assert!(matches!(
        allocation_policy_error("DynamicUpperThreshold[measure=Std]"),
        ConfigError::BadOption { .. }
    ));
    assert!(matches!(
        allocation_policy_error("DynamicUpperThreshold[safety=-1]"),
        ConfigError::Negative { .. }
    ));
    assert!(matches!(
        allocation_policy_error("DynamicUpperThreshold[min_history=0]"),
        ConfigError::Zero { .. }
    ));
    assert!(matches!(allocation_policy_error("Simple[oops]"), ConfigError::BadOption { .. }));
    assert!(matches!(
        allocation_policy_error("DynamicUpperThreshold[fallback=Bogus]"),
        ConfigError::UnknownName { .. }
    ));
}

#[test]
fn test_unknown_options() {
    for config_str in [
        "StaticThreshold[ovr=0.5]",
        "MigrationBestFit[over=0.8,safety=2]",
        "Simple[fit=BestFit]",
        "BestFit[over=0.5]",
        "DynamicUpperThreshold[measure=Mad,window=10]",
    ] {
        match allocation_policy_error(config_str) {
            ConfigError::BadOption { .. } => {}
            e => panic!("{}: unexpected error {}", config_str, e),
        }
    }
    match allocation_policy_error("StaticThreshold[ovr=0.5]") {
        ConfigError::BadOption { option, value } => {
            assert_eq!(option, "ovr");
            assert_eq!(value, "0.5");
        }
        e => panic!("unexpected error {}", e),
    }
    for config_str in [
        "MinimumUtilization[seed=1]",
        "MinimumMigrationTime[fallback=MinimumUtilization]",
        "MaximumCorrelation[seed=1]",
        "RandomSelection[fallback=MinimumUtilization]",
    ] {
        assert!(
            matches!(selection_policy_error(config_str), ConfigError::BadOption { .. }),
            "{}",
            config_str
        );
    }
    // unknown policy name is reported before its options
    assert!(matches!(allocation_policy_error("Fancy[x=1]"), ConfigError::UnknownName { .. }));
}

#[test]
// Dynamic threshold uses the configured fallback while the host history is empty.
fn test_dynamic_threshold_fallback() {
    let config = AllocationConfig::from_file(&name_wrapper("config_with_defaults.yaml")).unwrap();
    let clock = rc!(ManualClock::new(0.));
    let mut pool = ResourcePool::from_config(clock, config.clone()).unwrap();
    pool.add_vm(Vm::new(0, 1, 1000., 1024, 100, 1000));
    assert!(pool.create_vm(0, 0));

    let low = vm_allocation_policy_resolver("DynamicUpperThreshold[over=0.4,fallback=StaticThreshold]", &config)
        .unwrap();
    assert!(low.is_overloaded(pool.host(0)));
    let default = vm_allocation_policy_resolver("DynamicUpperThreshold", &config).unwrap();
    assert!(!default.is_overloaded(pool.host(0)));
}

#[test]
fn test_selection_policy_resolver() {
    for config_str in [
        "MinimumUtilization",
        "MinimumMigrationTime",
        "MaximumCorrelation",
        "MaximumCorrelation[fallback=MinimumMigrationTime]",
        "RandomSelection[seed=7]",
    ] {
        assert!(vm_selection_policy_resolver(config_str).is_ok(), "{}", config_str);
    }
    assert!(matches!(selection_policy_error("Fancy"), ConfigError::UnknownName { .. }));
    assert!(matches!(
        selection_policy_error("MaximumCorrelation[fallback=Fancy]"),
        ConfigError::UnknownName { .. }
    ));
    assert!(matches!(
        selection_policy_error("RandomSelection[seed=x]"),
        ConfigError::BadOption { .. }
    ));
}
