//! Allocation subsystem configuration.

use serde::{Deserialize, Serialize};

use crate::core::error::{check_fraction, check_non_negative, check_positive_size, ConfigError};

/// Fraction of CPU share lost by a VM while it is being migrated.
pub const DEFAULT_VM_MIGRATION_CPU_OVERHEAD: f64 = 0.1;
/// Minimum number of hosts for which the parallel host search is used.
pub const DEFAULT_PARALLEL_SEARCH_THRESHOLD: usize = 1000;
/// Number of utilization samples kept per host and per VM.
pub const DEFAULT_UTILIZATION_HISTORY_SIZE: usize = 30;

/// Holds raw allocation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
struct RawAllocationConfig {
    pub vm_migration_cpu_overhead: Option<f64>,
    pub parallel_host_search: Option<bool>,
    pub parallel_search_threshold: Option<usize>,
    pub utilization_history_size: Option<usize>,
    pub min_history_size_for_measure: Option<usize>,
    pub over_utilization_threshold: Option<f64>,
    pub under_utilization_threshold: Option<f64>,
    pub safety_parameter: Option<f64>,
    pub vm_selection_policy: Option<String>,
    pub vm_allocation_policy: Option<String>,
    pub hosts: Option<Vec<HostConfig>>,
}

/// Holds configuration of a single physical host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Host name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Host name prefix.
    /// Full name is produced by appending host instance number to the prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    /// Number of host cores.
    pub pes: u32,
    /// Capacity of each core in MIPS.
    pub mips_per_pe: f64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
    /// VM scheduler config string, `TimeShared` if absent.
    pub scheduler: Option<String>,
    /// Number of such hosts.
    pub count: Option<u32>,
}

/// Represents allocation subsystem configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct AllocationConfig {
    /// Fraction of CPU share lost by a VM while it is being migrated.
    pub vm_migration_cpu_overhead: f64,
    /// Whether the host search of initial placement may run in parallel.
    pub parallel_host_search: bool,
    /// Minimum number of hosts for which the parallel search is used.
    pub parallel_search_threshold: usize,
    /// Number of utilization samples kept for each host and VM.
    pub utilization_history_size: usize,
    /// Number of samples required to compute a utilization measure of dynamic threshold.
    pub min_history_size_for_measure: usize,
    /// Static CPU over-utilization threshold.
    pub over_utilization_threshold: f64,
    /// CPU under-utilization threshold.
    pub under_utilization_threshold: f64,
    /// Safety parameter of dynamic over-utilization threshold.
    pub safety_parameter: f64,
    /// VM selection policy config string.
    pub vm_selection_policy: String,
    /// VM allocation policy config string.
    pub vm_allocation_policy: String,
    /// Configurations of physical hosts.
    pub hosts: Vec<HostConfig>,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self::from_raw(RawAllocationConfig::default())
    }
}

impl AllocationConfig {
    /// Creates config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_yaml(&data)
    }

    /// Creates config from YAML string.
    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let raw: RawAllocationConfig = serde_yaml::from_str(data)?;
        let config = Self::from_raw(raw);
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawAllocationConfig) -> Self {
        Self {
            vm_migration_cpu_overhead: raw
                .vm_migration_cpu_overhead
                .unwrap_or(DEFAULT_VM_MIGRATION_CPU_OVERHEAD),
            parallel_host_search: raw.parallel_host_search.unwrap_or(false),
            parallel_search_threshold: raw
                .parallel_search_threshold
                .unwrap_or(DEFAULT_PARALLEL_SEARCH_THRESHOLD),
            utilization_history_size: raw
                .utilization_history_size
                .unwrap_or(DEFAULT_UTILIZATION_HISTORY_SIZE),
            min_history_size_for_measure: raw.min_history_size_for_measure.unwrap_or(12),
            over_utilization_threshold: raw.over_utilization_threshold.unwrap_or(0.9),
            under_utilization_threshold: raw.under_utilization_threshold.unwrap_or(0.35),
            safety_parameter: raw.safety_parameter.unwrap_or(2.5),
            vm_selection_policy: raw
                .vm_selection_policy
                .unwrap_or_else(|| "MinimumUtilization".to_string()),
            vm_allocation_policy: raw.vm_allocation_policy.unwrap_or_else(|| "Simple".to_string()),
            hosts: raw.hosts.unwrap_or_default(),
        }
    }

    /// Checks that all numeric parameters are within their domains.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("vm_migration_cpu_overhead", self.vm_migration_cpu_overhead)?;
        check_positive_size("utilization_history_size", self.utilization_history_size)?;
        check_positive_size("min_history_size_for_measure", self.min_history_size_for_measure)?;
        let over = check_fraction("over_utilization_threshold", self.over_utilization_threshold)?;
        let under = check_fraction("under_utilization_threshold", self.under_utilization_threshold)?;
        if under >= over {
            return Err(ConfigError::ThresholdsOverlap { under, over });
        }
        check_non_negative("safety_parameter", self.safety_parameter)?;
        for host in &self.hosts {
            check_positive_size("host pes", host.pes as usize)?;
            check_non_negative("host mips_per_pe", host.mips_per_pe)?;
        }
        Ok(())
    }
}
