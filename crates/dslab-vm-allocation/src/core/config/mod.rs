//! Configuration of the allocation subsystem.

pub mod allocation_config;
pub mod options;

pub use allocation_config::{
    AllocationConfig, HostConfig, DEFAULT_PARALLEL_SEARCH_THRESHOLD, DEFAULT_UTILIZATION_HISTORY_SIZE,
    DEFAULT_VM_MIGRATION_CPU_OVERHEAD,
};
