//! Resource allocation, CPU sharing and consolidation of virtual machines.

pub mod clock;
pub mod common;
pub mod config;
pub mod error;
pub mod host;
pub mod load_model;
pub mod migration_map;
pub mod pe;
pub mod resource_pool;
pub mod stats;
pub mod utilization_history;
pub mod vm;
pub mod vm_allocation_policies;
pub mod vm_allocation_policy;
pub mod vm_scheduler;
pub mod vm_schedulers;
pub mod vm_selection_policies;
pub mod vm_selection_policy;
