pub mod maximum_correlation;
pub mod minimum_migration_time;
pub mod minimum_utilization;
pub mod random_selection;
