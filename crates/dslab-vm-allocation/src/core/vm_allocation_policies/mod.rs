pub mod best_fit;
pub mod first_fit;
pub mod migration;
pub mod simple;
pub mod threshold;
