//! # Consumables
//!
//! Simulated ink counters and where they are kept between jobs.
//!
//! - [`ink`]: depletion algorithm and out-of-ink effects
//! - [`store`]: persisted counter records

pub mod ink;
pub mod store;

pub use ink::{Depth, InkLevels, page_resolution};
pub use store::{FileLevelStore, LevelStore, MemoryLevelStore};
