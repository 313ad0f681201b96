//! # Printer Module
//!
//! This module provides the simulated device's configuration.
//!
//! ## Modules
//!
//! - [`config`]: Device profile, job paths and translator tunables

pub mod config;

pub use config::{DeviceProfile, JobPaths, TranslatorOptions, document_basename};
