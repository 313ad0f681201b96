//! # Device Configuration
//!
//! This module defines the hardware profile of the simulated printer and the
//! per-job settings that the command line and environment supply.
//!
//! ## Simulated Device
//!
//! | Property | Value |
//! |----------|-------|
//! | Model | Acme Sample Raster |
//! | Max raster | 3600 x 5400 pixels (12x18" at 300 DPI) |
//! | Depths | 1 (gray) or 3 (RGB) bytes per pixel |
//! | Ink capacity | 1,000,000 units per cartridge |
//!
//! ## Usage
//!
//! ```
//! use rastersim::printer::DeviceProfile;
//!
//! let profile = DeviceProfile::SAMPLE_RASTER;
//! println!("{} accepts rasters up to {}x{}",
//!          profile.model,
//!          profile.max_raster_width,
//!          profile.max_raster_height);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

/// # Device Profile
///
/// Describes the simulated raster device: how it identifies itself during
/// discovery and what geometry it accepts.
///
/// ## Ink Accounting
///
/// ```text
/// reported level = counter / level_divisor      (0..=100 with the defaults)
/// ink used       = usage_factor * delta / dpi / dpi
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    /// Manufacturer name
    pub make: &'static str,

    /// Model name
    pub model: &'static str,

    /// URI scheme the device backend answers to
    pub scheme: &'static str,

    /// Maximum accepted raster width in pixels
    pub max_raster_width: u32,

    /// Maximum accepted raster height in pixels
    pub max_raster_height: u32,

    /// Resolution assumed before any raster has been seen on a page
    pub default_resolution: u32,
}

impl DeviceProfile {
    /// # Acme Sample Raster
    ///
    /// Allocates page buffers for up to a 12x18" page at 300 DPI.
    pub const SAMPLE_RASTER: Self = Self {
        make: "Acme",
        model: "Sample Raster",
        scheme: "rastersim",
        max_raster_width: 3600,
        max_raster_height: 5400,
        default_resolution: 100,
    };

    /// The single line printed when the device stage is run for discovery.
    ///
    /// ## Example
    ///
    /// ```
    /// use rastersim::printer::DeviceProfile;
    ///
    /// let line = DeviceProfile::SAMPLE_RASTER.discovery_line();
    /// assert!(line.starts_with("direct rastersim://Acme/Sample%20Raster "));
    /// ```
    pub fn discovery_line(&self) -> String {
        format!(
            "direct {}://{}/{} \"{} {}\" \"{} Driver\" \"MFG:{};MODEL:{};\"",
            self.scheme,
            self.make,
            self.model.replace(' ', "%20"),
            self.make,
            self.model,
            self.model,
            self.make,
            self.model,
        )
    }

    /// Whether a `RASTER` geometry fits the page buffer limits.
    #[inline]
    pub fn accepts_raster(&self, width: u32, height: u32, depth: u32) -> bool {
        (depth == 1 || depth == 3)
            && width > 0
            && width <= self.max_raster_width
            && height > 0
            && height <= self.max_raster_height
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::SAMPLE_RASTER
    }
}

// ============================================================================
// JOB PATHS
// ============================================================================

/// Where a job reads and writes its persistent files.
///
/// ```text
/// <cache_dir>/<printer>.cmyk                     ink levels
/// <cache_dir>/<printer>/<job> - <title><n>/      rendered documents
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    /// Root of the simulator's cache
    pub cache_dir: PathBuf,

    /// Queue name (the `PRINTER` environment variable under CUPS)
    pub printer: String,
}

impl JobPaths {
    pub fn new(cache_dir: impl Into<PathBuf>, printer: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            printer: printer.into(),
        }
    }

    /// Path of the persisted ink level record.
    pub fn levels_file(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.cmyk", self.printer))
    }

    /// Directory holding this printer's rendered documents.
    pub fn output_dir(&self) -> PathBuf {
        self.cache_dir.join(&self.printer)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Sanitize `"<job> - <title>"` into a file name stem.
///
/// Control characters, `/` and DEL become `_`; everything else (including
/// non-ASCII text) is kept.
///
/// ```
/// use rastersim::printer::document_basename;
///
/// assert_eq!(document_basename("42", "a/b\tc"), "42 - a_b_c");
/// ```
pub fn document_basename(job_id: &str, title: &str) -> String {
    format!("{} - {}", job_id, title)
        .chars()
        .map(|c| if c.is_ascii_control() || c == '/' { '_' } else { c })
        .collect()
}

// ============================================================================
// TRANSLATOR OPTIONS
// ============================================================================

/// Tunables for the raster translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatorOptions {
    /// Scanlines between `LEVELS` queries and progress messages
    pub progress_interval: u32,

    /// How long the final status query waits for the device
    pub final_status_timeout: Duration,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            progress_interval: 128,
            final_status_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
