//! # Ink Level Persistence
//!
//! The simulated device keeps its counters between jobs in one small text
//! record per printer:
//!
//! ```text
//! 1000000 987654 1000000 12
//! ```
//!
//! The record is rewritten in place at the end of every job. Only one
//! device stage runs per queue at a time, so there is no locking.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::ink::InkLevels;
use crate::error::Result;

/// Persistent home of a device's ink counters.
pub trait LevelStore {
    /// Load the counters, falling back to full cartridges when nothing
    /// usable is stored.
    fn load(&self) -> InkLevels;

    /// Overwrite the stored counters.
    fn save(&self, levels: &InkLevels) -> Result<()>;
}

/// Parse a stored record: four whitespace-separated integers on the first line.
pub fn parse_record(text: &str) -> Option<InkLevels> {
    let first = text.lines().next()?;
    let values: Vec<i32> = first
        .split_whitespace()
        .take(4)
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    let counters: [i32; 4] = values.try_into().ok()?;
    Some(InkLevels::new(counters))
}

/// Render counters as a stored record.
pub fn format_record(levels: &InkLevels) -> String {
    let [c, m, y, k] = levels.counters();
    format!("{} {} {} {}\n", c, m, y, k)
}

/// Plain-text file store, one file per printer.
#[derive(Debug, Clone)]
pub struct FileLevelStore {
    path: PathBuf,
}

impl FileLevelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LevelStore for FileLevelStore {
    fn load(&self) -> InkLevels {
        match fs::read_to_string(&self.path) {
            Ok(text) => parse_record(&text).unwrap_or_else(|| {
                warn!("Ignoring malformed ink record in {}", self.path.display());
                InkLevels::full()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No ink record at {}, starting full", self.path.display());
                InkLevels::full()
            }
            Err(e) => {
                warn!("Unable to read {}: {}", self.path.display(), e);
                InkLevels::full()
            }
        }
    }

    fn save(&self, levels: &InkLevels) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format_record(levels))?;
        debug!("Saved ink levels to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store that remembers how often it was written.
#[derive(Debug, Default)]
pub struct MemoryLevelStore {
    levels: RefCell<Option<InkLevels>>,
    saves: Cell<usize>,
}

impl MemoryLevelStore {
    pub fn new(levels: InkLevels) -> Self {
        Self {
            levels: RefCell::new(Some(levels)),
            saves: Cell::new(0),
        }
    }

    /// Number of completed [`LevelStore::save`] calls.
    pub fn saves(&self) -> usize {
        self.saves.get()
    }

    /// Last stored counters, if any.
    pub fn stored(&self) -> Option<InkLevels> {
        *self.levels.borrow()
    }
}

impl LevelStore for MemoryLevelStore {
    fn load(&self) -> InkLevels {
        self.stored().unwrap_or_default()
    }

    fn save(&self, levels: &InkLevels) -> Result<()> {
        *self.levels.borrow_mut() = Some(*levels);
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

impl<S: LevelStore + ?Sized> LevelStore for &S {
    fn load(&self) -> InkLevels {
        (**self).load()
    }

    fn save(&self, levels: &InkLevels) -> Result<()> {
        (**self).save(levels)
    }
}
