//! # Back-Channel Status Lines
//!
//! The device answers on the back-channel with one status per line:
//!
//! | Line | Meaning |
//! |------|---------|
//! | `IL<c>,<m>,<y>,<k>` | ink levels, four decimal integers |
//! | `OP` | out of paper |
//! | `LP` | low paper |
//! | `OK` | no error |

use std::fmt;
use std::str::FromStr;

use crate::error::RasterSimError;

/// One parsed back-channel line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatusLine {
    InkLevels([i32; 4]),
    OutOfPaper,
    LowPaper,
    Ok,
}

impl FromStr for DeviceStatusLine {
    type Err = RasterSimError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let unknown = || RasterSimError::Protocol(format!("Unknown status \"{}\"", line));

        match line {
            "OP" => return Ok(DeviceStatusLine::OutOfPaper),
            "LP" => return Ok(DeviceStatusLine::LowPaper),
            "OK" => return Ok(DeviceStatusLine::Ok),
            _ => {}
        }

        let fields = line.strip_prefix("IL").ok_or_else(unknown)?;
        let mut levels = [0i32; 4];
        let mut parts = fields.split(',');
        for slot in levels.iter_mut() {
            *slot = parts
                .next()
                .and_then(|p| p.trim().parse().ok())
                .ok_or_else(unknown)?;
        }
        if parts.next().is_some() {
            return Err(unknown());
        }
        Ok(DeviceStatusLine::InkLevels(levels))
    }
}

impl fmt::Display for DeviceStatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatusLine::InkLevels([c, m, y, k]) => write!(f, "IL{},{},{},{}", c, m, y, k),
            DeviceStatusLine::OutOfPaper => f.write_str("OP"),
            DeviceStatusLine::LowPaper => f.write_str("LP"),
            DeviceStatusLine::Ok => f.write_str("OK"),
        }
    }
}
