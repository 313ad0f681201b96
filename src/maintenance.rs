//! Printer maintenance commands.
//!
//! CUPS delivers maintenance requests as a small command file:
//!
//! ```text
//! #CUPS-COMMAND
//! ChangeInk all
//! ReportLevels
//! ```
//!
//! Names are matched without regard to case. Each known command becomes a
//! device record; level reports wait for the device's reply.

use std::io::{BufRead, Write};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::protocol::CommandRecord;
use crate::protocol::command::write_record;
use crate::status::{SchedulerSink, StatusChannel};
use crate::transport::BackChannel;

/// A recognized maintenance command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceCommand {
    ChangeInk(String),
    Clean(String),
    ReportLevels,
    PrintSelfTestPage,
}

impl MaintenanceCommand {
    /// Parse one command file line. `None` for blanks and comments.
    ///
    /// An unrecognized name is returned as `Err(name)`.
    pub fn parse(line: &str) -> Option<std::result::Result<Self, String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (name, value) = match line.split_once(char::is_whitespace) {
            Some((name, value)) => (name, value.trim()),
            None => (line, ""),
        };

        let command = if name.eq_ignore_ascii_case("ChangeInk") {
            MaintenanceCommand::ChangeInk(value.to_string())
        } else if name.eq_ignore_ascii_case("Clean") {
            MaintenanceCommand::Clean(value.to_string())
        } else if name.eq_ignore_ascii_case("ReportLevels") {
            MaintenanceCommand::ReportLevels
        } else if name.eq_ignore_ascii_case("PrintSelfTestPage") {
            MaintenanceCommand::PrintSelfTestPage
        } else {
            return Some(Err(name.to_string()));
        };
        Some(Ok(command))
    }
}

/// Outcome of one command file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub executed: usize,
    pub unknown: usize,
}

/// Run every command in `commands` against the device.
///
/// `timeout` bounds each wait for a level report.
pub fn run_commands<R, W, B, S>(
    commands: R,
    out: &mut W,
    back: &mut B,
    scheduler: &mut S,
    status: &mut StatusChannel,
    timeout: Duration,
) -> Result<MaintenanceReport>
where
    R: BufRead,
    W: Write,
    B: BackChannel,
    S: SchedulerSink,
{
    let mut report = MaintenanceReport::default();

    for line in commands.lines() {
        let command = match MaintenanceCommand::parse(&line?) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(name)) => {
                error!("Unknown printer command \"{}\"!", name);
                report.unknown += 1;
                continue;
            }
        };

        match command {
            MaintenanceCommand::ChangeInk(value) => {
                info!("Changing ink");
                write_record(out, &CommandRecord::ChangeInk(value))?;
                status.query(out, back, timeout, scheduler)?;
            }
            MaintenanceCommand::Clean(value) => {
                info!("Cleaning print heads");
                write_record(out, &CommandRecord::Clean(value))?;
                out.flush()?;
            }
            MaintenanceCommand::ReportLevels => {
                status.query(out, back, timeout, scheduler)?;
            }
            MaintenanceCommand::PrintSelfTestPage => {
                warn!("Self-test pages are not supported");
            }
        }
        report.executed += 1;
    }

    Ok(report)
}
