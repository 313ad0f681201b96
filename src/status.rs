//! # Device Status Tracking
//!
//! The translator polls the back-channel between scanlines and turns device
//! replies into scheduler messages: marker (ink) attributes and printer
//! state reasons.
//!
//! ## Scheduler Messages
//!
//! ```text
//! ATTR: marker-colors=#00ffff,#ff00ff,#ffff00,#000000 marker-levels=80,64,3,90 marker-names=Cyan,Magenta,Yellow,Black marker-types=ink,ink,ink,ink
//! STATE: +com.sample-yellow-error
//! STATE: -media-empty-warning
//! PAGE: 1 1
//! INFO: Printing page 1, 50% complete...
//! ```
//!
//! ## Ink Levels
//!
//! A report identical to the previous one is dropped. Otherwise one `ATTR:`
//! line carries all four levels, followed by a `STATE:` toggle for every
//! channel that crossed the low threshold. Each channel keeps its own
//! below-threshold flag:
//!
//! ```text
//! level:   80 ──► 3 ──► 2 ──► 7
//! event:   -      +     -     -
//!                 enter       clear
//! ```
//!
//! Before the first report every flag counts as low. The first report
//! therefore clears each healthy channel, which drops a stale reason the
//! scheduler kept from an earlier job, and never enters one.
//!
//! ## Paper
//!
//! | Line | empty-warning | low-report |
//! |------|---------------|------------|
//! | `OP` | set | cleared |
//! | `LP` | cleared | set |
//! | `OK` | cleared | cleared |
//!
//! Paper lines are not deduplicated; each one re-sends both toggles.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use crate::consumable::ink::LOW_THRESHOLD;
use crate::error::{RasterSimError, Result};
use crate::protocol::command::write_record;
use crate::protocol::{CommandRecord, DeviceStatusLine};
use crate::transport::{BACK_CHANNEL_CHUNK, BackChannel};

/// Marker attributes that never change between reports.
const MARKER_COLORS: &str = "#00ffff,#ff00ff,#ffff00,#000000";
const MARKER_NAMES: &str = "Cyan,Magenta,Yellow,Black";
const MARKER_TYPES: &str = "ink,ink,ink,ink";

/// Per-channel keyword stems for low-ink state reasons.
const INK_KEYWORDS: [&str; 4] = ["cyan", "magenta", "yellow", "black"];

/// A printer state reason toggled through `STATE:` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateReason {
    /// Ink channel below the low threshold (0 = cyan .. 3 = black)
    InkLow(usize),
    MediaEmpty,
    MediaLow,
}

impl fmt::Display for StateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateReason::InkLow(channel) => {
                write!(f, "com.sample-{}-error", INK_KEYWORDS[*channel])
            }
            StateReason::MediaEmpty => f.write_str("media-empty-warning"),
            StateReason::MediaLow => f.write_str("media-low-report"),
        }
    }
}

/// One message for the job scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Current ink levels in percent
    MarkerLevels([i32; 4]),
    /// Add (`set == true`) or remove a state reason
    State { set: bool, reason: StateReason },
    /// A page has started printing
    Page { number: u32, copies: u32 },
    /// Human-readable progress
    Info(String),
}

impl SchedulerEvent {
    fn state(set: bool, reason: StateReason) -> Self {
        SchedulerEvent::State { set, reason }
    }
}

impl fmt::Display for SchedulerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerEvent::MarkerLevels([c, m, y, k]) => write!(
                f,
                "ATTR: marker-colors={} marker-levels={},{},{},{} marker-names={} marker-types={}",
                MARKER_COLORS, c, m, y, k, MARKER_NAMES, MARKER_TYPES
            ),
            SchedulerEvent::State { set, reason } => {
                write!(f, "STATE: {}{}", if *set { '+' } else { '-' }, reason)
            }
            SchedulerEvent::Page { number, copies } => write!(f, "PAGE: {} {}", number, copies),
            SchedulerEvent::Info(message) => write!(f, "INFO: {}", message),
        }
    }
}

/// Where scheduler messages go.
pub trait SchedulerSink {
    fn emit(&mut self, event: SchedulerEvent);
}

impl SchedulerSink for Vec<SchedulerEvent> {
    fn emit(&mut self, event: SchedulerEvent) {
        self.push(event);
    }
}

impl<S: SchedulerSink + ?Sized> SchedulerSink for &mut S {
    fn emit(&mut self, event: SchedulerEvent) {
        (**self).emit(event)
    }
}

/// Writes scheduler messages to stderr, where CUPS reads them.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrScheduler;

impl SchedulerSink for StderrScheduler {
    fn emit(&mut self, event: SchedulerEvent) {
        let _ = writeln!(io::stderr().lock(), "{}", event);
    }
}

/// Paper supply as last reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaState {
    #[default]
    Ok,
    Low,
    Empty,
}

/// Result of one [`StatusChannel::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing arrived within the timeout
    NoData,
    /// A chunk was read; this many status lines were applied
    Processed(usize),
}

/// Translator-side view of the device, built from back-channel replies.
///
/// One instance lives for the whole process and is passed to every poll.
#[derive(Debug)]
pub struct StatusChannel {
    last_levels: Option<[i32; 4]>,
    low: [bool; 4],
    media: MediaState,
    empty_warning: bool,
    low_report: bool,
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self {
            last_levels: None,
            // No level known yet: treat every channel as below threshold.
            low: [true; 4],
            media: MediaState::Ok,
            empty_warning: false,
            low_report: false,
        }
    }
}

impl StatusChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Levels from the last reported change, if any.
    pub fn last_levels(&self) -> Option<[i32; 4]> {
        self.last_levels
    }

    /// Whether `channel` is currently flagged as low.
    pub fn is_low(&self, channel: usize) -> bool {
        self.low[channel]
    }

    pub fn media_state(&self) -> MediaState {
        self.media
    }

    /// `(empty-warning, low-report)` flags as last sent to the scheduler.
    pub fn media_flags(&self) -> (bool, bool) {
        (self.empty_warning, self.low_report)
    }

    /// Read up to one chunk from the back-channel and apply it.
    ///
    /// With a zero timeout this never blocks and an empty back-channel is
    /// [`PollOutcome::NoData`]. Otherwise it waits up to `timeout` for the
    /// chunk. An unrecognized line fails the call with
    /// [`RasterSimError::Protocol`]; lines before it have been applied.
    pub fn poll<B, S>(&mut self, back: &mut B, timeout: Duration, sink: &mut S) -> Result<PollOutcome>
    where
        B: BackChannel + ?Sized,
        S: SchedulerSink + ?Sized,
    {
        let mut buf = [0u8; BACK_CHANNEL_CHUNK];
        let n = back.read_chunk(&mut buf, timeout)?;
        if n == 0 {
            return Ok(PollOutcome::NoData);
        }
        let text = String::from_utf8_lossy(&buf[..n]);
        self.process_chunk(&text, sink).map(PollOutcome::Processed)
    }

    /// [`poll`](Self::poll), logging a failure as "no data".
    pub fn poll_logged<B, S>(&mut self, back: &mut B, timeout: Duration, sink: &mut S) -> PollOutcome
    where
        B: BackChannel + ?Sized,
        S: SchedulerSink + ?Sized,
    {
        self.poll(back, timeout, sink).unwrap_or_else(|err| {
            log_poll_error(&err);
            PollOutcome::NoData
        })
    }

    /// Ask the device for its ink levels and wait up to `timeout` for the
    /// reply.
    ///
    /// Only a failure to send the request is an error.
    pub fn query<W, B, S>(
        &mut self,
        out: &mut W,
        back: &mut B,
        timeout: Duration,
        sink: &mut S,
    ) -> Result<PollOutcome>
    where
        W: Write,
        B: BackChannel + ?Sized,
        S: SchedulerSink + ?Sized,
    {
        write_record(out, &CommandRecord::Levels)?;
        out.flush()?;
        Ok(self.poll_logged(back, timeout, sink))
    }

    /// Apply every line of one back-channel chunk.
    ///
    /// A final line without a newline is still complete; nothing is carried
    /// over to the next call. A blank line inside the chunk is an unknown
    /// status.
    pub fn process_chunk<S>(&mut self, chunk: &str, sink: &mut S) -> Result<usize>
    where
        S: SchedulerSink + ?Sized,
    {
        let mut applied = 0;
        for line in chunk.split_terminator('\n') {
            let line = line.trim_end_matches('\r');
            let status: DeviceStatusLine = line.parse()?;
            self.apply(status, sink);
            applied += 1;
        }
        Ok(applied)
    }

    /// Apply one status line.
    pub fn apply<S>(&mut self, status: DeviceStatusLine, sink: &mut S)
    where
        S: SchedulerSink + ?Sized,
    {
        match status {
            DeviceStatusLine::InkLevels(levels) => self.apply_levels(levels, sink),
            DeviceStatusLine::OutOfPaper => self.set_media(MediaState::Empty, sink),
            DeviceStatusLine::LowPaper => self.set_media(MediaState::Low, sink),
            DeviceStatusLine::Ok => self.set_media(MediaState::Ok, sink),
        }
    }

    fn apply_levels<S>(&mut self, levels: [i32; 4], sink: &mut S)
    where
        S: SchedulerSink + ?Sized,
    {
        if self.last_levels == Some(levels) {
            return;
        }
        sink.emit(SchedulerEvent::MarkerLevels(levels));

        for (channel, &level) in levels.iter().enumerate() {
            let below = level < LOW_THRESHOLD;
            if below != self.low[channel] {
                self.low[channel] = below;
                sink.emit(SchedulerEvent::state(below, StateReason::InkLow(channel)));
            }
        }
        self.last_levels = Some(levels);
    }

    fn set_media<S>(&mut self, state: MediaState, sink: &mut S)
    where
        S: SchedulerSink + ?Sized,
    {
        let (empty, low) = match state {
            MediaState::Empty => (true, false),
            MediaState::Low => (false, true),
            MediaState::Ok => (false, false),
        };

        // Clear before set so the scheduler never sees both at once.
        let toggles = [
            (empty, StateReason::MediaEmpty),
            (low, StateReason::MediaLow),
        ];
        for (set, reason) in toggles.iter().filter(|(set, _)| !set) {
            sink.emit(SchedulerEvent::state(*set, *reason));
        }
        for (set, reason) in toggles.iter().filter(|(set, _)| *set) {
            sink.emit(SchedulerEvent::state(*set, *reason));
        }

        self.media = state;
        self.empty_warning = empty;
        self.low_report = low;
    }
}

/// Turn a poll failure into a log line; the job always continues.
pub fn log_poll_error(err: &RasterSimError) {
    match err {
        RasterSimError::Protocol(message) => tracing::debug!("{}", message),
        other => tracing::debug!("Back-channel read failed: {}", other),
    }
}

// ============================================================================
// TESTS
// ============================================================================
