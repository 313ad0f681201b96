//! # Stage Transport Layer
//!
//! The translator and the device are connected by two one-way streams:
//!
//! ```text
//!  translator ── forward (commands, any io::Write) ──► device
//!  translator ◄── back-channel (status lines) ─────── device
//! ```
//!
//! Only the back-channel read has a timeout. A zero timeout is a
//! non-blocking poll; anything larger waits at most that long for one chunk.
//!
//! ## Available Transports
//!
//! - [`fd`]: file descriptor back-channel (fd 3 under CUPS), `poll(2)` based
//! - [`pipe`]: in-process streams for running both stages as threads

#[cfg(unix)]
pub mod fd;
pub mod pipe;

use std::io;
use std::time::Duration;

use crate::protocol::DeviceStatusLine;

#[cfg(unix)]
pub use fd::FdBackChannel;
pub use pipe::{PipeReader, PipeWriter, StatusReceiver, StatusSender};

/// Largest chunk read from the back-channel in one call.
pub const BACK_CHANNEL_CHUNK: usize = 1024;

/// Read side of the back-channel (translator).
pub trait BackChannel {
    /// Read at most one chunk into `buf`, waiting up to `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// Write side of the back-channel (device).
pub trait StatusSink {
    fn send_status(&mut self, status: &DeviceStatusLine) -> io::Result<()>;
}

impl<B: BackChannel + ?Sized> BackChannel for &mut B {
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read_chunk(buf, timeout)
    }
}

impl<S: StatusSink + ?Sized> StatusSink for &mut S {
    fn send_status(&mut self, status: &DeviceStatusLine) -> io::Result<()> {
        (**self).send_status(status)
    }
}

/// Back-channel that never has data, for translators without a device.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackChannel;

impl BackChannel for NoBackChannel {
    fn read_chunk(&mut self, _buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        Ok(0)
    }
}

/// Collects status lines in memory.
impl StatusSink for Vec<DeviceStatusLine> {
    fn send_status(&mut self, status: &DeviceStatusLine) -> io::Result<()> {
        self.push(*status);
        Ok(())
    }
}
