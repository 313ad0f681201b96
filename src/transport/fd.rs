//! # File Descriptor Back-Channel
//!
//! Under CUPS the filter and the backend share a back-channel on file
//! descriptor 3. The filter reads device status from it and the backend
//! writes status to it.
//!
//! Reads use `poll(2)` so a job never stalls on a quiet device:
//!
//! | Timeout | Behaviour |
//! |---------|-----------|
//! | zero | return whatever is already buffered |
//! | positive | wait up to the timeout for one chunk |
//!
//! An fd that is not open (no back-channel configured) reads as "no data".
//! The descriptor is borrowed, never closed.

use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::{BackChannel, StatusSink};
use crate::protocol::DeviceStatusLine;

/// Back-channel descriptor used by CUPS filters and backends.
pub const CUPS_BACK_CHANNEL_FD: RawFd = 3;

/// Back-channel over a raw file descriptor.
#[derive(Debug, Clone, Copy)]
pub struct FdBackChannel {
    fd: RawFd,
}

impl FdBackChannel {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }

    /// The CUPS back-channel (fd 3).
    pub fn cups() -> Self {
        Self::new(CUPS_BACK_CHANNEL_FD)
    }

    /// Wait until the fd is readable. `Ok(false)` on timeout or closed fd.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let millis = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };

        loop {
            let result = unsafe { libc::poll(&mut pfd, 1, millis) };
            if result < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if result == 0 || pfd.revents & libc::POLLNVAL != 0 {
                return Ok(false);
            }
            return Ok(pfd.revents & (libc::POLLIN | libc::POLLHUP) != 0);
        }
    }
}

impl BackChannel for FdBackChannel {
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() || !self.wait_readable(timeout)? {
            return Ok(0);
        }

        loop {
            let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => return Ok(0),
                _ => return Err(err),
            }
        }
    }
}

impl Write for FdBackChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let n = unsafe { libc::write(self.fd, buf.as_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StatusSink for FdBackChannel {
    fn send_status(&mut self, status: &DeviceStatusLine) -> io::Result<()> {
        self.write_all(format!("{}\n", status).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as libc::c_int; 2];
        let result = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(result, 0);
        (fds[0], fds[1])
    }

    fn close(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    #[test]
    fn test_poll_without_data_returns_zero() {
        let (read_fd, write_fd) = os_pipe();
        let mut channel = FdBackChannel::new(read_fd);
        let mut buf = [0u8; 64];

        assert_eq!(channel.read_chunk(&mut buf, Duration::ZERO).unwrap(), 0);
        assert_eq!(
            channel.read_chunk(&mut buf, Duration::from_millis(20)).unwrap(),
            0
        );

        close(read_fd);
        close(write_fd);
    }

    #[test]
    fn test_status_round_trip_through_pipe() {
        let (read_fd, write_fd) = os_pipe();
        let mut device = FdBackChannel::new(write_fd);
        let mut filter = FdBackChannel::new(read_fd);

        device
            .send_status(&DeviceStatusLine::InkLevels([1, 2, 3, 4]))
            .unwrap();
        device.send_status(&DeviceStatusLine::LowPaper).unwrap();

        let mut buf = [0u8; 64];
        let n = filter.read_chunk(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(&buf[..n], b"IL1,2,3,4\nLP\n");

        close(read_fd);
        close(write_fd);
    }

    #[test]
    fn test_unopened_fd_reads_as_no_data() {
        let mut channel = FdBackChannel::new(9_999);
        let mut buf = [0u8; 8];
        assert_eq!(channel.read_chunk(&mut buf, Duration::ZERO).unwrap(), 0);
    }
}
