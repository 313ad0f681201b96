//! # In-Process Pipes
//!
//! Lets the translator and the device run as two threads of one process
//! while keeping the same contracts as the two-process setup:
//!
//! - [`forward`]: ordered byte stream, `io::Write` on one end and
//!   `io::Read` on the other; end of stream when the writer is dropped.
//! - [`back_channel`]: status lines flowing the other way, read with the
//!   same timeout rules as the fd back-channel.
//!
//! Both are built on unbounded `crossbeam-channel` queues of byte chunks.

use std::io::{self, Read, Write};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};

use super::{BackChannel, StatusSink};
use crate::protocol::DeviceStatusLine;

/// Bytes the forward writer collects before handing a chunk to the reader.
const FORWARD_CHUNK: usize = 8192;

/// Create a forward stream.
pub fn forward() -> (PipeWriter, PipeReader) {
    let (tx, rx) = unbounded();
    (
        PipeWriter {
            tx,
            pending: Vec::with_capacity(FORWARD_CHUNK),
        },
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
        },
    )
}

/// Create a back-channel.
pub fn back_channel() -> (StatusSender, StatusReceiver) {
    let (tx, rx) = unbounded();
    (
        StatusSender { tx },
        StatusReceiver {
            rx,
            pending: Vec::new(),
        },
    )
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader has gone away")
}

/// Writing end of a forward stream.
pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
    pending: Vec<u8>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        if self.pending.len() >= FORWARD_CHUNK {
            self.flush()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.pending, Vec::with_capacity(FORWARD_CHUNK));
        self.tx.send(chunk).map_err(|_| disconnected())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Reading end of a forward stream.
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.current.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Device end of an in-process back-channel.
#[derive(Clone)]
pub struct StatusSender {
    tx: Sender<Vec<u8>>,
}

impl StatusSink for StatusSender {
    fn send_status(&mut self, status: &DeviceStatusLine) -> io::Result<()> {
        self.tx
            .send(format!("{}\n", status).into_bytes())
            .map_err(|_| disconnected())
    }
}

/// Translator end of an in-process back-channel.
pub struct StatusReceiver {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl StatusReceiver {
    fn next_chunk(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        if timeout.is_zero() {
            match self.rx.try_recv() {
                Ok(chunk) => Some(chunk),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
            }
        } else {
            match self.rx.recv_timeout(timeout) {
                Ok(chunk) => Some(chunk),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
            }
        }
    }
}

impl BackChannel for StatusReceiver {
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.next_chunk(timeout) {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
            // Coalesce whatever else is already queued, like a pipe would.
            while self.pending.len() < buf.len() {
                match self.rx.try_recv() {
                    Ok(more) => self.pending.extend_from_slice(&more),
                    Err(_) => break,
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
