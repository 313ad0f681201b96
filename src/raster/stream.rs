//! # Raster Stream Reader and Writer
//!
//! A CUPS raster stream is a 4-byte sync word followed by pages, each a
//! [`PageHeader`] and `cupsHeight` scanlines.
//!
//! ## Sync Words
//!
//! | Bytes (big-endian) | Version | Pixel data |
//! |--------------------|---------|------------|
//! | `RaSt` | 1 | uncompressed |
//! | `RaS2` | 2 | run-length compressed |
//! | `RaS3` | 3 | uncompressed |
//!
//! The same words byte-reversed (`tSaR`, `2SaR`, `3SaR`) mark a
//! little-endian stream.
//!
//! ## Version 2 Compression
//!
//! ```text
//! line    := repeat pixel-run*        (line used repeat+1 times)
//! run     := 0..=127  pixel           (pixel repeated n+1 times)
//!          | 129..=255 pixel*(257-n)  (literal pixels)
//!          | 128                      (rest of line is blank)
//! ```
//!
//! 16-bit samples are handed out in host byte order.

use std::io::{self, Read, Write};

use super::header::{HEADER_SIZE, PageHeader};
use crate::error::{RasterSimError, Result};

const SYNC_V1: u32 = 0x5261_5374; // "RaSt"
const SYNC_V2: u32 = 0x5261_5332; // "RaS2"
const SYNC_V3: u32 = 0x5261_5333; // "RaS3"

/// Fill `buf` completely, or report how much was available before EOF.
fn read_full<R: Read>(inner: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn swap_samples(line: &mut [u8]) {
    for pair in line.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

/// Reads pages and scanlines from a CUPS raster stream.
pub struct RasterReader<R> {
    inner: R,
    big_endian: bool,
    compressed: bool,
    header: Option<PageHeader>,
    lines_left: u32,
    // Version 2: last decoded line and how many more times to hand it out.
    repeat_line: Vec<u8>,
    repeats_left: u32,
}

impl<R: Read> RasterReader<R> {
    /// Read the sync word and prepare for the first page.
    pub fn open(mut inner: R) -> Result<Self> {
        let mut sync = [0u8; 4];
        if read_full(&mut inner, &mut sync)? < sync.len() {
            return Err(RasterSimError::Raster("stream too short for a sync word".into()));
        }

        let be = u32::from_be_bytes(sync);
        let le = u32::from_le_bytes(sync);
        let (big_endian, version) = match (be, le) {
            (SYNC_V1, _) => (true, 1),
            (SYNC_V2, _) => (true, 2),
            (SYNC_V3, _) => (true, 3),
            (_, SYNC_V1) => (false, 1),
            (_, SYNC_V2) => (false, 2),
            (_, SYNC_V3) => (false, 3),
            _ => {
                return Err(RasterSimError::Raster(format!(
                    "unknown sync word {:02x?}",
                    sync
                )));
            }
        };

        tracing::debug!(
            "Raster stream version {} ({})",
            version,
            if big_endian { "big-endian" } else { "little-endian" }
        );

        Ok(Self {
            inner,
            big_endian,
            compressed: version == 2,
            header: None,
            lines_left: 0,
            repeat_line: Vec::new(),
            repeats_left: 0,
        })
    }

    /// Whether the stream stores multi-byte values big-endian.
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Header of the page being read, if any.
    pub fn header(&self) -> Option<&PageHeader> {
        self.header.as_ref()
    }

    /// Advance to the next page, skipping unread lines of the current one.
    ///
    /// Returns `None` at a clean end of stream.
    pub fn next_header(&mut self) -> Result<Option<PageHeader>> {
        if let Some(bytes_per_line) = self.header.as_ref().map(|h| h.bytes_per_line as usize) {
            let mut scratch = vec![0u8; bytes_per_line];
            while self.read_line(&mut scratch)? {}
            self.header = None;
        }

        let mut bytes = vec![0u8; HEADER_SIZE];
        match read_full(&mut self.inner, &mut bytes)? {
            0 => return Ok(None),
            n if n < HEADER_SIZE => {
                return Err(RasterSimError::Raster(format!(
                    "truncated page header ({} of {} bytes)",
                    n, HEADER_SIZE
                )));
            }
            _ => {}
        }

        let header = PageHeader::decode(&bytes, self.big_endian)?;
        self.lines_left = header.height;
        self.repeats_left = 0;
        self.header = Some(header.clone());
        Ok(Some(header))
    }

    /// Read one scanline of the current page into `line`.
    ///
    /// `line` must hold `bytes_per_line` bytes. Returns `false` once the
    /// page has no lines left, or when the stream ends early.
    pub fn read_line(&mut self, line: &mut [u8]) -> Result<bool> {
        let Some(header) = self.header.as_ref() else {
            return Ok(false);
        };
        if self.lines_left == 0 {
            return Ok(false);
        }
        let bytes_per_line = header.bytes_per_line as usize;
        if line.len() < bytes_per_line {
            return Err(RasterSimError::Raster(format!(
                "line buffer holds {} bytes, page needs {}",
                line.len(),
                bytes_per_line
            )));
        }
        let line = &mut line[..bytes_per_line];
        let sixteen_bit = header.bits_per_color == 16;

        let complete = if self.compressed {
            self.read_compressed_line(line)?
        } else {
            read_full(&mut self.inner, line)? == bytes_per_line
        };
        if !complete {
            self.lines_left = 0;
            return Ok(false);
        }

        if sixteen_bit && self.big_endian != cfg!(target_endian = "big") {
            swap_samples(line);
        }
        self.lines_left -= 1;
        Ok(true)
    }

    fn read_compressed_line(&mut self, line: &mut [u8]) -> Result<bool> {
        if self.repeats_left > 0 && self.repeat_line.len() == line.len() {
            self.repeats_left -= 1;
            line.copy_from_slice(&self.repeat_line);
            return Ok(true);
        }

        let mut byte = [0u8; 1];
        if read_full(&mut self.inner, &mut byte)? == 0 {
            return Ok(false);
        }
        let repeat = byte[0] as u32;

        let header = self.header.as_ref().ok_or_else(|| {
            RasterSimError::Raster("compressed line outside a page".into())
        })?;
        let bpp = header.bytes_per_pixel();
        let blank = if header.color_space.zero_is_white() { 0x00 } else { 0xff };

        let mut pos = 0;
        while pos < line.len() {
            if read_full(&mut self.inner, &mut byte)? == 0 {
                return Ok(false);
            }
            let control = byte[0];
            match control {
                128 => {
                    line[pos..].fill(blank);
                    pos = line.len();
                }
                0..=127 => {
                    let count = control as usize + 1;
                    let mut pixel = vec![0u8; bpp];
                    if read_full(&mut self.inner, &mut pixel)? < bpp {
                        return Ok(false);
                    }
                    for _ in 0..count {
                        let end = (pos + bpp).min(line.len());
                        line[pos..end].copy_from_slice(&pixel[..end - pos]);
                        pos = end;
                        if pos == line.len() {
                            break;
                        }
                    }
                }
                129..=255 => {
                    let wanted = (257 - control as usize) * bpp;
                    let take = wanted.min(line.len() - pos);
                    if read_full(&mut self.inner, &mut line[pos..pos + take])? < take {
                        return Ok(false);
                    }
                    // Literal runs that overshoot the line are consumed and dropped.
                    if wanted > take {
                        let mut rest = vec![0u8; wanted - take];
                        if read_full(&mut self.inner, &mut rest)? < rest.len() {
                            return Ok(false);
                        }
                    }
                    pos += take;
                }
            }
        }

        self.repeats_left = repeat;
        self.repeat_line.clear();
        self.repeat_line.extend_from_slice(line);
        Ok(true)
    }
}

/// Writes uncompressed version 3 raster streams (little-endian).
pub struct RasterWriter<W> {
    inner: W,
    bits_per_color: u32,
}

impl<W: Write> RasterWriter<W> {
    pub fn new(mut inner: W) -> Result<Self> {
        inner.write_all(&SYNC_V3.to_le_bytes())?;
        Ok(Self {
            inner,
            bits_per_color: 8,
        })
    }

    pub fn write_header(&mut self, header: &PageHeader) -> Result<()> {
        self.bits_per_color = header.bits_per_color;
        self.inner.write_all(&header.encode(false))?;
        Ok(())
    }

    /// Write one scanline; 16-bit samples are given in host byte order.
    pub fn write_line(&mut self, line: &[u8]) -> Result<()> {
        if self.bits_per_color == 16 && cfg!(target_endian = "big") {
            let mut swapped = line.to_vec();
            swap_samples(&mut swapped);
            self.inner.write_all(&swapped)?;
        } else {
            self.inner.write_all(line)?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

// ============================================================================
// TESTS
// ============================================================================
