//! # Device Command Stream
//!
//! The forward stream from the translator to the device is a sequence of
//! newline-terminated ASCII header lines. Only `LINE` carries binary data:
//! its header declares a byte count and exactly that many raw bytes follow.
//!
//! ## Grammar
//!
//! | Record | Header | Payload |
//! |--------|--------|---------|
//! | Document | `DOCUMENT` | |
//! | Author | `AUTHOR <text>` | |
//! | Title | `TITLE <text>` | |
//! | Page | `PAGE <x> <y> <width> <height>` | |
//! | Raster | `RASTER <width> <height> <depth>` | |
//! | Line | `LINE <count>` | `count` raw bytes |
//! | EndPage | `ENDPAGE` | |
//! | EndDocument | `ENDDOCUMENT` | |
//! | Levels | `LEVELS` | |
//! | ChangeInk | `CHANGEINK <ignored>` | |
//! | Clean | `CLEAN <ignored>` | |
//!
//! Command names are case-sensitive. Fields are separated by whitespace.
//!
//! ## Example
//!
//! ```text
//! DOCUMENT
//! AUTHOR alice
//! TITLE Quarterly Report
//! PAGE 18 36 612 792
//! RASTER 2550 3300 3
//! LINE 7650
//! <7650 bytes of RGB pixels>
//! ...
//! ENDPAGE
//! ENDDOCUMENT
//! ```

use std::io::{self, BufRead, Read, Write};

use crate::error::{RasterSimError, Result};

/// Largest `LINE` payload kept in memory: a full 12x18" RGB page at 300 DPI.
/// Bytes past this limit are read and discarded.
pub const DEFAULT_PAYLOAD_LIMIT: usize = 3600 * 5400 * 3;

/// Page region in points, as sent by `PAGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PageBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the region can hold a raster.
    #[inline]
    pub fn is_printable(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// One record of the forward stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRecord {
    Document,
    Author(String),
    Title(String),
    Page(PageBox),
    Raster { width: u32, height: u32, depth: u32 },
    Line(Vec<u8>),
    EndPage,
    EndDocument,
    Levels,
    ChangeInk(String),
    Clean(String),
}

impl CommandRecord {
    /// Command name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            CommandRecord::Document => "DOCUMENT",
            CommandRecord::Author(_) => "AUTHOR",
            CommandRecord::Title(_) => "TITLE",
            CommandRecord::Page(_) => "PAGE",
            CommandRecord::Raster { .. } => "RASTER",
            CommandRecord::Line(_) => "LINE",
            CommandRecord::EndPage => "ENDPAGE",
            CommandRecord::EndDocument => "ENDDOCUMENT",
            CommandRecord::Levels => "LEVELS",
            CommandRecord::ChangeInk(_) => "CHANGEINK",
            CommandRecord::Clean(_) => "CLEAN",
        }
    }

    /// Encode the record, payload included.
    ///
    /// ```
    /// use rastersim::protocol::command::CommandRecord;
    ///
    /// assert_eq!(CommandRecord::Line(vec![1, 2]).encode(), b"LINE 2\n\x01\x02");
    /// assert_eq!(CommandRecord::Levels.encode(), b"LEVELS\n");
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = write_record(&mut out, self);
        out
    }
}

/// Keep free text on one header line.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

fn write_text<W: Write>(out: &mut W, name: &str, text: &str) -> io::Result<()> {
    if text.is_empty() {
        writeln!(out, "{}", name)
    } else {
        writeln!(out, "{} {}", name, single_line(text))
    }
}

/// Write one record to a forward stream.
pub fn write_record<W: Write>(out: &mut W, record: &CommandRecord) -> io::Result<()> {
    match record {
        CommandRecord::Author(text) | CommandRecord::Title(text) => {
            write_text(out, record.name(), text)
        }
        CommandRecord::ChangeInk(text) | CommandRecord::Clean(text) => {
            write_text(out, record.name(), text)
        }
        CommandRecord::Page(b) => {
            writeln!(out, "PAGE {} {} {} {}", b.x, b.y, b.width, b.height)
        }
        CommandRecord::Raster {
            width,
            height,
            depth,
        } => writeln!(out, "RASTER {} {} {}", width, height, depth),
        CommandRecord::Line(data) => write_line(out, data),
        CommandRecord::Document
        | CommandRecord::EndPage
        | CommandRecord::EndDocument
        | CommandRecord::Levels => writeln!(out, "{}", record.name()),
    }
}

/// Write a `LINE` record without building a [`CommandRecord`].
pub fn write_line<W: Write>(out: &mut W, data: &[u8]) -> io::Result<()> {
    writeln!(out, "LINE {}", data.len())?;
    out.write_all(data)
}

// ============================================================================
// DECODER
// ============================================================================

/// Pulls [`CommandRecord`]s off a forward stream.
///
/// Errors come in two kinds:
/// - [`RasterSimError::Protocol`]: one bad header line; the reader is already
///   positioned on the next record, so the caller can log and continue.
/// - [`RasterSimError::Io`]: the stream itself failed or ended inside a
///   `LINE` payload; decoding cannot continue.
pub struct CommandReader<R> {
    inner: R,
    header: Vec<u8>,
    payload_limit: usize,
    line_number: usize,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            header: Vec::with_capacity(64),
            payload_limit: DEFAULT_PAYLOAD_LIMIT,
            line_number: 0,
        }
    }

    /// Cap the number of `LINE` payload bytes kept per record.
    pub fn with_payload_limit(mut self, limit: usize) -> Self {
        self.payload_limit = limit;
        self
    }

    /// Header lines read so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Next record, or `None` at end of stream.
    pub fn next_record(&mut self) -> Result<Option<CommandRecord>> {
        loop {
            self.header.clear();
            if self.inner.read_until(b'\n', &mut self.header)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let owned = String::from_utf8_lossy(&self.header).into_owned();
            let text = owned.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let (name, value) = match text.split_once(char::is_whitespace) {
                Some((name, value)) => (name, value.trim_start()),
                None => (text, ""),
            };
            return match parse_header(name, value, self.line_number)? {
                HeaderRecord::Complete(record) => Ok(Some(record)),
                HeaderRecord::Line(count) => self.read_payload(count).map(Some),
            };
        }
    }

    fn read_payload(&mut self, count: u64) -> Result<CommandRecord> {
        let keep = count.min(self.payload_limit as u64);
        let mut data = Vec::with_capacity(keep.min(1 << 16) as usize);
        let read = (&mut self.inner).take(keep).read_to_end(&mut data)?;
        let mut total = read as u64;

        if total == keep && count > keep {
            total += io::copy(&mut (&mut self.inner).take(count - keep), &mut io::sink())?;
        }
        if total < count {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("LINE payload cut short: {} of {} bytes", total, count),
            )
            .into());
        }
        Ok(CommandRecord::Line(data))
    }
}

impl<R: BufRead> Iterator for CommandReader<R> {
    type Item = Result<CommandRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

enum HeaderRecord {
    Complete(CommandRecord),
    Line(u64),
}

fn parse_numbers<const N: usize>(value: &str, name: &str, line: usize) -> Result<[u32; N]> {
    let mut out = [0u32; N];
    let mut fields = value.split_whitespace();
    for slot in out.iter_mut() {
        *slot = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| {
                RasterSimError::Protocol(format!(
                    "line {}: {} needs {} unsigned fields, got \"{}\"",
                    line, name, N, value
                ))
            })?;
    }
    Ok(out)
}

fn parse_header(name: &str, value: &str, line: usize) -> Result<HeaderRecord> {
    use CommandRecord::*;

    let record = match name {
        "DOCUMENT" => Document,
        "AUTHOR" => Author(value.to_string()),
        "TITLE" => Title(value.to_string()),
        "PAGE" => {
            let [x, y, width, height] = parse_numbers::<4>(value, name, line)?;
            Page(PageBox::new(x, y, width, height))
        }
        "RASTER" => {
            let [width, height, depth] = parse_numbers::<3>(value, name, line)?;
            Raster {
                width,
                height,
                depth,
            }
        }
        "LINE" => {
            let count = value
                .split_whitespace()
                .next()
                .and_then(|f| f.parse::<u64>().ok())
                .ok_or_else(|| {
                    RasterSimError::Protocol(format!(
                        "line {}: LINE needs a byte count, got \"{}\"",
                        line, value
                    ))
                })?;
            return Ok(HeaderRecord::Line(count));
        }
        "ENDPAGE" => EndPage,
        "ENDDOCUMENT" => EndDocument,
        "LEVELS" => Levels,
        "CHANGEINK" => ChangeInk(value.to_string()),
        "CLEAN" => Clean(value.to_string()),
        other => {
            return Err(RasterSimError::Protocol(format!(
                "line {}: unknown command \"{}\"",
                line, other
            )));
        }
    };
    Ok(HeaderRecord::Complete(record))
}

// ============================================================================
// TESTS
// ============================================================================
