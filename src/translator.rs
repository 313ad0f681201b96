//! # Raster Translator
//!
//! Turns a CUPS raster job into the device command stream.
//!
//! ## Output For One Job
//!
//! ```text
//! DOCUMENT
//! AUTHOR alice
//! TITLE report.pdf
//! PAGE 0 0 612 792          ◄── one block per raster page
//! RASTER 850 1100 3
//! LEVELS                    ◄── every progress interval (line 0 included)
//! LINE 2550
//! <2550 bytes>
//! ...
//! ENDPAGE
//! LEVELS                    ◄── final status query
//! ENDDOCUMENT
//! ```
//!
//! Between scanlines the back-channel is polled without blocking, so ink and
//! paper changes reach the scheduler while the job is still printing.
//!
//! ## Accepted Input
//!
//! | Field | Accepted |
//! |-------|----------|
//! | bits per color | 8, 16 (downsampled to 8) |
//! | color order | chunked |
//! | color space | gray (1 color), RGB (3 colors) |
//!
//! Anything else stops the job before the offending page; the document is
//! still closed.

use std::io::{Read, Write};
use std::time::Duration;

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::{RasterSimError, Result};
use crate::printer::TranslatorOptions;
use crate::protocol::command::{write_line, write_record};
use crate::protocol::{CommandRecord, PageBox};
use crate::raster::{ColorOrder, ColorSpace, PageHeader, RasterReader};
use crate::status::{SchedulerEvent, SchedulerSink, StatusChannel};
use crate::transport::BackChannel;

/// Job attributes from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub user: String,
    pub title: String,
    pub copies: u32,
}

/// What a finished (or cancelled) job produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslateSummary {
    pub pages: u32,
    pub lines: u64,
    pub cancelled: bool,
}

/// Scale a 16-bit sample to 8 bits, rounding to nearest.
///
/// ```
/// use rastersim::translator::downsample;
///
/// assert_eq!(downsample(0), 0);
/// assert_eq!(downsample(257 * 100), 100);
/// assert_eq!(downsample(u16::MAX), 255);
/// ```
pub fn downsample(sample: u16) -> u8 {
    ((u32::from(sample) + 129) / 257) as u8
}

/// Check that a page can be sent to the device.
pub fn validate_header(header: &PageHeader) -> Result<()> {
    if header.bits_per_color != 8 && header.bits_per_color != 16 {
        return Err(RasterSimError::Validation(format!(
            "Unsupported bits per color {}",
            header.bits_per_color
        )));
    }
    if header.color_order != ColorOrder::Chunked {
        return Err(RasterSimError::Validation(format!(
            "Unsupported color order {}",
            header.color_order.raw()
        )));
    }
    let colors = match header.color_space {
        ColorSpace::Gray => 1,
        ColorSpace::Rgb => 3,
        other => {
            return Err(RasterSimError::Validation(format!(
                "Unsupported color space {}",
                other.raw()
            )));
        }
    };
    if header.num_colors != colors {
        return Err(RasterSimError::Validation(format!(
            "{} colors per pixel do not match color space {}",
            header.num_colors,
            header.color_space.raw()
        )));
    }
    Ok(())
}

fn allocate_line(len: usize) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    line.try_reserve_exact(len).map_err(|_| {
        RasterSimError::Resource(format!("Unable to allocate {} bytes for a raster line", len))
    })?;
    line.resize(len, 0);
    Ok(line)
}

/// Raster-to-command filter.
///
/// `W` is the forward stream to the device, `B` the back-channel and `S`
/// receives scheduler messages.
pub struct RasterTranslator<W, B, S> {
    out: W,
    back: B,
    scheduler: S,
    options: TranslatorOptions,
    cancel: CancelToken,
}

impl<W: Write, B: BackChannel, S: SchedulerSink> RasterTranslator<W, B, S> {
    pub fn new(out: W, back: B, scheduler: S) -> Self {
        Self {
            out,
            back,
            scheduler,
            options: TranslatorOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, options: TranslatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn into_parts(self) -> (W, B, S) {
        (self.out, self.back, self.scheduler)
    }

    /// Translate every page of `raster`.
    ///
    /// The document is always closed with a final status query and
    /// `ENDDOCUMENT`, even when a page fails. Errors writing the forward
    /// stream end the job immediately.
    pub fn translate<R: Read>(
        &mut self,
        job: &Job,
        raster: &mut RasterReader<R>,
        status: &mut StatusChannel,
    ) -> Result<TranslateSummary> {
        write_record(&mut self.out, &CommandRecord::Document)?;
        write_record(&mut self.out, &CommandRecord::Author(job.user.clone()))?;
        write_record(&mut self.out, &CommandRecord::Title(job.title.clone()))?;

        let mut summary = TranslateSummary::default();
        let printed = self.print_pages(job, raster, status, &mut summary);

        status.query(
            &mut self.out,
            &mut self.back,
            self.options.final_status_timeout,
            &mut self.scheduler,
        )?;
        write_record(&mut self.out, &CommandRecord::EndDocument)?;
        self.out.flush()?;

        printed?;
        if summary.pages == 0 && !summary.cancelled {
            return Err(RasterSimError::Raster("No pages found".to_string()));
        }
        Ok(summary)
    }

    fn check_cancelled(&self, summary: &mut TranslateSummary) -> bool {
        if self.cancel.is_cancelled() && !summary.cancelled {
            info!("Job canceled");
            summary.cancelled = true;
        }
        summary.cancelled
    }

    fn print_pages<R: Read>(
        &mut self,
        job: &Job,
        raster: &mut RasterReader<R>,
        status: &mut StatusChannel,
        summary: &mut TranslateSummary,
    ) -> Result<()> {
        while let Some(header) = raster.next_header()? {
            if self.check_cancelled(summary) {
                break;
            }
            validate_header(&header)?;
            let mut line = allocate_line(header.bytes_per_line as usize)?;

            summary.pages += 1;
            self.print_page(job, &header, raster, &mut line, status, summary)?;
            if summary.cancelled {
                break;
            }
        }
        Ok(())
    }

    fn print_page<R: Read>(
        &mut self,
        job: &Job,
        header: &PageHeader,
        raster: &mut RasterReader<R>,
        line: &mut [u8],
        status: &mut StatusChannel,
        summary: &mut TranslateSummary,
    ) -> Result<()> {
        let number = summary.pages;
        self.scheduler.emit(SchedulerEvent::Page {
            number,
            copies: job.copies,
        });
        self.scheduler
            .emit(SchedulerEvent::Info(format!("Starting page {}...", number)));

        let page_box = PageBox::new(
            header.margins[0],
            header.margins[1],
            header.page_size[0],
            header.page_size[1],
        );
        write_record(&mut self.out, &CommandRecord::Page(page_box))?;
        write_record(
            &mut self.out,
            &CommandRecord::Raster {
                width: header.width,
                height: header.height,
                depth: header.num_colors,
            },
        )?;

        let scanned = self.print_lines(header, raster, line, status, summary);

        write_record(&mut self.out, &CommandRecord::EndPage)?;
        self.scheduler
            .emit(SchedulerEvent::Info(format!("Finished page {}...", number)));
        scanned
    }

    fn print_lines<R: Read>(
        &mut self,
        header: &PageHeader,
        raster: &mut RasterReader<R>,
        line: &mut [u8],
        status: &mut StatusChannel,
        summary: &mut TranslateSummary,
    ) -> Result<()> {
        let number = summary.pages;
        let interval = self.options.progress_interval.max(1);
        let mut narrow = if header.bits_per_color == 16 {
            allocate_line(line.len() / 2)?
        } else {
            Vec::new()
        };

        for y in 0..header.height {
            if self.check_cancelled(summary) {
                break;
            }

            if y % interval == 0 {
                let percent = 100.0 * f64::from(y) / f64::from(header.height);
                self.scheduler.emit(SchedulerEvent::Info(format!(
                    "Printing page {}, {:.0}% complete...",
                    number, percent
                )));
                write_record(&mut self.out, &CommandRecord::Levels)?;
                self.out.flush()?;
            }
            status.poll_logged(&mut self.back, Duration::ZERO, &mut self.scheduler);

            if !raster.read_line(line)? {
                warn!("Page {} ended after {} of {} lines", number, y, header.height);
                break;
            }

            if header.bits_per_color == 16 {
                for (dst, pair) in narrow.iter_mut().zip(line.chunks_exact(2)) {
                    *dst = downsample(u16::from_ne_bytes([pair[0], pair[1]]));
                }
                write_line(&mut self.out, &narrow)?;
            } else {
                write_line(&mut self.out, line)?;
            }
            summary.lines += 1;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandReader;
    use crate::raster::RasterWriter;
    use crate::transport::{NoBackChannel, StatusSink};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn job() -> Job {
        Job {
            id: "7".to_string(),
            user: "alice".to_string(),
            title: "report".to_string(),
            copies: 1,
        }
    }

    fn quick() -> TranslatorOptions {
        TranslatorOptions {
            final_status_timeout: Duration::ZERO,
            ..TranslatorOptions::default()
        }
    }

    fn recorder() -> RasterTranslator<Vec<u8>, NoBackChannel, Vec<SchedulerEvent>> {
        RasterTranslator::new(Vec::new(), NoBackChannel, Vec::new()).with_options(quick())
    }

    fn stream(pages: &[(PageHeader, Vec<Vec<u8>>)]) -> RasterReader<Cursor<Vec<u8>>> {
        let mut writer = RasterWriter::new(Vec::new()).unwrap();
        for (header, lines) in pages {
            writer.write_header(header).unwrap();
            for line in lines {
                writer.write_line(line).unwrap();
            }
        }
        RasterReader::open(Cursor::new(writer.into_inner())).unwrap()
    }

    fn records(bytes: &[u8]) -> Vec<CommandRecord> {
        CommandReader::new(bytes)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn gray_page(width: u32, height: u32) -> (PageHeader, Vec<Vec<u8>>) {
        let header = PageHeader::new(width, height, ColorSpace::Gray, 8, 72);
        let lines = (0..height).map(|y| vec![y as u8; width as usize]).collect();
        (header, lines)
    }

    #[test]
    fn test_two_page_gray_job() {
        let mut raster = stream(&[gray_page(3, 2), gray_page(3, 1)]);
        let mut translator = recorder();
        let summary = translator
            .translate(&job(), &mut raster, &mut StatusChannel::new())
            .unwrap();
        assert_eq!(
            summary,
            TranslateSummary {
                pages: 2,
                lines: 3,
                cancelled: false
            }
        );

        let (out, _, events) = translator.into_parts();
        assert_eq!(
            records(&out),
            vec![
                CommandRecord::Document,
                CommandRecord::Author("alice".to_string()),
                CommandRecord::Title("report".to_string()),
                CommandRecord::Page(PageBox::new(0, 0, 3, 2)),
                CommandRecord::Raster {
                    width: 3,
                    height: 2,
                    depth: 1
                },
                CommandRecord::Levels,
                CommandRecord::Line(vec![0, 0, 0]),
                CommandRecord::Line(vec![1, 1, 1]),
                CommandRecord::EndPage,
                CommandRecord::Page(PageBox::new(0, 0, 3, 1)),
                CommandRecord::Raster {
                    width: 3,
                    height: 1,
                    depth: 1
                },
                CommandRecord::Levels,
                CommandRecord::Line(vec![0, 0, 0]),
                CommandRecord::EndPage,
                CommandRecord::Levels,
                CommandRecord::EndDocument,
            ]
        );

        let lines: Vec<String> = events.iter().take(4).map(|e| e.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "PAGE: 1 1",
                "INFO: Starting page 1...",
                "INFO: Printing page 1, 0% complete...",
                "INFO: Finished page 1...",
            ]
        );
    }

    #[test]
    fn test_sixteen_bit_rgb_is_downsampled() {
        let header = PageHeader::new(1, 1, ColorSpace::Rgb, 16, 72);
        let line: Vec<u8> = [0u16, 257 * 100, u16::MAX]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let mut raster = stream(&[(header, vec![line])]);

        let mut translator = recorder();
        translator
            .translate(&job(), &mut raster, &mut StatusChannel::new())
            .unwrap();

        let (out, _, _) = translator.into_parts();
        assert!(records(&out).contains(&CommandRecord::Line(vec![0, 100, 255])));
    }

    #[test]
    fn test_progress_interval() {
        let mut raster = stream(&[gray_page(2, 5)]);
        let options = TranslatorOptions {
            progress_interval: 2,
            ..quick()
        };
        let mut translator = recorder().with_options(options);
        translator
            .translate(&job(), &mut raster, &mut StatusChannel::new())
            .unwrap();

        let (out, _, events) = translator.into_parts();
        let queries = records(&out)
            .iter()
            .filter(|r| **r == CommandRecord::Levels)
            .count();
        // Lines 0, 2 and 4 plus the final query.
        assert_eq!(queries, 4);
        assert!(events.contains(&SchedulerEvent::Info(
            "Printing page 1, 40% complete...".to_string()
        )));
    }

    #[test]
    fn test_invalid_page_still_closes_document() {
        let mut header = PageHeader::new(4, 1, ColorSpace::Gray, 8, 72);
        header.bits_per_color = 1;
        let mut raster = stream(&[(header, vec![vec![0u8; 1]])]);

        let mut translator = recorder();
        let result = translator.translate(&job(), &mut raster, &mut StatusChannel::new());
        assert!(matches!(result, Err(RasterSimError::Validation(_))));

        let (out, _, _) = translator.into_parts();
        assert_eq!(
            records(&out),
            vec![
                CommandRecord::Document,
                CommandRecord::Author("alice".to_string()),
                CommandRecord::Title("report".to_string()),
                CommandRecord::Levels,
                CommandRecord::EndDocument,
            ]
        );
    }

    #[test]
    fn test_cmyk_rejected() {
        let header = PageHeader::new(4, 4, ColorSpace::Cmyk, 8, 72);
        assert!(matches!(
            validate_header(&header),
            Err(RasterSimError::Validation(_))
        ));
        let mut banded = PageHeader::new(4, 4, ColorSpace::Rgb, 8, 72);
        banded.color_order = ColorOrder::Banded;
        assert!(validate_header(&banded).is_err());
    }

    #[test]
    fn test_empty_job_fails() {
        let mut raster = stream(&[]);
        let mut translator = recorder();
        let result = translator.translate(&job(), &mut raster, &mut StatusChannel::new());
        assert!(matches!(result, Err(RasterSimError::Raster(_))));

        let (out, _, _) = translator.into_parts();
        assert_eq!(records(&out).last(), Some(&CommandRecord::EndDocument));
    }

    #[test]
    fn test_cancelled_job_succeeds_with_teardown() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut raster = stream(&[gray_page(2, 2)]);
        let mut translator = recorder().with_cancel_token(cancel);

        let summary = translator
            .translate(&job(), &mut raster, &mut StatusChannel::new())
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.pages, 0);

        let (out, _, _) = translator.into_parts();
        assert_eq!(records(&out).last(), Some(&CommandRecord::EndDocument));
    }

    /// Cancels the job once the first progress message goes out.
    struct CancelOnProgress {
        cancel: CancelToken,
        events: Vec<SchedulerEvent>,
    }

    impl SchedulerSink for CancelOnProgress {
        fn emit(&mut self, event: SchedulerEvent) {
            if event == SchedulerEvent::Info("Printing page 1, 0% complete...".to_string()) {
                self.cancel.cancel();
            }
            self.events.push(event);
        }
    }

    #[test]
    fn test_cancel_mid_page_finishes_current_line() {
        let cancel = CancelToken::new();
        let sink = CancelOnProgress {
            cancel: cancel.clone(),
            events: Vec::new(),
        };
        let mut raster = stream(&[gray_page(2, 3), gray_page(2, 1)]);
        let mut translator = RasterTranslator::new(Vec::new(), NoBackChannel, sink)
            .with_options(quick())
            .with_cancel_token(cancel);

        let summary = translator
            .translate(&job(), &mut raster, &mut StatusChannel::new())
            .unwrap();
        assert_eq!(
            summary,
            TranslateSummary {
                pages: 1,
                lines: 1,
                cancelled: true
            }
        );

        let (out, _, sink) = translator.into_parts();
        let decoded = records(&out);
        assert_eq!(
            decoded[3..].to_vec(),
            vec![
                CommandRecord::Page(PageBox::new(0, 0, 2, 3)),
                CommandRecord::Raster {
                    width: 2,
                    height: 3,
                    depth: 1
                },
                CommandRecord::Levels,
                CommandRecord::Line(vec![0, 0]),
                CommandRecord::EndPage,
                CommandRecord::Levels,
                CommandRecord::EndDocument,
            ]
        );
        assert!(
            !sink
                .events
                .contains(&SchedulerEvent::Page { number: 2, copies: 1 })
        );
    }

    #[test]
    fn test_truncated_page_ends_early() {
        let (header, mut lines) = gray_page(2, 3);
        lines.truncate(1);
        let mut raster = stream(&[(header, lines)]);

        let mut translator = recorder();
        let summary = translator
            .translate(&job(), &mut raster, &mut StatusChannel::new())
            .unwrap();
        assert_eq!(summary.lines, 1);

        let (out, _, _) = translator.into_parts();
        let decoded = records(&out);
        assert!(decoded.contains(&CommandRecord::EndPage));
        assert_eq!(decoded.last(), Some(&CommandRecord::EndDocument));
    }

    #[test]
    fn test_status_reported_while_printing() {
        use crate::protocol::DeviceStatusLine;
        use crate::transport::pipe::back_channel;

        let (mut device, back) = back_channel();
        device.send_status(&DeviceStatusLine::LowPaper).unwrap();

        let mut raster = stream(&[gray_page(1, 1)]);
        let mut status = StatusChannel::new();
        let mut translator = RasterTranslator::new(Vec::<u8>::new(), back, Vec::<SchedulerEvent>::new())
            .with_options(quick());
        translator.translate(&job(), &mut raster, &mut status).unwrap();

        let (_, _, events) = translator.into_parts();
        assert!(events.iter().any(|e| e.to_string() == "STATE: +media-low-report"));
        assert_eq!(status.media_flags(), (false, true));
    }

    proptest! {
        #[test]
        fn prop_downsample_is_monotonic(a: u16, b: u16) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(downsample(lo) <= downsample(hi));
        }
    }
}
