//! # Simulated Raster Device
//!
//! Consumes the command stream the way the hardware would: pages are drawn
//! into buffers, every printed line depletes the cartridges, and `LEVELS`
//! queries are answered on the back-channel.
//!
//! ## Record Handling
//!
//! ```text
//!              DOCUMENT               PAGE                 RASTER
//! NoDocument ───────────► Document ─────────► Page ───────────────► Page+buffer
//!      ▲                   │   ▲                │  ENDPAGE            │ LINE*
//!      │   ENDDOCUMENT     │   └────────────────┴─────────────────────┘
//!      └───────────────────┘
//! ```
//!
//! Records that do not fit the current state are logged and skipped. The
//! ink counters are persisted once, when the input ends.

use std::io::BufRead;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::consumable::{Depth, InkLevels, LevelStore, page_resolution};
use crate::error::{RasterSimError, Result};
use crate::output::{OutputDocument, PageImage};
use crate::printer::DeviceProfile;
use crate::protocol::{CommandReader, CommandRecord, DeviceStatusLine, PageBox};
use crate::transport::StatusSink;

/// Where rendered documents go: `<dir>/<basename><n>/`.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub basename: String,
}

/// Counters for one device run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceReport {
    pub documents: u32,
    pub pages: u32,
    pub lines: u64,
    /// `LINE` records longer than the space left in the page buffer
    pub truncated_lines: u64,
    /// Records that were malformed or out of place
    pub skipped_records: u64,
    pub levels: InkLevels,
}

struct PageRaster {
    width: u32,
    height: u32,
    depth: Depth,
    data: Vec<u8>,
    cursor: usize,
}

impl PageRaster {
    fn allocate(width: u32, height: u32, depth: Depth) -> Result<Self> {
        let len = width as usize * height as usize * depth.bytes_per_pixel();
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| {
            RasterSimError::Resource(format!("Unable to allocate {} bytes for page", len))
        })?;
        data.resize(len, 255);
        Ok(Self {
            width,
            height,
            depth,
            data,
            cursor: 0,
        })
    }
}

struct OpenPage {
    page_box: PageBox,
    raster: Option<PageRaster>,
}

/// The device stage.
pub struct DeviceSimulator<S, B> {
    profile: DeviceProfile,
    target: OutputTarget,
    store: S,
    back: B,
    levels: InkLevels,
    resolution: u32,
    document: Option<OutputDocument>,
    page: Option<OpenPage>,
    report: DeviceReport,
}

impl<S: LevelStore, B: StatusSink> DeviceSimulator<S, B> {
    /// Create a device with the counters currently in `store`.
    pub fn new(profile: DeviceProfile, target: OutputTarget, store: S, back: B) -> Self {
        let levels = store.load();
        debug!("Ink levels {:?}", levels.reported());
        Self {
            resolution: profile.default_resolution,
            profile,
            target,
            store,
            back,
            levels,
            document: None,
            page: None,
            report: DeviceReport::default(),
        }
    }

    pub fn levels(&self) -> &InkLevels {
        &self.levels
    }

    /// Resolution used for ink accounting on the current page.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    /// Run the device until the command stream ends.
    ///
    /// Bad records are skipped. A failing stream stops the run, but the open
    /// document is still closed and the levels are still saved before the
    /// error is returned.
    pub fn run<R: BufRead>(mut self, reader: R) -> Result<DeviceReport> {
        let mut commands = CommandReader::new(reader);
        let mut failure = None;

        loop {
            match commands.next_record() {
                Ok(Some(record)) => self.apply(record),
                Ok(None) => break,
                Err(RasterSimError::Protocol(message)) => {
                    warn!("Line {}: {}", commands.line_number(), message);
                    self.report.skipped_records += 1;
                }
                Err(err) => {
                    error!("Unable to read commands: {}", err);
                    failure = Some(err);
                    break;
                }
            }
        }

        let report = self.finish()?;
        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Apply one record.
    pub fn apply(&mut self, record: CommandRecord) {
        match record {
            CommandRecord::Document => self.start_document(),
            CommandRecord::Author(author) => match self.document.as_mut() {
                Some(document) => document.set_author(&author),
                None => self.skip("AUTHOR without a document"),
            },
            CommandRecord::Title(title) => match self.document.as_mut() {
                Some(document) => document.set_title(&title),
                None => self.skip("TITLE without a document"),
            },
            CommandRecord::Page(page_box) => self.start_page(page_box),
            CommandRecord::Raster {
                width,
                height,
                depth,
            } => self.start_raster(width, height, depth),
            CommandRecord::Line(data) => self.print_line(&data),
            CommandRecord::EndPage => self.end_page(),
            CommandRecord::EndDocument => {
                if self.page.take().is_some() {
                    warn!("Discarding unfinished page at end of document");
                }
                self.close_document();
            }
            CommandRecord::Levels => self.report_levels(),
            CommandRecord::ChangeInk(_) => {
                info!("Changing ink cartridges");
                self.levels.change_ink();
            }
            CommandRecord::Clean(_) => info!("Cleaning print heads"),
        }
    }

    /// Close any open document and persist the ink counters.
    pub fn finish(mut self) -> Result<DeviceReport> {
        if self.page.take().is_some() {
            warn!("Discarding unfinished page at end of input");
        }
        self.close_document();
        self.store.save(&self.levels)?;
        self.report.levels = self.levels;
        Ok(self.report)
    }

    fn skip(&mut self, what: &str) {
        debug!("Ignoring {}", what);
        self.report.skipped_records += 1;
    }

    fn start_document(&mut self) {
        if self.page.take().is_some() {
            warn!("Discarding unfinished page");
        }
        self.close_document();

        self.report.documents += 1;
        match OutputDocument::create(&self.target.dir, &self.target.basename, self.report.documents) {
            Ok(document) => self.document = Some(document),
            Err(err) => error!("{}", err),
        }
    }

    fn close_document(&mut self) {
        if let Some(document) = self.document.take() {
            match document.close() {
                Ok(dir) => info!("Wrote {}", dir.display()),
                Err(err) => error!("Unable to finish document: {}", err),
            }
        }
    }

    fn start_page(&mut self, page_box: PageBox) {
        if self.document.is_none() {
            return self.skip("PAGE without a document");
        }
        if self.page.is_some() {
            warn!("Discarding unfinished page");
        }
        debug!(
            "Starting page {}x{} at {},{}",
            page_box.width, page_box.height, page_box.x, page_box.y
        );
        self.page = Some(OpenPage {
            page_box,
            raster: None,
        });
    }

    fn start_raster(&mut self, width: u32, height: u32, depth: u32) {
        let Some(page) = self.page.as_mut() else {
            return self.skip("RASTER without a page");
        };
        if !page.page_box.is_printable() || page.raster.is_some() {
            return self.skip("RASTER for this page");
        }
        if !self.profile.accepts_raster(width, height, depth) {
            warn!("Unsupported raster {}x{}x{}", width, height, depth);
            self.report.skipped_records += 1;
            return;
        }
        let Ok(depth) = Depth::try_from(depth) else {
            return self.skip("RASTER depth");
        };

        match PageRaster::allocate(width, height, depth) {
            Ok(raster) => {
                self.resolution = page_resolution(width, page.page_box.width);
                debug!("Page resolution {} dpi", self.resolution);
                page.raster = Some(raster);
            }
            Err(err) => error!("{}", err),
        }
    }

    fn print_line(&mut self, data: &[u8]) {
        let Some(raster) = self.page.as_mut().and_then(|page| page.raster.as_mut()) else {
            debug!("Dropping {} bytes of raster data", data.len());
            return;
        };

        let remaining = raster.data.len() - raster.cursor;
        let count = data.len().min(remaining);
        if count < data.len() {
            debug!("Raster data too long, dropping {} bytes", data.len() - count);
            self.report.truncated_lines += 1;
        }

        let line = &mut raster.data[raster.cursor..raster.cursor + count];
        line.copy_from_slice(&data[..count]);
        self.levels.consume_line(line, raster.depth, self.resolution);
        raster.cursor += count;
        self.report.lines += 1;
    }

    fn end_page(&mut self) {
        let Some(page) = self.page.take() else {
            return self.skip("ENDPAGE without a page");
        };
        let Some(document) = self.document.as_mut() else {
            return;
        };

        let image = page.raster.as_ref().map(|raster| PageImage {
            width: raster.width,
            height: raster.height,
            depth: raster.depth,
            data: &raster.data,
        });
        match document.finish_page(page.page_box, image) {
            Ok(()) => self.report.pages += 1,
            Err(err) => error!("Unable to write page: {}", err),
        }
    }

    fn report_levels(&mut self) {
        let status = DeviceStatusLine::InkLevels(self.levels.reported());
        if let Err(err) = self.back.send_status(&status) {
            warn!("Unable to send ink levels: {}", err);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumable::MemoryLevelStore;
    use crate::output::DocumentManifest;
    use pretty_assertions::assert_eq;

    fn target(root: &std::path::Path) -> OutputTarget {
        OutputTarget {
            dir: root.to_path_buf(),
            basename: "1 - test".to_string(),
        }
    }

    fn device<'a>(
        root: &std::path::Path,
        store: &'a MemoryLevelStore,
        back: &'a mut Vec<DeviceStatusLine>,
    ) -> DeviceSimulator<&'a MemoryLevelStore, &'a mut Vec<DeviceStatusLine>> {
        DeviceSimulator::new(DeviceProfile::SAMPLE_RASTER, target(root), store, back)
    }

    #[test]
    fn test_single_page_document() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryLevelStore::new(InkLevels::full());
        let mut back = Vec::new();

        let input: &[u8] = b"DOCUMENT\nTITLE test\nPAGE 0 0 4 2\nRASTER 4 2 1\n\
            LINE 4\n\x00\x40\x80\xffLINE 4\n\xff\xff\xff\xff\nENDPAGE\nENDDOCUMENT\n";
        let report = device(root.path(), &store, &mut back).run(input).unwrap();

        assert_eq!(report.documents, 1);
        assert_eq!(report.pages, 1);
        assert_eq!(report.lines, 2);
        assert_eq!(store.saves(), 1);

        let manifest = DocumentManifest::load(&root.path().join("1 - test1")).unwrap();
        assert_eq!(manifest.title.as_deref(), Some("test"));
        assert_eq!(manifest.pages.len(), 1);
    }

    #[test]
    fn test_levels_query_replies() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryLevelStore::new(InkLevels::new([500_000, 1_000_000, 250_000, 0]));
        let mut back = Vec::new();

        device(root.path(), &store, &mut back)
            .run(&b"LEVELS\n"[..])
            .unwrap();
        assert_eq!(back, vec![DeviceStatusLine::InkLevels([50, 100, 25, 0])]);
    }

    #[test]
    fn test_exhausted_black_blanks_second_line() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryLevelStore::new(InkLevels::new([MAX, MAX, MAX, 12]));
        let mut back = Vec::new();

        let mut sim = device(root.path(), &store, &mut back);
        for record in [
            CommandRecord::Document,
            // 4 pixels across 4 inches: 1 dpi
            CommandRecord::Page(PageBox::new(0, 0, 288, 2)),
            CommandRecord::Raster {
                width: 4,
                height: 2,
                depth: 1,
            },
            CommandRecord::Line(vec![0; 4]),
        ] {
            sim.apply(record);
        }
        assert_eq!(sim.levels().get(3), 0);

        sim.apply(CommandRecord::Line(vec![0; 4]));
        let raster = sim.page.as_ref().and_then(|p| p.raster.as_ref()).unwrap();
        assert_eq!(&raster.data[..4], &[0, 0, 0, 0]);
        assert_eq!(&raster.data[4..], &[255, 255, 255, 255]);
    }

    const MAX: i32 = crate::consumable::ink::MAX_LEVEL;

    #[test]
    fn test_overlong_line_truncated() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryLevelStore::new(InkLevels::full());
        let mut back = Vec::new();

        let input: &[u8] = b"DOCUMENT\nPAGE 0 0 2 1\nRASTER 2 1 1\n\
            LINE 5\n\x10\x20\x30\x40\x50LEVELS\nENDPAGE\nENDDOCUMENT\n";
        let report = device(root.path(), &store, &mut back).run(input).unwrap();

        assert_eq!(report.truncated_lines, 1);
        assert_eq!(report.pages, 1);
        assert_eq!(back.len(), 1);

        let page = image::open(root.path().join("1 - test1").join("page-0001.png"))
            .unwrap()
            .to_luma8();
        assert_eq!(page.as_raw(), &vec![0x10, 0x20]);
    }

    #[test]
    fn test_records_outside_document_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryLevelStore::new(InkLevels::full());
        let mut back = Vec::new();

        let input: &[u8] = b"PAGE 0 0 10 10\nRASTER 10 10 1\nLINE 2\n\x00\x00ENDPAGE\nBOGUS 1\n";
        let report = device(root.path(), &store, &mut back).run(input).unwrap();

        assert_eq!(report.documents, 0);
        assert_eq!(report.lines, 0);
        assert_eq!(report.skipped_records, 4);
        assert_eq!(report.levels, InkLevels::full());
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn test_unsupported_raster_leaves_page_blank() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryLevelStore::new(InkLevels::full());
        let mut back = Vec::new();

        let input: &[u8] =
            b"DOCUMENT\nPAGE 0 0 3 2\nRASTER 3 2 4\nLINE 3\n\x00\x00\x00ENDPAGE\nENDDOCUMENT\n";
        let report = device(root.path(), &store, &mut back).run(input).unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.lines, 0);
        let manifest = DocumentManifest::load(&root.path().join("1 - test1")).unwrap();
        assert_eq!(manifest.pages[0].raster, None);
    }

    #[test]
    fn test_documents_numbered_and_closed_at_end() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryLevelStore::new(InkLevels::full());
        let mut back = Vec::new();

        let input: &[u8] = b"DOCUMENT\nPAGE 0 0 1 1\nENDPAGE\nDOCUMENT\nPAGE 0 0 1 1\nENDPAGE\n";
        let report = device(root.path(), &store, &mut back).run(input).unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.pages, 2);
        assert!(root.path().join("1 - test1").join("document.json").exists());
        assert!(root.path().join("1 - test2").join("document.json").exists());
    }

    #[test]
    fn test_change_ink_and_resolution() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryLevelStore::new(InkLevels::new([0, 0, 0, 0]));
        let mut back = Vec::new();

        let mut sim = device(root.path(), &store, &mut back);
        assert_eq!(sim.resolution(), 100);
        sim.apply(CommandRecord::ChangeInk(String::new()));
        sim.apply(CommandRecord::Clean("all".to_string()));
        assert_eq!(*sim.levels(), InkLevels::full());

        sim.apply(CommandRecord::Document);
        sim.apply(CommandRecord::Page(PageBox::new(0, 0, 612, 792)));
        sim.apply(CommandRecord::Raster {
            width: 2550,
            height: 1,
            depth: 3,
        });
        assert_eq!(sim.resolution(), 300);

        let report = sim.finish().unwrap();
        assert_eq!(store.stored(), Some(InkLevels::full()));
        assert_eq!(report.pages, 0);
    }

    #[test]
    fn test_truncated_payload_still_saves() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryLevelStore::new(InkLevels::full());
        let mut back = Vec::new();

        let result = device(root.path(), &store, &mut back).run(&b"DOCUMENT\nLINE 10\nabc"[..]);
        assert!(matches!(result, Err(RasterSimError::Io(_))));
        assert_eq!(store.saves(), 1);
        assert!(root.path().join("1 - test1").join("document.json").exists());
    }
}
