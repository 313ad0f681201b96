//! # Pipeline Tests
//!
//! End-to-end runs of the translator and the simulated device.
//!
//! - **In-memory**: translator output fed straight into the device
//! - **Threaded**: both stages connected by in-process pipes, as the
//!   `pipeline` command runs them
//! - **CLI**: the binary's discovery, usage and pipeline paths

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rastersim::consumable::store::parse_record;
use rastersim::consumable::{FileLevelStore, InkLevels, LevelStore, MemoryLevelStore};
use rastersim::output::DocumentManifest;
use rastersim::printer::{DeviceProfile, TranslatorOptions};
use rastersim::protocol::{CommandRecord, DeviceStatusLine};
use rastersim::raster::{ColorSpace, PageHeader, RasterReader, RasterWriter};
use rastersim::simulator::OutputTarget;
use rastersim::status::SchedulerEvent;
use rastersim::transport::{NoBackChannel, pipe};
use rastersim::translator::Job;
use rastersim::{DeviceSimulator, RasterTranslator, StatusChannel};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn job() -> Job {
    Job {
        id: "12".to_string(),
        user: "alice".to_string(),
        title: "proof".to_string(),
        copies: 1,
    }
}

fn target(dir: &Path) -> OutputTarget {
    OutputTarget {
        dir: dir.to_path_buf(),
        basename: "12 - proof".to_string(),
    }
}

/// A 4x3 RGB page with a different color in every pixel.
fn rgb_pixels() -> Vec<u8> {
    (0..4 * 3 * 3).map(|i| (i * 7) as u8).collect()
}

fn rgb_raster() -> Vec<u8> {
    let mut writer = RasterWriter::new(Vec::new()).unwrap();
    writer
        .write_header(&PageHeader::new(4, 3, ColorSpace::Rgb, 8, 72))
        .unwrap();
    for line in rgb_pixels().chunks(12) {
        writer.write_line(line).unwrap();
    }
    writer.into_inner()
}

fn quick() -> TranslatorOptions {
    TranslatorOptions {
        final_status_timeout: Duration::ZERO,
        ..TranslatorOptions::default()
    }
}

fn translate(raster: Vec<u8>) -> Vec<u8> {
    let mut reader = RasterReader::open(Cursor::new(raster)).unwrap();
    let mut translator: RasterTranslator<Vec<u8>, _, Vec<SchedulerEvent>> =
        RasterTranslator::new(Vec::new(), NoBackChannel, Vec::new()).with_options(quick());
    translator
        .translate(&job(), &mut reader, &mut StatusChannel::new())
        .unwrap();
    translator.into_parts().0
}

// ============================================================================
// IN-MEMORY
// ============================================================================

#[test]
fn test_round_trip_reproduces_pixels() {
    let root = tempfile::tempdir().unwrap();
    let store = MemoryLevelStore::new(InkLevels::full());
    let mut replies: Vec<DeviceStatusLine> = Vec::new();

    let commands = translate(rgb_raster());
    let report = DeviceSimulator::new(
        DeviceProfile::SAMPLE_RASTER,
        target(root.path()),
        &store,
        &mut replies,
    )
    .run(commands.as_slice())
    .unwrap();

    assert_eq!(report.documents, 1);
    assert_eq!(report.pages, 1);
    assert_eq!(report.lines, 3);
    assert_eq!(store.saves(), 1);
    // One query at line 0, one at the end of the job.
    assert_eq!(replies.len(), 2);

    let dir = root.path().join("12 - proof1");
    let manifest = DocumentManifest::load(&dir).unwrap();
    assert_eq!(manifest.author.as_deref(), Some("alice"));
    assert_eq!(manifest.pages[0].page_box, [0, 0, 4, 3]);

    let page = image::open(dir.join(&manifest.pages[0].file))
        .unwrap()
        .to_rgb8();
    assert_eq!(page.dimensions(), (4, 3));
    assert_eq!(page.into_raw(), rgb_pixels());

    let used = store.stored().unwrap();
    assert!(used.get(3) < InkLevels::full().get(3));
}

#[test]
fn test_single_page_persists_levels_once() {
    let root = tempfile::tempdir().unwrap();
    let levels_file = root.path().join("sample.cmyk");
    let mut replies: Vec<DeviceStatusLine> = Vec::new();

    let input: &[u8] = b"DOCUMENT\nPAGE 0 0 2 1\nRASTER 2 1 1\nLINE 2\n\x00\x00ENDPAGE\nENDDOCUMENT\n";
    let report = DeviceSimulator::new(
        DeviceProfile::SAMPLE_RASTER,
        target(&root.path().join("out")),
        FileLevelStore::new(&levels_file),
        &mut replies,
    )
    .run(input)
    .unwrap();

    assert_eq!(report.pages, 1);
    let documents: Vec<_> = fs::read_dir(root.path().join("out")).unwrap().collect();
    assert_eq!(documents.len(), 1);

    let stored = parse_record(&fs::read_to_string(&levels_file).unwrap()).unwrap();
    assert_eq!(stored, report.levels);
    assert!(stored.get(3) < InkLevels::full().get(3));
    assert_eq!(FileLevelStore::new(&levels_file).load(), stored);
}

#[test]
fn test_ink_carries_over_between_jobs() {
    let root = tempfile::tempdir().unwrap();
    let store = MemoryLevelStore::new(InkLevels::new([1_000_000, 1_000_000, 1_000_000, 30_000]));

    let commands = translate(rgb_raster());
    for _ in 0..2 {
        let mut replies: Vec<DeviceStatusLine> = Vec::new();
        DeviceSimulator::new(
            DeviceProfile::SAMPLE_RASTER,
            target(root.path()),
            &store,
            &mut replies,
        )
        .run(commands.as_slice())
        .unwrap();
    }

    assert_eq!(store.saves(), 2);
    let after = store.stored().unwrap();
    assert!(after.get(3) < 30_000);
}

// ============================================================================
// THREADED
// ============================================================================

#[test]
fn test_threaded_pipeline_reports_levels() {
    let root = tempfile::tempdir().unwrap();
    let levels_file = root.path().join("sample.cmyk");

    let (forward_out, forward_in) = pipe::forward();
    let (status_out, status_in) = pipe::back_channel();

    let device_target = target(root.path());
    let device_store = FileLevelStore::new(&levels_file);
    let device = thread::spawn(move || {
        DeviceSimulator::new(
            DeviceProfile::SAMPLE_RASTER,
            device_target,
            device_store,
            status_out,
        )
        .run(std::io::BufReader::new(forward_in))
    });

    let options = TranslatorOptions {
        final_status_timeout: Duration::from_secs(5),
        ..TranslatorOptions::default()
    };
    let mut reader = RasterReader::open(Cursor::new(rgb_raster())).unwrap();
    let mut status = StatusChannel::new();
    let mut translator = RasterTranslator::new(forward_out, status_in, Vec::<SchedulerEvent>::new())
        .with_options(options);
    let summary = translator
        .translate(&job(), &mut reader, &mut status)
        .unwrap();
    let (forward_out, _, events) = translator.into_parts();
    drop(forward_out);

    let report = device.join().unwrap().unwrap();
    assert_eq!(summary.pages, 1);
    assert_eq!(report.pages, 1);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::MarkerLevels(_)))
    );
    assert!(status.last_levels().is_some());
    assert!(levels_file.exists());
}

// ============================================================================
// CLI
// ============================================================================

fn rastersim() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_rastersim"));
    command.env_remove("PRINTER").env_remove("RASTERSIM_CACHE_DIR");
    command
}

#[test]
fn test_cli_discovery() {
    let output = rastersim().arg("device").output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "direct rastersim://Acme/Sample%20Raster \"Acme Sample Raster\" \
         \"Sample Raster Driver\" \"MFG:Acme;MODEL:Sample Raster;\"\n"
    );
}

#[test]
fn test_cli_usage() {
    let output = rastersim()
        .args(["translate", "1", "alice"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(
        String::from_utf8_lossy(&output.stderr)
            .contains("Usage: rastersim translate job user title copies options [filename]")
    );
}

#[test]
fn test_cli_pipeline() {
    let root = tempfile::tempdir().unwrap();
    let raster = root.path().join("job.ras");
    fs::write(&raster, rgb_raster()).unwrap();
    let cache = root.path().join("cache");

    let output = rastersim()
        .arg("pipeline")
        .arg(&raster)
        .arg("--cache-dir")
        .arg(&cache)
        .args(["--printer", "test", "--status-timeout", "1"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let manifest = DocumentManifest::load(&cache.join("test").join("1 - job.ras1")).unwrap();
    assert_eq!(manifest.pages.len(), 1);
    assert!(cache.join("test.cmyk").exists());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PAGE: 1 1"));
    assert!(stderr.contains("ATTR: marker-colors="));
}

#[test]
fn test_unknown_forward_record_skipped() {
    let root = tempfile::tempdir().unwrap();
    let store = MemoryLevelStore::new(InkLevels::full());
    let mut replies: Vec<DeviceStatusLine> = Vec::new();

    let mut commands = b"STAPLE 2\n".to_vec();
    commands.extend(CommandRecord::Levels.encode());
    let report = DeviceSimulator::new(
        DeviceProfile::SAMPLE_RASTER,
        target(root.path()),
        &store,
        &mut replies,
    )
    .run(commands.as_slice())
    .unwrap();

    assert_eq!(report.skipped_records, 1);
    assert_eq!(replies, vec![DeviceStatusLine::InkLevels([100; 4])]);
}
