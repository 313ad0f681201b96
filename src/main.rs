//! # rastersim CLI
//!
//! The three CUPS stages of the simulated printer, plus an in-process
//! pipeline for trying them without a scheduler.
//!
//! ## Usage
//!
//! ```bash
//! # Raster filter: raster on stdin (or file), commands on stdout
//! rastersim translate 42 alice report.pdf 1 "" job.ras > job.cmd
//!
//! # Device backend: commands on stdin (or file), pages under the cache dir
//! rastersim device 42 alice report.pdf 1 "" job.cmd
//!
//! # Discovery
//! rastersim device
//!
//! # Maintenance command file
//! rastersim command 43 alice maintenance 1 "" commands.txt
//!
//! # Both stages at once
//! rastersim pipeline job.ras --cache-dir /tmp/rastersim
//! ```
//!
//! Scheduler messages (`ATTR:`, `STATE:`, `PAGE:`, `INFO:`) and logs go to
//! stderr. Set `RASTERSIM_LOG=debug` for more detail.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use rastersim::{
    DeviceProfile, DeviceSimulator, RasterSimError, RasterTranslator, StatusChannel,
    cancel::{CancelToken, cancel_on_sigterm},
    consumable::FileLevelStore,
    error::Result,
    maintenance,
    printer::{JobPaths, TranslatorOptions, document_basename},
    raster::RasterReader,
    simulator::OutputTarget,
    status::StderrScheduler,
    translator::Job,
    transport::{FdBackChannel, pipe},
};

/// Exit status CUPS treats as "stop the queue".
const BACKEND_STOP: i32 = 4;

/// rastersim - simulated raster printer
#[derive(Parser, Debug)]
#[command(name = "rastersim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding ink levels and rendered documents
    #[arg(
        long,
        global = true,
        env = "RASTERSIM_CACHE_DIR",
        default_value = "/var/cache/rastersim"
    )]
    cache_dir: PathBuf,

    /// Printer queue name
    #[arg(long, global = true, env = "PRINTER", default_value = "rastersim")]
    printer: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert CUPS raster to device commands
    Translate {
        /// Seconds to wait for the final status reply
        #[arg(long, default_value = "5")]
        status_timeout: u64,

        /// job user title copies options [filename]
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Send a maintenance command file to the device
    Command {
        /// Seconds to wait for each status reply
        #[arg(long, default_value = "5")]
        status_timeout: u64,

        /// job user title copies options [filename]
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the simulated device (no arguments: print the discovery line)
    Device {
        /// job user title copies options [filename]
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Translate a raster file and print it on the device in one process
    Pipeline {
        /// CUPS raster file
        raster: PathBuf,

        /// Job number used for the output directory
        #[arg(long, default_value = "1")]
        job: String,

        /// Requesting user
        #[arg(long, default_value = "rastersim")]
        user: String,

        /// Job title (defaults to the raster file name)
        #[arg(long)]
        title: Option<String>,

        /// Seconds to wait for the final status reply
        #[arg(long, default_value = "5")]
        status_timeout: u64,
    },
}

impl Commands {
    fn failure_code(&self) -> i32 {
        match self {
            Commands::Device { .. } => BACKEND_STOP,
            _ => 1,
        }
    }
}

/// Positional arguments every CUPS filter and backend receives.
struct JobArgs {
    job: Job,
    file: Option<PathBuf>,
}

impl JobArgs {
    fn parse(stage: &str, args: &[String]) -> Result<Self> {
        if !(5..=6).contains(&args.len()) {
            return Err(RasterSimError::Usage(format!(
                "Usage: rastersim {} job user title copies options [filename]",
                stage
            )));
        }
        Ok(Self {
            job: Job {
                id: args[0].clone(),
                user: args[1].clone(),
                title: args[2].clone(),
                copies: args[3].trim().parse().unwrap_or(1),
            },
            file: args.get(5).map(PathBuf::from),
        })
    }

    fn open(&self) -> Result<Box<dyn BufRead>> {
        match &self.file {
            Some(path) => Ok(Box::new(BufReader::new(open_file(path)?))),
            None => Ok(Box::new(io::stdin().lock())),
        }
    }
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        RasterSimError::Resource(format!("Unable to open \"{}\": {}", path.display(), e))
    })
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let failure_code = cli.command.failure_code();

    if let Err(e) = run(cli) {
        match e {
            RasterSimError::Usage(usage) => eprintln!("{}", usage),
            other => eprintln!("ERROR: {}", other),
        }
        std::process::exit(failure_code);
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_env("RASTERSIM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the command stream, so logs stay on stderr.
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let paths = JobPaths::new(cli.cache_dir, cli.printer);

    match cli.command {
        Commands::Translate {
            status_timeout,
            args,
        } => run_translate(&JobArgs::parse("translate", &args)?, status_timeout),
        Commands::Command {
            status_timeout,
            args,
        } => run_command(&JobArgs::parse("command", &args)?, status_timeout),
        Commands::Device { args } => {
            if args.is_empty() {
                println!("{}", DeviceProfile::SAMPLE_RASTER.discovery_line());
                return Ok(());
            }
            run_device(&paths, &JobArgs::parse("device", &args)?)
        }
        Commands::Pipeline {
            raster,
            job,
            user,
            title,
            status_timeout,
        } => {
            let title = title.unwrap_or_else(|| {
                raster
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "raster".to_string())
            });
            let job = Job {
                id: job,
                user,
                title,
                copies: 1,
            };
            run_pipeline(&paths, &raster, job, status_timeout)
        }
    }
}

fn translator_options(status_timeout: u64) -> TranslatorOptions {
    TranslatorOptions {
        final_status_timeout: Duration::from_secs(status_timeout),
        ..TranslatorOptions::default()
    }
}

fn output_target(paths: &JobPaths, job: &Job) -> OutputTarget {
    OutputTarget {
        dir: paths.output_dir(),
        basename: document_basename(&job.id, &job.title),
    }
}

fn run_translate(args: &JobArgs, status_timeout: u64) -> Result<()> {
    let input: Box<dyn Read> = match &args.file {
        Some(path) => Box::new(open_file(path)?),
        None => Box::new(io::stdin().lock()),
    };
    let mut raster = RasterReader::open(input)?;

    let cancel = CancelToken::new();
    cancel_on_sigterm(&cancel);

    let out = BufWriter::new(io::stdout().lock());
    let mut translator = RasterTranslator::new(out, FdBackChannel::cups(), StderrScheduler)
        .with_options(translator_options(status_timeout))
        .with_cancel_token(cancel);

    let summary = translator.translate(&args.job, &mut raster, &mut StatusChannel::new())?;
    info!(
        "Sent {} page(s), {} line(s){}",
        summary.pages,
        summary.lines,
        if summary.cancelled { " (canceled)" } else { "" }
    );
    Ok(())
}

fn run_command(args: &JobArgs, status_timeout: u64) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    let report = maintenance::run_commands(
        args.open()?,
        &mut out,
        &mut FdBackChannel::cups(),
        &mut StderrScheduler,
        &mut StatusChannel::new(),
        Duration::from_secs(status_timeout),
    )?;
    info!("Ran {} command(s)", report.executed);
    Ok(())
}

fn run_device(paths: &JobPaths, args: &JobArgs) -> Result<()> {
    let device = DeviceSimulator::new(
        DeviceProfile::SAMPLE_RASTER,
        output_target(paths, &args.job),
        FileLevelStore::new(paths.levels_file()),
        FdBackChannel::cups(),
    );
    let report = device.run(args.open()?)?;
    info!(
        "Printed {} page(s) in {} document(s), ink {:?}",
        report.pages,
        report.documents,
        report.levels.reported()
    );
    Ok(())
}

fn run_pipeline(paths: &JobPaths, raster_path: &Path, job: Job, status_timeout: u64) -> Result<()> {
    let mut raster = RasterReader::open(BufReader::new(open_file(raster_path)?))?;

    let (forward_out, forward_in) = pipe::forward();
    let (status_out, status_in) = pipe::back_channel();

    let target = output_target(paths, &job);
    let store = FileLevelStore::new(paths.levels_file());
    let device = thread::Builder::new()
        .name("device".to_string())
        .spawn(move || {
            DeviceSimulator::new(DeviceProfile::SAMPLE_RASTER, target, store, status_out)
                .run(BufReader::new(forward_in))
        })?;

    let cancel = CancelToken::new();
    cancel_on_sigterm(&cancel);

    let mut translator = RasterTranslator::new(forward_out, status_in, StderrScheduler)
        .with_options(translator_options(status_timeout))
        .with_cancel_token(cancel);
    let translated = translator.translate(&job, &mut raster, &mut StatusChannel::new());
    // Closing the forward stream ends the device's input.
    drop(translator);

    let report = device
        .join()
        .map_err(|_| RasterSimError::Resource("device thread panicked".to_string()))??;
    let summary = translated?;

    info!(
        "Printed {} of {} page(s) to {}, ink {:?}",
        report.pages,
        summary.pages,
        paths.output_dir().display(),
        report.levels.reported()
    );
    Ok(())
}
