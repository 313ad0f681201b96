//! # rastersim - Simulated Raster Printer Pipeline
//!
//! rastersim is a complete print path for a printer that does not exist:
//!
//! - **Translator**: CUPS raster pages to a line-oriented command stream
//! - **Device**: command stream to rendered pages, with ink that runs out
//! - **Status**: device replies to scheduler marker and state messages
//!
//! ```text
//!  raster ──► RasterTranslator ── DOCUMENT/PAGE/LINE... ──► DeviceSimulator ──► PNG pages
//!                   ▲                                            │
//!   scheduler ◄── StatusChannel ◄──────── IL/OP/LP/OK ───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use rastersim::{
//!     protocol::{CommandReader, CommandRecord},
//!     raster::{ColorSpace, PageHeader, RasterReader, RasterWriter},
//!     status::{SchedulerEvent, StatusChannel},
//!     transport::NoBackChannel,
//!     translator::{Job, RasterTranslator},
//! };
//!
//! // One 8x2 gray page
//! let mut raster = RasterWriter::new(Vec::new())?;
//! raster.write_header(&PageHeader::new(8, 2, ColorSpace::Gray, 8, 72))?;
//! raster.write_line(&[0u8; 8])?;
//! raster.write_line(&[255u8; 8])?;
//! let bytes = raster.into_inner();
//! let mut reader = RasterReader::open(bytes.as_slice())?;
//!
//! let job = Job {
//!     id: "1".into(),
//!     user: "alice".into(),
//!     title: "demo".into(),
//!     copies: 1,
//! };
//! let events: Vec<SchedulerEvent> = Vec::new();
//! let mut translator = RasterTranslator::new(Vec::<u8>::new(), NoBackChannel, events);
//! translator.translate(&job, &mut reader, &mut StatusChannel::new())?;
//!
//! let (commands, _, _) = translator.into_parts();
//! let first = CommandReader::new(commands.as_slice()).next().transpose()?;
//! assert_eq!(first, Some(CommandRecord::Document));
//! # Ok::<(), rastersim::error::RasterSimError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`raster`] | CUPS raster stream reader and writer |
//! | [`translator`] | Raster to command stream filter |
//! | [`protocol`] | Command records and device status lines |
//! | [`status`] | Back-channel tracking and scheduler messages |
//! | [`simulator`] | The simulated device |
//! | [`consumable`] | Ink accounting and persistence |
//! | [`output`] | Rendered page documents |
//! | [`maintenance`] | Command file filter |
//! | [`transport`] | Back-channel and in-process pipes |
//! | [`printer`] | Device profile and job paths |
//! | [`error`] | Error types |

pub mod cancel;
pub mod consumable;
pub mod error;
pub mod maintenance;
pub mod output;
pub mod printer;
pub mod protocol;
pub mod raster;
pub mod simulator;
pub mod status;
pub mod translator;
pub mod transport;

// Re-exports for convenience
pub use error::RasterSimError;
pub use printer::DeviceProfile;
pub use simulator::DeviceSimulator;
pub use status::StatusChannel;
pub use translator::RasterTranslator;
