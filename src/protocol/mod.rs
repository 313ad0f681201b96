//! # Device Protocol
//!
//! The two wire formats shared by the translator and the simulated device.
//!
//! ## Module Structure
//!
//! - [`command`]: forward stream records (translator → device)
//! - [`status`]: back-channel status lines (device → translator)
//!
//! ## Usage Example
//!
//! ```
//! use rastersim::protocol::command::{CommandRecord, PageBox, write_line, write_record};
//!
//! let mut data = Vec::new();
//! write_record(&mut data, &CommandRecord::Document).unwrap();
//! write_record(&mut data, &CommandRecord::Page(PageBox::new(0, 0, 72, 72))).unwrap();
//! write_record(&mut data, &CommandRecord::Raster { width: 2, height: 1, depth: 1 }).unwrap();
//! write_line(&mut data, &[0, 255]).unwrap();
//! write_record(&mut data, &CommandRecord::EndPage).unwrap();
//! write_record(&mut data, &CommandRecord::EndDocument).unwrap();
//!
//! assert!(data.starts_with(b"DOCUMENT\nPAGE 0 0 72 72\n"));
//! ```

pub mod command;
pub mod status;

pub use command::{CommandReader, CommandRecord, PageBox};
pub use status::DeviceStatusLine;
