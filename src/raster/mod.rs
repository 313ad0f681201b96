//! # CUPS Raster Input
//!
//! Page headers and scanlines as produced by the CUPS raster filters.
//!
//! - [`header`]: `cups_page_header2_t` fields, color spaces and orders
//! - [`stream`]: stream reader (versions 1-3, both byte orders) and a
//!   version 3 writer

pub mod header;
pub mod stream;

pub use header::{ColorOrder, ColorSpace, PageHeader};
pub use stream::{RasterReader, RasterWriter};
