//! # Raster Page Header
//!
//! Each page of a CUPS raster stream starts with a fixed 1796-byte
//! `cups_page_header2_t`. Only the fields the translator needs are decoded;
//! the rest are preserved as zeros when writing.
//!
//! ## Field Offsets
//!
//! | Offset | Field | Meaning |
//! |--------|-------|---------|
//! | 276 | HWResolution[2] | dots per inch |
//! | 312 | Margins[2] | lower-left margins in points |
//! | 340 | NumCopies | copies requested |
//! | 352 | PageSize[2] | page size in points |
//! | 372 | cupsWidth | pixels per line |
//! | 376 | cupsHeight | lines per page |
//! | 384 | cupsBitsPerColor | 1, 2, 4, 8 or 16 |
//! | 388 | cupsBitsPerPixel | bits per pixel |
//! | 392 | cupsBytesPerLine | bytes per scanline |
//! | 396 | cupsColorOrder | chunked / banded / planar |
//! | 400 | cupsColorSpace | W, RGB, K, CMYK, ... |
//! | 420 | cupsNumColors | colors per pixel (v2+) |

use crate::error::{RasterSimError, Result};

/// Size of one page header on the wire.
pub const HEADER_SIZE: usize = 1796;

const OFF_HW_RESOLUTION: usize = 276;
const OFF_MARGINS: usize = 312;
const OFF_NUM_COPIES: usize = 340;
const OFF_PAGE_SIZE: usize = 352;
const OFF_WIDTH: usize = 372;
const OFF_HEIGHT: usize = 376;
const OFF_BITS_PER_COLOR: usize = 384;
const OFF_BITS_PER_PIXEL: usize = 388;
const OFF_BYTES_PER_LINE: usize = 392;
const OFF_COLOR_ORDER: usize = 396;
const OFF_COLOR_SPACE: usize = 400;
const OFF_NUM_COLORS: usize = 420;

/// How color components are laid out in a scanline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorOrder {
    /// Components interleaved per pixel (RGBRGB...)
    Chunked,
    /// One band of each component per line
    Banded,
    /// One plane of each component per page
    Planar,
    Other(u32),
}

impl ColorOrder {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ColorOrder::Chunked,
            1 => ColorOrder::Banded,
            2 => ColorOrder::Planar,
            other => ColorOrder::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            ColorOrder::Chunked => 0,
            ColorOrder::Banded => 1,
            ColorOrder::Planar => 2,
            ColorOrder::Other(raw) => raw,
        }
    }
}

/// Color space of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Luminance, 0 = black (`CUPS_CSPACE_W`)
    Gray,
    /// Red, green, blue (`CUPS_CSPACE_RGB`)
    Rgb,
    /// Black ink, 0 = white (`CUPS_CSPACE_K`)
    Black,
    /// Cyan, magenta, yellow, black (`CUPS_CSPACE_CMYK`)
    Cmyk,
    Other(u32),
}

impl ColorSpace {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ColorSpace::Gray,
            1 => ColorSpace::Rgb,
            3 => ColorSpace::Black,
            6 => ColorSpace::Cmyk,
            other => ColorSpace::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            ColorSpace::Gray => 0,
            ColorSpace::Rgb => 1,
            ColorSpace::Black => 3,
            ColorSpace::Cmyk => 6,
            ColorSpace::Other(raw) => raw,
        }
    }

    /// Components per pixel for spaces with a fixed count.
    pub fn components(self) -> Option<u32> {
        match self {
            ColorSpace::Gray | ColorSpace::Black => Some(1),
            ColorSpace::Rgb => Some(3),
            ColorSpace::Cmyk => Some(4),
            ColorSpace::Other(_) => None,
        }
    }

    /// Whether all-zero bits mean "no ink" in this space.
    pub fn zero_is_white(self) -> bool {
        matches!(self, ColorSpace::Black | ColorSpace::Cmyk)
    }
}

/// The page header fields the driver uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub hw_resolution: [u32; 2],
    pub margins: [u32; 2],
    pub num_copies: u32,
    pub page_size: [u32; 2],
    pub width: u32,
    pub height: u32,
    pub bits_per_color: u32,
    pub bits_per_pixel: u32,
    pub bytes_per_line: u32,
    pub color_order: ColorOrder,
    pub color_space: ColorSpace,
    pub num_colors: u32,
}

impl PageHeader {
    /// Chunked page of `width` x `height` pixels at `dpi`, page size derived
    /// from the pixel size.
    ///
    /// ```
    /// use rastersim::raster::{ColorSpace, PageHeader};
    ///
    /// let header = PageHeader::new(300, 150, ColorSpace::Rgb, 16, 150);
    /// assert_eq!(header.bytes_per_line, 300 * 3 * 2);
    /// assert_eq!(header.page_size, [144, 72]);
    /// ```
    pub fn new(width: u32, height: u32, color_space: ColorSpace, bits_per_color: u32, dpi: u32) -> Self {
        let num_colors = color_space.components().unwrap_or(1);
        let bits_per_pixel = bits_per_color * num_colors;
        let dpi = dpi.max(1);
        Self {
            hw_resolution: [dpi, dpi],
            margins: [0, 0],
            num_copies: 1,
            page_size: [width * 72 / dpi, height * 72 / dpi],
            width,
            height,
            bits_per_color,
            bits_per_pixel,
            bytes_per_line: (width * bits_per_pixel).div_ceil(8),
            color_order: ColorOrder::Chunked,
            color_space,
            num_colors,
        }
    }

    /// Bytes occupied by one pixel (at least one).
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel as usize).div_ceil(8).max(1)
    }

    /// Decode a header. `big_endian` is the byte order of the stream.
    pub fn decode(bytes: &[u8], big_endian: bool) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RasterSimError::Raster(format!(
                "page header is {} bytes, expected {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let field = |offset: usize| -> u32 {
            let raw: [u8; 4] = [
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ];
            if big_endian {
                u32::from_be_bytes(raw)
            } else {
                u32::from_le_bytes(raw)
            }
        };

        let color_space = ColorSpace::from_raw(field(OFF_COLOR_SPACE));
        let mut num_colors = field(OFF_NUM_COLORS);
        if num_colors == 0 {
            // Version 1 streams leave cupsNumColors unset.
            num_colors = color_space.components().unwrap_or(1);
        }

        Ok(Self {
            hw_resolution: [field(OFF_HW_RESOLUTION), field(OFF_HW_RESOLUTION + 4)],
            margins: [field(OFF_MARGINS), field(OFF_MARGINS + 4)],
            num_copies: field(OFF_NUM_COPIES),
            page_size: [field(OFF_PAGE_SIZE), field(OFF_PAGE_SIZE + 4)],
            width: field(OFF_WIDTH),
            height: field(OFF_HEIGHT),
            bits_per_color: field(OFF_BITS_PER_COLOR),
            bits_per_pixel: field(OFF_BITS_PER_PIXEL),
            bytes_per_line: field(OFF_BYTES_PER_LINE),
            color_order: ColorOrder::from_raw(field(OFF_COLOR_ORDER)),
            color_space,
            num_colors,
        })
    }

    /// Encode a header in the given byte order.
    pub fn encode(&self, big_endian: bool) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        let mut put = |offset: usize, value: u32| {
            let raw = if big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            bytes[offset..offset + 4].copy_from_slice(&raw);
        };

        put(OFF_HW_RESOLUTION, self.hw_resolution[0]);
        put(OFF_HW_RESOLUTION + 4, self.hw_resolution[1]);
        put(OFF_MARGINS, self.margins[0]);
        put(OFF_MARGINS + 4, self.margins[1]);
        put(OFF_NUM_COPIES, self.num_copies);
        put(OFF_PAGE_SIZE, self.page_size[0]);
        put(OFF_PAGE_SIZE + 4, self.page_size[1]);
        put(OFF_WIDTH, self.width);
        put(OFF_HEIGHT, self.height);
        put(OFF_BITS_PER_COLOR, self.bits_per_color);
        put(OFF_BITS_PER_PIXEL, self.bits_per_pixel);
        put(OFF_BYTES_PER_LINE, self.bytes_per_line);
        put(OFF_COLOR_ORDER, self.color_order.raw());
        put(OFF_COLOR_SPACE, self.color_space.raw());
        put(OFF_NUM_COLORS, self.num_colors);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_header_byte_orders() {
        let mut header = PageHeader::new(850, 1100, ColorSpace::Gray, 8, 100);
        header.margins = [18, 36];
        header.num_copies = 2;

        for big_endian in [false, true] {
            let bytes = header.encode(big_endian);
            assert_eq!(bytes.len(), HEADER_SIZE);
            assert_eq!(PageHeader::decode(&bytes, big_endian).unwrap(), header);
        }

        let le = header.encode(false);
        assert_eq!(&le[OFF_WIDTH..OFF_WIDTH + 4], &850u32.to_le_bytes());
        let be = header.encode(true);
        assert_eq!(&be[OFF_WIDTH..OFF_WIDTH + 4], &850u32.to_be_bytes());
    }

    #[test]
    fn test_v1_num_colors_fallback() {
        let mut header = PageHeader::new(10, 10, ColorSpace::Rgb, 8, 72);
        header.num_colors = 0;
        let decoded = PageHeader::decode(&header.encode(false), false).unwrap();
        assert_eq!(decoded.num_colors, 3);
    }

    #[test]
    fn test_short_header_rejected() {
        assert!(PageHeader::decode(&[0u8; 100], false).is_err());
    }

    #[test]
    fn test_raw_codes() {
        assert_eq!(ColorSpace::from_raw(1), ColorSpace::Rgb);
        assert_eq!(ColorSpace::from_raw(19), ColorSpace::Other(19));
        assert_eq!(ColorOrder::from_raw(2), ColorOrder::Planar);
        assert_eq!(ColorOrder::Other(9).raw(), 9);
    }
}
