//! # Simulated Ink Consumption
//!
//! A real printer reports how much ink it has left. The simulated device has
//! no cartridges, so it estimates usage from the pixels it prints and applies
//! the effect of running dry back onto those pixels.
//!
//! ## Counters
//!
//! Four counters (cyan, magenta, yellow, black) start at [`MAX_LEVEL`] and
//! only go down until the ink is "changed". They never go below zero.
//!
//! ## Color Separation
//!
//! The classic RGB to CMYK formula takes K from the brightest component,
//! which makes colors look flat. Instead black depends on both the darkest
//! and the brightest component, so less colorful pixels use more black:
//!
//! ```text
//!             (255 - max)^3
//! K = 255 - ( ------------- )      when max > min, else K = max
//!             (255 - min)^2
//!
//! C = K - R        M = K - G        Y = K - B        black = 255 - K
//! ```
//!
//! Here `K` is the brightness left after black is laid down; the chromatic
//! amounts are what each channel needs on top of it.
//!
//! ## Running Dry
//!
//! | Condition | Effect on the line |
//! |-----------|--------------------|
//! | gray line, black empty | whole line printed white |
//! | color line, all four empty | whole line printed white |
//! | one chromatic ink empty | that component replaced by `K` |
//! | black empty on a color line | all components brightened by `255 - K` |

use crate::error::RasterSimError;

/// Full cartridge.
pub const MAX_LEVEL: i32 = 1_000_000;

/// Counter units per reported percentage point.
pub const LEVEL_DIVISOR: i32 = 10_000;

/// Scale applied to the per-line pixel delta before the resolution divide.
pub const USAGE_FACTOR: i64 = 50;

/// Level (in reported units) below which a channel is considered low.
pub const LOW_THRESHOLD: i32 = 5;

pub const CYAN: usize = 0;
pub const MAGENTA: usize = 1;
pub const YELLOW: usize = 2;
pub const BLACK: usize = 3;

/// Bytes per pixel of a simulated page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// One byte per pixel, black ink only
    Gray = 1,
    /// Three interleaved bytes per pixel (R, G, B)
    Rgb = 3,
}

impl Depth {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        self as usize
    }
}

impl TryFrom<u32> for Depth {
    type Error = RasterSimError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Depth::Gray),
            3 => Ok(Depth::Rgb),
            other => Err(RasterSimError::Protocol(format!(
                "unsupported raster depth {}",
                other
            ))),
        }
    }
}

/// The four consumable counters of the simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InkLevels {
    counters: [i32; 4],
}

impl Default for InkLevels {
    fn default() -> Self {
        Self::full()
    }
}

impl InkLevels {
    /// All four cartridges full.
    pub const fn full() -> Self {
        Self {
            counters: [MAX_LEVEL; 4],
        }
    }

    /// Build from raw counters, clamping each into `[0, MAX_LEVEL]`.
    pub fn new(counters: [i32; 4]) -> Self {
        Self {
            counters: counters.map(|c| c.clamp(0, MAX_LEVEL)),
        }
    }

    #[inline]
    pub fn counters(&self) -> [i32; 4] {
        self.counters
    }

    #[inline]
    pub fn get(&self, channel: usize) -> i32 {
        self.counters[channel]
    }

    /// Counters in reporting units, as sent on the back-channel.
    ///
    /// ```
    /// use rastersim::consumable::InkLevels;
    ///
    /// assert_eq!(InkLevels::full().reported(), [100, 100, 100, 100]);
    /// ```
    pub fn reported(&self) -> [i32; 4] {
        self.counters.map(|c| c / LEVEL_DIVISOR)
    }

    /// Put in fresh cartridges.
    pub fn change_ink(&mut self) {
        self.counters = [MAX_LEVEL; 4];
    }

    fn is_empty(&self, channel: usize) -> bool {
        self.counters[channel] <= 0
    }

    fn all_empty(&self) -> bool {
        self.counters.iter().all(|&c| c <= 0)
    }

    /// Account for one printed line and apply out-of-ink effects to it.
    ///
    /// `line` holds whole pixels of `depth`; a trailing partial pixel on a
    /// color line is left untouched. `resolution` is the page's dots per
    /// inch as computed by [`page_resolution`].
    pub fn consume_line(&mut self, line: &mut [u8], depth: Depth, resolution: u32) {
        let mut used = [0i64; 4];

        match depth {
            Depth::Gray => {
                if self.is_empty(BLACK) {
                    line.fill(255);
                } else {
                    used[BLACK] = line.iter().map(|&v| 255 - v as i64).sum();
                }
            }
            Depth::Rgb => {
                if self.all_empty() {
                    line.fill(255);
                } else {
                    for pixel in line.chunks_exact_mut(3) {
                        self.consume_pixel(pixel, &mut used);
                    }
                }
            }
        }

        let resolution = resolution.max(1) as i64;
        for (counter, delta) in self.counters.iter_mut().zip(used) {
            let spent = USAGE_FACTOR * delta / resolution / resolution;
            *counter = (*counter as i64 - spent).max(0) as i32;
        }
    }

    fn consume_pixel(&self, pixel: &mut [u8], used: &mut [i64; 4]) {
        let level = black_generation(pixel[0], pixel[1], pixel[2]);

        for channel in [CYAN, MAGENTA, YELLOW] {
            used[channel] += level as i64 - pixel[channel] as i64;
        }
        used[BLACK] += 255 - level as i64;

        for channel in [CYAN, MAGENTA, YELLOW] {
            if self.is_empty(channel) {
                pixel[channel] = level;
            }
        }

        if self.is_empty(BLACK) {
            let lift = 255 - level;
            for component in pixel.iter_mut() {
                *component = component.saturating_add(lift);
            }
        }
    }
}

/// Brightness left after black ink is applied to an RGB pixel.
///
/// Always at least the brightest component, so chromatic usage
/// (`level - component`) is never negative.
///
/// ```
/// use rastersim::consumable::ink::black_generation;
///
/// assert_eq!(black_generation(0, 0, 0), 0);
/// assert_eq!(black_generation(255, 0, 0), 255);
/// assert_eq!(black_generation(200, 200, 200), 200);
/// ```
pub fn black_generation(r: u8, g: u8, b: u8) -> u8 {
    let mx = r.max(g).max(b) as u32;
    let mn = r.min(g).min(b) as u32;

    if mx > mn {
        let dark = 255 - mx;
        let light = 255 - mn;
        (255 - dark * dark * dark / (light * light)) as u8
    } else {
        mx as u8
    }
}

/// Dots per inch of a page: raster pixels across the page width in points.
///
/// Computed once per page; never less than 1.
///
/// ```
/// use rastersim::consumable::page_resolution;
///
/// assert_eq!(page_resolution(2550, 612), 300);
/// assert_eq!(page_resolution(10, 100), 7);
/// ```
pub fn page_resolution(raster_width: u32, page_width_points: u32) -> u32 {
    if page_width_points == 0 {
        return 1;
    }
    let dpi = (raster_width as f64 * 72.0 / page_width_points as f64).round();
    (dpi as u32).max(1)
}

// ============================================================================
// TESTS
// ============================================================================
