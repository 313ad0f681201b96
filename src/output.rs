//! # Rendered Output Documents
//!
//! Every `DOCUMENT` the simulated device receives becomes a directory of
//! page images plus a manifest:
//!
//! ```text
//! <output_dir>/42 - Quarterly Report1/
//! ├── page-0001.png
//! ├── page-0002.png
//! └── document.json
//! ```
//!
//! A page with a raster is stored at raster resolution (grayscale or RGB).
//! A page that never received a raster is stored as a blank page the size
//! of its region, one pixel per point.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consumable::Depth;
use crate::error::{RasterSimError, Result};
use crate::protocol::PageBox;

/// File name of the per-document manifest.
pub const MANIFEST_NAME: &str = "document.json";

/// Raster geometry recorded for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterInfo {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// One finalized page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    pub number: u32,
    /// `[x, y, width, height]` in points
    pub page_box: [u32; 4],
    pub raster: Option<RasterInfo>,
    pub file: String,
}

/// Contents of `document.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentManifest {
    pub number: u32,
    pub author: Option<String>,
    pub title: Option<String>,
    pub created: DateTime<Utc>,
    pub pages: Vec<PageEntry>,
}

impl DocumentManifest {
    /// Read the manifest of a closed document directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let text = fs::read_to_string(dir.join(MANIFEST_NAME))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Pixels of one page, as composited by [`OutputDocument::finish_page`].
pub struct PageImage<'a> {
    pub width: u32,
    pub height: u32,
    pub depth: Depth,
    pub data: &'a [u8],
}

/// An open output document.
pub struct OutputDocument {
    dir: PathBuf,
    manifest: DocumentManifest,
}

impl OutputDocument {
    /// Create `<output_dir>/<basename><number>/`.
    pub fn create(output_dir: &Path, basename: &str, number: u32) -> Result<Self> {
        let dir = output_dir.join(format!("{}{}", basename, number));
        fs::create_dir_all(&dir).map_err(|e| {
            RasterSimError::Resource(format!("Unable to create {}: {}", dir.display(), e))
        })?;
        debug!("Writing \"{}\"...", dir.display());

        Ok(Self {
            dir,
            manifest: DocumentManifest {
                number,
                author: None,
                title: None,
                created: Utc::now(),
                pages: Vec::new(),
            },
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_count(&self) -> usize {
        self.manifest.pages.len()
    }

    pub fn set_author(&mut self, author: &str) {
        self.manifest.author = Some(author.to_string());
    }

    pub fn set_title(&mut self, title: &str) {
        self.manifest.title = Some(title.to_string());
    }

    /// Composite `image` into `page_box` and finalize the page.
    ///
    /// Without an image the page is finalized blank.
    pub fn finish_page(&mut self, page_box: PageBox, image: Option<PageImage<'_>>) -> Result<()> {
        let number = self.manifest.pages.len() as u32 + 1;
        let file = format!("page-{:04}.png", number);
        let path = self.dir.join(&file);

        let raster = match image {
            Some(image) => {
                save_image(&path, &image)?;
                debug!("Drawing image on page...");
                Some(RasterInfo {
                    width: image.width,
                    height: image.height,
                    depth: image.depth as u32,
                })
            }
            None => {
                let blank = GrayImage::from_pixel(
                    page_box.width.max(1),
                    page_box.height.max(1),
                    image::Luma([255]),
                );
                blank.save(&path)?;
                None
            }
        };
        debug!("Ending page...");

        self.manifest.pages.push(PageEntry {
            number,
            page_box: [page_box.x, page_box.y, page_box.width, page_box.height],
            raster,
            file,
        });
        Ok(())
    }

    /// Write the manifest and return the document directory.
    pub fn close(self) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(self.dir.join(MANIFEST_NAME), json)?;
        debug!(
            "Closed {} with {} page(s)",
            self.dir.display(),
            self.manifest.pages.len()
        );
        Ok(self.dir)
    }
}

fn save_image(path: &Path, image: &PageImage<'_>) -> Result<()> {
    let malformed = || {
        RasterSimError::Image(format!(
            "{}x{}x{} page does not match {} bytes",
            image.width,
            image.height,
            image.depth as u32,
            image.data.len()
        ))
    };

    match image.depth {
        Depth::Gray => GrayImage::from_raw(image.width, image.height, image.data.to_vec())
            .ok_or_else(malformed)?
            .save(path)?,
        Depth::Rgb => RgbImage::from_raw(image.width, image.height, image.data.to_vec())
            .ok_or_else(malformed)?
            .save(path)?,
    }
    Ok(())
}
