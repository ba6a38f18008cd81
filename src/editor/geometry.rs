//! Raster and document coordinate spaces
//!
//! Two coordinate systems meet in the editor:
//! - Raster space: pixels of the rendered page preview, origin top-left, y down.
//! - Document space: PDF points (1/72 inch), origin bottom-left, y up.
//!
//! They are kept as distinct types so crossing between them always goes through
//! a [`Projector`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A point in raster (pixel) space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Clamp into `[0, width] x [0, height]`
    pub fn clamp_to(self, raster: &PageRaster) -> Self {
        Self {
            x: self.x.clamp(0.0, raster.pixel_width as f64),
            y: self.y.clamp(0.0, raster.pixel_height as f64),
        }
    }
}

/// A point in document (PDF point) space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f64,
    pub y: f64,
}

impl DocPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in document space, anchored at its bottom-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocRect {
    pub origin: DocPoint,
    pub width: f64,
    pub height: f64,
}

/// Native page of the source document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    /// Page width in points
    pub page_width: f64,
    /// Page height in points
    pub page_height: f64,
}

impl DocumentPage {
    pub fn new(page_width: f64, page_height: f64) -> Result<Self> {
        if !is_positive(page_width) || !is_positive(page_height) {
            return Err(Error::InvalidRaster {
                detail: format!("page size {}x{} must be positive", page_width, page_height),
            });
        }
        Ok(Self {
            page_width,
            page_height,
        })
    }
}

/// Pixel geometry of one rendered page at a fixed render scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRaster {
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Pixels per document point
    pub scale: f64,
}

impl PageRaster {
    /// Compute the raster a page renders to at `scale` pixels per point.
    ///
    /// Dimensions are rounded to whole pixels the same way the renderer does.
    pub fn for_page(page: &DocumentPage, scale: f64) -> Result<Self> {
        if !is_positive(scale) {
            return Err(Error::InvalidRaster {
                detail: format!("render scale {} must be positive", scale),
            });
        }
        let pixel_width = (page.page_width * scale).round();
        let pixel_height = (page.page_height * scale).round();
        if pixel_width < 1.0 || pixel_height < 1.0 || pixel_width > u32::MAX as f64 {
            return Err(Error::InvalidRaster {
                detail: format!(
                    "page {}x{} at scale {} yields a {}x{} raster",
                    page.page_width, page.page_height, scale, pixel_width, pixel_height
                ),
            });
        }
        Ok(Self {
            pixel_width: pixel_width as u32,
            pixel_height: pixel_height as u32,
            scale,
        })
    }

    /// Describe an already rendered raster of the given pixel size
    pub fn from_pixels(pixel_width: u32, pixel_height: u32, scale: f64) -> Result<Self> {
        if pixel_width == 0 || pixel_height == 0 {
            return Err(Error::InvalidRaster {
                detail: format!("raster {}x{} has no area", pixel_width, pixel_height),
            });
        }
        Ok(Self {
            pixel_width,
            pixel_height,
            scale,
        })
    }

    /// Whether a raster point lies inside the visible bounds (edges inclusive)
    pub fn contains(&self, point: PixelPoint) -> bool {
        (0.0..=self.pixel_width as f64).contains(&point.x)
            && (0.0..=self.pixel_height as f64).contains(&point.y)
    }
}

/// Bidirectional mapping between raster space and document space for one page.
///
/// The scale factors are computed once at construction and never change; a new
/// page means a new projector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projector {
    raster: PageRaster,
    page: DocumentPage,
    scale_x: f64,
    scale_y: f64,
}

impl Projector {
    pub fn new(raster: PageRaster, page: DocumentPage) -> Result<Self> {
        if raster.pixel_width == 0 || raster.pixel_height == 0 {
            return Err(Error::InvalidRaster {
                detail: "raster has zero pixel dimension".to_string(),
            });
        }
        if !is_positive(page.page_width) || !is_positive(page.page_height) {
            return Err(Error::InvalidRaster {
                detail: "page has non-positive dimension".to_string(),
            });
        }
        Ok(Self {
            raster,
            page,
            scale_x: page.page_width / raster.pixel_width as f64,
            scale_y: page.page_height / raster.pixel_height as f64,
        })
    }

    pub fn raster(&self) -> &PageRaster {
        &self.raster
    }

    pub fn page(&self) -> &DocumentPage {
        &self.page
    }

    /// Document points per raster pixel along x
    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    /// Document points per raster pixel along y
    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    /// Raster point to document point. Total: out-of-bounds input gives out-of-bounds output.
    pub fn to_document(&self, point: PixelPoint) -> DocPoint {
        DocPoint {
            x: point.x * self.scale_x,
            y: self.page.page_height - point.y * self.scale_y,
        }
    }

    /// Document point to raster point, the exact inverse of [`Projector::to_document`]
    pub fn to_raster(&self, point: DocPoint) -> PixelPoint {
        PixelPoint {
            x: point.x / self.scale_x,
            y: (self.page.page_height - point.y) / self.scale_y,
        }
    }

    /// Horizontal raster length in document points
    pub fn width_to_document(&self, pixels: f64) -> f64 {
        pixels * self.scale_x
    }

    /// Vertical raster length in document points
    pub fn height_to_document(&self, pixels: f64) -> f64 {
        pixels * self.scale_y
    }

    /// Project a raster box given by its top-left corner into a bottom-left anchored document rect
    pub fn box_to_document(&self, top_left: PixelPoint, width: f64, height: f64) -> DocRect {
        let projected = self.to_document(top_left);
        let doc_width = self.width_to_document(width);
        let doc_height = self.height_to_document(height);
        DocRect {
            origin: DocPoint::new(projected.x, projected.y - doc_height),
            width: doc_width,
            height: doc_height,
        }
    }

    /// The rect covering the whole page
    pub fn full_page(&self) -> DocRect {
        DocRect {
            origin: DocPoint::new(0.0, 0.0),
            width: self.page.page_width,
            height: self.page.page_height,
        }
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
