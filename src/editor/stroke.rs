//! Freehand stroke layer
//!
//! A single RGBA buffer the size of the page raster. Ink is painted source-over;
//! erasing paints with `DestinationOut`, which removes existing coverage instead of
//! covering it, so erased areas become fully transparent. Individual strokes are not
//! kept, only whole-layer snapshots for undo.

use super::annotation::Color;
use super::geometry::{PageRaster, PixelPoint};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tiny_skia::{BlendMode, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

/// How a stroke composites onto the layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StrokeMode {
    Draw,
    Erase,
}

#[derive(Debug, Clone, Copy)]
struct ActiveStroke {
    mode: StrokeMode,
    color: Color,
    width: f32,
    last: PixelPoint,
}

/// Persistent raster buffer accumulating ink and erasure for one page
pub struct StrokeLayer {
    pixmap: Pixmap,
    active: Option<ActiveStroke>,
    snapshots: Vec<Pixmap>,
    undo_depth: usize,
    undo_max_bytes: usize,
}

impl StrokeLayer {
    /// Allocate a transparent layer matching `raster`
    pub fn new(raster: &PageRaster, undo_depth: usize) -> Result<Self> {
        let pixmap = Pixmap::new(raster.pixel_width, raster.pixel_height).ok_or_else(|| {
            Error::StrokeLayer {
                reason: format!(
                    "cannot allocate {}x{} layer",
                    raster.pixel_width, raster.pixel_height
                ),
            }
        })?;
        Ok(Self {
            pixmap,
            active: None,
            snapshots: Vec::new(),
            undo_depth,
            undo_max_bytes: usize::MAX,
        })
    }

    /// Cap the memory held by undo snapshots; fewer than `undo_depth` are kept
    /// when the layer is large.
    pub fn with_undo_budget(mut self, max_bytes: usize) -> Self {
        self.undo_max_bytes = max_bytes;
        self.snapshots.truncate(self.undo_capacity());
        self
    }

    /// Snapshots that fit in both the depth and the byte budget
    pub fn undo_capacity(&self) -> usize {
        let layer_bytes = self.pixmap.data().len().max(1);
        self.undo_depth.min(self.undo_max_bytes / layer_bytes)
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Whether the layer has the pixel size of `raster`
    pub fn matches(&self, raster: &PageRaster) -> bool {
        self.width() == raster.pixel_width && self.height() == raster.pixel_height
    }

    /// Start a new path at `point`. An unfinished stroke is ended first.
    pub fn begin_stroke(&mut self, point: PixelPoint, mode: StrokeMode, color: Color, width: f32) {
        self.end_stroke();
        self.push_snapshot();
        let width = if width.is_finite() && width > 0.0 {
            width
        } else {
            1.0
        };
        self.active = Some(ActiveStroke {
            mode,
            color,
            width,
            last: point,
        });
    }

    /// Extend the current path with a segment to `point`.
    ///
    /// Returns false when no stroke is in progress.
    pub fn continue_stroke(&mut self, point: PixelPoint) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };

        let mut pb = PathBuilder::new();
        pb.move_to(active.last.x as f32, active.last.y as f32);
        pb.line_to(point.x as f32, point.y as f32);
        active.last = point;

        let Some(path) = pb.finish() else {
            return true;
        };

        let mut paint = Paint::default();
        paint.anti_alias = true;
        match active.mode {
            StrokeMode::Draw => {
                let c = active.color;
                paint.set_color_rgba8(c.r, c.g, c.b, c.a);
            }
            StrokeMode::Erase => {
                paint.set_color_rgba8(0, 0, 0, 255);
                paint.blend_mode = BlendMode::DestinationOut;
            }
        }

        let stroke = Stroke {
            width: active.width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Default::default()
        };
        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        true
    }

    /// Finish the current path; further points need a new `begin_stroke`
    pub fn end_stroke(&mut self) {
        self.active = None;
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    /// Clear the whole layer. Undoable.
    pub fn reset(&mut self) {
        self.end_stroke();
        self.push_snapshot();
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    /// Restore the layer as it was before the most recent stroke or reset
    pub fn undo(&mut self) -> bool {
        self.end_stroke();
        match self.snapshots.pop() {
            Some(previous) => {
                self.pixmap = previous;
                true
            }
            None => false,
        }
    }

    pub fn undo_available(&self) -> usize {
        self.snapshots.len()
    }

    /// True when no pixel carries any coverage
    pub fn is_blank(&self) -> bool {
        self.pixmap.pixels().iter().all(|p| p.alpha() == 0)
    }

    /// Alpha of the pixel at (x, y), `None` outside the layer
    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        self.pixmap.pixel(x, y).map(|p| p.alpha())
    }

    /// Encode the layer as PNG with its transparency intact
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap.encode_png().map_err(|e| Error::StrokeLayer {
            reason: format!("PNG encoding failed: {}", e),
        })
    }

    fn push_snapshot(&mut self) {
        let capacity = self.undo_capacity();
        if capacity == 0 {
            return;
        }
        while self.snapshots.len() >= capacity {
            self.snapshots.remove(0);
        }
        self.snapshots.push(self.pixmap.clone());
    }
}
