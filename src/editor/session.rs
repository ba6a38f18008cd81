//! Editing session for a single page
//!
//! Owns the projector, stroke layer and annotation store of the page being
//! edited. Loading another page discards all three and allocates them again
//! together, so the stroke layer always matches the current raster.

use super::annotation::{
    Annotation, AnnotationBody, AnnotationId, AnnotationPatch, AnnotationStore, Color,
};
use super::burn_in::{burn_in, BurnInOptions, BurnInResult, PageCanvas};
use super::geometry::{DocumentPage, PageRaster, PixelPoint, Projector};
use super::stroke::{StrokeLayer, StrokeMode};
use crate::error::{Error, Result};

/// Tunables for an editing session
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    /// Pixels per point used when rasterizing a page for editing
    pub default_render_scale: f64,
    /// Ink width in raster pixels
    pub pen_width: f32,
    /// Eraser width in raster pixels
    pub eraser_width: f32,
    /// Font size of new text annotations, in raster pixels
    pub default_font_size: f64,
    /// Box size of new image annotations, in raster pixels
    pub default_image_size: (f64, f64),
    pub burn_in: BurnInOptions,
    /// Whole-layer snapshots kept for stroke undo
    pub undo_depth: usize,
    /// Upper bound on the bytes held by those snapshots
    pub undo_max_bytes: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_render_scale: 1.5,
            pen_width: 3.0,
            eraser_width: 20.0,
            default_font_size: 16.0,
            default_image_size: (200.0, 200.0),
            burn_in: BurnInOptions::default(),
            undo_depth: 20,
            undo_max_bytes: 64 * 1024 * 1024,
        }
    }
}

struct LoadedPage {
    projector: Projector,
    strokes: StrokeLayer,
    annotations: AnnotationStore,
}

/// Transient editing state for one page at a time
pub struct EditorSession {
    config: EditorConfig,
    page: Option<LoadedPage>,
}

impl EditorSession {
    pub fn new(config: EditorConfig) -> Self {
        Self { config, page: None }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Start editing `page` rasterized at `scale` pixels per point.
    ///
    /// Any previous page's strokes and annotations are discarded.
    pub fn load_page(&mut self, page: DocumentPage, scale: f64) -> Result<(PageRaster, Projector)> {
        let raster = PageRaster::for_page(&page, scale)?;
        self.load_raster(page, raster)
    }

    /// Start editing `page` against a raster that was already rendered at a known size
    pub fn load_raster(
        &mut self,
        page: DocumentPage,
        raster: PageRaster,
    ) -> Result<(PageRaster, Projector)> {
        let projector = Projector::new(raster, page)?;
        let strokes = StrokeLayer::new(&raster, self.config.undo_depth)?
            .with_undo_budget(self.config.undo_max_bytes);
        tracing::debug!(
            width = raster.pixel_width,
            height = raster.pixel_height,
            scale = raster.scale,
            "Loaded page into editor"
        );
        self.page = Some(LoadedPage {
            projector,
            strokes,
            annotations: AnnotationStore::new(),
        });
        Ok((raster, projector))
    }

    pub fn is_loaded(&self) -> bool {
        self.page.is_some()
    }

    /// End the session, dropping all transient state
    pub fn close(&mut self) {
        self.page = None;
    }

    pub fn projector(&self) -> Result<&Projector> {
        Ok(&self.loaded()?.projector)
    }

    pub fn strokes(&self) -> Result<&StrokeLayer> {
        Ok(&self.loaded()?.strokes)
    }

    // Stroke layer

    /// Begin a stroke using the configured pen or eraser width
    pub fn begin_stroke(
        &mut self,
        point: PixelPoint,
        mode: StrokeMode,
        color: Color,
    ) -> Result<()> {
        let width = match mode {
            StrokeMode::Draw => self.config.pen_width,
            StrokeMode::Erase => self.config.eraser_width,
        };
        self.begin_stroke_with_width(point, mode, color, width)
    }

    pub fn begin_stroke_with_width(
        &mut self,
        point: PixelPoint,
        mode: StrokeMode,
        color: Color,
        width: f32,
    ) -> Result<()> {
        self.loaded_mut()?
            .strokes
            .begin_stroke(point, mode, color, width);
        Ok(())
    }

    pub fn continue_stroke(&mut self, point: PixelPoint) -> Result<bool> {
        Ok(self.loaded_mut()?.strokes.continue_stroke(point))
    }

    pub fn end_stroke(&mut self) -> Result<()> {
        self.loaded_mut()?.strokes.end_stroke();
        Ok(())
    }

    pub fn reset_stroke_layer(&mut self) -> Result<()> {
        self.loaded_mut()?.strokes.reset();
        Ok(())
    }

    pub fn undo_stroke(&mut self) -> Result<bool> {
        Ok(self.loaded_mut()?.strokes.undo())
    }

    // Annotation store

    /// Add an annotation. A creation point outside the raster is pulled back inside it.
    pub fn add(&mut self, origin: PixelPoint, body: AnnotationBody) -> Result<AnnotationId> {
        let page = self.loaded_mut()?;
        let origin = origin.clamp_to(page.projector.raster());
        Ok(page.annotations.add(origin, body))
    }

    /// Merge `patch` into an annotation; unknown ids are ignored
    pub fn update(&mut self, id: AnnotationId, patch: AnnotationPatch) -> Result<bool> {
        Ok(self.loaded_mut()?.annotations.update(id, patch))
    }

    pub fn remove(&mut self, id: AnnotationId) -> Result<Option<Annotation>> {
        Ok(self.loaded_mut()?.annotations.remove(id))
    }

    pub fn list(&self) -> Result<&[Annotation]> {
        Ok(self.loaded()?.annotations.list())
    }

    // Save path

    /// Commit strokes and annotations onto `canvas`, the page being saved
    pub fn burn_in(&self, canvas: &mut dyn PageCanvas) -> Result<BurnInResult> {
        let page = self.loaded()?;
        burn_in(
            canvas,
            &page.projector,
            &page.strokes,
            page.annotations.list(),
            &self.config.burn_in,
        )
    }

    fn loaded(&self) -> Result<&LoadedPage> {
        self.page.as_ref().ok_or(Error::NoPageLoaded)
    }

    fn loaded_mut(&mut self) -> Result<&mut LoadedPage> {
        self.page.as_mut().ok_or(Error::NoPageLoaded)
    }
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::burn_in::testing::RecordingCanvas;

    fn a4() -> DocumentPage {
        DocumentPage::new(595.0, 842.0).unwrap()
    }

    #[test]
    fn test_burn_in_before_load_fails() {
        let session = EditorSession::default();
        let mut canvas = RecordingCanvas::default();
        assert!(matches!(session.burn_in(&mut canvas), Err(Error::NoPageLoaded)));
    }

    #[test]
    fn test_operations_before_load_fail() {
        let mut session = EditorSession::default();
        assert!(matches!(
            session.begin_stroke(PixelPoint::default(), StrokeMode::Draw, Color::BLACK),
            Err(Error::NoPageLoaded)
        ));
        assert!(matches!(session.list(), Err(Error::NoPageLoaded)));
    }

    #[test]
    fn test_load_page_allocates_matching_layer() {
        let mut session = EditorSession::default();
        let (raster, projector) = session.load_page(a4(), 1.5).unwrap();
        assert_eq!(projector.raster(), &raster);
        assert!(session.strokes().unwrap().matches(&raster));
    }

    #[test]
    fn test_undo_snapshots_fit_byte_budget() {
        let mut session = EditorSession::default();
        // 1190x1684 RGBA is about 8 MB, so 64 MB holds eight snapshots
        let (raster, _) = session.load_page(a4(), 2.0).unwrap();
        assert_eq!((raster.pixel_width, raster.pixel_height), (1190, 1684));
        assert_eq!(session.strokes().unwrap().undo_capacity(), 8);

        for i in 0..12 {
            let y = 100.0 + i as f64 * 10.0;
            session
                .begin_stroke(PixelPoint::new(10.0, y), StrokeMode::Draw, Color::BLACK)
                .unwrap();
            session.continue_stroke(PixelPoint::new(200.0, y)).unwrap();
            session.end_stroke().unwrap();
        }
        assert_eq!(session.strokes().unwrap().undo_available(), 8);
    }

    #[test]
    fn test_loading_new_page_discards_state() {
        let mut session = EditorSession::default();
        session.load_page(a4(), 1.5).unwrap();
        session
            .add(
                PixelPoint::new(50.0, 50.0),
                AnnotationBody::Text {
                    content: "x".to_string(),
                    font_size: 16.0,
                    color: Color::BLACK,
                },
            )
            .unwrap();
        session
            .begin_stroke(PixelPoint::new(10.0, 10.0), StrokeMode::Draw, Color::BLACK)
            .unwrap();
        session.continue_stroke(PixelPoint::new(100.0, 10.0)).unwrap();

        let letter = DocumentPage::new(612.0, 792.0).unwrap();
        let (raster, _) = session.load_page(letter, 2.0).unwrap();
        assert!(session.list().unwrap().is_empty());
        assert!(session.strokes().unwrap().is_blank());
        assert!(session.strokes().unwrap().matches(&raster));
    }

    #[test]
    fn test_add_clamps_creation_point() {
        let mut session = EditorSession::default();
        let (raster, _) = session.load_page(a4(), 1.0).unwrap();
        let id = session
            .add(
                PixelPoint::new(-10.0, 5000.0),
                AnnotationBody::Image {
                    width: 10.0,
                    height: 10.0,
                    data: vec![],
                },
            )
            .unwrap();
        let annotation = &session.list().unwrap()[0];
        assert_eq!(annotation.id(), id);
        assert_eq!(
            annotation.origin,
            PixelPoint::new(0.0, raster.pixel_height as f64)
        );
    }

    #[test]
    fn test_drag_outside_bounds_is_kept() {
        let mut session = EditorSession::default();
        session.load_page(a4(), 1.0).unwrap();
        let id = session
            .add(
                PixelPoint::new(10.0, 10.0),
                AnnotationBody::Text {
                    content: "t".to_string(),
                    font_size: 12.0,
                    color: Color::BLACK,
                },
            )
            .unwrap();
        let far = PixelPoint::new(-40.0, 9000.0);
        assert!(session.update(id, AnnotationPatch::move_to(far)).unwrap());
        assert_eq!(session.list().unwrap()[0].origin, far);
    }

    #[test]
    fn test_close_drops_page() {
        let mut session = EditorSession::default();
        session.load_page(a4(), 1.0).unwrap();
        session.close();
        assert!(!session.is_loaded());
        assert!(matches!(session.projector(), Err(Error::NoPageLoaded)));
    }
}
