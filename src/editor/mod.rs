//! Page annotation editor
//!
//! Maps pointer input on a rasterized page preview back into the page's own
//! coordinate space and commits it at save time:
//! - `geometry`: raster/document coordinate types and the [`Projector`]
//! - `annotation`: text and image annotations and their store
//! - `stroke`: freehand ink and eraser layer
//! - `burn_in`: projection of all marks onto a [`PageCanvas`]
//! - `session`: one page's editing state
//! - `ops`: serializable edit operations

pub mod annotation;
pub mod burn_in;
pub mod geometry;
pub mod ops;
pub mod session;
pub mod stroke;

pub use annotation::{
    Annotation, AnnotationBody, AnnotationId, AnnotationPatch, AnnotationStore, Color,
};
pub use burn_in::{BurnInOptions, BurnInResult, CanvasError, PageCanvas, SkippedAnnotation};
pub use geometry::{DocPoint, DocRect, DocumentPage, PageRaster, PixelPoint, Projector};
pub use ops::{apply_ops, decode_image_payload, EditOp};
pub use session::{EditorConfig, EditorSession};
pub use stroke::{StrokeLayer, StrokeMode};
