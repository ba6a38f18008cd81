//! Committing strokes and annotations onto the document page
//!
//! Everything is projected into document space and handed to a [`PageCanvas`],
//! the document-writing collaborator. Paint order is the stroke layer first, then
//! annotations in list order.

use super::annotation::{Annotation, AnnotationBody, AnnotationId, Color};
use super::geometry::{DocPoint, DocRect, PixelPoint, Projector};
use super::stroke::StrokeLayer;
use crate::error::Result;
use serde::Serialize;
use thiserror::Error;

/// Failure reported by a [`PageCanvas`] for one mark
#[derive(Error, Debug)]
pub enum CanvasError {
    /// The supplied image bytes could not be decoded or embedded
    #[error("image could not be embedded: {0}")]
    ImageDecode(String),

    /// The text could not be placed (font or encoding problem)
    #[error("text could not be placed: {0}")]
    Text(String),

    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}

/// Destination page of a burn-in, in document space
pub trait PageCanvas {
    /// Draw encoded image bytes stretched to `rect`
    fn draw_image(&mut self, encoded: &[u8], rect: DocRect) -> std::result::Result<(), CanvasError>;

    /// Draw `text` with its baseline starting at `baseline`
    fn draw_text(
        &mut self,
        text: &str,
        baseline: DocPoint,
        font_size: f64,
        color: Color,
    ) -> std::result::Result<(), CanvasError>;
}

/// Placement knobs for burn-in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurnInOptions {
    /// Distance from the top of a text box to its baseline, in multiples of the font size.
    ///
    /// This is an approximation: real baselines depend on font ascent metrics.
    pub baseline_offset_em: f64,
}

impl Default for BurnInOptions {
    fn default() -> Self {
        Self {
            baseline_offset_em: 1.0,
        }
    }
}

/// An annotation that could not be committed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedAnnotation {
    pub id: AnnotationId,
    pub reason: String,
}

/// Outcome of a burn-in
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BurnInResult {
    /// Annotations written to the page
    pub applied_count: usize,
    /// Whether the stroke layer carried ink and was placed on the page
    pub strokes_applied: bool,
    /// Annotations left out, in list order
    pub skipped: Vec<SkippedAnnotation>,
}

impl BurnInResult {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Where a text annotation's baseline lands in document space
pub fn text_baseline(
    projector: &Projector,
    origin: PixelPoint,
    font_size: f64,
    options: &BurnInOptions,
) -> DocPoint {
    projector.to_document(PixelPoint::new(
        origin.x,
        origin.y + font_size * options.baseline_offset_em,
    ))
}

/// Project and write the stroke layer and all annotations onto `canvas`.
///
/// A failing annotation is recorded in [`BurnInResult::skipped`] and the rest are
/// still written. Only a failure to place the stroke layer itself is an error.
pub fn burn_in(
    canvas: &mut dyn PageCanvas,
    projector: &Projector,
    strokes: &StrokeLayer,
    annotations: &[Annotation],
    options: &BurnInOptions,
) -> Result<BurnInResult> {
    let mut result = BurnInResult::default();

    if !strokes.is_blank() {
        let png = strokes.encode_png()?;
        canvas
            .draw_image(&png, projector.full_page())
            .map_err(|e| crate::error::Error::StrokeLayer {
                reason: e.to_string(),
            })?;
        result.strokes_applied = true;
    }

    for annotation in annotations {
        let outcome = match &annotation.body {
            AnnotationBody::Text {
                content,
                font_size,
                color,
            } => {
                if content.is_empty() {
                    continue;
                }
                let baseline = text_baseline(projector, annotation.origin, *font_size, options);
                let size = projector.width_to_document(*font_size);
                canvas.draw_text(content, baseline, size, *color)
            }
            AnnotationBody::Image {
                width,
                height,
                data,
            } => {
                let rect = projector.box_to_document(annotation.origin, *width, *height);
                canvas.draw_image(data, rect)
            }
        };

        match outcome {
            Ok(()) => result.applied_count += 1,
            Err(e) => {
                tracing::warn!(
                    id = %annotation.id(),
                    error = %e,
                    "Skipping annotation during burn-in"
                );
                result.skipped.push(SkippedAnnotation {
                    id: annotation.id(),
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::debug!(
        applied = result.applied_count,
        skipped = result.skipped.len(),
        strokes = result.strokes_applied,
        "Burn-in complete"
    );

    Ok(result)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A mark recorded by [`RecordingCanvas`]
    #[derive(Debug, Clone, PartialEq)]
    pub enum Mark {
        Image { bytes: usize, rect: DocRect },
        Text { text: String, baseline: DocPoint, font_size: f64, color: Color },
    }

    /// Canvas that records marks and rejects image bytes that do not start with a PNG/JPEG signature
    #[derive(Debug, Default)]
    pub struct RecordingCanvas {
        pub marks: Vec<Mark>,
    }

    impl PageCanvas for RecordingCanvas {
        fn draw_image(
            &mut self,
            encoded: &[u8],
            rect: DocRect,
        ) -> std::result::Result<(), CanvasError> {
            let known = encoded.starts_with(b"\x89PNG") || encoded.starts_with(&[0xFF, 0xD8]);
            if !known {
                return Err(CanvasError::ImageDecode("unrecognized image format".to_string()));
            }
            self.marks.push(Mark::Image {
                bytes: encoded.len(),
                rect,
            });
            Ok(())
        }

        fn draw_text(
            &mut self,
            text: &str,
            baseline: DocPoint,
            font_size: f64,
            color: Color,
        ) -> std::result::Result<(), CanvasError> {
            self.marks.push(Mark::Text {
                text: text.to_string(),
                baseline,
                font_size,
                color,
            });
            Ok(())
        }
    }
}
