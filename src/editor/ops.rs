//! Serializable edit operations
//!
//! Clients describe an editing session as a list of operations in raster
//! coordinates; [`apply_ops`] replays them onto a loaded [`EditorSession`].
//! Operations that reference annotations use the 1-based creation index within
//! the same list, since ids are only known once the session assigns them.

use super::annotation::{AnnotationBody, AnnotationId, AnnotationPatch, Color};
use super::geometry::PixelPoint;
use super::session::EditorSession;
use super::stroke::StrokeMode;
use crate::error::{Error, Result};
use base64::Engine;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const DEFAULT_TEXT: &str = "Type here...";
const DEFAULT_TEXT_ORIGIN: (f64, f64) = (50.0, 50.0);
const DEFAULT_IMAGE_ORIGIN: (f64, f64) = (100.0, 100.0);

/// A single editing step in raster pixel coordinates (origin top-left, y down)
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    /// Freehand path drawn with the pen or the eraser
    Stroke {
        /// Path points as [x, y] pairs
        points: Vec<[f64; 2]>,
        /// "draw" (default) or "erase"
        #[serde(default = "default_mode")]
        mode: StrokeMode,
        /// Ink color as "#rrggbb" (draw mode only)
        #[serde(default)]
        color: Option<String>,
        /// Line width in pixels (defaults to the pen or eraser width)
        #[serde(default)]
        width: Option<f32>,
    },
    /// Place a text box whose top-left corner is (x, y)
    AddText {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default)]
        content: Option<String>,
        /// Font size in pixels
        #[serde(default)]
        font_size: Option<f64>,
        /// Text color as "#rrggbb"
        #[serde(default)]
        color: Option<String>,
    },
    /// Place an image whose top-left corner is (x, y)
    AddImage {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default)]
        width: Option<f64>,
        #[serde(default)]
        height: Option<f64>,
        /// Base64 encoded PNG or JPEG (a data: URL prefix is accepted)
        image_base64: String,
    },
    /// Move an annotation; `target` is its 1-based creation index
    Move { target: u64, x: f64, y: f64 },
    /// Change the content or style of a text annotation
    EditText {
        target: u64,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        font_size: Option<f64>,
        #[serde(default)]
        color: Option<String>,
    },
    /// Resize an image annotation
    Resize { target: u64, width: f64, height: f64 },
    /// Delete an annotation
    Remove { target: u64 },
    /// Clear all ink
    ResetStrokes,
    /// Revert the most recent stroke or reset
    UndoStroke,
}

fn default_mode() -> StrokeMode {
    StrokeMode::Draw
}

/// Replay `ops` onto a loaded session, returning ids of created annotations in creation order
pub fn apply_ops(session: &mut EditorSession, ops: &[EditOp]) -> Result<Vec<AnnotationId>> {
    let mut created: Vec<AnnotationId> = Vec::new();

    for op in ops {
        match op {
            EditOp::Stroke {
                points,
                mode,
                color,
                width,
            } => {
                let Some((first, rest)) = points.split_first() else {
                    continue;
                };
                let color = parse_color(color.as_deref())?;
                let start = PixelPoint::new(first[0], first[1]);
                match width {
                    Some(w) => session.begin_stroke_with_width(start, *mode, color, *w)?,
                    None => session.begin_stroke(start, *mode, color)?,
                }
                for p in rest {
                    session.continue_stroke(PixelPoint::new(p[0], p[1]))?;
                }
                session.end_stroke()?;
            }
            EditOp::AddText {
                x,
                y,
                content,
                font_size,
                color,
            } => {
                let origin = PixelPoint::new(
                    x.unwrap_or(DEFAULT_TEXT_ORIGIN.0),
                    y.unwrap_or(DEFAULT_TEXT_ORIGIN.1),
                );
                let body = AnnotationBody::Text {
                    content: content.clone().unwrap_or_else(|| DEFAULT_TEXT.to_string()),
                    font_size: font_size.unwrap_or(session.config().default_font_size),
                    color: parse_color(color.as_deref())?,
                };
                created.push(session.add(origin, body)?);
            }
            EditOp::AddImage {
                x,
                y,
                width,
                height,
                image_base64,
            } => {
                let (default_w, default_h) = session.config().default_image_size;
                let origin = PixelPoint::new(
                    x.unwrap_or(DEFAULT_IMAGE_ORIGIN.0),
                    y.unwrap_or(DEFAULT_IMAGE_ORIGIN.1),
                );
                let body = AnnotationBody::Image {
                    width: width.unwrap_or(default_w),
                    height: height.unwrap_or(default_h),
                    data: decode_image_payload(image_base64)?,
                };
                created.push(session.add(origin, body)?);
            }
            EditOp::Move { target, x, y } => {
                if let Some(id) = resolve_target(&created, *target) {
                    session.update(id, AnnotationPatch::move_to(PixelPoint::new(*x, *y)))?;
                }
            }
            EditOp::EditText {
                target,
                content,
                font_size,
                color,
            } => {
                if let Some(id) = resolve_target(&created, *target) {
                    let color = match color {
                        Some(hex) => Some(parse_color(Some(hex))?),
                        None => None,
                    };
                    session.update(
                        id,
                        AnnotationPatch {
                            content: content.clone(),
                            font_size: *font_size,
                            color,
                            ..AnnotationPatch::default()
                        },
                    )?;
                }
            }
            EditOp::Resize {
                target,
                width,
                height,
            } => {
                if let Some(id) = resolve_target(&created, *target) {
                    session.update(
                        id,
                        AnnotationPatch {
                            width: Some(*width),
                            height: Some(*height),
                            ..AnnotationPatch::default()
                        },
                    )?;
                }
            }
            EditOp::Remove { target } => {
                if let Some(id) = resolve_target(&created, *target) {
                    session.remove(id)?;
                }
            }
            EditOp::ResetStrokes => session.reset_stroke_layer()?,
            EditOp::UndoStroke => {
                session.undo_stroke()?;
            }
        }
    }

    Ok(created)
}

fn resolve_target(created: &[AnnotationId], target: u64) -> Option<AnnotationId> {
    let index = usize::try_from(target).ok()?.checked_sub(1)?;
    created.get(index).copied()
}

fn parse_color(hex: Option<&str>) -> Result<Color> {
    match hex {
        None => Ok(Color::BLACK),
        Some(hex) => Color::from_hex(hex).ok_or_else(|| Error::InvalidEdit {
            reason: format!("invalid color '{}', expected #rrggbb", hex),
        }),
    }
}

/// Decode base64 image bytes, accepting a `data:image/...;base64,` prefix
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>> {
    let trimmed = payload.trim();
    let body = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    Ok(base64::engine::general_purpose::STANDARD.decode(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::geometry::DocumentPage;
    use pretty_assertions::assert_eq;

    fn session() -> EditorSession {
        let mut session = EditorSession::default();
        session
            .load_page(DocumentPage::new(200.0, 100.0).unwrap(), 1.0)
            .unwrap();
        session
    }

    #[test]
    fn test_ops_deserialize_from_json() {
        let json = r##"[
            {"op": "stroke", "points": [[1, 2], [3, 4]], "mode": "erase"},
            {"op": "add_text", "content": "Hi", "color": "#ff0000"},
            {"op": "move", "target": 1, "x": 5, "y": 6},
            {"op": "reset_strokes"}
        ]"##;
        let ops: Vec<EditOp> = serde_json::from_str(json).unwrap();
        assert_eq!(ops.len(), 4);
        assert!(matches!(
            ops[0],
            EditOp::Stroke {
                mode: StrokeMode::Erase,
                ..
            }
        ));
        assert!(matches!(ops[3], EditOp::ResetStrokes));
    }

    #[test]
    fn test_defaults_follow_editor_config() {
        let mut session = session();
        let ids = apply_ops(
            &mut session,
            &[
                EditOp::AddText {
                    x: None,
                    y: None,
                    content: None,
                    font_size: None,
                    color: None,
                },
                EditOp::AddImage {
                    x: None,
                    y: None,
                    width: None,
                    height: None,
                    image_base64: "iVBORw0K".to_string(),
                },
            ],
        )
        .unwrap();
        assert_eq!(ids.len(), 2);

        let list = session.list().unwrap();
        assert_eq!(list[0].origin, PixelPoint::new(50.0, 50.0));
        assert_eq!(
            list[0].body,
            AnnotationBody::Text {
                content: "Type here...".to_string(),
                font_size: 16.0,
                color: Color::BLACK,
            }
        );
        assert_eq!(list[1].origin, PixelPoint::new(100.0, 100.0));
        match &list[1].body {
            AnnotationBody::Image { width, height, .. } => {
                assert_eq!((*width, *height), (200.0, 200.0))
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_targets_refer_to_creation_index() {
        let mut session = session();
        apply_ops(
            &mut session,
            &[
                EditOp::AddText {
                    x: Some(1.0),
                    y: Some(1.0),
                    content: Some("a".to_string()),
                    font_size: None,
                    color: None,
                },
                EditOp::AddText {
                    x: Some(2.0),
                    y: Some(2.0),
                    content: Some("b".to_string()),
                    font_size: None,
                    color: None,
                },
                EditOp::Remove { target: 1 },
                EditOp::Remove { target: 1 },
                EditOp::Move {
                    target: 2,
                    x: 70.0,
                    y: 80.0,
                },
                EditOp::Move {
                    target: 9,
                    x: 0.0,
                    y: 0.0,
                },
            ],
        )
        .unwrap();

        let list = session.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].origin, PixelPoint::new(70.0, 80.0));
    }

    #[test]
    fn test_stroke_then_erase_leaves_layer_blank() {
        let mut session = session();
        apply_ops(
            &mut session,
            &[
                EditOp::Stroke {
                    points: vec![[20.0, 50.0], [180.0, 50.0]],
                    mode: StrokeMode::Draw,
                    color: Some("#0000ff".to_string()),
                    width: Some(3.0),
                },
                EditOp::Stroke {
                    points: vec![[0.0, 50.0], [200.0, 50.0]],
                    mode: StrokeMode::Erase,
                    color: None,
                    width: Some(30.0),
                },
            ],
        )
        .unwrap();
        assert!(session.strokes().unwrap().is_blank());
    }

    #[test]
    fn test_invalid_color_is_rejected() {
        let mut session = session();
        let result = apply_ops(
            &mut session,
            &[EditOp::AddText {
                x: None,
                y: None,
                content: None,
                font_size: None,
                color: Some("red".to_string()),
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_data_url() {
        let raw = decode_image_payload("data:image/png;base64,AQID").unwrap();
        assert_eq!(raw, vec![1, 2, 3]);
        assert_eq!(decode_image_payload("AQID").unwrap(), vec![1, 2, 3]);
        assert!(decode_image_payload("%%%").is_err());
    }
}
