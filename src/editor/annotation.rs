//! Annotation store for the page being edited
//!
//! Annotations are kept in raster space (see [`PixelPoint`]); projection into
//! document space only happens at burn-in.

use super::geometry::PixelPoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an annotation within one editing session.
///
/// Assigned by the store from a monotonic counter, so a removed id is never handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(u64);

impl AnnotationId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (the leading `#` is optional)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !matches!(digits.len(), 6 | 8) || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        let a = if digits.len() == 8 { channel(6)? } else { 255 };
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// What an annotation draws
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationBody {
    Text {
        content: String,
        /// Font size in raster pixels
        font_size: f64,
        color: Color,
    },
    Image {
        width: f64,
        height: f64,
        /// Encoded image bytes as supplied by the user (PNG, JPEG, ...)
        data: Vec<u8>,
    },
}

/// A user-placed element on the page.
///
/// `origin` is the top-left corner of the element's box in raster space.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    id: AnnotationId,
    pub origin: PixelPoint,
    pub body: AnnotationBody,
}

impl Annotation {
    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn is_text(&self) -> bool {
        matches!(self.body, AnnotationBody::Text { .. })
    }

    pub fn is_image(&self) -> bool {
        matches!(self.body, AnnotationBody::Image { .. })
    }
}

/// Partial update merged into an existing annotation.
///
/// Fields that do not apply to the annotation's kind are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationPatch {
    pub origin: Option<PixelPoint>,
    pub content: Option<String>,
    pub font_size: Option<f64>,
    pub color: Option<Color>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl AnnotationPatch {
    pub fn move_to(origin: PixelPoint) -> Self {
        Self {
            origin: Some(origin),
            ..Self::default()
        }
    }

    fn apply(self, annotation: &mut Annotation) {
        if let Some(origin) = self.origin {
            annotation.origin = origin;
        }
        match &mut annotation.body {
            AnnotationBody::Text {
                content,
                font_size,
                color,
            } => {
                if let Some(new_content) = self.content {
                    *content = new_content;
                }
                if let Some(size) = self.font_size {
                    *font_size = size;
                }
                if let Some(new_color) = self.color {
                    *color = new_color;
                }
            }
            AnnotationBody::Image { width, height, .. } => {
                if let Some(w) = self.width {
                    *width = w;
                }
                if let Some(h) = self.height {
                    *height = h;
                }
            }
        }
    }
}

/// Ordered collection of annotations for one page.
///
/// Insertion order is paint order: later annotations render on top.
#[derive(Debug, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    next_id: u64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an annotation and return its freshly assigned id
    pub fn add(&mut self, origin: PixelPoint, body: AnnotationBody) -> AnnotationId {
        self.next_id += 1;
        let id = AnnotationId(self.next_id);
        self.annotations.push(Annotation { id, origin, body });
        id
    }

    /// Merge `patch` into the annotation with `id`.
    ///
    /// Unknown ids are a no-op: a drag may still be delivering moves for an
    /// annotation that was just deleted. Returns whether anything was updated.
    pub fn update(&mut self, id: AnnotationId, patch: AnnotationPatch) -> bool {
        match self.annotations.iter_mut().find(|a| a.id == id) {
            Some(annotation) => {
                patch.apply(annotation);
                true
            }
            None => false,
        }
    }

    /// Remove the annotation with `id` if present. Idempotent.
    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(index))
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    /// All annotations in insertion order
    pub fn list(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> AnnotationBody {
        AnnotationBody::Text {
            content: content.to_string(),
            font_size: 16.0,
            color: Color::BLACK,
        }
    }

    fn ids(store: &AnnotationStore) -> Vec<AnnotationId> {
        store.list().iter().map(|a| a.id()).collect()
    }

    #[test]
    fn test_add_assigns_unique_ids() {
        let mut store = AnnotationStore::new();
        let a = store.add(PixelPoint::new(1.0, 1.0), text("a"));
        let b = store.add(PixelPoint::new(2.0, 2.0), text("b"));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut store = AnnotationStore::new();
        let a = store.add(PixelPoint::default(), text("a"));
        store.remove(a);
        let b = store.add(PixelPoint::default(), text("b"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = AnnotationStore::new();
        let a = store.add(PixelPoint::default(), text("a"));
        let b = store.add(PixelPoint::default(), text("b"));

        assert!(store.remove(a).is_some());
        let after_first = ids(&store);
        assert!(store.remove(a).is_none());
        assert_eq!(ids(&store), after_first);
        assert_eq!(after_first, vec![b]);
    }

    #[test]
    fn test_order_survives_updates() {
        let mut store = AnnotationStore::new();
        let a = store.add(PixelPoint::new(0.0, 0.0), text("a"));
        let b = store.add(PixelPoint::new(0.0, 0.0), text("b"));
        let c = store.add(PixelPoint::new(0.0, 0.0), text("c"));

        assert!(store.update(a, AnnotationPatch::move_to(PixelPoint::new(90.0, 90.0))));
        assert!(store.update(
            b,
            AnnotationPatch {
                content: Some("bee".to_string()),
                ..AnnotationPatch::default()
            }
        ));

        assert_eq!(ids(&store), vec![a, b, c]);
        assert_eq!(store.get(a).unwrap().origin, PixelPoint::new(90.0, 90.0));
        match &store.get(b).unwrap().body {
            AnnotationBody::Text { content, .. } => assert_eq!(content, "bee"),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_update_missing_id_is_noop() {
        let mut store = AnnotationStore::new();
        let a = store.add(PixelPoint::default(), text("a"));
        store.remove(a);
        assert!(!store.update(a, AnnotationPatch::move_to(PixelPoint::new(5.0, 5.0))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_patch_ignores_fields_of_other_kind() {
        let mut store = AnnotationStore::new();
        let img = store.add(
            PixelPoint::default(),
            AnnotationBody::Image {
                width: 10.0,
                height: 20.0,
                data: vec![1, 2, 3],
            },
        );
        store.update(
            img,
            AnnotationPatch {
                content: Some("ignored".to_string()),
                width: Some(40.0),
                ..AnnotationPatch::default()
            },
        );
        assert_eq!(
            store.get(img).unwrap().body,
            AnnotationBody::Image {
                width: 40.0,
                height: 20.0,
                data: vec![1, 2, 3],
            }
        );
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(Color::from_hex("#ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(
            Color::from_hex("00000080"),
            Some(Color {
                r: 0,
                g: 0,
                b: 0,
                a: 128
            })
        );
        assert_eq!(Color::from_hex("#fff"), None);
        assert_eq!(Color::from_hex("#gg0000"), None);
        assert_eq!(Color::rgb(1, 2, 255).to_hex(), "#0102ff");
    }
}
