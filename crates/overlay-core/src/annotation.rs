//! Annotation records placed on top of PDF pages
//!
//! An annotation is either a text field or an image overlay. Geometry is
//! kept in display pixels and only converted to document points on export.

use crate::coords::DisplayRect;
use crate::error::EditorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque annotation identity, stable for the annotation's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AnnotationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub text: String,
    /// Set once the user resized the box by hand. Auto-sizing from content
    /// is suspended from then on.
    #[serde(default)]
    pub manual_resize: bool,
    pub font_size: f64,
    /// Hex color, e.g. "#000000"
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnnotation {
    #[serde(with = "base64_bytes")]
    pub source_bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnnotationKind {
    Text(TextAnnotation),
    Image(ImageAnnotation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// Zero-based index of the owning page
    pub page: u32,
    pub rect: DisplayRect,
    pub kind: AnnotationKind,
}

impl Annotation {
    pub fn as_text(&self) -> Option<&TextAnnotation> {
        match &self.kind {
            AnnotationKind::Text(text) => Some(text),
            AnnotationKind::Image(_) => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextAnnotation> {
        match &mut self.kind {
            AnnotationKind::Text(text) => Some(text),
            AnnotationKind::Image(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.as_text().is_some()
    }

    /// Merge a patch into this annotation.
    ///
    /// Text-only fields are ignored for image annotations. Geometry is clamped
    /// so the box never has a negative position or a non-positive size.
    pub fn apply(&mut self, patch: &AnnotationPatch) {
        if let Some(x) = patch.x {
            self.rect.x = x.max(0.0);
        }
        if let Some(y) = patch.y {
            self.rect.y = y.max(0.0);
        }
        if let Some(width) = patch.width {
            self.rect.width = width.max(MIN_EXTENT);
        }
        if let Some(height) = patch.height {
            self.rect.height = height.max(MIN_EXTENT);
        }

        if let AnnotationKind::Text(text) = &mut self.kind {
            if let Some(value) = &patch.text {
                text.text = value.clone();
            }
            if let Some(font_size) = patch.font_size {
                text.font_size = font_size.max(MIN_EXTENT);
            }
            if let Some(color) = &patch.color {
                text.color = color.clone();
            }
            if let Some(manual_resize) = patch.manual_resize {
                text.manual_resize = manual_resize;
            }
        }
    }
}

/// Smallest width, height or font size an annotation can be given
const MIN_EXTENT: f64 = 1.0;

/// Content and geometry for a new annotation. The store assigns id and page.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDraft {
    pub rect: DisplayRect,
    pub kind: AnnotationKind,
}

impl AnnotationDraft {
    pub fn text(rect: DisplayRect, text: &str, font_size: f64, color: &str) -> Self {
        Self {
            rect,
            kind: AnnotationKind::Text(TextAnnotation {
                text: text.to_string(),
                manual_resize: false,
                font_size,
                color: color.to_string(),
            }),
        }
    }

    pub fn image(rect: DisplayRect, source_bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            rect,
            kind: AnnotationKind::Image(ImageAnnotation {
                source_bytes,
                mime_type: mime_type.to_string(),
            }),
        }
    }
}

/// Partial update merged by [`Annotation::apply`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPatch {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub manual_resize: Option<bool>,
}

impl AnnotationPatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn geometry(rect: DisplayRect) -> Self {
        Self {
            x: Some(rect.x),
            y: Some(rect.y),
            width: Some(rect.width),
            height: Some(rect.height),
            ..Self::default()
        }
    }
}

/// Image codecs the composer can embed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn from_mime(mime_type: &str) -> Result<Self, EditorError> {
        match mime_type.trim().to_lowercase().as_str() {
            "image/png" => Ok(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
            _ => Err(EditorError::UnsupportedImageFormat(mime_type.to_string())),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Parse hex color string (e.g., "#FF0000" or "FF0000") to RGB floats (0-1 range)
pub fn parse_hex_color(color: &str) -> (f32, f32, f32) {
    let hex = color.trim_start_matches('#');
    if hex.len() >= 6 && hex.is_ascii() {
        let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0) as f32 / 255.0;
        let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0) as f32 / 255.0;
        let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0) as f32 / 255.0;
        (r, g, b)
    } else {
        (0.0, 0.0, 0.0) // Default to black
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_annotation() -> Annotation {
        Annotation {
            id: AnnotationId::new(),
            page: 0,
            rect: DisplayRect::new(10.0, 20.0, 100.0, 30.0),
            kind: AnnotationKind::Text(TextAnnotation {
                text: "Hello".to_string(),
                manual_resize: false,
                font_size: 16.0,
                color: "#000000".to_string(),
            }),
        }
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(AnnotationId::new(), AnnotationId::new());
    }

    #[test]
    fn test_id_parses_from_display() {
        let id = AnnotationId::new();
        let parsed: AnnotationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_patch_merges_text_fields() {
        let mut annotation = text_annotation();
        annotation.apply(&AnnotationPatch {
            text: Some("World".to_string()),
            color: Some("#FF0000".to_string()),
            ..AnnotationPatch::default()
        });
        let text = annotation.as_text().unwrap();
        assert_eq!(text.text, "World");
        assert_eq!(text.color, "#FF0000");
        assert_eq!(annotation.rect, DisplayRect::new(10.0, 20.0, 100.0, 30.0));
    }

    #[test]
    fn test_patch_clamps_geometry() {
        let mut annotation = text_annotation();
        annotation.apply(&AnnotationPatch::geometry(DisplayRect::new(
            -5.0, -1.0, -20.0, 0.0,
        )));
        assert_eq!(annotation.rect, DisplayRect::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_patch_ignores_text_fields_on_images() {
        let mut annotation = Annotation {
            id: AnnotationId::new(),
            page: 0,
            rect: DisplayRect::new(0.0, 0.0, 50.0, 50.0),
            kind: AnnotationKind::Image(ImageAnnotation {
                source_bytes: vec![1, 2, 3],
                mime_type: "image/png".to_string(),
            }),
        };
        let before = annotation.kind.clone();
        annotation.apply(&AnnotationPatch {
            text: Some("ignored".to_string()),
            width: Some(80.0),
            ..AnnotationPatch::default()
        });
        assert_eq!(annotation.kind, before);
        assert_eq!(annotation.rect.width, 80.0);
    }

    #[test]
    fn test_image_format_from_mime() {
        assert_eq!(ImageFormat::from_mime("image/png").unwrap(), ImageFormat::Png);
        assert_eq!(ImageFormat::from_mime("image/jpeg").unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_mime("IMAGE/JPG").unwrap(), ImageFormat::Jpeg);
        assert!(matches!(
            ImageFormat::from_mime("image/gif"),
            Err(EditorError::UnsupportedImageFormat(_))
        ));
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), (1.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("00FF00"), (0.0, 1.0, 0.0));
        assert_eq!(parse_hex_color("#abc"), (0.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("#ééé"), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_image_bytes_serialize_as_base64() {
        let annotation = Annotation {
            id: AnnotationId::new(),
            page: 1,
            rect: DisplayRect::new(0.0, 0.0, 10.0, 10.0),
            kind: AnnotationKind::Image(ImageAnnotation {
                source_bytes: b"abc".to_vec(),
                mime_type: "image/png".to_string(),
            }),
        };
        let json = serde_json::to_string(&annotation).unwrap();
        assert!(json.contains("\"source_bytes\":\"YWJj\""));
        let restored: Annotation = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, annotation);
    }
}
