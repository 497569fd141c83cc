//! Editor configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use crate::error::EditorError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub zoom: ZoomConfig,
    #[serde(default)]
    pub text_metrics: TextMetricsConfig,
    #[serde(default)]
    pub defaults: AnnotationDefaults,
    #[serde(default)]
    pub interaction: InteractionConfig,
    /// Draw text without a background fill on export
    #[serde(default)]
    pub transparent_text: bool,
}

impl EditorConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub min: f64,
    pub max: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self { min: 0.5, max: 2.0 }
    }
}

/// Constants used by the text metrics estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextMetricsConfig {
    /// Total horizontal padding (left + right)
    pub padding_x: f64,
    /// Total vertical padding (top + bottom)
    pub padding_y: f64,
    /// Extra space between lines, added to the font size
    pub line_spacing: f64,
    pub min_width: f64,
    pub min_height: f64,
}

impl Default for TextMetricsConfig {
    fn default() -> Self {
        Self {
            padding_x: 16.0,
            padding_y: 10.0,
            line_spacing: 4.0,
            min_width: 80.0,
            min_height: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationDefaults {
    pub font_size: f64,
    pub color: String,
    pub image_width: f64,
    pub image_height: f64,
}

impl Default for AnnotationDefaults {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            color: "#000000".to_string(),
            image_width: 150.0,
            image_height: 150.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Side of the square resize handle at the bottom-right corner, display pixels
    pub handle_size: f64,
    /// Smallest width/height a manual resize can produce
    pub min_resize: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            handle_size: 10.0,
            min_resize: 20.0,
        }
    }
}
