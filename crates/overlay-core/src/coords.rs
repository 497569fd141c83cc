//! Coordinate transformation between viewport, display and PDF spaces
//!
//! - Viewport pixels: raw pointer-event coordinates, affected by zoom.
//! - Display pixels: viewport pixels divided by zoom. Annotation geometry is
//!   stored here, top-left origin.
//! - Document points: the page's native unit, bottom-left origin.
//!
//! Display space at zoom 1.0 matches document points one to one, so only the
//! Y axis needs flipping on export.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewportPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentPoint {
    pub x: f64,
    pub y: f64,
}

/// Axis-aligned box in display pixels, `(x, y)` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned box in document points, `(x, y)` is the bottom-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewportPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl DisplayPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl DisplayRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> DisplayPoint {
        DisplayPoint::new(self.x, self.y)
    }

    /// Inclusive containment test in display space
    pub fn contains(&self, point: DisplayPoint) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Convert a pointer position to display pixels.
///
/// `zoom` must be positive. Values outside the configured zoom range are
/// accepted as-is; see [`clamp_zoom`].
pub fn to_display(viewport: ViewportPoint, zoom: f64) -> DisplayPoint {
    DisplayPoint {
        x: viewport.x / zoom,
        y: viewport.y / zoom,
    }
}

/// Convert display pixels back to pointer space
pub fn to_viewport(display: DisplayPoint, zoom: f64) -> ViewportPoint {
    ViewportPoint {
        x: display.x * zoom,
        y: display.y * zoom,
    }
}

/// Convert the top-left corner of a box in display space to the bottom-left
/// corner of the same box in document space.
///
/// The box height is subtracted so the top edge on screen lands on the top
/// edge in the document.
pub fn to_document(origin: DisplayPoint, box_height: f64, page_height: f64) -> DocumentPoint {
    DocumentPoint {
        x: origin.x,
        y: page_height - origin.y - box_height,
    }
}

/// Inverse of [`to_document`]
pub fn to_display_origin(
    origin: DocumentPoint,
    box_height: f64,
    page_height: f64,
) -> DisplayPoint {
    DisplayPoint {
        x: origin.x,
        y: page_height - origin.y - box_height,
    }
}

pub fn rect_to_document(rect: &DisplayRect, page_height: f64) -> DocumentRect {
    let origin = to_document(rect.origin(), rect.height, page_height);
    DocumentRect {
        x: origin.x,
        y: origin.y,
        width: rect.width,
        height: rect.height,
    }
}

/// Clamp a zoom factor into `[min, max]`
pub fn clamp_zoom(zoom: f64, min: f64, max: f64) -> f64 {
    if zoom.is_nan() {
        return 1.0_f64.clamp(min, max);
    }
    zoom.clamp(min, max)
}
