use overlay_core::{HelveticaMeasurer, TextMeasurer};
use wasm_bindgen::JsCast;
use web_sys::CanvasRenderingContext2d;

/// Font stack the editor renders text boxes with
const FONT_FAMILY: &str = "Helvetica, Arial, sans-serif";

/// Measures text with a detached 2D canvas, so box sizes match what the
/// browser actually draws
pub struct CanvasMeasurer {
    context: CanvasRenderingContext2d,
}

impl CanvasMeasurer {
    /// `None` outside a window or when 2D canvas is unavailable
    pub fn new() -> Option<Self> {
        let document = web_sys::window()?.document()?;
        let canvas = document
            .create_element("canvas")
            .ok()?
            .dyn_into::<web_sys::HtmlCanvasElement>()
            .ok()?;
        let context = canvas
            .get_context("2d")
            .ok()??
            .dyn_into::<CanvasRenderingContext2d>()
            .ok()?;
        Some(Self { context })
    }
}

impl TextMeasurer for CanvasMeasurer {
    fn line_width(&self, line: &str, font_size: f64) -> f64 {
        self.context.set_font(&format!("{font_size}px {FONT_FAMILY}"));
        match self.context.measure_text(line) {
            Ok(metrics) => metrics.width(),
            Err(_) => HelveticaMeasurer.line_width(line, font_size),
        }
    }
}

/// Canvas measurement when available, Helvetica metrics otherwise
pub fn best_measurer() -> Box<dyn TextMeasurer> {
    match CanvasMeasurer::new() {
        Some(measurer) => Box::new(measurer),
        None => Box::new(HelveticaMeasurer),
    }
}
