//! Text box sizing
//!
//! Computes the smallest box that shows a text annotation without clipping.
//! Measurement is pluggable: the browser measures with its canvas, native
//! code falls back to Helvetica advance widths, which is also the font the
//! exported text is drawn with.

use crate::config::TextMetricsConfig;

/// Measures the advance width of a single line of text
pub trait TextMeasurer {
    fn line_width(&self, line: &str, font_size: f64) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub width: f64,
    pub height: f64,
}

/// Estimate the box needed to render `text` at `font_size`.
///
/// Never returns less than the configured floor so an empty field stays
/// clickable.
pub fn estimate_text_box(
    measurer: &dyn TextMeasurer,
    config: &TextMetricsConfig,
    text: &str,
    font_size: f64,
) -> TextBox {
    let lines: Vec<&str> = text.split('\n').collect();

    let widest = lines
        .iter()
        .map(|line| measurer.line_width(line.trim_end_matches('\r'), font_size))
        .fold(0.0_f64, f64::max);

    let width = widest + config.padding_x;
    let height = lines.len() as f64 * (font_size + config.line_spacing) + config.padding_y;

    TextBox {
        width: width.max(config.min_width),
        height: height.max(config.min_height),
    }
}

/// Helvetica advance widths (1/1000 em) for printable ASCII, from the
/// standard 14 font metrics
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A..M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N..Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a..m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n..z
    334, 260, 334, 584, // {..~
];

const HELVETICA_DEFAULT_WIDTH: u16 = 556;

/// Measures text with Helvetica metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct HelveticaMeasurer;

impl TextMeasurer for HelveticaMeasurer {
    fn line_width(&self, line: &str, font_size: f64) -> f64 {
        let units: u32 = line
            .chars()
            .map(|c| {
                let code = c as u32;
                if (32..127).contains(&code) {
                    HELVETICA_WIDTHS[(code - 32) as usize] as u32
                } else {
                    HELVETICA_DEFAULT_WIDTH as u32
                }
            })
            .sum();
        units as f64 * font_size / 1000.0
    }
}
