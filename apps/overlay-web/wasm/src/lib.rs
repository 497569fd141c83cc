//! WASM bindings for the overlay editor
//!
//! All editor state lives in Rust inside [`OverlayEditor`]. JavaScript renders
//! pages (PDF.js), draws the annotation boxes it gets from
//! `annotationsForPage`, and forwards pointer and input events.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { OverlayEditor } from './pkg/overlay_wasm.js';
//!
//! await init();
//!
//! const editor = new OverlayEditor(bytes);
//! editor.setDragHandlers(
//!     (e) => editor.pointerMove(page, e.offsetX, e.offsetY),
//!     () => editor.pointerUp(),
//! );
//! const id = editor.addText(0, 120, 80, "Hello");
//! const pdf = await editor.applyChanges();
//! ```

pub mod editor;
pub mod listeners;
pub mod measure;

use wasm_bindgen::prelude::*;

pub use editor::OverlayEditor;
pub use listeners::DomListeners;
pub use measure::CanvasMeasurer;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
