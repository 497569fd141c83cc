//! Stateful editor handle exposed to JavaScript

use crate::listeners::DomListeners;
use crate::measure::best_measurer;
use base64::Engine;
use overlay_core::{
    AnnotationId, AnnotationKind, AnnotationPatch, EditorConfig, EditorError, EditorSession,
    PageSize, ViewportPoint,
};
use wasm_bindgen::prelude::*;

fn to_js(e: EditorError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_id(id: &str) -> Result<AnnotationId, JsValue> {
    id.parse()
        .map_err(|_| JsValue::from_str(&format!("Invalid annotation id: {id}")))
}

/// `data:` URL for showing an image annotation in an `<img>`
fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[wasm_bindgen]
pub struct OverlayEditor {
    session: EditorSession<DomListeners>,
    listeners: DomListeners,
}

#[wasm_bindgen]
impl OverlayEditor {
    /// Open a PDF. `config_json` is an optional `EditorConfig` as JSON.
    #[wasm_bindgen(constructor)]
    pub fn new(bytes: &[u8], config_json: Option<String>) -> Result<OverlayEditor, JsValue> {
        let config = match config_json {
            Some(json) => EditorConfig::from_json(&json).map_err(to_js)?,
            None => EditorConfig::default(),
        };
        let listeners = DomListeners::new();
        let session = EditorSession::open(bytes, listeners.clone(), best_measurer(), config)
            .map_err(to_js)?;
        Ok(Self { session, listeners })
    }

    /// Register the handlers that receive window pointer events during a drag
    #[wasm_bindgen(js_name = setDragHandlers)]
    pub fn set_drag_handlers(&self, on_move: js_sys::Function, on_up: js_sys::Function) {
        self.listeners.set_handlers(on_move, on_up);
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.session.page_count()
    }

    /// Record the page size reported by the page renderer, in points, as
    /// displayed. The MediaBox origin and rotation read at load are kept.
    #[wasm_bindgen(js_name = setPageSize)]
    pub fn set_page_size(&mut self, page: u32, width: f64, height: f64) -> Result<(), JsValue> {
        let size = match self.session.page_size(page) {
            Some(known) => PageSize {
                width,
                height,
                ..known
            },
            None => PageSize::new(width, height),
        };
        self.session.set_page_size(page, size).map_err(to_js)
    }

    /// Page size as `{ width, height, offset_x, offset_y, rotation }`, or undefined
    #[wasm_bindgen(js_name = getPageSize)]
    pub fn get_page_size(&self, page: u32) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.session.page_size(page))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    #[wasm_bindgen(getter)]
    pub fn zoom(&self) -> f64 {
        self.session.zoom()
    }

    /// Returns the zoom actually applied after clamping
    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        self.session.set_zoom(zoom)
    }

    #[wasm_bindgen(getter, js_name = transparentText)]
    pub fn transparent_text(&self) -> bool {
        self.session.transparent_text()
    }

    #[wasm_bindgen(setter, js_name = transparentText)]
    pub fn set_transparent_text(&mut self, transparent: bool) {
        self.session.set_transparent_text(transparent);
    }

    /// Place a text box at a viewport point. Returns its id.
    #[wasm_bindgen(js_name = addText)]
    pub fn add_text(&mut self, page: u32, x: f64, y: f64, text: &str) -> Result<String, JsValue> {
        self.session
            .add_text(page, ViewportPoint::new(x, y), text)
            .map(|id| id.to_string())
            .map_err(to_js)
    }

    /// Place an image at a viewport point. Returns its id.
    #[wasm_bindgen(js_name = addImage)]
    pub fn add_image(
        &mut self,
        page: u32,
        x: f64,
        y: f64,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, JsValue> {
        self.session
            .add_image(page, ViewportPoint::new(x, y), bytes, mime_type)
            .map(|id| id.to_string())
            .map_err(to_js)
    }

    /// Annotations on `page` in draw order. Image bytes are base64 strings.
    #[wasm_bindgen(js_name = annotationsForPage)]
    pub fn annotations_for_page(&self, page: u32) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.session.store().list_for_page(page))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    #[wasm_bindgen(js_name = imageDataUrl)]
    pub fn image_data_url(&self, id: &str) -> Result<Option<String>, JsValue> {
        let id = parse_id(id)?;
        Ok(self
            .session
            .store()
            .get(id)
            .and_then(|annotation| match &annotation.kind {
                AnnotationKind::Image(image) => {
                    Some(data_url(&image.mime_type, &image.source_bytes))
                }
                AnnotationKind::Text(_) => None,
            }))
    }

    #[wasm_bindgen(getter)]
    pub fn selection(&self) -> Option<String> {
        self.session.store().selection().map(|id| id.to_string())
    }

    /// Current interaction state: idle, selected, dragging, resizing or editing_text
    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.session.state().name().to_string()
    }

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&mut self, page: u32, x: f64, y: f64, over_text_input: bool) {
        self.session.pointer_down(page, x, y, over_text_input);
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&mut self, page: u32, x: f64, y: f64) {
        self.session.pointer_move(page, x, y);
    }

    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&mut self) {
        self.session.pointer_up();
    }

    /// Abort a drag or resize (escape key, pointercancel, window blur)
    #[wasm_bindgen(js_name = cancelGesture)]
    pub fn cancel_gesture(&mut self) {
        self.session.cancel_gesture();
    }

    #[wasm_bindgen(js_name = focusText)]
    pub fn focus_text(&mut self, id: &str) -> Result<(), JsValue> {
        self.session.focus_text(parse_id(id)?);
        Ok(())
    }

    #[wasm_bindgen(js_name = blurText)]
    pub fn blur_text(&mut self) {
        self.session.blur_text();
    }

    #[wasm_bindgen(js_name = editText)]
    pub fn edit_text(&mut self, id: &str, text: &str) -> Result<(), JsValue> {
        self.session.edit_text(parse_id(id)?, text);
        Ok(())
    }

    #[wasm_bindgen(js_name = setFontSize)]
    pub fn set_font_size(&mut self, id: &str, font_size: f64) -> Result<(), JsValue> {
        self.session.set_font_size(parse_id(id)?, font_size);
        Ok(())
    }

    #[wasm_bindgen(js_name = setColor)]
    pub fn set_color(&mut self, id: &str, color: &str) -> Result<(), JsValue> {
        let patch = AnnotationPatch {
            color: Some(color.to_string()),
            ..AnnotationPatch::default()
        };
        self.session.update(parse_id(id)?, &patch);
        Ok(())
    }

    #[wasm_bindgen(js_name = deleteAnnotation)]
    pub fn delete_annotation(&mut self, id: &str) -> Result<(), JsValue> {
        self.session.delete(parse_id(id)?);
        Ok(())
    }

    #[wasm_bindgen(js_name = deleteSelected)]
    pub fn delete_selected(&mut self) {
        self.session.delete_selected();
    }

    #[wasm_bindgen(js_name = saveAnnotations)]
    pub fn save_annotations(&self) -> Result<String, JsValue> {
        self.session.save_annotations().map_err(to_js)
    }

    #[wasm_bindgen(js_name = restoreAnnotations)]
    pub fn restore_annotations(&mut self, json: &str) -> Result<(), JsValue> {
        self.session.restore_annotations(json).map_err(to_js)
    }

    #[wasm_bindgen(getter, js_name = isExporting)]
    pub fn is_exporting(&self) -> bool {
        self.session.is_exporting()
    }

    /// Compose the annotations into a new PDF.
    /// Resolves to a `Uint8Array`; rejects while another export is running.
    #[wasm_bindgen(js_name = applyChanges)]
    pub fn apply_changes(&self) -> js_sys::Promise {
        let pending = self.session.export();
        wasm_bindgen_futures::future_to_promise(async move {
            let bytes = pending.await.map_err(to_js)?;
            Ok(js_sys::Uint8Array::from(bytes.as_slice()).into())
        })
    }
}
