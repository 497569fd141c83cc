//! One editing session over one loaded document
//!
//! Holds everything the UI layer talks to: the source PDF, page sizes, the
//! annotation store, the interaction controller and the export gate. All
//! methods are synchronous except [`EditorSession::export`].

use crate::annotation::{AnnotationDraft, AnnotationId, AnnotationPatch, ImageFormat};
use crate::builder::PdfOutputBuilder;
use crate::compose::ComposeOptions;
use crate::config::EditorConfig;
use crate::coords::{clamp_zoom, to_display, DisplayRect, ViewportPoint};
use crate::document::{load_pages, MediaBoxRasterizer, PageRasterizer, PageSize, PageSizes, SourceDocument};
use crate::error::EditorError;
use crate::export::Exporter;
use crate::interaction::{InteractionController, InteractionState, PointerEvent, PointerListeners};
use crate::metrics::TextMeasurer;
use crate::store::AnnotationStore;
use std::future::Future;
use std::sync::Arc;

pub struct EditorSession<L: PointerListeners> {
    source: Arc<SourceDocument>,
    sizes: PageSizes,
    store: AnnotationStore,
    controller: InteractionController<L>,
    config: EditorConfig,
    exporter: Exporter,
    zoom: f64,
    transparent_text: bool,
}

impl<L: PointerListeners> EditorSession<L> {
    /// Load `bytes` and read page sizes from the page tree
    pub fn open(
        bytes: &[u8],
        listeners: L,
        measurer: Box<dyn TextMeasurer>,
        config: EditorConfig,
    ) -> Result<Self, EditorError> {
        let source = SourceDocument::load(bytes)?;
        Ok(Self::with_rasterizer(source, &MediaBoxRasterizer, listeners, measurer, config).0)
    }

    /// Start a session on an already loaded document, rendering every page
    /// once with `rasterizer`. Returns the rendered page images alongside.
    pub fn with_rasterizer<R: PageRasterizer>(
        source: SourceDocument,
        rasterizer: &R,
        listeners: L,
        measurer: Box<dyn TextMeasurer>,
        config: EditorConfig,
    ) -> (Self, Vec<Option<R::Image>>) {
        let loaded = load_pages(rasterizer, &source, 1.0);
        let controller = InteractionController::new(
            listeners,
            config.interaction.clone(),
            config.text_metrics.clone(),
            measurer,
        );
        let session = Self {
            store: AnnotationStore::new(source.page_count()),
            source: Arc::new(source),
            sizes: loaded.sizes,
            controller,
            transparent_text: config.transparent_text,
            config,
            exporter: Exporter::new(),
            zoom: 1.0,
        };
        (session, loaded.images)
    }

    pub fn page_count(&self) -> u32 {
        self.source.page_count()
    }

    pub fn page_size(&self, page: u32) -> Option<PageSize> {
        self.sizes.get(page)
    }

    /// Record a page size reported by the host's renderer
    pub fn set_page_size(&mut self, page: u32, size: PageSize) -> Result<(), EditorError> {
        self.sizes.set(page, size)
    }

    pub fn source(&self) -> &SourceDocument {
        &self.source
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn state(&self) -> &InteractionState {
        self.controller.state()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Set the view zoom, clamped to the configured range. Returns the zoom
    /// actually applied.
    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        self.zoom = clamp_zoom(zoom, self.config.zoom.min, self.config.zoom.max);
        self.zoom
    }

    pub fn transparent_text(&self) -> bool {
        self.transparent_text
    }

    pub fn set_transparent_text(&mut self, transparent: bool) {
        self.transparent_text = transparent;
    }

    /// Place a text annotation with its top-left corner at a viewport point.
    /// The box starts at the estimated size of `text` and takes focus.
    pub fn add_text(
        &mut self,
        page: u32,
        at: ViewportPoint,
        text: &str,
    ) -> Result<AnnotationId, EditorError> {
        let origin = to_display(at, self.zoom);
        let defaults = &self.config.defaults;
        let size = self.controller.measure_text(text, defaults.font_size);
        let draft = AnnotationDraft::text(
            DisplayRect::new(origin.x, origin.y, size.width, size.height),
            text,
            defaults.font_size,
            &defaults.color,
        );
        let id = self.store.add(page, draft)?;
        self.controller.focus_text(&mut self.store, id)?;
        Ok(id)
    }

    /// Place an image annotation at the default image size.
    ///
    /// The MIME type is only checked at export, where an unsupported one
    /// fails the export.
    pub fn add_image(
        &mut self,
        page: u32,
        at: ViewportPoint,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<AnnotationId, EditorError> {
        if let Err(e) = ImageFormat::from_mime(mime_type) {
            tracing::warn!(error = %e, "image will fail to export");
        }
        let origin = to_display(at, self.zoom);
        let defaults = &self.config.defaults;
        let draft = AnnotationDraft::image(
            DisplayRect::new(origin.x, origin.y, defaults.image_width, defaults.image_height),
            bytes,
            mime_type,
        );
        self.store.add(page, draft)
    }

    /// Apply a direct edit. A stale id is logged and ignored.
    pub fn update(&mut self, id: AnnotationId, patch: &AnnotationPatch) {
        let _ = self.store.update(id, patch);
    }

    /// Delete an annotation. A stale id is logged and ignored.
    pub fn delete(&mut self, id: AnnotationId) {
        let _ = self.controller.delete(&mut self.store, id);
    }

    /// Delete whatever is selected
    pub fn delete_selected(&mut self) {
        if let Some(id) = self.store.selection() {
            self.delete(id);
        }
    }

    fn event(&self, page: u32, x: f64, y: f64) -> PointerEvent {
        PointerEvent::new(page, x, y, self.zoom)
    }

    pub fn pointer_down(&mut self, page: u32, x: f64, y: f64, over_text_input: bool) {
        let mut event = self.event(page, x, y);
        event.over_text_input = over_text_input;
        self.controller.pointer_down(&mut self.store, event);
    }

    pub fn pointer_move(&mut self, page: u32, x: f64, y: f64) {
        let event = self.event(page, x, y);
        self.controller.pointer_move(&mut self.store, event);
    }

    pub fn pointer_up(&mut self) {
        self.controller.pointer_up(&mut self.store);
    }

    pub fn cancel_gesture(&mut self) {
        self.controller.cancel(&mut self.store);
    }

    pub fn focus_text(&mut self, id: AnnotationId) {
        let _ = self.controller.focus_text(&mut self.store, id);
    }

    pub fn blur_text(&mut self) {
        self.controller.blur_text(&mut self.store);
    }

    pub fn edit_text(&mut self, id: AnnotationId, text: &str) {
        let _ = self.controller.edit_text(&mut self.store, id, text);
    }

    /// Change the font size of a text annotation and refit its box
    pub fn set_font_size(&mut self, id: AnnotationId, font_size: f64) {
        let patch = AnnotationPatch {
            font_size: Some(font_size),
            ..AnnotationPatch::default()
        };
        if self.store.update(id, &patch).is_ok() {
            let _ = self.controller.fit_text(&mut self.store, id);
        }
    }

    /// Drop all interaction state, releasing any drag listeners
    pub fn reset_interaction(&mut self) {
        self.controller.reset(&mut self.store);
    }

    /// Serialize the annotations of this session
    pub fn save_annotations(&self) -> Result<String, EditorError> {
        self.store.to_json()
    }

    /// Replace all annotations with a saved set. The saved set must have been
    /// made for a document with the same page count.
    pub fn restore_annotations(&mut self, json: &str) -> Result<(), EditorError> {
        let store = AnnotationStore::from_json(json)?;
        if store.page_count() != self.page_count() {
            return Err(EditorError::PageCountMismatch {
                expected: self.page_count(),
                found: store.page_count(),
            });
        }
        self.controller.reset(&mut self.store);
        self.store = store;
        tracing::info!(annotations = self.store.len(), "annotations restored");
        Ok(())
    }

    pub fn is_exporting(&self) -> bool {
        self.exporter.is_busy()
    }

    /// Compose the current annotations into a new PDF.
    ///
    /// Works on a copy of the store taken now. Fails with
    /// [`EditorError::ExportInProgress`] if another export is pending.
    pub fn export(&self) -> impl Future<Output = Result<Vec<u8>, EditorError>> + 'static {
        let source = Arc::clone(&self.source);
        let options = ComposeOptions {
            transparent_text: self.transparent_text,
        };
        self.exporter.export(
            &self.store,
            &self.sizes,
            &self.config.text_metrics,
            options,
            move || PdfOutputBuilder::new(&source),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationKind;
    use crate::document::test_support::pdf_with_pages;
    use crate::interaction::NoopListeners;
    use crate::metrics::HelveticaMeasurer;
    use lopdf::Document;
    use pretty_assertions::assert_eq;

    fn session(pages: &[(i64, i64)]) -> EditorSession<NoopListeners> {
        EditorSession::open(
            &pdf_with_pages(pages),
            NoopListeners,
            Box::new(HelveticaMeasurer),
            EditorConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_reads_page_sizes() {
        let session = session(&[(612, 792), (595, 842)]);
        assert_eq!(session.page_count(), 2);
        assert_eq!(session.page_size(1), Some(PageSize::new(595.0, 842.0)));
        assert!(session.store().is_empty());
    }

    #[test]
    fn test_open_rejects_corrupt_bytes() {
        let result = EditorSession::open(
            b"%PDF-garbage",
            NoopListeners,
            Box::new(HelveticaMeasurer),
            EditorConfig::default(),
        );
        assert!(matches!(result, Err(EditorError::CorruptDocument(_))));
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut session = session(&[(612, 792)]);
        assert_eq!(session.set_zoom(5.0), 2.0);
        assert_eq!(session.set_zoom(0.1), 0.5);
        assert_eq!(session.set_zoom(f64::NAN), 1.0);
    }

    #[test]
    fn test_add_text_uses_estimated_size_and_focuses() {
        let mut session = session(&[(612, 792)]);
        session.set_zoom(2.0);
        let id = session
            .add_text(0, ViewportPoint::new(200.0, 100.0), "")
            .unwrap();

        let annotation = session.store().get(id).unwrap();
        // Viewport point divided by zoom, empty text gets the floor size
        assert_eq!(annotation.rect, DisplayRect::new(100.0, 50.0, 80.0, 30.0));
        assert_eq!(annotation.as_text().unwrap().font_size, 16.0);
        assert!(matches!(session.state(), InteractionState::EditingText(s) if *s == id));
    }

    #[test]
    fn test_add_to_invalid_page() {
        let mut session = session(&[(612, 792)]);
        assert!(matches!(
            session.add_text(3, ViewportPoint::new(0.0, 0.0), "x"),
            Err(EditorError::InvalidPage { page: 3, page_count: 1 })
        ));
    }

    #[test]
    fn test_add_image_keeps_unknown_mime() {
        let mut session = session(&[(612, 792)]);
        let id = session
            .add_image(0, ViewportPoint::new(10.0, 10.0), vec![1, 2], "image/gif")
            .unwrap();
        let annotation = session.store().get(id).unwrap();
        assert_eq!(annotation.rect, DisplayRect::new(10.0, 10.0, 150.0, 150.0));
        assert!(matches!(&annotation.kind, AnnotationKind::Image(i) if i.mime_type == "image/gif"));
    }

    #[test]
    fn test_stale_ids_are_ignored() {
        let mut session = session(&[(612, 792)]);
        let id = session
            .add_text(0, ViewportPoint::new(0.0, 0.0), "x")
            .unwrap();
        session.delete(id);
        session.delete(id);
        session.edit_text(id, "gone");
        session.update(id, &AnnotationPatch::position(5.0, 5.0));
        session.focus_text(id);
        assert!(session.store().is_empty());
        assert!(matches!(session.state(), InteractionState::Idle));
    }

    #[test]
    fn test_set_font_size_refits_box() {
        let mut session = session(&[(612, 792)]);
        let id = session
            .add_text(0, ViewportPoint::new(0.0, 0.0), "Some text to size")
            .unwrap();
        let before = session.store().get(id).unwrap().rect;
        session.set_font_size(id, 32.0);
        let after = session.store().get(id).unwrap().rect;
        assert!(after.width > before.width);
        assert!(after.height > before.height);
    }

    #[test]
    fn test_delete_selected() {
        let mut session = session(&[(612, 792)]);
        let id = session
            .add_text(0, ViewportPoint::new(10.0, 10.0), "x")
            .unwrap();
        session.blur_text();
        assert_eq!(session.store().selection(), Some(id));
        session.delete_selected();
        assert!(session.store().is_empty());
        assert!(matches!(session.state(), InteractionState::Idle));
    }

    #[test]
    fn test_drag_through_session_uses_zoom() {
        let mut session = session(&[(612, 792)]);
        let id = session
            .add_text(0, ViewportPoint::new(100.0, 100.0), "drag me")
            .unwrap();
        session.blur_text();
        session.set_zoom(2.0);

        // Box origin is display (100, 100), viewport (200, 200) at zoom 2
        session.pointer_down(0, 210.0, 210.0, false);
        assert!(matches!(session.state(), InteractionState::Dragging(_)));
        session.pointer_move(0, 250.0, 230.0);
        session.pointer_up();

        let rect = session.store().get(id).unwrap().rect;
        assert_eq!((rect.x, rect.y), (120.0, 110.0));
    }

    #[test]
    fn test_restore_annotations() {
        let mut source = session(&[(612, 792), (612, 792)]);
        let id = source
            .add_text(1, ViewportPoint::new(10.0, 10.0), "saved")
            .unwrap();
        let json = source.save_annotations().unwrap();

        let mut target = session(&[(612, 792), (612, 792)]);
        target.restore_annotations(&json).unwrap();
        assert_eq!(target.store().list_for_page(1)[0].id, id);

        let mut wrong = session(&[(612, 792)]);
        let err = wrong.restore_annotations(&json).unwrap_err();
        assert_eq!(
            err,
            EditorError::PageCountMismatch {
                expected: 1,
                found: 2
            }
        );
        assert!(err.is_fatal());
        assert!(wrong.store().is_empty());
    }

    #[tokio::test]
    async fn test_export_produces_loadable_pdf() {
        let mut session = session(&[(612, 792), (612, 792)]);
        session
            .add_text(1, ViewportPoint::new(72.0, 72.0), "Hello")
            .unwrap();
        let bytes = session.export().await.unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        assert!(!session.is_exporting());
    }

    fn png_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, 3, 2);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[40u8; 3 * 2 * 4]).unwrap();
        }
        out
    }

    fn jpeg_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 4, image::Rgb([10, 120, 200])))
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Jpeg)
            .unwrap();
        out
    }

    #[tokio::test]
    async fn test_export_is_deterministic() {
        let mut session = session(&[(612, 792)]);
        session
            .add_text(0, ViewportPoint::new(72.0, 72.0), "Same")
            .unwrap();
        session
            .add_image(0, ViewportPoint::new(200.0, 300.0), png_bytes(), "image/png")
            .unwrap();
        session
            .add_image(0, ViewportPoint::new(300.0, 400.0), jpeg_bytes(), "image/jpeg")
            .unwrap();
        let first = session.export().await.unwrap();
        let second = session.export().await.unwrap();
        assert_eq!(first, second);

        let doc = Document::load_mem(&first).unwrap();
        let page_id = doc.get_pages()[&1];
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert_eq!(xobjects.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_page_size_fails_export() {
        let mut session = session(&[(612, 792)]);
        session.sizes = PageSizes::new(1);
        assert_eq!(
            session.export().await,
            Err(EditorError::MissingPageSize(0))
        );
        session.set_page_size(0, PageSize::new(612.0, 792.0)).unwrap();
        assert!(session.export().await.is_ok());
    }
}
