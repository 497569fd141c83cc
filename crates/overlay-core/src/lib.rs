//! overlay-core: text and image overlays for PDF pages
//!
//! Users place, drag, resize and edit overlays on top of rendered pages; the
//! engine keeps those overlays in display-pixel space and bakes them into
//! the page content of a new PDF on export.
//!
//! - [`coords`]: viewport / display / document coordinate conversion
//! - [`store`]: per-page annotation records
//! - [`metrics`]: text box size estimation
//! - [`interaction`]: pointer state machine (select, drag, resize, edit)
//! - [`compose`] and [`builder`]: export into PDF bytes via lopdf
//! - [`export`]: single-flight async export
//! - [`session`]: everything above bundled for one open document

pub mod annotation;
pub mod builder;
pub mod compose;
pub mod config;
pub mod coords;
pub mod document;
pub mod error;
pub mod export;
pub mod interaction;
pub mod metrics;
pub mod session;
pub mod store;

pub use annotation::{
    Annotation, AnnotationDraft, AnnotationId, AnnotationKind, AnnotationPatch, ImageAnnotation,
    ImageFormat, TextAnnotation,
};
pub use builder::PdfOutputBuilder;
pub use compose::{ComposeOptions, Composer, OutputBuilder, TextDraw};
pub use config::EditorConfig;
pub use coords::{DisplayPoint, DisplayRect, DocumentPoint, DocumentRect, ViewportPoint};
pub use document::{MediaBoxRasterizer, PageRasterizer, PageSize, PageSizes, SourceDocument};
pub use error::EditorError;
pub use export::Exporter;
pub use interaction::{
    InteractionController, InteractionState, ListenerGuard, NoopListeners, PointerEvent,
    PointerListeners,
};
pub use metrics::{HelveticaMeasurer, TextBox, TextMeasurer};
pub use session::EditorSession;
pub use store::AnnotationStore;
