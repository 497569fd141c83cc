//! Single-flight export
//!
//! Exporting is the only asynchronous operation in the engine. At most one
//! export runs at a time; a second request while one is pending fails with
//! [`EditorError::ExportInProgress`]. The store and page sizes are copied
//! when the export starts, so the live store can keep changing while the
//! export is pending and is never written by it.

use crate::compose::{ComposeOptions, Composer, OutputBuilder};
use crate::config::TextMetricsConfig;
use crate::document::PageSizes;
use crate::error::EditorError;
use crate::store::AnnotationStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::Instrument;

#[derive(Debug, Clone, Default)]
pub struct Exporter {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one export. Dropping it, including by dropping
/// a pending export future, lets the next export start.
#[derive(Debug)]
pub struct ExportTicket {
    busy: Arc<AtomicBool>,
}

impl Drop for ExportTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn begin(&self) -> Result<ExportTicket, EditorError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EditorError::ExportInProgress)?;
        Ok(ExportTicket {
            busy: Arc::clone(&self.busy),
        })
    }

    /// Compose `store` into a fresh builder from `make_builder`.
    ///
    /// The ticket is taken immediately, not on first poll, so a rejected
    /// export is visible before anything is awaited.
    pub fn export<B, F>(
        &self,
        store: &AnnotationStore,
        sizes: &PageSizes,
        text_metrics: &TextMetricsConfig,
        options: ComposeOptions,
        make_builder: F,
    ) -> impl Future<Output = Result<Vec<u8>, EditorError>> + 'static
    where
        B: OutputBuilder + 'static,
        F: FnOnce() -> B + 'static,
    {
        let ticket = self.begin();
        let store = store.clone();
        let sizes = sizes.clone();
        let text_metrics = text_metrics.clone();
        let span = tracing::info_span!(
            "export",
            pages = store.page_count(),
            annotations = store.len(),
            transparent = options.transparent_text,
        );

        async move {
            let _ticket = match ticket {
                Ok(ticket) => ticket,
                Err(e) => {
                    tracing::warn!("export requested while another is running");
                    return Err(e);
                }
            };

            // Let the host repaint before the blocking compose
            YieldNow::default().await;

            let composer = Composer::new(&sizes, &text_metrics, options);
            match composer.compose(&store, make_builder()) {
                Ok(bytes) => {
                    tracing::info!(bytes = bytes.len(), "export finished");
                    Ok(bytes)
                }
                Err(e) => {
                    tracing::error!(error = %e, "export failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
    }
}

/// Returns `Pending` once, then `Ready`
#[derive(Debug, Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
