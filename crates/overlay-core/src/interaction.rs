//! Pointer and keyboard interaction state machine
//!
//! Turns raw pointer events into [`AnnotationStore`] mutations: selection,
//! drag-move, manual resize and text editing. Only one annotation is active
//! at a time, and only one gesture (drag, resize or text edit) can be in
//! progress.
//!
//! While a drag or resize is running the UI layer must listen for pointer
//! move/up globally, otherwise a fast drag that leaves the element is lost.
//! Those listeners are held as a [`ListenerGuard`] inside the gesture state,
//! so they are released exactly once on every exit path: pointer-up,
//! cancellation, deletion, reset, or the controller being dropped.

use crate::annotation::{AnnotationId, AnnotationPatch};
use crate::config::{InteractionConfig, TextMetricsConfig};
use crate::coords::{to_display, DisplayPoint, DisplayRect, ViewportPoint};
use crate::error::EditorError;
use crate::metrics::{estimate_text_box, TextBox, TextMeasurer};
use crate::store::AnnotationStore;
use std::fmt;

/// Registers the global pointer-move/pointer-up listeners used during a drag
pub trait PointerListeners {
    /// Register the listener pair. Dropping the returned guard deregisters it.
    fn attach(&self) -> ListenerGuard;
}

/// Scoped registration of global pointer listeners
pub struct ListenerGuard {
    release: Option<Box<dyn FnOnce()>>,
}

impl ListenerGuard {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release, for hosts without global listeners
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Listener registry for hosts that deliver every pointer event anyway
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListeners;

impl PointerListeners for NoopListeners {
    fn attach(&self) -> ListenerGuard {
        ListenerGuard::noop()
    }
}

/// A pointer event as delivered by the UI layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Page the pointer is over. Ignored for move/up during a gesture.
    pub page: u32,
    /// Pointer position relative to the page, in viewport pixels
    pub position: ViewportPoint,
    pub zoom: f64,
    /// The pointer landed on a focusable text input inside an annotation
    pub over_text_input: bool,
}

impl PointerEvent {
    pub fn new(page: u32, x: f64, y: f64, zoom: f64) -> Self {
        Self {
            page,
            position: ViewportPoint::new(x, y),
            zoom,
            over_text_input: false,
        }
    }

    pub fn on_text_input(mut self) -> Self {
        self.over_text_input = true;
        self
    }

    fn display_point(&self) -> DisplayPoint {
        to_display(self.position, self.zoom)
    }
}

/// An in-progress drag or resize
#[derive(Debug)]
pub struct Gesture {
    pub id: AnnotationId,
    pub origin_pointer: DisplayPoint,
    pub origin_geometry: DisplayRect,
    _listeners: ListenerGuard,
}

#[derive(Debug, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Selected(AnnotationId),
    Dragging(Gesture),
    Resizing(Gesture),
    EditingText(AnnotationId),
}

impl InteractionState {
    /// The annotation this state refers to, if any
    pub fn active_id(&self) -> Option<AnnotationId> {
        match self {
            InteractionState::Idle => None,
            InteractionState::Selected(id) | InteractionState::EditingText(id) => Some(*id),
            InteractionState::Dragging(g) | InteractionState::Resizing(g) => Some(g.id),
        }
    }

    pub fn is_gesture(&self) -> bool {
        matches!(
            self,
            InteractionState::Dragging(_) | InteractionState::Resizing(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            InteractionState::Idle => "idle",
            InteractionState::Selected(_) => "selected",
            InteractionState::Dragging(_) => "dragging",
            InteractionState::Resizing(_) => "resizing",
            InteractionState::EditingText(_) => "editing_text",
        }
    }
}

pub struct InteractionController<L: PointerListeners> {
    state: InteractionState,
    listeners: L,
    config: InteractionConfig,
    text_metrics: TextMetricsConfig,
    measurer: Box<dyn TextMeasurer>,
}

impl<L: PointerListeners> InteractionController<L> {
    pub fn new(
        listeners: L,
        config: InteractionConfig,
        text_metrics: TextMetricsConfig,
        measurer: Box<dyn TextMeasurer>,
    ) -> Self {
        Self {
            state: InteractionState::Idle,
            listeners,
            config,
            text_metrics,
            measurer,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn listeners(&self) -> &L {
        &self.listeners
    }

    fn transition(&mut self, next: InteractionState) {
        tracing::debug!(from = self.state.name(), to = next.name(), "interaction");
        // Replacing the state drops any gesture and releases its listeners
        self.state = next;
    }

    fn go_idle(&mut self, store: &mut AnnotationStore) {
        store.clear_selection();
        self.transition(InteractionState::Idle);
    }

    fn go_selected(&mut self, store: &mut AnnotationStore, id: AnnotationId) {
        if store.select(id).is_ok() {
            self.transition(InteractionState::Selected(id));
        } else {
            self.go_idle(store);
        }
    }

    /// Drop back to idle if the active annotation disappeared from the store
    fn reconcile(&mut self, store: &mut AnnotationStore) {
        if let Some(id) = self.state.active_id() {
            if !store.contains(id) {
                tracing::debug!(%id, "active annotation no longer exists");
                self.go_idle(store);
            }
        }
    }

    /// Topmost annotation on `page` under `point`
    fn hit_test(store: &AnnotationStore, page: u32, point: DisplayPoint) -> Option<AnnotationId> {
        store
            .list_for_page(page)
            .iter()
            .rev()
            .find(|a| a.rect.contains(point))
            .map(|a| a.id)
    }

    fn on_resize_handle(&self, rect: &DisplayRect, point: DisplayPoint) -> bool {
        let size = self.config.handle_size;
        point.x >= rect.x + rect.width - size
            && point.x <= rect.x + rect.width
            && point.y >= rect.y + rect.height - size
            && point.y <= rect.y + rect.height
    }

    fn begin_gesture(&self, id: AnnotationId, pointer: DisplayPoint, geometry: DisplayRect) -> Gesture {
        Gesture {
            id,
            origin_pointer: pointer,
            origin_geometry: geometry,
            _listeners: self.listeners.attach(),
        }
    }

    pub fn pointer_down(&mut self, store: &mut AnnotationStore, event: PointerEvent) {
        self.reconcile(store);

        // A second press while a drag is still held must not select anything
        if self.state.is_gesture() {
            tracing::debug!("pointer down ignored while a gesture is active");
            return;
        }

        let point = event.display_point();
        let Some(id) = Self::hit_test(store, event.page, point) else {
            self.go_idle(store);
            return;
        };

        if self.state.active_id() != Some(id) {
            self.go_selected(store, id);
            return;
        }

        let Some(rect) = store.get(id).map(|a| a.rect) else {
            self.go_idle(store);
            return;
        };

        if self.on_resize_handle(&rect, point) {
            let gesture = self.begin_gesture(id, point, rect);
            self.transition(InteractionState::Resizing(gesture));
        } else if event.over_text_input {
            // Clicks inside the text input belong to the input
        } else {
            let gesture = self.begin_gesture(id, point, rect);
            self.transition(InteractionState::Dragging(gesture));
        }
    }

    pub fn pointer_move(&mut self, store: &mut AnnotationStore, event: PointerEvent) {
        let point = event.display_point();
        let (id, patch) = match &self.state {
            InteractionState::Dragging(g) => {
                let x = g.origin_geometry.x + (point.x - g.origin_pointer.x);
                let y = g.origin_geometry.y + (point.y - g.origin_pointer.y);
                (g.id, AnnotationPatch::position(x.max(0.0), y.max(0.0)))
            }
            InteractionState::Resizing(g) => {
                let min = self.config.min_resize;
                let width = g.origin_geometry.width + (point.x - g.origin_pointer.x);
                let height = g.origin_geometry.height + (point.y - g.origin_pointer.y);
                let patch = AnnotationPatch {
                    manual_resize: Some(true),
                    ..AnnotationPatch::size(width.max(min), height.max(min))
                };
                (g.id, patch)
            }
            _ => return,
        };

        if store.update(id, &patch).is_err() {
            self.go_idle(store);
        }
    }

    pub fn pointer_up(&mut self, store: &mut AnnotationStore) {
        if let Some(id) = self.finished_gesture() {
            self.go_selected(store, id);
        }
    }

    /// End the current gesture from outside (pointer cancel, window blur,
    /// escape key). The annotation returns to where the gesture started; if
    /// it was deleted meanwhile the controller goes idle.
    pub fn cancel(&mut self, store: &mut AnnotationStore) {
        let origin = match &self.state {
            InteractionState::Dragging(g) | InteractionState::Resizing(g) => {
                Some((g.id, g.origin_geometry))
            }
            _ => None,
        };
        let Some((id, geometry)) = origin else {
            return;
        };
        match store.update(id, &AnnotationPatch::geometry(geometry)) {
            Ok(()) => self.go_selected(store, id),
            Err(e) => {
                tracing::debug!(%id, error = %e, "cancelled gesture target is gone");
                self.go_idle(store);
            }
        }
    }

    fn finished_gesture(&self) -> Option<AnnotationId> {
        match &self.state {
            InteractionState::Dragging(g) | InteractionState::Resizing(g) => Some(g.id),
            _ => None,
        }
    }

    /// Smallest box that fits `text` at `font_size`
    pub fn measure_text(&self, text: &str, font_size: f64) -> TextBox {
        estimate_text_box(self.measurer.as_ref(), &self.text_metrics, text, font_size)
    }

    /// The text input of `id` received focus
    pub fn focus_text(&mut self, store: &mut AnnotationStore, id: AnnotationId) -> Result<(), EditorError> {
        let annotation = store.get(id).ok_or(EditorError::NotFound(id))?;
        if !annotation.is_text() {
            return Ok(());
        }
        store.select(id)?;
        self.transition(InteractionState::EditingText(id));
        Ok(())
    }

    pub fn blur_text(&mut self, store: &mut AnnotationStore) {
        if let InteractionState::EditingText(id) = self.state {
            self.go_selected(store, id);
        }
    }

    /// Replace the content of a text annotation, auto-sizing the box unless
    /// it was resized by hand
    pub fn edit_text(
        &mut self,
        store: &mut AnnotationStore,
        id: AnnotationId,
        text: &str,
    ) -> Result<(), EditorError> {
        let annotation = store.get(id).ok_or(EditorError::NotFound(id))?;
        let Some(content) = annotation.as_text() else {
            return Ok(());
        };

        let mut patch = AnnotationPatch {
            text: Some(text.to_string()),
            ..AnnotationPatch::default()
        };
        if !content.manual_resize {
            let size = self.measure_text(text, content.font_size);
            patch.width = Some(size.width);
            patch.height = Some(size.height);
        }
        store.update(id, &patch)
    }

    /// Resize the box of a text annotation to fit its current content, unless
    /// it was resized by hand
    pub fn fit_text(&mut self, store: &mut AnnotationStore, id: AnnotationId) -> Result<(), EditorError> {
        let text = store
            .get(id)
            .ok_or(EditorError::NotFound(id))?
            .as_text()
            .map(|t| t.text.clone());
        match text {
            Some(text) => self.edit_text(store, id, &text),
            None => Ok(()),
        }
    }

    pub fn delete(
        &mut self,
        store: &mut AnnotationStore,
        id: AnnotationId,
    ) -> Result<crate::annotation::Annotation, EditorError> {
        let removed = store.remove(id)?;
        if self.state.active_id() == Some(id) {
            self.go_idle(store);
        }
        Ok(removed)
    }

    /// Tear down all interaction state, releasing any held listeners
    pub fn reset(&mut self, store: &mut AnnotationStore) {
        self.go_idle(store);
    }
}
