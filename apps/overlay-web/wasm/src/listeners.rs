//! Window-level pointer listeners for drag and resize
//!
//! JavaScript hands over its move/up handlers once; every gesture registers
//! them on `window` and the returned guard removes them again.

use overlay_core::{ListenerGuard, PointerListeners};
use std::cell::RefCell;
use std::rc::Rc;

const MOVE_EVENT: &str = "pointermove";
const UP_EVENT: &str = "pointerup";

#[derive(Debug, Clone)]
struct Handlers {
    on_move: js_sys::Function,
    on_up: js_sys::Function,
}

#[derive(Debug, Clone, Default)]
pub struct DomListeners {
    handlers: Rc<RefCell<Option<Handlers>>>,
}

impl DomListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_handlers(&self, on_move: js_sys::Function, on_up: js_sys::Function) {
        *self.handlers.borrow_mut() = Some(Handlers { on_move, on_up });
    }

    pub fn has_handlers(&self) -> bool {
        self.handlers.borrow().is_some()
    }
}

impl PointerListeners for DomListeners {
    fn attach(&self) -> ListenerGuard {
        let Some(handlers) = self.handlers.borrow().clone() else {
            return ListenerGuard::noop();
        };
        let Some(window) = web_sys::window() else {
            return ListenerGuard::noop();
        };

        let added = window
            .add_event_listener_with_callback(MOVE_EVENT, &handlers.on_move)
            .and_then(|_| window.add_event_listener_with_callback(UP_EVENT, &handlers.on_up));
        if let Err(e) = added {
            web_sys::console::warn_2(&"failed to register drag listeners".into(), &e);
        }

        ListenerGuard::new(move || {
            // Removing a listener that was never added is a no-op
            let _ = window.remove_event_listener_with_callback(MOVE_EVENT, &handlers.on_move);
            let _ = window.remove_event_listener_with_callback(UP_EVENT, &handlers.on_up);
        })
    }
}
