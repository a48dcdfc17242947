//! Delegated event listeners bound to lifecycle tokens.
//!
//! # Responsibility
//! - Let a feature react to events on any current or future element matching
//!   a selector, through one document-level listener.
//! - Drop every listener of an activation when its token is cancelled.
//!
//! # Invariants
//! - Capture listeners run before bubble listeners; registration order is
//!   kept within each phase.
//! - A listener whose token is cancelled is never invoked.
//! - A panicking handler is logged; later listeners still run.

use crate::dom::{NodeId, SharedDocument};
use crate::feature::error::panic_message;
use crate::lifecycle::LifecycleToken;
use crate::selector::{closest, Selector, SelectorSyntaxError};
use log::{debug, trace, warn};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// One dispatched event.
#[derive(Debug)]
pub struct Event {
    kind: String,
    target: NodeId,
    propagation_stopped: Cell<bool>,
    immediate_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
}

impl Event {
    pub fn new(kind: &str, target: NodeId) -> Self {
        Self {
            kind: kind.to_string(),
            target,
            propagation_stopped: Cell::new(false),
            immediate_stopped: Cell::new(false),
            default_prevented: Cell::new(false),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Skips listeners of the following phase.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    /// Skips every listener not yet invoked.
    pub fn stop_immediate_propagation(&self) {
        self.propagation_stopped.set(true);
        self.immediate_stopped.set(true);
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

/// Event as seen by a delegated handler.
pub struct DelegateEvent<'a> {
    pub event: &'a Event,
    /// Closest inclusive ancestor of the target matching the listener selector.
    pub delegate_target: NodeId,
    pub document: &'a SharedDocument,
}

pub type DelegateHandler = Rc<dyn Fn(&DelegateEvent<'_>)>;

#[derive(Debug, Clone)]
pub struct DelegateOptions {
    pub capture: bool,
    pub token: LifecycleToken,
}

impl DelegateOptions {
    pub fn new(token: &LifecycleToken) -> Self {
        Self {
            capture: false,
            token: token.clone(),
        }
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }
}

struct Listener {
    selector: Rc<Selector>,
    kind: String,
    capture: bool,
    handler: DelegateHandler,
    token: LifecycleToken,
}

#[derive(Default)]
struct DelegatorState {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

/// Document-level delegated listener table.
#[derive(Clone)]
pub struct EventDelegator {
    document: SharedDocument,
    state: Rc<RefCell<DelegatorState>>,
}

impl EventDelegator {
    pub fn new(document: SharedDocument) -> Self {
        Self {
            document,
            state: Rc::new(RefCell::new(DelegatorState::default())),
        }
    }

    /// Registers `handler` for `event_type` on elements matching `selector`.
    ///
    /// No-op when the token is already cancelled.
    pub fn delegate(
        &self,
        selector: &str,
        event_type: &str,
        handler: impl Fn(&DelegateEvent<'_>) + 'static,
        options: DelegateOptions,
    ) -> Result<(), SelectorSyntaxError> {
        let selector = Selector::parse(selector)?;
        let DelegateOptions { capture, token } = options;
        if token.is_cancelled() {
            return Ok(());
        }

        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.insert(
                id,
                Listener {
                    selector: Rc::new(selector),
                    kind: event_type.to_string(),
                    capture,
                    handler: Rc::new(handler),
                    token: token.clone(),
                },
            );
            id
        };
        debug!(
            "event=delegate_registered module=events owner={} type={} capture={}",
            token.label(),
            event_type,
            capture
        );

        let state: Weak<RefCell<DelegatorState>> = Rc::downgrade(&self.state);
        token.on_cancel(move || {
            if let Some(state) = state.upgrade() {
                if let Ok(mut state) = state.try_borrow_mut() {
                    state.listeners.remove(&id);
                }
            }
        });
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Live listeners registered under `token`.
    pub fn listeners_owned_by(&self, token: &LifecycleToken) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|listener| listener.token == *token)
            .count()
    }

    /// Dispatches `event` and returns how many handlers ran.
    ///
    /// Targets outside the connected document reach no listener.
    pub fn dispatch(&self, event: &Event) -> usize {
        self.state
            .borrow_mut()
            .listeners
            .retain(|_, listener| !listener.token.is_cancelled());
        if !self.document.borrow().is_connected(event.target) {
            return 0;
        }

        let mut invoked = 0;
        for capture_phase in [true, false] {
            if !capture_phase && event.propagation_stopped.get() {
                break;
            }
            let ids: Vec<u64> = self
                .state
                .borrow()
                .listeners
                .iter()
                .filter(|(_, listener)| listener.capture == capture_phase && listener.kind == event.kind)
                .map(|(id, _)| *id)
                .collect();

            for id in ids {
                if event.immediate_stopped.get() {
                    return invoked;
                }
                let Some((selector, handler, token)) = self.state.borrow().listeners.get(&id).map(
                    |listener| {
                        (
                            Rc::clone(&listener.selector),
                            Rc::clone(&listener.handler),
                            listener.token.clone(),
                        )
                    },
                ) else {
                    continue;
                };
                if token.is_cancelled() {
                    continue;
                }
                let delegate_target = {
                    let document = self.document.borrow();
                    closest(&document, event.target, &selector)
                };
                let Some(delegate_target) = delegate_target else {
                    continue;
                };
                trace!(
                    "event=delegate_invoked module=events owner={} type={}",
                    token.label(),
                    event.kind
                );
                let delegated = DelegateEvent {
                    event,
                    delegate_target,
                    document: &self.document,
                };
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&delegated))) {
                    warn!(
                        "event=delegate_handler module=events status=error owner={} type={} error={}",
                        token.label(),
                        event.kind,
                        panic_message(payload.as_ref())
                    );
                }
                invoked += 1;
            }
        }
        invoked
    }
}
