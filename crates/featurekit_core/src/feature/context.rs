//! Per-activation handle passed to feature setup.

use crate::dom::{NodeId, SharedDocument};
use crate::events::{DelegateEvent, DelegateOptions, EventDelegator};
use crate::feature::error::{panic_message, ActivationFailure, BoxError, FeatureActivationError};
use crate::lifecycle::LifecycleToken;
use crate::observer::{element_ready, ElementReady, ObserveError, ObserveOptions, ObserverEngine};
use crate::page::PageContext;
use crate::selector::SelectorSyntaxError;
use futures::executor::LocalSpawner;
use futures::future::{select, Either};
use futures::task::LocalSpawnExt;
use futures::FutureExt;
use log::{debug, warn};
use std::cell::RefCell;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Async failures waiting to be settled by the registry.
#[derive(Clone, Default)]
pub(crate) struct FailureInbox(Rc<RefCell<Vec<FeatureActivationError>>>);

impl FailureInbox {
    pub(crate) fn report(&self, error: FeatureActivationError) {
        self.0.borrow_mut().push(error);
    }

    pub(crate) fn drain(&self) -> Vec<FeatureActivationError> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// Engine services shared by every activation.
#[derive(Clone)]
pub struct FeatureServices {
    pub observer: ObserverEngine,
    pub events: EventDelegator,
    pub spawner: LocalSpawner,
}

/// Everything one activation may touch, keyed to its lifecycle token.
#[derive(Clone)]
pub struct FeatureContext {
    feature_id: Rc<str>,
    token: LifecycleToken,
    page: PageContext,
    services: FeatureServices,
    failures: FailureInbox,
}

impl FeatureContext {
    pub(crate) fn new(
        feature_id: &str,
        token: LifecycleToken,
        page: PageContext,
        services: FeatureServices,
        failures: FailureInbox,
    ) -> Self {
        Self {
            feature_id: Rc::from(feature_id),
            token,
            page,
            services,
            failures,
        }
    }

    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }

    pub fn token(&self) -> &LifecycleToken {
        &self.token
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn document(&self) -> &SharedDocument {
        self.services.observer.document()
    }

    pub fn observer(&self) -> &ObserverEngine {
        &self.services.observer
    }

    pub fn events(&self) -> &EventDelegator {
        &self.services.events
    }

    /// Observes `selector` across the whole document for this activation.
    ///
    /// A panic in `callback` abandons this activation at the next runtime
    /// tick; other registrations keep receiving the batch.
    pub fn observe(
        &self,
        selector: &str,
        callback: impl Fn(&SharedDocument, NodeId) + 'static,
    ) -> Result<(), ObserveError> {
        self.services.observer.observe(
            selector,
            self.guard_callback(callback),
            ObserveOptions::new(&self.token),
        )?;
        Ok(())
    }

    /// Observes `selector` below `root` for this activation.
    pub fn observe_in(
        &self,
        root: NodeId,
        selector: &str,
        callback: impl Fn(&SharedDocument, NodeId) + 'static,
    ) -> Result<(), ObserveError> {
        self.services.observer.observe(
            selector,
            self.guard_callback(callback),
            ObserveOptions::new(&self.token).root(root),
        )?;
        Ok(())
    }

    /// Delegated bubble-phase listener for this activation.
    pub fn delegate(
        &self,
        selector: &str,
        event_type: &str,
        handler: impl Fn(&DelegateEvent<'_>) + 'static,
    ) -> Result<(), SelectorSyntaxError> {
        self.services.events.delegate(
            selector,
            event_type,
            self.guard_handler(handler),
            DelegateOptions::new(&self.token),
        )
    }

    /// Delegated capture-phase listener for this activation.
    pub fn delegate_capture(
        &self,
        selector: &str,
        event_type: &str,
        handler: impl Fn(&DelegateEvent<'_>) + 'static,
    ) -> Result<(), SelectorSyntaxError> {
        self.services.events.delegate(
            selector,
            event_type,
            self.guard_handler(handler),
            DelegateOptions::new(&self.token).capture(),
        )
    }

    /// First element matching `selector`, or `None` once deactivated.
    pub fn element_ready(&self, selector: &str) -> Result<ElementReady, ObserveError> {
        element_ready(
            &self.services.observer,
            selector,
            ObserveOptions::new(&self.token),
        )
    }

    /// Runs `work` on the page's task queue to completion.
    ///
    /// An error result or a panic abandons this activation at the next
    /// runtime tick.
    pub fn spawn(&self, work: impl Future<Output = Result<(), BoxError>> + 'static) {
        let report = self.reporter();
        self.spawn_task(async move {
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => report(ActivationFailure::Rejected(err.to_string())),
                Err(payload) => report(ActivationFailure::Faulted(panic_message(payload.as_ref()))),
            }
        });
    }

    /// Like [`FeatureContext::spawn`], but `work` is dropped unfinished when
    /// the activation is cancelled.
    pub fn spawn_cancellable(&self, work: impl Future<Output = Result<(), BoxError>> + 'static) {
        let report = self.reporter();
        let cancelled = self.token.cancelled();
        let feature_id = Rc::clone(&self.feature_id);
        let work = AssertUnwindSafe(work).catch_unwind();
        self.spawn_task(async move {
            // Cancellation is polled first so work woken by the same
            // teardown never resumes.
            match select(Box::pin(cancelled), Box::pin(work)).await {
                Either::Left(_) => {
                    debug!(
                        "event=task_aborted module=feature feature={} reason=deactivated",
                        feature_id
                    );
                }
                Either::Right((Ok(Ok(())), _)) => {}
                Either::Right((Ok(Err(err)), _)) => {
                    report(ActivationFailure::Rejected(err.to_string()))
                }
                Either::Right((Err(payload), _)) => {
                    report(ActivationFailure::Faulted(panic_message(payload.as_ref())))
                }
            }
        });
    }

    fn reporter(&self) -> impl Fn(ActivationFailure) + 'static {
        let failures = self.failures.clone();
        let feature_id = Rc::clone(&self.feature_id);
        let activation = self.token.id();
        move |failure: ActivationFailure| {
            warn!(
                "event=feature_fault module=feature status=error feature={} activation={} error={}",
                feature_id, activation, failure
            );
            failures.report(FeatureActivationError {
                feature_id: feature_id.to_string(),
                activation,
                failure,
            });
        }
    }

    fn guard_callback(
        &self,
        callback: impl Fn(&SharedDocument, NodeId) + 'static,
    ) -> impl Fn(&SharedDocument, NodeId) + 'static {
        let report = self.reporter();
        move |document: &SharedDocument, node: NodeId| {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(document, node))) {
                report(ActivationFailure::Faulted(panic_message(payload.as_ref())));
            }
        }
    }

    fn guard_handler(
        &self,
        handler: impl Fn(&DelegateEvent<'_>) + 'static,
    ) -> impl Fn(&DelegateEvent<'_>) + 'static {
        let report = self.reporter();
        move |event: &DelegateEvent<'_>| {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                report(ActivationFailure::Faulted(panic_message(payload.as_ref())));
            }
        }
    }

    fn spawn_task(&self, task: impl Future<Output = ()> + 'static) {
        if let Err(err) = self.services.spawner.spawn_local(task) {
            warn!(
                "event=spawn_failed module=feature feature={} error={}",
                self.feature_id, err
            );
        }
    }
}
