//! Selector observation over a continuously mutating document.
//!
//! # Responsibility
//! - Fan one mutation subscription per root out to any number of
//!   `(selector, callback, token)` registrations.
//! - Notify each registration once per matching element: first for elements
//!   already present, then for elements discovered in delivered batches.
//!
//! # Invariants
//! - A registration's callback fires at most once per node identity.
//! - No callback runs for a registration whose token is cancelled, including
//!   the remainder of a batch already being processed.
//! - Within one batch a registration sees its matches in document order.
//! - No `Document` or engine borrow is held while feature callbacks run.
//! - A panicking callback is logged and skipped; the rest of the batch still
//!   reaches every other registration.

use crate::dom::{Document, MutationRecord, NodeId, SharedDocument};
use crate::feature::error::panic_message;
use crate::lifecycle::{CancelHookId, LifecycleToken};
use crate::selector::{Selector, SelectorSyntaxError};
use log::{debug, trace, warn};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// Callback invoked with the shared document and the matched element.
pub type ObserveCallback = Rc<dyn Fn(&SharedDocument, NodeId)>;

/// Handle of one registration inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(u64);

/// Registration options: lifetime token and optional subtree root.
#[derive(Debug, Clone)]
pub struct ObserveOptions {
    pub root: Option<NodeId>,
    pub token: LifecycleToken,
}

impl ObserveOptions {
    pub fn new(token: &LifecycleToken) -> Self {
        Self {
            root: None,
            token: token.clone(),
        }
    }

    pub fn root(mut self, root: NodeId) -> Self {
        self.root = Some(root);
        self
    }
}

/// Per-call delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub batches: usize,
    pub records: usize,
    pub notified: usize,
    pub dropped_stale: usize,
    /// Callbacks that panicked. Counted in `notified` as well.
    pub panicked: usize,
}

impl DeliveryStats {
    pub fn is_idle(&self) -> bool {
        self.batches == 0
    }

    pub fn merge(&mut self, other: DeliveryStats) {
        self.batches += other.batches;
        self.records += other.records;
        self.notified += other.notified;
        self.dropped_stale += other.dropped_stale;
        self.panicked += other.panicked;
    }
}

/// Observation errors surfaced to the registering feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserveError {
    InvalidSelector(SelectorSyntaxError),
    UnknownRoot(NodeId),
}

impl Display for ObserveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSelector(err) => write!(f, "{err}"),
            Self::UnknownRoot(root) => write!(f, "observation root does not exist: {root}"),
        }
    }
}

impl Error for ObserveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidSelector(err) => Some(err),
            Self::UnknownRoot(_) => None,
        }
    }
}

impl From<SelectorSyntaxError> for ObserveError {
    fn from(err: SelectorSyntaxError) -> Self {
        Self::InvalidSelector(err)
    }
}

struct Registration {
    root: NodeId,
    selector: Rc<Selector>,
    callback: ObserveCallback,
    token: LifecycleToken,
    hook: CancelHookId,
    notified: HashSet<NodeId>,
}

#[derive(Default)]
struct EngineState {
    next_id: u64,
    registrations: BTreeMap<RegistrationId, Registration>,
    /// Roots whose subscriber count could not be dropped while the document
    /// was borrowed; settled at the next delivery.
    pending_unsubscribe: Vec<NodeId>,
}

/// Shared observer engine. Clones refer to the same registrations.
#[derive(Clone)]
pub struct ObserverEngine {
    document: SharedDocument,
    state: Rc<RefCell<EngineState>>,
}

struct WeakEngine {
    document: Weak<RefCell<Document>>,
    state: Weak<RefCell<EngineState>>,
}

impl WeakEngine {
    fn upgrade(&self) -> Option<ObserverEngine> {
        Some(ObserverEngine {
            document: self.document.upgrade()?,
            state: self.state.upgrade()?,
        })
    }
}

impl ObserverEngine {
    pub fn new(document: SharedDocument) -> Self {
        Self {
            document,
            state: Rc::new(RefCell::new(EngineState::default())),
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    fn downgrade(&self) -> WeakEngine {
        WeakEngine {
            document: Rc::downgrade(&self.document),
            state: Rc::downgrade(&self.state),
        }
    }

    /// Watches `selector` under `options.root` (default: whole document).
    ///
    /// Existing matches are reported synchronously before this returns. The
    /// selector is validated even when the token is already cancelled; in
    /// that case nothing is registered.
    pub fn observe(
        &self,
        selector: &str,
        callback: impl Fn(&SharedDocument, NodeId) + 'static,
        options: ObserveOptions,
    ) -> Result<Option<RegistrationId>, ObserveError> {
        let selector = Selector::parse(selector)?;
        self.observe_selector(selector, Rc::new(callback), options)
    }

    /// [`ObserverEngine::observe`] with an already parsed selector.
    pub fn observe_selector(
        &self,
        selector: Selector,
        callback: ObserveCallback,
        options: ObserveOptions,
    ) -> Result<Option<RegistrationId>, ObserveError> {
        let ObserveOptions { root, token } = options;
        if token.is_cancelled() {
            debug!(
                "event=observe_skipped module=observer reason=token_cancelled owner={} selector={}",
                token.label(),
                selector
            );
            return Ok(None);
        }

        let root = root.unwrap_or(NodeId::DOCUMENT);
        self.document
            .borrow_mut()
            .observe_root(root)
            .map_err(|_| ObserveError::UnknownRoot(root))?;
        let existing: Vec<NodeId> = {
            let document = self.document.borrow();
            selector.find_all(&document, root).collect()
        };

        let id = {
            let mut state = self.state.borrow_mut();
            let id = RegistrationId(state.next_id);
            state.next_id += 1;
            let engine = self.downgrade();
            let hook = token.on_cancel(move || {
                if let Some(engine) = engine.upgrade() {
                    engine.release(id);
                }
            });
            debug!(
                "event=observe_registered module=observer owner={} selector={} root={} existing={}",
                token.label(),
                selector,
                root,
                existing.len()
            );
            state.registrations.insert(
                id,
                Registration {
                    root,
                    selector: Rc::new(selector),
                    callback: Rc::clone(&callback),
                    token: token.clone(),
                    hook,
                    notified: existing.iter().copied().collect(),
                },
            );
            id
        };

        for (index, node) in existing.iter().enumerate() {
            if token.is_cancelled() {
                drop_stale(&token, existing.len() - index);
                break;
            }
            // An earlier callback may have detached this match.
            if !self.document.borrow().contains(root, *node) {
                continue;
            }
            invoke(&callback, &self.document, *node, &token);
        }
        Ok(Some(id))
    }

    /// Removes one registration explicitly.
    pub fn unregister(&self, id: RegistrationId) -> bool {
        self.release(id)
    }

    pub fn registration_count(&self) -> usize {
        self.state.borrow().registrations.len()
    }

    /// Live registrations created under `token`.
    pub fn registrations_owned_by(&self, token: &LifecycleToken) -> usize {
        self.state
            .borrow()
            .registrations
            .values()
            .filter(|registration| registration.token == *token)
            .count()
    }

    fn release(&self, id: RegistrationId) -> bool {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            // Pruned at the next delivery through the cancelled token.
            return false;
        };
        let Some(registration) = state.registrations.remove(&id) else {
            return false;
        };
        registration.token.remove_hook(registration.hook);
        match self.document.try_borrow_mut() {
            Ok(mut document) => {
                if document.unobserve_root(registration.root) {
                    debug!(
                        "event=subscription_closed module=observer root={}",
                        registration.root
                    );
                }
            }
            Err(_) => state.pending_unsubscribe.push(registration.root),
        }
        trace!(
            "event=observe_released module=observer owner={} selector={}",
            registration.token.label(),
            registration.selector
        );
        true
    }

    fn prune(&self) {
        let roots: Vec<NodeId> = {
            let mut state = self.state.borrow_mut();
            let dead: Vec<RegistrationId> = state
                .registrations
                .iter()
                .filter(|(_, registration)| registration.token.is_cancelled())
                .map(|(id, _)| *id)
                .collect();
            let mut roots: Vec<NodeId> = dead
                .iter()
                .filter_map(|id| state.registrations.remove(id))
                .map(|registration| registration.root)
                .collect();
            roots.append(&mut state.pending_unsubscribe);
            roots
        };
        if roots.is_empty() {
            return;
        }
        let mut document = self.document.borrow_mut();
        for root in roots {
            if document.unobserve_root(root) {
                debug!("event=subscription_closed module=observer root={root}");
            }
        }
    }

    /// Drains and processes one batch per observed root.
    ///
    /// Batches are handled in the order the document queued their records;
    /// records produced by callbacks land in the next delivery.
    pub fn deliver(&self) -> DeliveryStats {
        self.prune();
        let mut stats = DeliveryStats::default();
        let roots = self.document.borrow().observed_roots();
        for root in roots {
            let records = self.document.borrow_mut().take_records(root);
            if records.is_empty() {
                continue;
            }
            stats.batches += 1;
            stats.records += records.len();
            self.process_batch(root, &records, &mut stats);
        }
        if !stats.is_idle() {
            trace!(
                "event=batches_delivered module=observer batches={} records={} notified={} dropped_stale={} panicked={}",
                stats.batches,
                stats.records,
                stats.notified,
                stats.dropped_stale,
                stats.panicked
            );
        }
        stats
    }

    fn process_batch(&self, root: NodeId, records: &[MutationRecord], stats: &mut DeliveryStats) {
        let candidates = {
            let document = self.document.borrow();
            added_elements(&document, root, records)
        };
        if candidates.is_empty() {
            return;
        }

        let interested: Vec<RegistrationId> = self
            .state
            .borrow()
            .registrations
            .iter()
            .filter(|(_, registration)| registration.root == root)
            .map(|(id, _)| *id)
            .collect();

        for id in interested {
            let Some((selector, callback, token)) = self.state.borrow().registrations.get(&id).map(
                |registration| {
                    (
                        Rc::clone(&registration.selector),
                        Rc::clone(&registration.callback),
                        registration.token.clone(),
                    )
                },
            ) else {
                continue;
            };

            let matched: Vec<NodeId> = {
                let document = self.document.borrow();
                candidates
                    .iter()
                    .copied()
                    .filter(|node| selector.matches(&document, *node))
                    .collect()
            };

            for (index, node) in matched.iter().enumerate() {
                if token.is_cancelled() {
                    stats.dropped_stale += matched.len() - index;
                    drop_stale(&token, matched.len() - index);
                    break;
                }
                if !self.document.borrow().contains(root, *node) {
                    continue;
                }
                let fresh = match self.state.borrow_mut().registrations.get_mut(&id) {
                    Some(registration) => registration.notified.insert(*node),
                    None => {
                        stats.dropped_stale += matched.len() - index;
                        break;
                    }
                };
                if fresh {
                    if !invoke(&callback, &self.document, *node, &token) {
                        stats.panicked += 1;
                    }
                    stats.notified += 1;
                }
            }
        }
    }
}

/// Runs one callback, containing a panic. Returns `false` when it panicked.
fn invoke(
    callback: &ObserveCallback,
    document: &SharedDocument,
    node: NodeId,
    token: &LifecycleToken,
) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback(document, node))) {
        Ok(()) => true,
        Err(payload) => {
            warn!(
                "event=observe_callback module=observer status=error owner={} node={} error={}",
                token.label(),
                node,
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

fn drop_stale(token: &LifecycleToken, remaining: usize) {
    trace!(
        "event=stale_callbacks_dropped module=observer owner={} remaining={}",
        token.label(),
        remaining
    );
}

/// Elements inserted by `records` that are still under `root`, including
/// every element inside an inserted subtree, deduplicated, in document order.
fn added_elements(document: &Document, root: NodeId, records: &[MutationRecord]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in records {
        for added in &record.added {
            if *added == root || !document.contains(root, *added) {
                continue;
            }
            for node in std::iter::once(*added).chain(document.descendants(*added)) {
                if document.is_element(node) && seen.insert(node) {
                    out.push(node);
                }
            }
        }
    }
    out.sort_by_cached_key(|node| document.tree_position(*node));
    out
}
