//! Per-activation lifetime tokens.
//!
//! # Responsibility
//! - Represent one feature activation's resource lifetime as a value that is
//!   threaded explicitly through every registration call.
//! - Release everything tied to that lifetime with a single `cancel()`.
//!
//! # Invariants
//! - Cancellation is irreversible; a new activation always gets a new token.
//! - Every `on_cancel` hook runs exactly once: at cancellation, or immediately
//!   when registered on an already-cancelled token.
//! - Child tokens are cancelled together with their parent.
//! - A hook removed before cancellation never runs; a child that ends on its
//!   own removes its hook from the parent.

use log::trace;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use uuid::Uuid;

type CancelHook = Box<dyn FnOnce()>;

/// Handle of one `on_cancel` hook, used to remove it early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CancelHookId(u64);

struct TokenInner {
    id: Uuid,
    label: String,
    signal: CancellationToken,
    next_hook: Cell<u64>,
    hooks: RefCell<BTreeMap<u64, CancelHook>>,
    /// Parent token and the hook it holds for this child.
    parent: RefCell<Option<(Weak<TokenInner>, CancelHookId)>>,
}

/// Cancellation handle for one feature activation.
///
/// Cloning shares the same lifetime; equality is by activation id.
#[derive(Clone)]
pub struct LifecycleToken {
    inner: Rc<TokenInner>,
}

impl LifecycleToken {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(TokenInner {
                id: Uuid::new_v4(),
                label: label.into(),
                signal: CancellationToken::new(),
                next_hook: Cell::new(0),
                hooks: RefCell::new(BTreeMap::new()),
                parent: RefCell::new(None),
            }),
        }
    }

    /// Unique id of this activation.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Owner label, normally the feature id.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.signal.is_cancelled()
    }

    /// Cancels the token and runs its hooks in registration order.
    ///
    /// Repeated calls are no-ops.
    pub fn cancel(&self) {
        if self.inner.signal.is_cancelled() {
            return;
        }
        self.inner.signal.cancel();
        let hooks = std::mem::take(&mut *self.inner.hooks.borrow_mut());
        trace!(
            "event=token_cancelled module=lifecycle label={} activation={} hooks={}",
            self.inner.label,
            self.inner.id,
            hooks.len()
        );
        for hook in hooks.into_values() {
            hook();
        }
        let parent = self.inner.parent.borrow_mut().take();
        if let Some((parent, hook)) = parent {
            if let Some(inner) = parent.upgrade() {
                LifecycleToken { inner }.remove_hook(hook);
            }
        }
    }

    /// Registers `hook` to run at cancellation.
    pub fn on_cancel(&self, hook: impl FnOnce() + 'static) -> CancelHookId {
        let id = CancelHookId(self.inner.next_hook.get());
        self.inner.next_hook.set(id.0 + 1);
        if self.is_cancelled() {
            hook();
            return id;
        }
        self.inner.hooks.borrow_mut().insert(id.0, Box::new(hook));
        id
    }

    /// Drops a hook that has not run yet. Returns `false` when it already
    /// ran or was removed.
    pub fn remove_hook(&self, hook: CancelHookId) -> bool {
        match self.inner.hooks.try_borrow_mut() {
            Ok(mut hooks) => hooks.remove(&hook.0).is_some(),
            Err(_) => false,
        }
    }

    /// Creates a token that is cancelled when `self` is, and may also be
    /// cancelled on its own.
    pub fn child(&self, label: impl Into<String>) -> LifecycleToken {
        let child = LifecycleToken::new(label);
        let weak = Rc::downgrade(&child.inner);
        let hook = self.on_cancel(move || {
            if let Some(inner) = weak.upgrade() {
                LifecycleToken { inner }.cancel();
            }
        });
        if !child.is_cancelled() {
            *child.inner.parent.borrow_mut() = Some((Rc::downgrade(&self.inner), hook));
        }
        child
    }

    /// Resolves once the token is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFutureOwned {
        self.inner.signal.clone().cancelled_owned()
    }

    /// Underlying thread-safe signal, for APIs that take a `CancellationToken`.
    pub fn signal(&self) -> CancellationToken {
        self.inner.signal.clone()
    }

    /// Hooks still waiting for cancellation.
    pub fn pending_hooks(&self) -> usize {
        self.inner.hooks.borrow().len()
    }
}

impl PartialEq for LifecycleToken {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for LifecycleToken {}

impl Debug for LifecycleToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleToken")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleToken;
    use futures::executor::block_on;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn cancel_runs_hooks_once_in_order() {
        let token = LifecycleToken::new("copy-changes");
        let calls = Rc::new(RefCell::new(Vec::new()));
        for index in 0..3 {
            let calls = Rc::clone(&calls);
            token.on_cancel(move || calls.borrow_mut().push(index));
        }

        token.cancel();
        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(*calls.borrow(), vec![0, 1, 2]);
        assert_eq!(token.pending_hooks(), 0);
    }

    #[test]
    fn hook_on_cancelled_token_runs_immediately() {
        let token = LifecycleToken::new("reviews-tab");
        token.cancel();

        let ran = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&ran);
        token.on_cancel(move || *flag.borrow_mut() = true);

        assert!(*ran.borrow());
    }

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let parent = LifecycleToken::new("parent");
        let child = parent.child("child");
        let sibling = parent.child("sibling");

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(!sibling.is_cancelled());

        parent.cancel();
        assert!(sibling.is_cancelled());
    }

    #[test]
    fn finished_children_do_not_pile_up_on_the_parent() {
        let parent = LifecycleToken::new("reviews-tab");
        for index in 0..100 {
            parent.child(format!("watch-{index}")).cancel();
        }
        let live = parent.child("live");

        assert_eq!(parent.pending_hooks(), 1);
        parent.cancel();
        assert!(live.is_cancelled());
    }

    #[test]
    fn removed_hook_never_runs() {
        let token = LifecycleToken::new("feature");
        let ran = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&ran);
        let hook = token.on_cancel(move || *flag.borrow_mut() = true);

        assert!(token.remove_hook(hook));
        assert!(!token.remove_hook(hook));
        token.cancel();
        assert!(!*ran.borrow());
    }

    #[test]
    fn child_of_cancelled_parent_starts_cancelled() {
        let parent = LifecycleToken::new("parent");
        parent.cancel();
        assert!(parent.child("late").is_cancelled());
    }

    #[test]
    fn tokens_are_unique_per_activation() {
        let first = LifecycleToken::new("feature");
        let second = LifecycleToken::new("feature");

        assert_ne!(first, second);
        assert_eq!(first, first.clone());
        assert_eq!(first.label(), "feature");
    }

    #[test]
    fn cancelled_future_resolves_after_cancel() {
        let token = LifecycleToken::new("async");
        let waiter = token.cancelled();
        assert!(!token.signal().is_cancelled());

        token.cancel();
        block_on(waiter);
        assert!(token.signal().is_cancelled());
    }
}
