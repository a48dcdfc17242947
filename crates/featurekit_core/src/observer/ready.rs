//! One-shot wait for the first element matching a selector.

use crate::dom::{NodeId, SharedDocument};
use crate::observer::engine::{ObserveError, ObserveOptions, ObserverEngine};
use futures::channel::oneshot;
use futures::FutureExt;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by [`element_ready`].
///
/// Resolves to the first matching element, or `None` when the owning token
/// is cancelled before any match appears.
pub struct ElementReady {
    receiver: oneshot::Receiver<NodeId>,
}

impl Future for ElementReady {
    type Output = Option<NodeId>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver.poll_unpin(cx).map(Result::ok)
    }
}

/// Waits for `selector` to match under `options.root`.
///
/// The watch runs on a child of `options.token`; it ends after the first
/// match or when the parent lifetime ends.
pub fn element_ready(
    engine: &ObserverEngine,
    selector: &str,
    options: ObserveOptions,
) -> Result<ElementReady, ObserveError> {
    let (sender, receiver) = oneshot::channel();
    let watch = options.token.child(format!("{}:element-ready", options.token.label()));
    let sender = RefCell::new(Some(sender));
    let done = watch.clone();
    let watch_options = ObserveOptions {
        root: options.root,
        token: watch,
    };

    engine.observe(
        selector,
        move |_: &SharedDocument, node: NodeId| {
            if let Some(sender) = sender.borrow_mut().take() {
                let _ = sender.send(node);
            }
            done.cancel();
        },
        watch_options,
    )?;
    Ok(ElementReady { receiver })
}

#[cfg(test)]
mod tests {
    use super::element_ready;
    use crate::dom::{Document, ElementSpec, NodeId};
    use crate::lifecycle::LifecycleToken;
    use crate::observer::{ObserveOptions, ObserverEngine};
    use futures::executor::block_on;
    use futures::FutureExt;
    use std::rc::Rc;

    #[test]
    fn resolves_immediately_for_existing_element() {
        let document = Document::new().into_shared();
        let container = document
            .borrow_mut()
            .append_built(NodeId::DOCUMENT, &ElementSpec::new("div").id("repo-content"))
            .expect("seed element");
        let engine = ObserverEngine::new(Rc::clone(&document));
        let token = LifecycleToken::new("reviews-tab");

        let ready = element_ready(&engine, "#repo-content", ObserveOptions::new(&token))
            .expect("valid selector");

        assert_eq!(block_on(ready), Some(container));
        assert_eq!(engine.registration_count(), 0);
    }

    #[test]
    fn resolves_after_insertion_is_delivered() {
        let document = Document::new().into_shared();
        let engine = ObserverEngine::new(Rc::clone(&document));
        let token = LifecycleToken::new("reviews-tab");
        let mut ready = element_ready(&engine, "nav a.tab", ObserveOptions::new(&token))
            .expect("valid selector");
        assert_eq!((&mut ready).now_or_never(), None);

        let nav = document
            .borrow_mut()
            .append_built(
                NodeId::DOCUMENT,
                &ElementSpec::new("nav").child(ElementSpec::new("a").class("tab")),
            )
            .expect("insert nav");
        engine.deliver();

        let tab = document.borrow().element_children(nav).next();
        assert_eq!(block_on(ready), tab);
        assert_eq!(engine.registration_count(), 0);
    }

    #[test]
    fn resolved_waits_leave_no_hooks_on_the_owner() {
        let document = Document::new().into_shared();
        let tabs = document
            .borrow_mut()
            .append_built(NodeId::DOCUMENT, &ElementSpec::new("nav").class("tabnav-tabs"))
            .expect("seed element");
        let engine = ObserverEngine::new(Rc::clone(&document));
        let token = LifecycleToken::new("reviews-tab");

        for _ in 0..1000 {
            let ready = element_ready(&engine, ".tabnav-tabs", ObserveOptions::new(&token))
                .expect("valid selector");
            assert_eq!(block_on(ready), Some(tabs));
        }

        assert_eq!(token.pending_hooks(), 0);
        assert!(!document.borrow().is_observed(NodeId::DOCUMENT));
    }

    #[test]
    fn resolves_to_none_when_owner_is_cancelled() {
        let engine = ObserverEngine::new(Document::new().into_shared());
        let token = LifecycleToken::new("reviews-tab");
        let ready = element_ready(&engine, "#never", ObserveOptions::new(&token))
            .expect("valid selector");

        token.cancel();

        assert_eq!(block_on(ready), None);
        assert_eq!(engine.registration_count(), 0);
    }
}
