use featurekit_core::dom::{Document, ElementSpec, NodeId, SharedDocument};
use featurekit_core::{LifecycleToken, ObserveOptions, ObserverEngine};
use std::cell::RefCell;
use std::rc::Rc;

fn setup() -> (SharedDocument, ObserverEngine) {
    let document = Document::new().into_shared();
    let engine = ObserverEngine::new(Rc::clone(&document));
    (document, engine)
}

fn record_into(seen: &Rc<RefCell<Vec<NodeId>>>) -> impl Fn(&SharedDocument, NodeId) + 'static {
    let sink = Rc::clone(seen);
    move |_: &SharedDocument, node: NodeId| sink.borrow_mut().push(node)
}

fn append(document: &SharedDocument, parent: NodeId, spec: ElementSpec) -> NodeId {
    document.borrow_mut().append_built(parent, &spec).unwrap()
}

#[test]
fn each_element_is_notified_once_across_batches() {
    let (document, engine) = setup();
    let token = LifecycleToken::new("copy-changes");
    let seen = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe(".file-header", record_into(&seen), ObserveOptions::new(&token))
        .unwrap();

    let list = append(&document, NodeId::DOCUMENT, ElementSpec::new("div").id("files"));
    let mut inserted = Vec::new();
    for batch in 0..3 {
        for _ in 0..=batch {
            inserted.push(append(&document, list, ElementSpec::new("div").class("file-header")));
        }
        engine.deliver();
    }

    // Moving an already notified element and re-rendering its parent's
    // attributes must not produce a second notification.
    let first = inserted[0];
    document.borrow_mut().append_child(list, first).unwrap();
    document
        .borrow_mut()
        .set_attribute(list, "data-rendered", "true")
        .unwrap();
    engine.deliver();
    engine.deliver();

    assert_eq!(seen.borrow().len(), inserted.len());
    let mut unique = seen.borrow().clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), inserted.len());
}

#[test]
fn single_batch_inserting_a_subtree_reports_nested_matches() {
    let (document, engine) = setup();
    let token = LifecycleToken::new("reviews-tab");
    let seen = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe("a.tabnav-tab", record_into(&seen), ObserveOptions::new(&token))
        .unwrap();

    let nav = append(
        &document,
        NodeId::DOCUMENT,
        ElementSpec::new("nav").child(
            ElementSpec::new("div")
                .class("tabnav-tabs")
                .children([
                    ElementSpec::new("a").class("tabnav-tab"),
                    ElementSpec::new("a").class("tabnav-tab"),
                ]),
        ),
    );
    let stats = engine.deliver();

    let expected: Vec<NodeId> = {
        let document = document.borrow();
        let found = document
            .descendants(nav)
            .filter(|node| document.has_class(*node, "tabnav-tab"))
            .collect();
        found
    };
    assert_eq!(*seen.borrow(), expected);
    assert_eq!(stats.batches, 1);
}

#[test]
fn existing_matches_are_reported_before_later_mutations() {
    let (document, engine) = setup();
    let first = append(&document, NodeId::DOCUMENT, ElementSpec::new("button").class("js-account"));
    let second = append(&document, NodeId::DOCUMENT, ElementSpec::new("button").class("js-account"));
    let token = LifecycleToken::new("auto-account-switcher");
    let seen = Rc::new(RefCell::new(Vec::new()));

    engine
        .observe(".js-account", record_into(&seen), ObserveOptions::new(&token))
        .unwrap();
    assert_eq!(*seen.borrow(), vec![first, second]);

    let third = append(&document, NodeId::DOCUMENT, ElementSpec::new("button").class("js-account"));
    engine.deliver();
    assert_eq!(*seen.borrow(), vec![first, second, third]);
}

#[test]
fn batch_is_delivered_in_document_order() {
    let (document, engine) = setup();
    let list = append(&document, NodeId::DOCUMENT, ElementSpec::new("ol"));
    engine.deliver();
    let token = LifecycleToken::new("feature");
    let seen = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe("li", record_into(&seen), ObserveOptions::new(&token))
        .unwrap();

    // Inserted C, then B before C, then A before B: one batch, reverse
    // operation order.
    let (a, b, c) = {
        let mut document = document.borrow_mut();
        let c = document.create_element("li");
        document.append_child(list, c).unwrap();
        let b = document.create_element("li");
        document.insert_before(list, b, Some(c)).unwrap();
        let a = document.create_element("li");
        document.insert_before(list, a, Some(b)).unwrap();
        (a, b, c)
    };
    let stats = engine.deliver();

    assert_eq!(*seen.borrow(), vec![a, b, c]);
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.records, 3);
}

#[test]
fn cancellation_drops_queued_mutations() {
    let (document, engine) = setup();
    let token = LifecycleToken::new("feature");
    let seen = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe("p", record_into(&seen), ObserveOptions::new(&token))
        .unwrap();

    append(&document, NodeId::DOCUMENT, ElementSpec::new("p"));
    assert_eq!(document.borrow().pending_records(NodeId::DOCUMENT), 1);
    token.cancel();
    let stats = engine.deliver();

    assert!(seen.borrow().is_empty());
    assert!(stats.is_idle());
    assert!(!document.borrow().is_observed(NodeId::DOCUMENT));
    assert_eq!(engine.registration_count(), 0);
}

#[test]
fn cancellation_inside_a_callback_drops_the_rest_of_the_batch() {
    let (document, engine) = setup();
    let token = LifecycleToken::new("feature");
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let owner = token.clone();
    engine
        .observe(
            "li",
            move |_: &SharedDocument, node: NodeId| {
                sink.borrow_mut().push(node);
                owner.cancel();
            },
            ObserveOptions::new(&token),
        )
        .unwrap();

    let list = append(
        &document,
        NodeId::DOCUMENT,
        ElementSpec::new("ul").children([
            ElementSpec::new("li"),
            ElementSpec::new("li"),
            ElementSpec::new("li"),
        ]),
    );
    let stats = engine.deliver();

    let first = document.borrow().element_children(list).next();
    assert_eq!(seen.borrow().first().copied(), first);
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(stats.notified, 1);
    assert_eq!(stats.dropped_stale, 2);
}

#[test]
fn replacement_element_is_notified_again() {
    let (document, engine) = setup();
    let token = LifecycleToken::new("copy-changes");
    let seen = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe(".file-header", record_into(&seen), ObserveOptions::new(&token))
        .unwrap();

    let original = append(&document, NodeId::DOCUMENT, ElementSpec::new("div").class("file-header"));
    engine.deliver();
    document.borrow_mut().remove(original).unwrap();
    let replacement = append(&document, NodeId::DOCUMENT, ElementSpec::new("div").class("file-header"));
    engine.deliver();

    assert_ne!(original, replacement);
    assert_eq!(*seen.borrow(), vec![original, replacement]);
}

#[test]
fn same_element_reattached_is_not_notified_again() {
    let (document, engine) = setup();
    let token = LifecycleToken::new("copy-changes");
    let seen = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe(".file-header", record_into(&seen), ObserveOptions::new(&token))
        .unwrap();

    let header = append(&document, NodeId::DOCUMENT, ElementSpec::new("div").class("file-header"));
    engine.deliver();
    document.borrow_mut().remove(header).unwrap();
    engine.deliver();
    document.borrow_mut().append_child(NodeId::DOCUMENT, header).unwrap();
    engine.deliver();

    assert_eq!(*seen.borrow(), vec![header]);
}

#[test]
fn cancelling_one_registration_leaves_others_on_the_same_root() {
    let (document, engine) = setup();
    let first_token = LifecycleToken::new("first");
    let second_token = LifecycleToken::new("second");
    let first = Rc::new(RefCell::new(Vec::new()));
    let second = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe("p", record_into(&first), ObserveOptions::new(&first_token))
        .unwrap();
    engine
        .observe("p", record_into(&second), ObserveOptions::new(&second_token))
        .unwrap();

    first_token.cancel();
    let paragraph = append(&document, NodeId::DOCUMENT, ElementSpec::new("p"));
    engine.deliver();

    assert!(first.borrow().is_empty());
    assert_eq!(*second.borrow(), vec![paragraph]);
    assert_eq!(document.borrow().subscriber_count(NodeId::DOCUMENT), 1);
}

#[test]
fn scoped_root_ignores_insertions_elsewhere() {
    let (document, engine) = setup();
    let sidebar = append(&document, NodeId::DOCUMENT, ElementSpec::new("aside"));
    let main = append(&document, NodeId::DOCUMENT, ElementSpec::new("main"));
    let token = LifecycleToken::new("feature");
    let seen = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe("a", record_into(&seen), ObserveOptions::new(&token).root(main))
        .unwrap();

    append(&document, sidebar, ElementSpec::new("a"));
    let inside = append(&document, main, ElementSpec::new("a"));
    engine.deliver();

    assert_eq!(*seen.borrow(), vec![inside]);
    assert_eq!(document.borrow().observed_roots(), vec![main]);
}

#[test]
fn mutations_made_by_callbacks_land_in_the_next_delivery() {
    let (document, engine) = setup();
    let token = LifecycleToken::new("feature");
    let buttons = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe(
            ".file-header",
            |document: &SharedDocument, header: NodeId| {
                document
                    .borrow_mut()
                    .append_built(header, &ElementSpec::new("button").class("rgh-copy-changes"))
                    .unwrap();
            },
            ObserveOptions::new(&token),
        )
        .unwrap();
    engine
        .observe(".rgh-copy-changes", record_into(&buttons), ObserveOptions::new(&token))
        .unwrap();

    append(&document, NodeId::DOCUMENT, ElementSpec::new("div").class("file-header"));
    let first = engine.deliver();
    assert!(buttons.borrow().is_empty());
    assert_eq!(first.notified, 1);

    let second = engine.deliver();
    assert_eq!(buttons.borrow().len(), 1);
    assert_eq!(second.notified, 1);
    assert!(engine.deliver().is_idle());
}

#[test]
fn panicking_callback_does_not_starve_other_registrations() {
    let (document, engine) = setup();
    let broken = LifecycleToken::new("broken");
    let healthy = LifecycleToken::new("healthy");
    let seen = Rc::new(RefCell::new(Vec::new()));
    engine
        .observe(
            "p",
            |_: &SharedDocument, _: NodeId| panic!("callback bug"),
            ObserveOptions::new(&broken),
        )
        .unwrap();
    engine
        .observe("p", record_into(&seen), ObserveOptions::new(&healthy))
        .unwrap();

    let paragraph = append(&document, NodeId::DOCUMENT, ElementSpec::new("p"));
    let stats = engine.deliver();

    assert_eq!(*seen.borrow(), vec![paragraph]);
    assert_eq!(stats.notified, 2);
    assert_eq!(stats.panicked, 1);
    assert!(engine.deliver().is_idle());

    let later = append(&document, NodeId::DOCUMENT, ElementSpec::new("p"));
    engine.deliver();
    assert_eq!(*seen.borrow(), vec![paragraph, later]);
}
