//! Selector observer engine.
//!
//! Features register `(selector, callback, token)` triples and are told,
//! exactly once per element, when matching nodes appear under a root.

pub mod engine;
pub mod ready;

pub use engine::{
    DeliveryStats, ObserveCallback, ObserveError, ObserveOptions, ObserverEngine, RegistrationId,
};
pub use ready::{element_ready, ElementReady};
