//! Feature lifecycle orchestration and selector observation for page
//! enhancement extensions.
//!
//! Features declare which pages they apply to and what elements they react
//! to. The [`Runtime`] activates them per navigation, gives every activation
//! its own [`LifecycleToken`], and releases everything the activation
//! registered when that token is cancelled.

pub mod config;
pub mod dom;
pub mod events;
pub mod feature;
pub mod lifecycle;
pub mod logging;
pub mod observer;
pub mod page;
pub mod runtime;
pub mod selector;

pub use config::{ConfigError, RuntimeConfig};
pub use dom::{Document, DomError, ElementSpec, NodeId, SharedDocument};
pub use events::{DelegateEvent, DelegateOptions, Event, EventDelegator};
pub use feature::{
    ActivationFailure, Applicability, BoxError, FeatureActivationError, FeatureContext,
    FeatureDefinition, FeatureRegistry, FeatureRegistryError, NavigationReport,
};
pub use lifecycle::{CancelHookId, LifecycleToken};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use observer::{element_ready, DeliveryStats, ObserveError, ObserveOptions, ObserverEngine};
pub use page::{hash_is, path_matches, predicate, PageContext, PagePredicate};
pub use runtime::{IdleReport, Runtime, RuntimeError};
pub use selector::{Selector, SelectorSyntaxError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
