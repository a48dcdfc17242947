//! Single-threaded runtime driving navigation, async work and delivery.
//!
//! # Responsibility
//! - Own the shared document and every engine bound to it.
//! - Turn a navigation into registry transitions, then run the cooperative
//!   task queue and mutation delivery until nothing is left to do.
//!
//! # Invariants
//! - All feature code runs on the calling thread; there is no parallelism.
//! - Async failures are settled between task polling and delivery, so an
//!   abandoned activation never receives another batch.
//! - Tasks only enter the pool through `FeatureContext`, which contains their
//!   panics, so polling never unwinds into the caller.

use crate::config::{ConfigError, RuntimeConfig};
use crate::dom::{Document, SharedDocument};
use crate::events::{Event, EventDelegator};
use crate::feature::{
    FeatureActivationError, FeatureDefinition, FeatureRegistry, FeatureRegistryError,
    FeatureServices, NavigationReport,
};
use crate::observer::{DeliveryStats, ObserverEngine};
use crate::page::PageContext;
use futures::executor::LocalPool;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

#[derive(Debug)]
pub enum RuntimeError {
    Config(ConfigError),
    InvalidLocation {
        location: String,
        source: url::ParseError,
    },
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::InvalidLocation { location, source } => {
                write!(f, "invalid location `{location}`: {source}")
            }
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::InvalidLocation { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for RuntimeError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// What one `run_until_idle` call did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdleReport {
    pub rounds: usize,
    pub delivery: DeliveryStats,
    /// Activations abandoned because their spawned work failed.
    pub failures: Vec<FeatureActivationError>,
    /// `false` when the round limit stopped the loop early.
    pub settled: bool,
}

pub struct Runtime {
    document: SharedDocument,
    services: FeatureServices,
    registry: FeatureRegistry,
    pool: LocalPool,
    config: RuntimeConfig,
    page: Option<PageContext>,
}

impl Runtime {
    /// Runtime over an empty document with default configuration.
    pub fn new() -> Self {
        Self::assemble(Document::new().into_shared(), RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::with_document(Document::new().into_shared(), config)
    }

    pub fn with_document(document: SharedDocument, config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        Ok(Self::assemble(document, config))
    }

    fn assemble(document: SharedDocument, config: RuntimeConfig) -> Self {
        let pool = LocalPool::new();
        let services = FeatureServices {
            observer: ObserverEngine::new(Rc::clone(&document)),
            events: EventDelegator::new(Rc::clone(&document)),
            spawner: pool.spawner(),
        };
        let mut registry = FeatureRegistry::new();
        registry.set_disabled(config.disabled_features.iter().cloned());
        Self {
            document,
            services,
            registry,
            pool,
            config,
            page: None,
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn observer(&self) -> &ObserverEngine {
        &self.services.observer
    }

    pub fn events(&self) -> &EventDelegator {
        &self.services.events
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn current_page(&self) -> Option<&PageContext> {
        self.page.as_ref()
    }

    pub fn add_feature(&mut self, definition: FeatureDefinition) -> Result<(), FeatureRegistryError> {
        self.registry.add(definition)
    }

    /// Applies a completed navigation to `location` and runs to idle.
    ///
    /// `failed` also carries activations abandoned by async failures while
    /// running to idle.
    pub fn navigate(&mut self, location: &str) -> Result<NavigationReport, RuntimeError> {
        let page = PageContext::parse(location, Rc::clone(&self.document)).map_err(|source| {
            RuntimeError::InvalidLocation {
                location: location.to_string(),
                source,
            }
        })?;
        info!(
            "event=navigate module=runtime status=start path={}",
            page.path()
        );
        let mut report = self.registry.navigate(&page, &self.services);
        self.page = Some(page);

        let idle = self.run_until_idle();
        report.failed.extend(idle.failures);
        Ok(report)
    }

    /// Alternates task polling, failure settlement and mutation delivery
    /// until a round produces no batch and no failure.
    pub fn run_until_idle(&mut self) -> IdleReport {
        let mut report = IdleReport::default();
        loop {
            self.pool.run_until_stalled();
            let failures = self.registry.reap_failures();
            let failed = !failures.is_empty();
            report.failures.extend(failures);

            let stats = self.services.observer.deliver();
            report.delivery.merge(stats);
            if stats.is_idle() && !failed {
                report.settled = true;
                break;
            }

            report.rounds += 1;
            if report.rounds >= self.config.max_delivery_rounds {
                warn!(
                    "event=run_until_idle module=runtime status=warn reason=round_limit rounds={}",
                    report.rounds
                );
                break;
            }
        }
        report
    }

    /// Dispatches `event` to delegated listeners, then runs to idle.
    pub fn dispatch(&mut self, event: &Event) -> usize {
        let handled = self.services.events.dispatch(event);
        self.run_until_idle();
        handled
    }

    /// Deactivates every feature and drains the task queue.
    pub fn shutdown(&mut self) -> usize {
        let count = self.registry.deactivate_all();
        self.run_until_idle();
        self.page = None;
        info!(
            "event=shutdown module=runtime status=ok deactivated={}",
            count
        );
        count
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
