//! Feature registry and navigation-driven activation.
//!
//! # Responsibility
//! - Hold declared features in declaration order, keyed by unique id.
//! - On each navigation, move every feature through `inactive`/`active`
//!   according to its applicability, one feature at a time.
//! - Isolate activation failures at this boundary and tag them with the
//!   feature id.
//!
//! # Invariants
//! - An active feature owns exactly one uncancelled token; a deactivated or
//!   failed activation's token is cancelled before the next feature is
//!   evaluated.
//! - `init` runs only on an `inactive -> active` transition.
//! - A failing feature never prevents later features from transitioning.

use crate::feature::context::{FailureInbox, FeatureContext, FeatureServices};
use crate::feature::definition::{Applicability, FeatureDefinition};
use crate::feature::error::{
    panic_message, ActivationFailure, FeatureActivationError, FeatureRegistryError,
};
use crate::lifecycle::LifecycleToken;
use crate::page::PageContext;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

enum FeatureState {
    Inactive,
    Active(LifecycleToken),
}

struct FeatureEntry {
    definition: FeatureDefinition,
    state: FeatureState,
}

/// Outcome of one navigation pass, in declaration order per list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NavigationReport {
    pub activated: Vec<String>,
    pub deactivated: Vec<String>,
    pub retained: Vec<String>,
    pub failed: Vec<FeatureActivationError>,
    /// Applicability computed for every registered feature.
    pub decisions: Vec<(String, Applicability)>,
}

impl NavigationReport {
    pub fn decision(&self, feature_id: &str) -> Option<Applicability> {
        self.decisions
            .iter()
            .find(|(id, _)| id == feature_id)
            .map(|(_, decision)| *decision)
    }
}

/// Declared features and their activation state.
#[derive(Default)]
pub struct FeatureRegistry {
    features: Vec<FeatureEntry>,
    disabled: BTreeSet<String>,
    failures: FailureInbox,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a feature. Declaration never activates it.
    ///
    /// # Errors
    /// - Invalid or empty id, missing `init`.
    /// - An id that is already registered.
    pub fn add(&mut self, definition: FeatureDefinition) -> Result<(), FeatureRegistryError> {
        definition.validate()?;
        if self
            .features
            .iter()
            .any(|entry| entry.definition.id() == definition.id())
        {
            return Err(FeatureRegistryError::DuplicateId(
                definition.id().to_string(),
            ));
        }
        if definition.include_count() == 0 {
            warn!(
                "event=feature_add module=feature status=warn reason=no_include feature={}",
                definition.id()
            );
        }
        debug!(
            "event=feature_add module=feature status=ok feature={} include={} exclude={}",
            definition.id(),
            definition.include_count(),
            definition.exclude_count()
        );
        self.features.push(FeatureEntry {
            definition,
            state: FeatureState::Inactive,
        });
        Ok(())
    }

    /// Replaces the set of features turned off by configuration.
    ///
    /// Takes effect at the next navigation.
    pub fn set_disabled<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled = ids.into_iter().map(Into::into).collect();
    }

    pub fn is_disabled(&self, feature_id: &str) -> bool {
        self.disabled.contains(feature_id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Registered ids in declaration order.
    pub fn ids(&self) -> Vec<&str> {
        self.features
            .iter()
            .map(|entry| entry.definition.id())
            .collect()
    }

    pub fn is_active(&self, feature_id: &str) -> bool {
        self.active_token(feature_id).is_some()
    }

    pub fn active_ids(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|entry| matches!(entry.state, FeatureState::Active(_)))
            .map(|entry| entry.definition.id())
            .collect()
    }

    /// Token of the current activation of `feature_id`.
    pub fn active_token(&self, feature_id: &str) -> Option<&LifecycleToken> {
        self.features
            .iter()
            .find(|entry| entry.definition.id() == feature_id)
            .and_then(|entry| match &entry.state {
                FeatureState::Active(token) => Some(token),
                FeatureState::Inactive => None,
            })
    }

    /// Re-evaluates every feature against `page` and applies transitions.
    pub fn navigate(&mut self, page: &PageContext, services: &FeatureServices) -> NavigationReport {
        let mut report = NavigationReport::default();
        for entry in &mut self.features {
            let id = entry.definition.id().to_string();
            let decision = if self.disabled.contains(&id) {
                Applicability::Disabled
            } else {
                entry.definition.applicability(page)
            };
            report.decisions.push((id.clone(), decision));

            let active = matches!(entry.state, FeatureState::Active(_));
            match (active, decision.qualifies()) {
                (true, true) => report.retained.push(id),
                (true, false) => {
                    if let FeatureState::Active(token) =
                        std::mem::replace(&mut entry.state, FeatureState::Inactive)
                    {
                        token.cancel();
                    }
                    info!(
                        "event=feature_deactivate module=feature status=ok feature={} reason={}",
                        id,
                        decision.as_str()
                    );
                    report.deactivated.push(id);
                }
                (false, true) => {
                    match activate(&entry.definition, page, services, &self.failures) {
                        Ok(token) => {
                            entry.state = FeatureState::Active(token);
                            report.activated.push(id);
                        }
                        Err(err) => report.failed.push(err),
                    }
                }
                (false, false) => {}
            }
        }
        info!(
            "event=navigation_applied module=feature status=ok path={} activated={} deactivated={} retained={} failed={}",
            page.path(),
            report.activated.len(),
            report.deactivated.len(),
            report.retained.len(),
            report.failed.len()
        );
        report
    }

    /// Settles failures reported by spawned work since the last call.
    ///
    /// A failure abandons the activation it came from; failures of an
    /// activation that already ended are discarded.
    pub fn reap_failures(&mut self) -> Vec<FeatureActivationError> {
        let mut settled = Vec::new();
        for failure in self.failures.drain() {
            let entry = self.features.iter_mut().find(|entry| {
                matches!(&entry.state, FeatureState::Active(token) if token.id() == failure.activation)
            });
            let Some(entry) = entry else {
                debug!(
                    "event=feature_failure_discarded module=feature feature={} activation={} reason=not_active",
                    failure.feature_id, failure.activation
                );
                continue;
            };
            if let FeatureState::Active(token) =
                std::mem::replace(&mut entry.state, FeatureState::Inactive)
            {
                token.cancel();
            }
            error!(
                "event=feature_activate module=feature status=error feature={} error={}",
                failure.feature_id, failure.failure
            );
            settled.push(failure);
        }
        settled
    }

    /// Cancels every active feature. Returns how many were active.
    pub fn deactivate_all(&mut self) -> usize {
        let mut count = 0;
        for entry in &mut self.features {
            if let FeatureState::Active(token) =
                std::mem::replace(&mut entry.state, FeatureState::Inactive)
            {
                token.cancel();
                count += 1;
            }
        }
        if count > 0 {
            info!(
                "event=feature_deactivate_all module=feature status=ok count={}",
                count
            );
        }
        count
    }
}

fn activate(
    definition: &FeatureDefinition,
    page: &PageContext,
    services: &FeatureServices,
    failures: &FailureInbox,
) -> Result<LifecycleToken, FeatureActivationError> {
    let token = LifecycleToken::new(definition.id());
    let failure = match definition.init_fn() {
        Some(init) => {
            let context = FeatureContext::new(
                definition.id(),
                token.clone(),
                page.clone(),
                services.clone(),
                failures.clone(),
            );
            match catch_unwind(AssertUnwindSafe(|| init(&context))) {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(ActivationFailure::Returned(err.to_string())),
                Err(payload) => Some(ActivationFailure::Panicked(panic_message(payload.as_ref()))),
            }
        }
        None => Some(ActivationFailure::Returned("no init declared".to_string())),
    };

    match failure {
        None => {
            info!(
                "event=feature_activate module=feature status=ok feature={} activation={}",
                definition.id(),
                token.id()
            );
            Ok(token)
        }
        Some(failure) => {
            token.cancel();
            let err = FeatureActivationError {
                feature_id: definition.id().to_string(),
                activation: token.id(),
                failure,
            };
            error!(
                "event=feature_activate module=feature status=error feature={} error={}",
                err.feature_id, err.failure
            );
            Err(err)
        }
    }
}
