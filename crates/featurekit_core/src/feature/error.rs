//! Feature-level error taxonomy.

use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Error type feature code returns from `init` and spawned work.
pub type BoxError = Box<dyn Error + 'static>;

/// How one activation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationFailure {
    /// `init` returned an error.
    Returned(String),
    /// `init` panicked.
    Panicked(String),
    /// Work spawned during the activation resolved to an error.
    Rejected(String),
    /// An observer callback, delegated handler or spawned task panicked
    /// after `init` returned.
    Faulted(String),
}

impl Display for ActivationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Returned(message) => write!(f, "init failed: {message}"),
            Self::Panicked(message) => write!(f, "init panicked: {message}"),
            Self::Rejected(message) => write!(f, "async work rejected: {message}"),
            Self::Faulted(message) => write!(f, "callback panicked: {message}"),
        }
    }
}

/// Failure isolated at the registry boundary and tagged with the feature id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureActivationError {
    pub feature_id: String,
    pub activation: Uuid,
    pub failure: ActivationFailure,
}

impl Display for FeatureActivationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FeatureActivationError: feature `{}` (activation {}): {}",
            self.feature_id, self.activation, self.failure
        )
    }
}

impl Error for FeatureActivationError {}

/// Declaration-time registry errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureRegistryError {
    EmptyId,
    InvalidId(String),
    DuplicateId(String),
    MissingInit(String),
}

impl Display for FeatureRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "feature id must not be empty"),
            Self::InvalidId(value) => write!(f, "feature id is invalid: {value}"),
            Self::DuplicateId(value) => write!(f, "feature id already registered: {value}"),
            Self::MissingInit(value) => write!(f, "feature declares no init: {value}"),
        }
    }
}

impl Error for FeatureRegistryError {}

/// Bounded, single-line rendering of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    const MAX_CHARS: usize = 160;
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };
    let normalized = message.replace(['\n', '\r'], " ");
    let mut truncated: String = normalized.chars().take(MAX_CHARS).collect();
    if normalized.chars().count() > MAX_CHARS {
        truncated.push_str("...");
    }
    truncated
}
