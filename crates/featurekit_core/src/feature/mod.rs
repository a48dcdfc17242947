//! Feature declarations, activation context and registry.

pub mod context;
pub mod definition;
pub mod error;
pub mod registry;

pub use context::{FeatureContext, FeatureServices};
pub use definition::{Applicability, FeatureDefinition, FeatureInit};
pub use error::{ActivationFailure, BoxError, FeatureActivationError, FeatureRegistryError};
pub use registry::{FeatureRegistry, NavigationReport};
