use std::{fmt::Display, sync::Arc, time::Duration};

use thiserror::Error;

use crate::types::DynError;

/// Errors while resolving components
///
/// Clone, as callers awaiting the same in-flight instantiation all receive the outcome
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// A declared dependency slot holds no component
    #[error("Undefined dependency for '{component}' at {slot}")]
    UndefinedDependency {
        component: String,
        slot: DependencySlot,
    },

    /// The requested graph contains a cycle
    #[error("Component has recursive dependencies: {}", .chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    /// A factory did not settle within the configured resolve timeout
    #[error("Component timed out: '{component}' did not settle within {timeout:?}")]
    InstantiationTimeout {
        component: String,
        timeout: Duration,
    },

    /// A factory failed - displays the factory's own error unchanged
    #[error("{error}")]
    InstantiationFailure {
        component: String,
        error: Arc<DynError>,
    },

    /// A resolved instance is not of the type the caller asked for
    #[error("Resolved instance of '{component}' has an unexpected type: {source}")]
    Downcast {
        component: String,
        source: RequireError,
    },

    /// The sequencer met a component without a dependency map entry
    #[error("Missing dependencies: {}", .missing.join(", "))]
    MissingDependency { missing: Vec<String> },

    /// A factory was about to run while one of its dependencies was not cached
    #[error("'{component}' was instantiated before its dependency '{dependency}' was resolved")]
    UnresolvedDependency {
        component: String,
        dependency: String,
    },
}
impl ResolveError {
    /// The error a factory failed with, exactly as it returned it
    pub fn factory_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ResolveError::InstantiationFailure { error, .. } => Some(&***error),
            _ => None,
        }
    }

    /// Display name of the component the error is about, if it concerns a single one
    pub fn component(&self) -> Option<&str> {
        match self {
            ResolveError::UndefinedDependency { component, .. }
            | ResolveError::InstantiationTimeout { component, .. }
            | ResolveError::InstantiationFailure { component, .. }
            | ResolveError::Downcast { component, .. }
            | ResolveError::UnresolvedDependency { component, .. } => Some(component),
            ResolveError::CyclicDependency { .. } | ResolveError::MissingDependency { .. } => None,
        }
    }
}

/// Position of a dependency inside a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySlot {
    Index(usize),
    Name(String),
}
impl Display for DependencySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencySlot::Index(index) => write!(f, "position {index}"),
            DependencySlot::Name(name) => write!(f, "key '{name}'"),
        }
    }
}

/// Errors when a factory reads its injected dependencies
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequireError {
    /// No dependency was declared at this position
    #[error("No dependency injected at position {0}")]
    MissingPosition(usize),
    /// No dependency was declared under this name
    #[error("No dependency injected under '{0}'")]
    MissingName(String),

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
}
