//! Error taxonomy of the resolver.
//!
//! [`ResolveError`] is what travels through the recursion. Only the unrestricted
//! top-level entry point turns it into a user-facing [`ConfigError`].

use thiserror::Error;

use crate::origin::Origin;

/// Errors reported to users of a resolved document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{origin}: could not resolve substitution to a value: {expression}")]
    UnresolvedSubstitution { origin: Origin, expression: String },

    #[error("{origin}: substitution ${{{path}}} is part of a cycle of substitutions")]
    SubstitutionCycle { origin: Origin, path: String },

    #[error("{origin}: {path} has not been resolved, resolve substitutions first")]
    NotResolved { origin: Origin, path: String },

    #[error("invalid path {input:?}: {reason}")]
    BadPath { input: String, reason: String },

    #[error("{origin}: invalid tree document: {message}")]
    BadTree { origin: Origin, message: String },

    #[error("bug or broken invariant: {0}")]
    BugOrBroken(String),
}

/// Conditions raised while a traversal is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A substitution was reached again before its own resolution finished.
    #[error("{origin}: cycle detected through ${{{path}}}")]
    SelfReferential { origin: Origin, path: String },

    /// The node cannot be resolved in the current restriction/cycle state.
    #[error("{origin}: not possible to resolve ${{{path}}}")]
    NotPossibleToResolve { origin: Origin, path: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("bug or broken invariant: {0}")]
    BrokenInvariant(String),
}

impl ResolveError {
    pub fn is_not_possible_to_resolve(&self) -> bool {
        matches!(
            self,
            ResolveError::SelfReferential { .. } | ResolveError::NotPossibleToResolve { .. }
        )
    }

    /// Converts into the user-facing error; cycle conditions are reported against
    /// `origin`, the node the caller asked to resolve.
    pub fn into_config_error(self, origin: &Origin) -> ConfigError {
        match self {
            ResolveError::SelfReferential { path, .. }
            | ResolveError::NotPossibleToResolve { path, .. } => ConfigError::SubstitutionCycle {
                origin: origin.clone(),
                path,
            },
            ResolveError::Config(err) => err,
            ResolveError::BrokenInvariant(message) => ConfigError::BugOrBroken(message),
        }
    }
}
