//! Error types for the contextual container

use crate::meta::TypeRef;
use crate::qualifier::Qualifier;
use thiserror::Error;

/// Errors that can surface from container operations
#[derive(Error, Debug)]
pub enum ContainerError {
    /// A bean definition violated a container rule.
    ///
    /// Recorded on the bean during registration; the bean becomes invisible
    /// to the resolver. Surfaced in aggregate at boot verification.
    #[error("Definition error: {0}")]
    Definition(String),

    /// Boot verification found accumulated problems. Fatal.
    #[error("Deployment failed with {} problem(s):\n{}", problems.len(), problems.join("\n"))]
    Deployment { problems: Vec<String> },

    /// No bean satisfies the required type and qualifiers
    #[error("Unsatisfied dependency: type {required_type} with qualifiers {qualifiers:?}")]
    Unsatisfied {
        required_type: TypeRef,
        qualifiers: Vec<Qualifier>,
    },

    /// More than one bean satisfies the required type and qualifiers
    #[error("Ambiguous dependency: type {required_type} matched by [{}]", candidates.join(", "))]
    Ambiguous {
        required_type: TypeRef,
        candidates: Vec<String>,
    },

    /// A scope was used after destruction or before activation
    #[error("Context not active for scope {scope}")]
    ContextNotActive { scope: &'static str },

    /// A producer returned null for a scope that requires a value
    #[error("Illegal product from producer {producer}: {reason}")]
    IllegalProduct { producer: String, reason: String },

    /// An injection point declared a type that is not legal for injection
    #[error("Invalid injection point type {ty}: {reason}")]
    InvalidInjectionPointType { ty: TypeRef, reason: String },

    /// A bean was already under construction on this thread
    #[error("Circular dependency while constructing {type_name}")]
    CircularDependency { type_name: String },

    /// Instantiation or a user callback failed
    #[error("Failed to create {type_name}: {reason}")]
    Creation { type_name: String, reason: String },

    /// I/O error while scanning a discovery root
    #[error("Scan error at {path}: {source}")]
    Scan {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Internal container error (should not occur for valid inputs)
    #[error("Internal container error: {0}")]
    Internal(String),
}

impl ContainerError {
    /// Create an Unsatisfied error
    #[inline]
    pub fn unsatisfied(required_type: TypeRef, qualifiers: Vec<Qualifier>) -> Self {
        Self::Unsatisfied {
            required_type,
            qualifiers,
        }
    }

    /// Create an Ambiguous error listing the candidate bean classes
    #[inline]
    pub fn ambiguous(required_type: TypeRef, candidates: Vec<String>) -> Self {
        Self::Ambiguous {
            required_type,
            candidates,
        }
    }

    /// Create a Creation error
    #[inline]
    pub fn creation(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Creation {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a CircularDependency error
    #[inline]
    pub fn circular(type_name: impl Into<String>) -> Self {
        Self::CircularDependency {
            type_name: type_name.into(),
        }
    }

    /// Create a Definition error
    #[inline]
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }

    /// Create an Internal error
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::TypeRef;

    #[test]
    fn deployment_message_lists_problems() {
        let err = ContainerError::Deployment {
            problems: vec!["first".into(), "second".into()],
        };
        let text = err.to_string();
        assert!(text.contains("2 problem(s)"));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }

    #[test]
    fn ambiguous_message_lists_candidates() {
        let err = ContainerError::ambiguous(
            TypeRef::class("acme.Svc"),
            vec!["acme.A1".into(), "acme.A2".into()],
        );
        let text = err.to_string();
        assert!(text.contains("acme.A1"));
        assert!(text.contains("acme.A2"));
    }
}
