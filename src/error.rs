//! Error types for flowcontrol bootstrap reconciliation
//!
//! Errors are structured with fields to aid debugging in production.
//! Store failures are classified into the cases the reconciler reacts to
//! (missing object, lost optimistic-concurrency race, concurrent create);
//! everything else from the API server stays an opaque `Kube` error.

use thiserror::Error;

/// Main error type for flowcontrol reconciliation
#[derive(Debug, Error)]
pub enum Error {
    /// An object was handed to the access implementation of another kind
    #[error("kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        /// Kind the access implementation manages
        expected: String,
        /// Kind of the object that was passed in
        actual: String,
    },

    /// The object does not exist in the store
    #[error("{kind} {name:?} not found")]
    NotFound {
        /// Configuration kind (e.g. "FlowSchema")
        kind: String,
        /// Object name
        name: String,
    },

    /// A create raced with another writer that created the same name first
    #[error("{kind} {name:?} already exists")]
    AlreadyExists {
        /// Configuration kind
        kind: String,
        /// Object name
        name: String,
    },

    /// The write was based on a stale resourceVersion or failed a delete precondition
    #[error("conflict on {kind} {name:?}: {message}")]
    Conflict {
        /// Configuration kind
        kind: String,
        /// Object name
        name: String,
        /// Message returned by the API server
        message: String,
    },

    /// Kubernetes API error (transport, authorization, unavailable store)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Invalid bootstrap configuration
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a kind mismatch error
    pub fn kind_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::KindMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a not-found error for the named object
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error for the named object
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Classify a kube-rs error for the named object
    ///
    /// 404 becomes `NotFound`, 409 becomes `AlreadyExists` or `Conflict`
    /// depending on the reason the API server reports. Everything else is
    /// passed through untouched.
    pub fn from_kube(kind: &str, name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(kind, name),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists {
                    kind: kind.to_string(),
                    name: name.to_string(),
                }
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::conflict(kind, name, ae.message),
            other => Self::Kube { source: other },
        }
    }

    /// True if the object was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True if an optimistic-concurrency check failed
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// True if a create lost to a concurrent creator
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// Check if this error is worth another reconciliation pass
    ///
    /// Wiring, validation and serialization errors need a code or config fix.
    /// Races and transient API failures clear up on the next pass.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::KindMismatch { .. } => false,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::NotFound { .. } => true,
            Error::AlreadyExists { .. } => true,
            Error::Conflict { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the object name if this error is tied to a specific object
    pub fn object_name(&self) -> Option<&str> {
        match self {
            Error::NotFound { name, .. }
            | Error::AlreadyExists { name, .. }
            | Error::Conflict { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} from the API server"),
            reason: reason.to_string(),
            code,
        })
    }

    /// Story: the reconciler needs to tell "create it" from "the store is down"
    #[test]
    fn story_not_found_is_classified_from_http_404() {
        let err = Error::from_kube("FlowSchema", "global-default", api_error(404, "NotFound"));
        assert!(err.is_not_found());
        assert_eq!(err.object_name(), Some("global-default"));
        assert!(err.to_string().contains("FlowSchema"));
    }

    /// Story: a stale resourceVersion shows up as a 409 Conflict
    #[test]
    fn story_stale_write_is_classified_as_conflict() {
        let err = Error::from_kube(
            "PriorityLevelConfiguration",
            "workload-low",
            api_error(409, "Conflict"),
        );
        assert!(err.is_conflict());
        assert!(!err.is_already_exists());
        assert!(err.is_retryable());
        match err {
            Error::Conflict { message, .. } => assert!(message.contains("Conflict")),
            _ => panic!("Expected Conflict variant"),
        }
    }

    /// Story: two apiservers racing to create the same default
    #[test]
    fn story_concurrent_create_is_classified_as_already_exists() {
        let err = Error::from_kube("FlowSchema", "exempt", api_error(409, "AlreadyExists"));
        assert!(err.is_already_exists());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_other_api_errors_stay_opaque() {
        let err = Error::from_kube("FlowSchema", "exempt", api_error(503, "ServiceUnavailable"));
        assert!(matches!(err, Error::Kube { .. }));
        assert!(err.is_retryable());

        let err = Error::from_kube("FlowSchema", "exempt", api_error(403, "Forbidden"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_wiring_errors_are_not_retryable() {
        let err = Error::kind_mismatch("FlowSchema", "PriorityLevelConfiguration");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("expected FlowSchema"));

        assert!(!Error::validation("duplicate name").is_retryable());
        assert!(!Error::serialization_for_kind("FlowSchema", "bad spec").is_retryable());
        assert_eq!(
            Error::internal_with_context("ensure", "boom").to_string(),
            "internal error [ensure]: boom"
        );
    }
}
