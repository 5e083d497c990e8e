//! Error types for the CephFS share provisioner
//!
//! Provides structured error types for parameter resolution, credential
//! lookup, allocation agent invocation, and lifecycle orchestration, plus
//! the retry classification consumed by the external volume controller.

use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("unrecognized storage class parameter {key:?}")]
    UnknownParameter { key: String },

    #[error("missing Ceph admin secret name in storage class parameters")]
    MissingAdminSecretName,

    #[error("missing Ceph monitors in storage class parameters")]
    MissingMonitors,

    #[error("claim selectors are not supported")]
    SelectorUnsupported,

    // =========================================================================
    // Volume Errors
    // =========================================================================
    #[error("volume {name} carries no provisioner ownership annotations")]
    MissingOwnership { name: String },

    #[error("volume {name} has no storage class annotation")]
    MissingClassAnnotation { name: String },

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("admin secret {namespace}/{name} contains no credential data")]
    EmptyAdminSecret { namespace: String, name: String },

    // =========================================================================
    // Allocation Agent Errors
    // =========================================================================
    #[error("failed to launch allocation agent {program}: {source}")]
    AgentLaunch {
        program: String,
        source: std::io::Error,
    },

    #[error("allocation agent exited with {status}: {output}")]
    AgentFailed { status: String, output: String },

    #[error("allocation agent produced invalid output ({reason}): {output}")]
    AgentOutput { reason: String, output: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Action the external volume controller should take on error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue the request with exponential backoff
    RequeueWithBackoff,
    /// Don't requeue, the request cannot succeed without a change
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient dependency failures - the secret store or class
            // lookup may recover, and an empty admin secret may be populated
            Error::Kube(_) | Error::EmptyAdminSecret { .. } => ErrorAction::RequeueWithBackoff,

            // Validation, ownership, and agent failures - retrying the same
            // input reproduces the same outcome
            Error::UnknownParameter { .. }
            | Error::MissingAdminSecretName
            | Error::MissingMonitors
            | Error::SelectorUnsupported
            | Error::MissingOwnership { .. }
            | Error::MissingClassAnnotation { .. }
            | Error::AgentLaunch { .. }
            | Error::AgentFailed { .. }
            | Error::AgentOutput { .. }
            | Error::Internal(_)
            | Error::Configuration(_) => ErrorAction::NoRequeue,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::UnknownParameter {
            key: "quota".into(),
        };
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::EmptyAdminSecret {
            namespace: "default".into(),
            name: "ceph-admin".into(),
        };
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);

        let err = Error::AgentFailed {
            status: "exit status: 1".into(),
            output: "rados error".into(),
        };
        assert_eq!(err.action(), ErrorAction::NoRequeue);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "secrets \"ceph-admin\" not found".into(),
            reason: "NotFound".into(),
            code: 404,
        }));
        assert!(transient.is_retryable());

        let terminal = Error::SelectorUnsupported;
        assert!(!terminal.is_retryable());
    }
}
