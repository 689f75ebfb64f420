//! Error taxonomy for the generation ladder and the grading engine.
//!
//! Backend, parse and validation errors are recovered inside the core by
//! ladder advancement or by fallback records. Only [`ConfigurationError`]
//! is allowed to reach callers.

use thiserror::Error;

use crate::model::ContentKind;

/// Errors that can occur when interacting with a text-generation backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl BackendError {
    /// Returns `true` if this error is permanent and retrying cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            BackendError::AuthenticationFailed(_) | BackendError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            BackendError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Backend output that is not valid structured data for the requested schema.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("response contains no structured data")]
    NoStructuredData,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("{kind} payload does not match schema: {message}")]
    SchemaMismatch { kind: ContentKind, message: String },

    #[error("no numbered items found in free text")]
    NoEnumeratedItems,

    #[error("grading payload does not match schema: {0}")]
    GradingMismatch(String),
}

/// A parsed and coerced record that still violates an invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{kind} record has no usable items after normalization")]
    EmptyItems { kind: ContentKind },

    #[error("record kind {found} does not match requested kind {expected}")]
    KindMismatch {
        expected: ContentKind,
        found: ContentKind,
    },
}

/// Fatal setup errors. Never retried, never replaced by a fallback.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    #[error("missing credentials for provider '{0}'")]
    MissingCredential(String),

    #[error("credentials rejected by backend: {0}")]
    CredentialRejected(String),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Why a single ladder tier did not produce a record.
#[derive(Debug, Clone, Error)]
pub enum TierFailure {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl TierFailure {
    /// Credential rejections stop the ladder and surface as configuration errors.
    pub fn as_configuration_error(&self) -> Option<ConfigurationError> {
        match self {
            TierFailure::Backend(BackendError::AuthenticationFailed(msg)) => {
                Some(ConfigurationError::CredentialRejected(msg.clone()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_classification() {
        assert!(BackendError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(BackendError::ModelNotFound("x".into()).is_permanent());
        assert!(!BackendError::Timeout(30).is_permanent());
        assert!(!BackendError::NetworkError("reset".into()).is_permanent());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let err = BackendError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.retry_after_ms(), Some(5000));
        assert_eq!(BackendError::Timeout(1).retry_after_ms(), None);
    }

    #[test]
    fn auth_failure_maps_to_configuration_error() {
        let failure = TierFailure::from(BackendError::AuthenticationFailed("401".into()));
        assert!(matches!(
            failure.as_configuration_error(),
            Some(ConfigurationError::CredentialRejected(_))
        ));

        let failure = TierFailure::from(ParseError::NoStructuredData);
        assert!(failure.as_configuration_error().is_none());
    }
}
