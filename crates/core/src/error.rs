use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("MissingEndpoint")]
    MissingEndpoint,
    #[error("MissingKeys")]
    MissingKeys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The push service retired the endpoint; the subscription will never
    /// accept messages again.
    Gone,
    Transient,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn gone(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Gone,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn is_gone(&self) -> bool {
        self.kind == TransportErrorKind::Gone
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
#[error("rate limiter unavailable: {0}")]
pub struct RateLimitError(pub String);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Limiter(#[from] RateLimitError),
    #[error("failed to render push payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_classification() {
        assert!(TransportError::gone("410").is_gone());
        assert!(!TransportError::transient("timeout").is_gone());
    }

    #[test]
    fn test_normalization_error_messages() {
        assert_eq!(NormalizationError::MissingEndpoint.to_string(), "MissingEndpoint");
        assert_eq!(NormalizationError::MissingKeys.to_string(), "MissingKeys");
    }

    #[test]
    fn test_rate_limited_message() {
        let err = DispatchError::RateLimited { retry_after: 3 };
        assert_eq!(err.to_string(), "rate limited, retry after 3s");
    }
}
