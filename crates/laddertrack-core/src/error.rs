use thiserror::Error;

use crate::{ProviderId, Region};

/// Validation errors for identifiers, dates, and configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid provider '{value}', expected one of {expected}")]
    InvalidProvider { value: String, expected: String },
    #[error("invalid region '{value}', expected one of US, EU, KR, CN")]
    InvalidRegion { value: String },
    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnvValue { name: String, value: String },
}

/// Failure reported by a local store (variables or seasons).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<laddertrack_warehouse::WarehouseError> for StoreError {
    fn from(error: laddertrack_warehouse::WarehouseError) -> Self {
        Self(error.to_string())
    }
}

/// Terminal outcome of a failed logical operation.
///
/// An empty response is not represented here: operations return `Ok(None)` for it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("{provider} transport error: {message}")]
    Transport {
        provider: ProviderId,
        message: String,
    },

    #[error("{provider} request timed out: {message}")]
    Timeout {
        provider: ProviderId,
        message: String,
    },

    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse {
        provider: ProviderId,
        message: String,
    },

    #[error("{provider} rejected the request with status {status}")]
    ClientRequest { provider: ProviderId, status: u16 },

    #[error("{provider} failed with status {status}")]
    ServerError { provider: ProviderId, status: u16 },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no season found for region {region} (requested season {season})")]
    SeasonNotFound { region: Region, season: i32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation cancelled: deadline of {deadline_ms}ms elapsed")]
    Cancelled { deadline_ms: u64 },
}

impl ClientError {
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Whether another physical attempt could change the outcome.
    pub const fn retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::MalformedResponse { .. } => true,
            Self::ServerError { .. } => true,
            Self::ClientRequest { .. }
            | Self::InvalidConfiguration(_)
            | Self::SeasonNotFound { .. }
            | Self::Store(_)
            | Self::Cancelled { .. } => false,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "client.transport",
            Self::Timeout { .. } => "client.timeout",
            Self::MalformedResponse { .. } => "client.malformed_response",
            Self::ClientRequest { .. } => "client.request_rejected",
            Self::ServerError { .. } => "client.server_error",
            Self::InvalidConfiguration(_) => "client.invalid_configuration",
            Self::SeasonNotFound { .. } => "season.not_found",
            Self::Store(_) => "store.failure",
            Self::Cancelled { .. } => "client.cancelled",
        }
    }

    /// Provider the failure originated from, if any.
    pub const fn provider(&self) -> Option<ProviderId> {
        match self {
            Self::Transport { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::MalformedResponse { provider, .. }
            | Self::ClientRequest { provider, .. }
            | Self::ServerError { provider, .. } => Some(*provider),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        let provider = ProviderId::Twitch;
        assert!(ClientError::Timeout {
            provider,
            message: String::from("read"),
        }
        .retryable());
        assert!(ClientError::ServerError {
            provider,
            status: 503,
        }
        .retryable());
        assert!(!ClientError::ClientRequest {
            provider,
            status: 400,
        }
        .retryable());
        assert!(!ClientError::invalid_configuration("batch size").retryable());
    }

    #[test]
    fn codes_are_stable() {
        let error = ClientError::SeasonNotFound {
            region: Region::Eu,
            season: 60,
        };
        assert_eq!(error.code(), "season.not_found");
        assert_eq!(error.provider(), None);
        assert!(error.to_string().contains("EU"));
    }
}
