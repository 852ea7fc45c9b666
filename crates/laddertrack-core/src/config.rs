//! Per-provider client configuration.
//!
//! Built-in defaults come from [`ProviderConfig::default_for`]. Deployments override
//! them through environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `LADDERTRACK_<PROVIDER>_BASE_URL` | `base_url` |
//! | `LADDERTRACK_<PROVIDER>_TIMEOUT_MS` | `request_timeout_ms` |
//! | `LADDERTRACK_<PROVIDER>_MAX_ATTEMPTS` | `max_attempts` |
//! | `LADDERTRACK_<PROVIDER>_MAX_BATCH_SIZE` | `max_batch_size` |
//! | `LADDERTRACK_<PROVIDER>_TOKEN` | credential, see [`ProviderConfig::token_from_env`] |

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classify::EmptyStatusSet;
use crate::error::{ClientError, ValidationError};
use crate::http_client::TransportConfig;
use crate::retry::RetryPolicy;
use crate::throttling::RateLimit;
use crate::ProviderId;

/// Immutable base configuration of one provider client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderId,
    pub base_url: String,
    pub connect_timeout_ms: u64,
    /// Per-attempt budget covering send and body read.
    pub request_timeout_ms: u64,
    /// Largest key set one request may carry.
    pub max_batch_size: usize,
    /// Batches in flight at once.
    pub batch_concurrency: usize,
    /// Total physical attempts per logical operation.
    pub max_attempts: u32,
    #[serde(default)]
    pub empty_statuses: EmptyStatusSet,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
}

impl ProviderConfig {
    fn base(provider: ProviderId, base_url: &str) -> Self {
        Self {
            provider,
            base_url: base_url.to_owned(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            max_batch_size: 1,
            batch_concurrency: 4,
            max_attempts: 3,
            empty_statuses: EmptyStatusSet::default(),
            rate_limit: None,
        }
    }

    pub fn default_for(provider: ProviderId) -> Self {
        match provider {
            ProviderId::Battlenet => Self {
                batch_concurrency: 8,
                rate_limit: Some(RateLimit::per_second(100)),
                ..Self::base(provider, "https://eu.api.blizzard.com")
            },
            ProviderId::Aligulac => Self {
                max_batch_size: 100,
                batch_concurrency: 2,
                ..Self::base(provider, "http://aligulac.com/api/v1")
            },
            ProviderId::Liquipedia => Self {
                max_batch_size: 50,
                batch_concurrency: 1,
                rate_limit: Some(RateLimit::per_minute(30)),
                ..Self::base(provider, "https://liquipedia.net/starcraft2/api.php")
            },
            ProviderId::Sc2arcade => Self {
                max_batch_size: 100,
                ..Self::base(provider, "https://api.sc2arcade.com")
            },
            ProviderId::Twitch => Self {
                max_batch_size: 100,
                rate_limit: Some(RateLimit::per_minute(800)),
                ..Self::base(provider, "https://api.twitch.tv/helix")
            },
            ProviderId::Youtube => Self {
                max_batch_size: 50,
                batch_concurrency: 2,
                ..Self::base(provider, "https://www.googleapis.com/youtube/v3")
            },
            ProviderId::Discord => Self {
                rate_limit: Some(RateLimit::per_second(50)),
                ..Self::base(provider, "https://discord.com/api/v10")
            },
            ProviderId::Sc2revealed => Self {
                request_timeout_ms: 20_000,
                batch_concurrency: 1,
                ..Self::base(provider, "https://sc2revealed.com/api")
            },
        }
    }

    /// Defaults for `provider` with environment overrides applied.
    pub fn from_env(provider: ProviderId) -> Result<Self, ValidationError> {
        Self::default_for(provider).with_overrides(|name| env::var(name).ok())
    }

    /// Apply overrides from a variable lookup (environment in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ValidationError> {
        let prefix = self.provider.env_prefix();

        if let Some(base_url) = lookup(&format!("{prefix}_BASE_URL")) {
            self.base_url = base_url.trim().to_owned();
        }
        if let Some(timeout) = parse_var(&lookup, &format!("{prefix}_TIMEOUT_MS"))? {
            self.request_timeout_ms = timeout;
        }
        if let Some(attempts) = parse_var(&lookup, &format!("{prefix}_MAX_ATTEMPTS"))? {
            self.max_attempts = attempts;
        }
        if let Some(batch_size) = parse_var(&lookup, &format!("{prefix}_MAX_BATCH_SIZE"))? {
            self.max_batch_size = batch_size;
        }

        Ok(self)
    }

    /// Credential for the provider, read from `LADDERTRACK_<PROVIDER>_TOKEN`.
    pub fn token_from_env(&self) -> Option<String> {
        env::var(format!("{}_TOKEN", self.provider.env_prefix()))
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::invalid_configuration(format!(
                "{} base url must be http(s): '{}'",
                self.provider, self.base_url
            )));
        }
        if self.max_batch_size == 0 {
            return Err(ClientError::invalid_configuration(format!(
                "{} max batch size must be at least 1",
                self.provider
            )));
        }
        if self.batch_concurrency == 0 {
            return Err(ClientError::invalid_configuration(format!(
                "{} batch concurrency must be at least 1",
                self.provider
            )));
        }
        if self.max_attempts == 0 {
            return Err(ClientError::invalid_configuration(format!(
                "{} max attempts must be at least 1",
                self.provider
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ClientError::invalid_configuration(format!(
                "{} request timeout must be greater than zero",
                self.provider
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout_ms: self.connect_timeout_ms,
            read_timeout_ms: self.request_timeout_ms,
            ..TransportConfig::default()
        }
    }

    /// Absolute URL for a path relative to the base URL.
    pub fn url(&self, path: &str) -> String {
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ValidationError> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ValidationError::InvalidEnvValue {
            name: name.to_owned(),
            value: raw,
        })
}
