use crate::{channel::ChannelOptions, client::RetryPolicy, Client};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};
use sweeps_types::{Currency, SCRATCH_REVEAL_THRESHOLD};
use thiserror::Error;
use tracing::Level;
use url::Url;

/// Client configuration as read from YAML.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub base_url: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default)]
    pub channel_capacity: usize,

    #[serde(default = "default_scratch_threshold")]
    pub scratch_threshold: f64,
    #[serde(default = "default_eligible_currencies")]
    pub eligible_currencies: Vec<Currency>,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub retry_non_idempotent: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            retry_non_idempotent: policy.retry_non_idempotent,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base_url {value}: {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("base_url must be http or https (got {value})")]
    InvalidScheme { value: String },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("scratch_threshold must be in (0, 1] (got {value})")]
    InvalidThreshold { value: f64 },
    #[error("eligible_currencies must not be empty")]
    NoCurrencies,
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ValidatedConfig {
    pub base_url: Url,
    pub session_token: Option<String>,
    pub log_level: Level,
    pub request_timeout: Duration,
    pub scratch_threshold: f64,
    pub eligible_currencies: Vec<Currency>,
    pub retry_policy: RetryPolicy,
    pub channel_options: ChannelOptions,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_dial_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_scratch_threshold() -> f64 {
    SCRATCH_REVEAL_THRESHOLD
}

fn default_eligible_currencies() -> Vec<Currency> {
    vec![Currency::Gc, Currency::Sc]
}

fn non_zero(field: &'static str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(Duration::from_millis(value))
}

impl Config {
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let base_url = Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidUrl {
            value: self.base_url.clone(),
            source,
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidScheme {
                value: base_url.scheme().to_string(),
            });
        }

        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        let request_timeout = non_zero("request_timeout_ms", self.request_timeout_ms)?;
        let dial_timeout = non_zero("dial_timeout_ms", self.dial_timeout_ms)?;
        let reconnect_delay = non_zero("reconnect_delay_ms", self.reconnect_delay_ms)?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "retry.max_attempts",
                value: 0,
            });
        }
        if !(self.scratch_threshold > 0.0 && self.scratch_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold {
                value: self.scratch_threshold,
            });
        }
        if self.eligible_currencies.is_empty() {
            return Err(ConfigError::NoCurrencies);
        }

        Ok(ValidatedConfig {
            base_url,
            session_token: self.session_token,
            log_level,
            request_timeout,
            scratch_threshold: self.scratch_threshold,
            eligible_currencies: self.eligible_currencies,
            retry_policy: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
                retry_non_idempotent: self.retry.retry_non_idempotent,
            },
            channel_options: ChannelOptions {
                reconnect_delay,
                dial_timeout,
                capacity: self.channel_capacity,
            },
        })
    }
}

impl ValidatedConfig {
    /// Build an HTTP client from this configuration.
    pub fn client(&self) -> crate::Result<Client> {
        let mut client = Client::with_timeout(self.base_url.as_str(), self.request_timeout)?
            .with_retry_policy(self.retry_policy)
            .with_dial_timeout(self.channel_options.dial_timeout);
        client.set_session_token(self.session_token.clone());
        Ok(client)
    }
}
