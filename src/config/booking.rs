//! Booking core configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::engine::RetryPolicy;
use crate::core::policy::{CutoffWindow, WaitlistExpiry};

/// Prefix of every environment variable read by [`BookingConfig::from_env`].
pub const ENV_PREFIX: &str = "GYM_BOOKING_";

/// Longest accepted cancellation notice: one year.
pub const MAX_CUTOFF_MINS: u64 = 525_600;

/// Longest accepted waitlist TTL: one year.
pub const MAX_WAITLIST_TTL_SECS: u64 = 31_536_000;

/// Store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// Process-local store for development and testing.
    InMemory,
    /// Postgres via a connection pool.
    Postgres {
        /// Connection URL.
        url: String,
        /// Pool size.
        max_connections: u32,
    },
}

/// Root configuration of the booking core.
///
/// The cancellation cutoff and the waitlist TTL have no defaults: a value of
/// `null` must be spelled out to mean "no cutoff" or "never expires".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Attempts per operation when transactions conflict, including the first.
    pub max_tx_retries: u32,
    /// Base backoff between attempts, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Minutes of notice required to cancel; `None` allows cancelling until start.
    #[serde(deserialize_with = "Option::deserialize")]
    pub cancellation_cutoff_mins: Option<u64>,
    /// Seconds a waitlist entry stays pending; `None` never expires.
    #[serde(deserialize_with = "Option::deserialize")]
    pub waitlist_ttl_secs: Option<u64>,
    /// Per-subscriber buffer of the event broadcast channel.
    pub event_buffer: usize,
    /// Store backend.
    pub store: StoreBackendConfig,
}

impl StoreBackendConfig {
    /// Validate backend settings.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::InMemory => Ok(()),
            Self::Postgres {
                url,
                max_connections,
            } => {
                if url.trim().is_empty() {
                    return Err("postgres url must not be empty".into());
                }
                if *max_connections == 0 {
                    return Err("max_connections must be greater than 0".into());
                }
                Ok(())
            }
        }
    }
}

impl BookingConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tx_retries == 0 {
            return Err("max_tx_retries must be greater than 0".into());
        }
        if self.event_buffer == 0 {
            return Err("event_buffer must be greater than 0".into());
        }
        if self
            .cancellation_cutoff_mins
            .is_some_and(|mins| mins > MAX_CUTOFF_MINS)
        {
            return Err(format!(
                "cancellation_cutoff_mins must be at most {MAX_CUTOFF_MINS}"
            ));
        }
        if let Some(secs) = self.waitlist_ttl_secs {
            if secs == 0 || secs > MAX_WAITLIST_TTL_SECS {
                return Err(format!(
                    "waitlist_ttl_secs must be between 1 and {MAX_WAITLIST_TTL_SECS}"
                ));
            }
        }
        self.store
            .validate()
            .map_err(|e| format!("store invalid: {e}"))
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `GYM_BOOKING_*` environment variables, reading
    /// a `.env` file first if one exists.
    pub fn from_env() -> Result<Self, String> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// `CANCELLATION_CUTOFF_MINS` and `WAITLIST_TTL_SECS` are required and
    /// accept `none`; every other variable falls back to a default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let store = match var("STORE").as_deref().unwrap_or("in_memory") {
            "in_memory" => StoreBackendConfig::InMemory,
            "postgres" => StoreBackendConfig::Postgres {
                url: var("DATABASE_URL")
                    .ok_or_else(|| format!("{ENV_PREFIX}DATABASE_URL is required for postgres"))?,
                max_connections: parse_or(var("MAX_CONNECTIONS"), "MAX_CONNECTIONS", 10)?,
            },
            other => return Err(format!("unknown store backend `{other}`")),
        };

        let cfg = Self {
            max_tx_retries: parse_or(var("MAX_TX_RETRIES"), "MAX_TX_RETRIES", 3)?,
            retry_backoff_ms: parse_or(var("RETRY_BACKOFF_MS"), "RETRY_BACKOFF_MS", 10)?,
            cancellation_cutoff_mins: parse_explicit(
                var("CANCELLATION_CUTOFF_MINS"),
                "CANCELLATION_CUTOFF_MINS",
            )?,
            waitlist_ttl_secs: parse_explicit(var("WAITLIST_TTL_SECS"), "WAITLIST_TTL_SECS")?,
            event_buffer: parse_or(var("EVENT_BUFFER"), "EVENT_BUFFER", 256)?,
            store,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Cancellation policy described by this configuration.
    #[must_use]
    pub fn cancellation_policy(&self) -> CutoffWindow {
        self.cancellation_cutoff_mins.map_or_else(CutoffWindow::until_start, |mins| {
            let mins = i64::try_from(mins.min(MAX_CUTOFF_MINS)).unwrap_or_default();
            CutoffWindow::with_notice(chrono::Duration::minutes(mins))
        })
    }

    /// Waitlist expiry described by this configuration.
    #[must_use]
    pub fn waitlist_expiry(&self) -> WaitlistExpiry {
        self.waitlist_ttl_secs.map_or_else(WaitlistExpiry::never, |secs| {
            let secs = i64::try_from(secs.min(MAX_WAITLIST_TTL_SECS)).unwrap_or_default();
            WaitlistExpiry::after(chrono::Duration::seconds(secs))
        })
    }

    /// Conflict retry policy described by this configuration.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_tx_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T, String> {
    raw.map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|_| format!("{ENV_PREFIX}{name}: invalid value `{value}`"))
    })
}

fn parse_explicit(raw: Option<String>, name: &str) -> Result<Option<u64>, String> {
    let value = raw.ok_or_else(|| format!("{ENV_PREFIX}{name} must be set (use `none` to disable)"))?;
    match value.trim() {
        "none" => Ok(None),
        other => other
            .parse()
            .map(Some)
            .map_err(|_| format!("{ENV_PREFIX}{name}: invalid value `{value}`")),
    }
}
