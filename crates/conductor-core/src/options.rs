//! Configuration for the workflow host
//!
//! Options deserialize from any serde source and can be overridden from
//! `CONDUCTOR_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::CoreError;

/// Host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostOptions {
    /// Upper bound on waiting for an instance lock. `None` waits indefinitely.
    #[serde(default = "default_lock_acquire_timeout_ms")]
    pub lock_acquire_timeout_ms: Option<u64>,

    /// How often queue pollers look for new work
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lease after which an unreleased lock may be taken over. Backend specific.
    #[serde(default)]
    pub lock_lease_ttl_ms: Option<u64>,

    /// Log filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_lock_acquire_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            lock_acquire_timeout_ms: default_lock_acquire_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_lease_ttl_ms: None,
            log_filter: default_log_filter(),
        }
    }
}

impl HostOptions {
    /// Load options from defaults overridden by environment variables
    pub fn load() -> Result<Self, CoreError> {
        let mut options = Self::default();

        if let Ok(timeout) = env::var("CONDUCTOR_LOCK_ACQUIRE_TIMEOUT_MS") {
            if timeout.eq_ignore_ascii_case("none") {
                options.lock_acquire_timeout_ms = None;
            } else if let Ok(ms) = timeout.parse::<u64>() {
                options.lock_acquire_timeout_ms = Some(ms);
            } else {
                warn!("Invalid CONDUCTOR_LOCK_ACQUIRE_TIMEOUT_MS value: {}", timeout);
            }
        }

        if let Ok(interval) = env::var("CONDUCTOR_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse::<u64>() {
                options.poll_interval_ms = ms;
            } else {
                warn!("Invalid CONDUCTOR_POLL_INTERVAL_MS value: {}", interval);
            }
        }

        if let Ok(ttl) = env::var("CONDUCTOR_LOCK_LEASE_TTL_MS") {
            if let Ok(ms) = ttl.parse::<u64>() {
                options.lock_lease_ttl_ms = Some(ms);
            } else {
                warn!("Invalid CONDUCTOR_LOCK_LEASE_TTL_MS value: {}", ttl);
            }
        }

        if let Ok(filter) = env::var("CONDUCTOR_LOG_FILTER") {
            options.log_filter = filter;
        }

        options.validate()?;
        Ok(options)
    }

    /// Reject values the host cannot work with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval_ms == 0 {
            return Err(CoreError::ConfigurationError(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        if self.lock_acquire_timeout_ms == Some(0) {
            return Err(CoreError::ConfigurationError(
                "Lock acquire timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Lock acquisition bound as a duration
    pub fn lock_acquire_timeout(&self) -> Option<Duration> {
        self.lock_acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Lock lease as a duration
    pub fn lock_lease_ttl(&self) -> Option<Duration> {
        self.lock_lease_ttl_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = HostOptions::default();
        assert_eq!(options.lock_acquire_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(options.poll_interval(), Duration::from_millis(500));
        assert_eq!(options.lock_lease_ttl(), None);
        assert_eq!(options.log_filter, "info");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let options: HostOptions = serde_json::from_str(r#"{ "poll_interval_ms": 50 }"#).unwrap();
        assert_eq!(options.poll_interval_ms, 50);
        assert_eq!(options.lock_acquire_timeout_ms, Some(30_000));
        assert_eq!(options.log_filter, "info");
    }

    #[test]
    fn test_explicit_null_timeout_waits_forever() {
        let options: HostOptions =
            serde_json::from_str(r#"{ "lock_acquire_timeout_ms": null }"#).unwrap();
        assert_eq!(options.lock_acquire_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let options = HostOptions {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(CoreError::ConfigurationError(_))
        ));

        let options = HostOptions {
            lock_acquire_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
