// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client manager configuration.
//!
//! Durations are written in humantime notation (`10s`, `1m 30s`) when the
//! configuration is loaded from a file.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use uagate_client::config::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .default_publishing_interval_ms(500)
//!     .reconnect_interval(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.keep_alive_failure_threshold, 3);
//! assert!(config.reconnect.max_attempts.is_none());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Default location of the persisted topology.
pub const DEFAULT_PERSISTENCE_PATH: &str = "settings/persistency.json";

// =============================================================================
// ClientConfig
// =============================================================================

/// Configuration for the client manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Application name presented to servers.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Session timeout passed to the stack when opening sessions.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Publishing interval used when a request specifies 0.
    #[serde(default = "default_publishing_interval_ms")]
    pub default_publishing_interval_ms: u32,

    /// Sampling interval used when a request specifies 0.
    #[serde(default = "default_sampling_interval_ms")]
    pub default_sampling_interval_ms: u32,

    /// Consecutive bad keep-alives that start a reconnect.
    #[serde(default = "default_keep_alive_failure_threshold")]
    pub keep_alive_failure_threshold: u32,

    /// Reconnect cadence and limit.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Storage path of the persisted topology.
    #[serde(default = "default_persistence_path")]
    pub persistence_path: String,

    /// Whether every mutation writes a new snapshot.
    #[serde(default = "default_true")]
    pub persist_on_change: bool,
}

fn default_application_name() -> String {
    "uagate".to_string()
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_publishing_interval_ms() -> u32 {
    1000
}

fn default_sampling_interval_ms() -> u32 {
    500
}

fn default_keep_alive_failure_threshold() -> u32 {
    3
}

fn default_persistence_path() -> String {
    DEFAULT_PERSISTENCE_PATH.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            session_timeout: default_session_timeout(),
            default_publishing_interval_ms: default_publishing_interval_ms(),
            default_sampling_interval_ms: default_sampling_interval_ms(),
            keep_alive_failure_threshold: default_keep_alive_failure_threshold(),
            reconnect: ReconnectPolicy::default(),
            persistence_path: default_persistence_path(),
            persist_on_change: true,
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Returns the publishing interval to use for a requested value.
    pub fn effective_publishing_interval(&self, requested_ms: u32) -> u32 {
        if requested_ms == 0 {
            self.default_publishing_interval_ms
        } else {
            requested_ms
        }
    }

    /// Returns the sampling interval to use for a requested value.
    pub fn effective_sampling_interval(&self, requested_ms: u32) -> u32 {
        if requested_ms == 0 {
            self.default_sampling_interval_ms
        } else {
            requested_ms
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        if self.default_publishing_interval_ms == 0 {
            return Err(ClientError::configuration(
                "default_publishing_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.default_sampling_interval_ms == 0 {
            return Err(ClientError::configuration(
                "default_sampling_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.keep_alive_failure_threshold == 0 {
            return Err(ClientError::configuration(
                "keep_alive_failure_threshold",
                "must be at least 1",
            ));
        }
        if self.session_timeout.is_zero() {
            return Err(ClientError::configuration("session_timeout", "must be non-zero"));
        }
        if self.persistence_path.trim().is_empty() {
            return Err(ClientError::configuration("persistence_path", "must not be empty"));
        }
        self.reconnect.validate()
    }
}

// =============================================================================
// ReconnectPolicy
// =============================================================================

/// Reconnect cadence for sessions that lost their keep-alive.
///
/// `max_attempts = None` retries forever. When a limit is set and reached,
/// the session is closed and dropped from the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay between attempts.
    #[serde(default = "default_reconnect_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Attempt limit, unlimited when absent.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(10)
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: default_reconnect_interval(),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Returns `true` once `attempts` failed attempts exhaust the policy.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    fn validate(&self) -> ClientResult<()> {
        if self.interval.is_zero() {
            return Err(ClientError::configuration("reconnect.interval", "must be non-zero"));
        }
        if self.max_attempts == Some(0) {
            return Err(ClientError::configuration(
                "reconnect.max_attempts",
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// ClientConfigBuilder
// =============================================================================

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    application_name: Option<String>,
    session_timeout: Option<Duration>,
    default_publishing_interval_ms: Option<u32>,
    default_sampling_interval_ms: Option<u32>,
    keep_alive_failure_threshold: Option<u32>,
    reconnect_interval: Option<Duration>,
    reconnect_max_attempts: Option<u32>,
    persistence_path: Option<String>,
    persist_on_change: Option<bool>,
}

impl ClientConfigBuilder {
    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Sets the default publishing interval.
    pub fn default_publishing_interval_ms(mut self, interval: u32) -> Self {
        self.default_publishing_interval_ms = Some(interval);
        self
    }

    /// Sets the default sampling interval.
    pub fn default_sampling_interval_ms(mut self, interval: u32) -> Self {
        self.default_sampling_interval_ms = Some(interval);
        self
    }

    /// Sets the keep-alive failure threshold.
    pub fn keep_alive_failure_threshold(mut self, threshold: u32) -> Self {
        self.keep_alive_failure_threshold = Some(threshold);
        self
    }

    /// Sets the reconnect interval.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = Some(interval);
        self
    }

    /// Limits reconnect attempts.
    pub fn reconnect_max_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_max_attempts = Some(attempts);
        self
    }

    /// Sets the persistence path.
    pub fn persistence_path(mut self, path: impl Into<String>) -> Self {
        self.persistence_path = Some(path.into());
        self
    }

    /// Enables or disables persisting after each mutation.
    pub fn persist_on_change(mut self, enabled: bool) -> Self {
        self.persist_on_change = Some(enabled);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ClientResult<ClientConfig> {
        let defaults = ClientConfig::default();
        let config = ClientConfig {
            application_name: self.application_name.unwrap_or(defaults.application_name),
            session_timeout: self.session_timeout.unwrap_or(defaults.session_timeout),
            default_publishing_interval_ms: self
                .default_publishing_interval_ms
                .unwrap_or(defaults.default_publishing_interval_ms),
            default_sampling_interval_ms: self
                .default_sampling_interval_ms
                .unwrap_or(defaults.default_sampling_interval_ms),
            keep_alive_failure_threshold: self
                .keep_alive_failure_threshold
                .unwrap_or(defaults.keep_alive_failure_threshold),
            reconnect: ReconnectPolicy {
                interval: self.reconnect_interval.unwrap_or(defaults.reconnect.interval),
                max_attempts: self.reconnect_max_attempts,
            },
            persistence_path: self.persistence_path.unwrap_or(defaults.persistence_path),
            persist_on_change: self.persist_on_change.unwrap_or(defaults.persist_on_change),
        };
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.default_publishing_interval_ms, 1000);
        assert_eq!(config.keep_alive_failure_threshold, 3);
        assert_eq!(config.reconnect.interval, Duration::from_secs(10));
        assert_eq!(config.reconnect.max_attempts, None);
        assert_eq!(config.persistence_path, "settings/persistency.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_effective_intervals() {
        let config = ClientConfig::default();
        assert_eq!(config.effective_publishing_interval(0), 1000);
        assert_eq!(config.effective_publishing_interval(250), 250);
        assert_eq!(config.effective_sampling_interval(0), 500);
    }

    #[test]
    fn test_reconnect_policy_exhaustion() {
        let unlimited = ReconnectPolicy::default();
        assert!(!unlimited.is_exhausted(u32::MAX));

        let limited = ReconnectPolicy {
            interval: Duration::from_secs(1),
            max_attempts: Some(3),
        };
        assert!(!limited.is_exhausted(2));
        assert!(limited.is_exhausted(3));
    }

    #[test]
    fn test_builder_validation() {
        assert!(ClientConfig::builder().keep_alive_failure_threshold(0).build().is_err());
        assert!(ClientConfig::builder().reconnect_max_attempts(0).build().is_err());
        assert!(ClientConfig::builder().persistence_path(" ").build().is_err());

        let config = ClientConfig::builder()
            .reconnect_max_attempts(5)
            .persist_on_change(false)
            .build()
            .unwrap();
        assert_eq!(config.reconnect.max_attempts, Some(5));
        assert!(!config.persist_on_change);
    }

    #[test]
    fn test_deserialize_humantime() {
        let json = r#"{"session_timeout": "30s", "reconnect": {"interval": "2s", "max_attempts": 4}}"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.session_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect.interval, Duration::from_secs(2));
        assert_eq!(config.reconnect.max_attempts, Some(4));
        assert_eq!(config.default_sampling_interval_ms, 500);
    }
}
