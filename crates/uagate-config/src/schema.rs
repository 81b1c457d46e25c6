// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Gateway configuration schema.
//!
//! ```yaml
//! client:
//!   application_name: uagate
//!   session_timeout: 60s
//!   default_publishing_interval_ms: 1000
//!   default_sampling_interval_ms: 500
//!   keep_alive_failure_threshold: 3
//!   reconnect:
//!     interval: 10s
//!     max_attempts: 20
//!   persistence_path: settings/persistency.json
//! storage:
//!   root: /var/lib/uagate
//! security:
//!   credential_key: "${UAGATE_KEY}"
//! logging:
//!   level: info
//!   format: json
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use uagate_client::{AesGcmProtector, ClientConfig};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// GatewayConfig
// =============================================================================

/// Root configuration of the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Client manager settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Local storage for persisted files.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credential protection.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Validates every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.client.validate()?;
        self.storage.validate()?;
        self.security.validate()?;
        Ok(())
    }

    /// Absolute location of the persisted topology file.
    pub fn persistence_file(&self) -> PathBuf {
        self.storage.root.join(&self.client.persistence_path)
    }
}

// =============================================================================
// StorageConfig
// =============================================================================

/// Local storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory; persistence paths are relative to it.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl StorageConfig {
    /// Validates the storage configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::validation("storage.root", "must not be empty"));
        }
        Ok(())
    }
}

// =============================================================================
// SecurityConfig
// =============================================================================

/// Credential protection settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Base64 AES-256 key protecting persisted credentials.
    ///
    /// Without a key only anonymous sessions can be persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_key: Option<String>,
}

impl SecurityConfig {
    /// Validates the security configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.protector().map(|_| ())
    }

    /// Builds the credential protector, `None` when no key is configured.
    pub fn protector(&self) -> ConfigResult<Option<AesGcmProtector>> {
        match self.credential_key.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(key) => AesGcmProtector::from_base64(key)
                .map(Some)
                .map_err(|e| ConfigError::invalid_key(e.to_string())),
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("credential_key", &self.credential_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// =============================================================================
// LoggingConfig
// =============================================================================

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::validation("logging.level", format!("unknown level '{}'", other))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Single-line compact text.
    Compact,
    /// JSON lines for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::validation("logging.format", format!("unknown format '{}'", other))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Compact => f.write_str("compact"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
