// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Resolve `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 2. Parse by file extension (YAML, TOML or JSON)
//! 3. Apply `UAGATE_*` environment overrides
//! 4. Resolve a relative storage root against the config file's directory
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! UAGATE_LOG_LEVEL=debug
//! UAGATE_LOG_FORMAT=json
//! UAGATE_STORAGE_ROOT=/var/lib/uagate
//! UAGATE_CREDENTIAL_KEY=<base64>
//! UAGATE_PERSISTENCE_PATH=settings/persistency.json
//! UAGATE_KEEP_ALIVE_THRESHOLD=5
//! UAGATE_RECONNECT_MAX_ATTEMPTS=20
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::GatewayConfig;

/// Default prefix of override variables.
pub const DEFAULT_ENV_PREFIX: &str = "UAGATE";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for the gateway.
///
/// # Examples
///
/// ```no_run
/// use uagate_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("uagate.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Base directory for resolving relative paths.
    base_path: Option<PathBuf>,

    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve environment variables.
    resolve_env_vars: bool,

    /// Whether to resolve relative paths.
    resolve_paths: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
            resolve_paths: true,
        }
    }

    /// Creates a builder.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the base path for resolving relative paths.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Enables or disables relative path resolution.
    pub fn with_path_resolution(mut self, enabled: bool) -> Self {
        self.resolve_paths = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format is determined by the extension: `.yaml`/`.yml`, `.toml`
    /// or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let format = ConfigFormat::from_path(path)?;

        let content = self.prepare(&content);
        let mut config: GatewayConfig = parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        if self.resolve_paths {
            let base_path = self.base_path.clone().unwrap_or_else(|| {
                path.parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."))
            });
            if config.storage.root.is_relative() {
                config.storage.root = base_path.join(&config.storage.root);
            }
        }

        config.validate()?;

        debug!(
            storage_root = %config.storage.root.display(),
            persistence_path = %config.client.persistence_path,
            credential_key = config.security.credential_key.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
        let content = self.prepare(content);
        let mut config: GatewayConfig = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if self.resolve_paths {
            if let Some(ref base) = self.base_path {
                if config.storage.root.is_relative() {
                    config.storage.root = base.join(&config.storage.root);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn prepare(&self, content: &str) -> String {
        if self.resolve_env_vars {
            resolve_env_placeholders(content)
        } else {
            content.to_string()
        }
    }

    fn var(&self, name: &str) -> Option<(String, String)> {
        let key = format!("{}_{}", self.env_prefix, name);
        env::var(&key).ok().map(|value| (key, value))
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&self, config: &mut GatewayConfig) -> ConfigResult<()> {
        if let Some((_, value)) = self.var("APPLICATION_NAME") {
            config.client.application_name = value;
        }
        if let Some((_, value)) = self.var("PERSISTENCE_PATH") {
            config.client.persistence_path = value;
        }
        if let Some((key, value)) = self.var("KEEP_ALIVE_THRESHOLD") {
            config.client.keep_alive_failure_threshold = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(key, "expected a positive number"))?;
        }
        if let Some((key, value)) = self.var("RECONNECT_MAX_ATTEMPTS") {
            config.client.reconnect.max_attempts = match value.trim() {
                "" | "none" | "forever" => None,
                n => Some(
                    n.parse()
                        .map_err(|_| ConfigError::invalid_env_var(key, "expected a number or 'forever'"))?,
                ),
            };
        }
        if let Some((_, value)) = self.var("STORAGE_ROOT") {
            config.storage.root = PathBuf::from(value);
        }
        if let Some((_, value)) = self.var("CREDENTIAL_KEY") {
            config.security.credential_key = Some(value);
        }
        if let Some((key, value)) = self.var("LOG_LEVEL") {
            config.logging.level = value
                .parse()
                .map_err(|e: ConfigError| ConfigError::invalid_env_var(key, e.to_string()))?;
        }
        if let Some((key, value)) = self.var("LOG_FORMAT") {
            config.logging.format = value
                .parse()
                .map_err(|e: ConfigError| ConfigError::invalid_env_var(key, e.to_string()))?;
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves `${VAR_NAME}` and `${VAR_NAME:default}` placeholders.
///
/// Unknown variables without a default are kept verbatim.
pub fn resolve_env_placeholders(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };

        let body = &after[..end];
        let (name, default) = match body.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };

        match (env::var(name), default) {
            (Ok(value), _) => result.push_str(&value),
            (Err(_), Some(default)) => result.push_str(default),
            (Err(_), None) => {
                warn!("Environment variable '{}' not found", name);
                result.push_str(&rest[start..start + 3 + end]);
            }
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => serde_yaml_parse(content),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
    }
}

fn serde_yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for [`ConfigLoader`].
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    base_path: Option<PathBuf>,
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
    resolve_paths: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base path.
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Enables or disables relative path resolution.
    pub fn resolve_paths(mut self, enabled: bool) -> Self {
        self.resolve_paths = Some(enabled);
        self
    }

    /// Builds the loader.
    pub fn build(self) -> ConfigLoader {
        ConfigLoader {
            base_path: self.base_path,
            env_prefix: self.env_prefix.unwrap_or_else(|| DEFAULT_ENV_PREFIX.to_string()),
            resolve_env_vars: self.resolve_env_vars.unwrap_or(true),
            resolve_paths: self.resolve_paths.unwrap_or(true),
        }
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with default settings.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================
