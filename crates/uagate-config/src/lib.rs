// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uagate-config
//!
//! Configuration management for the uagate telemetry gateway.
//!
//! ## Quick Start
//!
//! ```no_run
//! use uagate_config::loader::load_config;
//!
//! let config = load_config("uagate.yaml").unwrap();
//!
//! println!("Application: {}", config.client.application_name);
//! println!("Topology file: {}", config.persistence_file().display());
//! ```
//!
//! ## Configuration Schema
//!
//! - `client` - Session, subscription and reconnect settings of the client manager
//! - `storage` - Root directory for persisted files
//! - `security` - Key protecting persisted credentials
//! - `logging` - Logging configuration
//!
//! ## Environment Variables
//!
//! ```text
//! UAGATE_LOG_LEVEL=debug
//! UAGATE_STORAGE_ROOT=/var/lib/uagate
//! UAGATE_CREDENTIAL_KEY=<base64 key>
//! ```
//!
//! Values in config files can reference environment variables:
//!
//! ```yaml
//! security:
//!   credential_key: "${UAGATE_KEY:}"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    load_config, load_config_str, resolve_env_placeholders, ConfigFormat, ConfigLoader,
    ConfigLoaderBuilder, DEFAULT_ENV_PREFIX,
};
pub use schema::{GatewayConfig, LogFormat, LogLevel, LoggingConfig, SecurityConfig, StorageConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// =============================================================================
// Prelude
// =============================================================================

/// Convenience re-exports for common use cases.
pub mod prelude {
    pub use crate::error::{ConfigError, ConfigResult};
    pub use crate::loader::{load_config, ConfigLoader};
    pub use crate::schema::GatewayConfig;
}

// =============================================================================
// Tests
// =============================================================================
