// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the uagate binary.
//!
//! Each variant maps to a distinct process exit code so scripts can tell
//! a bad config file from a bad key or an unreadable topology.

use thiserror::Error;

/// Result type alias for uagate-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that can occur in the uagate binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// The config file is missing, invalid, or failed strict validation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The config file could not be loaded.
    #[error(transparent)]
    Config(#[from] uagate_config::ConfigError),

    /// No usable credential key, or a blob that does not decrypt.
    #[error("Credential error: {0}")]
    Credentials(String),

    /// A file or stream could not be read or written.
    #[error("{0:#}")]
    Io(anyhow::Error),

    /// JSON output could not be rendered.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),

    /// A persisted topology could not be read or decoded.
    #[error("Cannot read topology {path}: {source}")]
    Topology {
        /// File that was read.
        path: String,
        /// Underlying failure.
        #[source]
        source: uagate_client::ClientError,
    },
}

impl BinError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a credential error.
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 1,
            Self::Credentials(_) => 2,
            Self::Output(_) => 3,
            Self::Io(_) => 4,
            Self::Topology { .. } => 5,
        }
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Io(err)
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.into())
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Prints the error and every cause below it.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

/// Reports an error and exits with its code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}
