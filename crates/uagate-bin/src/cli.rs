// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `validate`: Validate the configuration file
//! - `version`: Show version information
//! - `gen-key`: Generate a credential key
//! - `encrypt` / `decrypt`: Protect or reveal a `user:password` credential blob
//! - `topology`: Print the persisted subscription topology

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// uagate - industrial telemetry gateway
///
/// Operator tooling for the gateway's client manager: configuration checks,
/// credential protection and inspection of the persisted topology.
#[derive(Parser, Debug)]
#[command(
    name = "uagate",
    author = "Sylvex <contact@sylvex.io>",
    version = uagate_client::VERSION,
    about = "Industrial telemetry gateway operator CLI",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "uagate.yaml",
        env = "UAGATE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the config file's level
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; defaults to the config file's format
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the uagate CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Validate the configuration file
    ///
    /// Parses and validates the configuration file, including the credential
    /// key, and reports a summary of the effective settings.
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,

    /// Generate a new credential key
    ///
    /// Generates an AES-256 key for protecting persisted session credentials.
    #[command(name = "gen-key")]
    GenKey(GenKeyArgs),

    /// Protect a credential pair
    ///
    /// Encrypts a `user:password` pair into the blob stored in the
    /// persisted topology.
    Encrypt(EncryptArgs),

    /// Reveal a credential blob
    ///
    /// Decrypts a blob from the persisted topology back to `user:password`.
    Decrypt(DecryptArgs),

    /// Show the persisted subscription topology
    Topology(TopologyArgs),
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Strict mode: treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the `gen-key` command.
#[derive(Args, Debug, Clone, Default)]
pub struct GenKeyArgs {
    /// Output file path (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Key source shared by `encrypt` and `decrypt`.
#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Credential key (base64 encoded); defaults to the config file's key
    #[arg(short, long, env = "UAGATE_CREDENTIAL_KEY")]
    pub key: Option<String>,

    /// Key file path
    #[arg(long, conflicts_with = "key")]
    pub key_file: Option<PathBuf>,
}

/// Arguments for the `encrypt` command.
#[derive(Args, Debug, Clone)]
pub struct EncryptArgs {
    /// Credential pair in `user:password` form
    #[arg(required_unless_present = "stdin")]
    pub value: Option<String>,

    /// Read value from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Key source
    #[command(flatten)]
    pub key: KeyArgs,
}

/// Arguments for the `decrypt` command.
#[derive(Args, Debug, Clone)]
pub struct DecryptArgs {
    /// Protected credential blob
    #[arg(required_unless_present = "stdin")]
    pub value: Option<String>,

    /// Read value from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Key source
    #[command(flatten)]
    pub key: KeyArgs,
}

/// Arguments for the `topology` command.
#[derive(Args, Debug, Clone, Default)]
pub struct TopologyArgs {
    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Read this file instead of the configured persistence path
    #[arg(long)]
    pub file: Option<PathBuf>,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<uagate_config::LogFormat> for LogFormat {
    fn from(format: uagate_config::LogFormat) -> Self {
        match format {
            uagate_config::LogFormat::Text => LogFormat::Text,
            uagate_config::LogFormat::Json => LogFormat::Json,
            uagate_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose logging is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Level forced by `-q`/`-v`/`-l`, if any.
    pub fn forced_log_level(&self) -> Option<&str> {
        if self.quiet {
            Some("warn")
        } else if self.verbose {
            Some("debug")
        } else {
            self.log_level.as_deref()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
