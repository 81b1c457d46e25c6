// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uagate-bin
//!
//! Operator CLI for the uagate telemetry gateway.
//!
//! ```text
//!            main.rs
//!               │
//!         ┌─────▼─────┐
//!         │   cli.rs  │
//!         └─────┬─────┘
//!        ┌──────┴──────┐
//!        ▼             ▼
//!   ┌──────────┐  ┌──────────┐
//!   │ commands │  │ logging  │
//!   └────┬─────┘  └──────────┘
//!        │
//!   ┌────┴──────────────────┐
//!   │ uagate-config         │
//!   │ uagate-client         │
//!   └───────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Validate configuration
//! uagate -c /etc/uagate/uagate.yaml validate
//!
//! # Generate a credential key
//! uagate gen-key
//!
//! # Protect a username/password pair
//! uagate encrypt "operator:s3cret" -k <key>
//!
//! # Inspect the persisted topology
//! uagate topology --format json
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
