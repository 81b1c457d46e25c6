// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `validate`: Validate configuration file
//! - `version`: Show version information
//! - `gen-key`, `encrypt`, `decrypt`: Credential key and blob handling
//! - `topology`: Print the persisted topology

mod keys;
mod topology;
mod validate;
mod version;

pub use keys::{decrypt, encrypt, gen_key};
pub use topology::topology;
pub use validate::validate;
pub use version::version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.command.clone() {
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
        Commands::GenKey(args) => keys::gen_key(&cli, args),
        Commands::Encrypt(args) => keys::encrypt(&cli, args),
        Commands::Decrypt(args) => keys::decrypt(&cli, args),
        Commands::Topology(args) => topology::topology(&cli, args).await,
    }
}
