// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! uagate - industrial telemetry gateway operator CLI.

use uagate_bin::cli::Cli;
use uagate_bin::error::report_error_and_exit;
use uagate_bin::{commands, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    let (level, format) = logging::resolve_settings(&cli);
    logging::init_logging(&level, format);

    if let Err(e) = commands::execute(cli).await {
        report_error_and_exit(e);
    }
}
