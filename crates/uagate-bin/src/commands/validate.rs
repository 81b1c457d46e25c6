// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use uagate_config::GatewayConfig;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.exists() {
        return Err(BinError::Configuration(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = uagate_config::load_config(config_path)
        .map_err(|e| BinError::Configuration(format!("Configuration validation failed: {}", e)))?;

    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Application:        {}", config.client.application_name);
            println!("  Session timeout:    {:?}", config.client.session_timeout);
            println!(
                "  Default intervals:  publishing {}ms, sampling {}ms",
                config.client.default_publishing_interval_ms, config.client.default_sampling_interval_ms
            );
            println!("  Keep-alive misses:  {}", config.client.keep_alive_failure_threshold);
            println!(
                "  Reconnect:          every {:?}, {}",
                config.client.reconnect.interval,
                match config.client.reconnect.max_attempts {
                    Some(n) => format!("at most {} attempts", n),
                    None => "until it succeeds".to_string(),
                }
            );
            println!("  Topology file:      {}", config.persistence_file().display());
            println!(
                "  Credential key:     {}",
                if config.security.credential_key.is_some() { "configured" } else { "none" }
            );

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", render_json(&config)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "application_name": config.client.application_name,
                    "persistence_file": config.persistence_file().display().to_string(),
                    "persist_on_change": config.client.persist_on_change,
                    "keep_alive_failure_threshold": config.client.keep_alive_failure_threshold,
                    "reconnect_max_attempts": config.client.reconnect.max_attempts,
                    "credential_key": config.security.credential_key.is_some(),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(redacted(&config)) } else { None },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::Configuration(format!(
            "Strict mode: {} warning(s) found",
            warnings.len()
        )));
    }

    Ok(())
}

/// Findings that do not make the configuration invalid.
fn collect_warnings(config: &GatewayConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.security.credential_key.is_none() {
        warnings.push(
            "No security.credential_key: sessions with user credentials cannot be persisted".to_string(),
        );
    }
    if !config.storage.root.exists() {
        warnings.push(format!(
            "Storage root does not exist yet: {}",
            config.storage.root.display()
        ));
    }
    if !config.client.persist_on_change {
        warnings.push("persist_on_change is disabled: the topology is only written on request".to_string());
    }

    warnings
}

fn redacted(config: &GatewayConfig) -> GatewayConfig {
    let mut copy = config.clone();
    if copy.security.credential_key.is_some() {
        copy.security.credential_key = Some("[REDACTED]".to_string());
    }
    copy
}

fn render_json(config: &GatewayConfig) -> BinResult<String> {
    Ok(serde_json::to_string_pretty(&redacted(config))?)
}
