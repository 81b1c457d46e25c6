// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the credential key commands.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::Context;
use uagate_client::{generate_key_base64, AesGcmProtector, CredentialProtector, Credentials};

use crate::cli::{Cli, DecryptArgs, EncryptArgs, GenKeyArgs, KeyArgs};
use crate::error::{BinError, BinResult};

/// Executes the `gen-key` command to generate a credential key.
pub fn gen_key(_cli: &Cli, args: GenKeyArgs) -> BinResult<()> {
    let key = generate_key_base64();

    if let Some(path) = &args.output {
        write_key_file(path, &key)?;
        eprintln!("Key written to: {}", path.display());
    } else {
        println!("{}", key);
    }

    eprintln!();
    eprintln!("Store this key securely! You will need it to:");
    eprintln!("  - Persist sessions that use credentials: security.credential_key in the config file");
    eprintln!("  - Or set the environment variable: export UAGATE_CREDENTIAL_KEY=<key>");

    Ok(())
}

/// Executes the `encrypt` command to protect a `user:password` pair.
pub fn encrypt(cli: &Cli, args: EncryptArgs) -> BinResult<()> {
    let value = read_value(args.stdin, args.value)?;
    let credentials = parse_credentials(&value)?;
    let protector = resolve_protector(cli, &args.key)?;

    let blob = protector
        .protect(&credentials)
        .map_err(|e| BinError::credentials(format!("Encryption failed: {}", e)))?;

    println!("{}", blob);
    Ok(())
}

/// Executes the `decrypt` command to reveal a credential blob.
pub fn decrypt(cli: &Cli, args: DecryptArgs) -> BinResult<()> {
    let blob = read_value(args.stdin, args.value)?;
    let protector = resolve_protector(cli, &args.key)?;

    let credentials = protector
        .unprotect(&blob)
        .map_err(|e| BinError::credentials(format!("Decryption failed: {}", e)))?;

    println!("{}:{}", credentials.username, credentials.password);
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn write_key_file(path: &Path, key: &str) -> BinResult<()> {
    fs::write(path, format!("{}\n", key))
        .with_context(|| format!("Failed to write key file {}", path.display()))?;
    Ok(())
}

fn read_value(stdin: bool, value: Option<String>) -> BinResult<String> {
    if stdin {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read from stdin")?;
        return Ok(input.trim().to_string());
    }
    value.ok_or_else(|| BinError::config("No value provided. Use --stdin or provide a value"))
}

/// Splits `user:password` at the first colon; the password may contain colons.
pub(crate) fn parse_credentials(value: &str) -> BinResult<Credentials> {
    match value.split_once(':') {
        Some((user, password)) if !user.is_empty() => Ok(Credentials::new(user, password)),
        _ => Err(BinError::credentials("Expected credentials in user:password form")),
    }
}

/// Key precedence: `--key`/`UAGATE_CREDENTIAL_KEY`, `--key-file`, then the config file.
pub(crate) fn resolve_protector(cli: &Cli, args: &KeyArgs) -> BinResult<AesGcmProtector> {
    let key = if let Some(key) = &args.key {
        key.clone()
    } else if let Some(path) = &args.key_file {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file {}", path.display()))?
            .trim()
            .to_string()
    } else {
        let config = uagate_config::load_config(&cli.config).map_err(|e| {
            BinError::credentials(format!(
                "No key provided (-k, --key-file or UAGATE_CREDENTIAL_KEY) and the config could not be loaded: {}",
                e
            ))
        })?;
        config.security.credential_key.ok_or_else(|| {
            BinError::credentials(
                "No key provided. Use -k or --key-file, set UAGATE_CREDENTIAL_KEY, or configure security.credential_key",
            )
        })?
    };

    AesGcmProtector::from_base64(key.trim()).map_err(|e| BinError::credentials(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_credentials() {
        let creds = parse_credentials("operator:pa:ss").unwrap();
        assert_eq!(creds.username, "operator");
        assert_eq!(creds.password, "pa:ss");

        assert!(parse_credentials("no-colon").is_err());
        assert!(parse_credentials(":password").is_err());
    }

    #[test]
    fn test_resolve_protector_sources() {
        let key = generate_key_base64();
        let cli = Cli::parse_from(["uagate", "-c", "/nonexistent/uagate.yaml", "version"]);

        let from_flag = resolve_protector(
            &cli,
            &KeyArgs {
                key: Some(key.clone()),
                key_file: None,
            },
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("uagate.key");
        write_key_file(&key_file, &key).unwrap();
        let from_file = resolve_protector(
            &cli,
            &KeyArgs {
                key: None,
                key_file: Some(key_file),
            },
        )
        .unwrap();

        // Both protectors share the key, so one reveals what the other protects.
        let blob = from_flag.protect(&Credentials::new("operator", "s3cret")).unwrap();
        let revealed = from_file.unprotect(&blob).unwrap();
        assert_eq!(revealed.password, "s3cret");

        let missing = resolve_protector(&cli, &KeyArgs::default()).unwrap_err();
        assert_eq!(missing.exit_code(), 2);
    }
}
