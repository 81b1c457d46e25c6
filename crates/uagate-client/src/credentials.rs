// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session identities and credential protection.
//!
//! Persisted topologies never contain plaintext passwords. Username/password
//! credentials are sealed into an opaque blob by a [`CredentialProtector`]
//! and unsealed again on rehydration. The default protector is AES-256-GCM:
//! the blob is base64 of `nonce (12 bytes) || ciphertext || tag`.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Length of the protection key in bytes.
pub const KEY_LENGTH: usize = 32;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

// =============================================================================
// Credentials / Identity
// =============================================================================

/// Username and password for a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Authentication mode as recorded in the persisted topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AuthMode {
    /// No user identity.
    #[default]
    Anonymous,
    /// Username and password.
    UsernamePassword,
}

impl AuthMode {
    /// Returns `true` for anonymous sessions.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::UsernamePassword => f.write_str("UsernamePassword"),
        }
    }
}

/// The identity a session authenticates with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    /// Anonymous session.
    #[default]
    Anonymous,
    /// Username/password session.
    UserName(Credentials),
}

impl Identity {
    /// Builds an identity from optional credentials.
    pub fn from_credentials(credentials: Option<Credentials>) -> Self {
        credentials.map_or(Self::Anonymous, Self::UserName)
    }

    /// Returns the persisted auth mode.
    pub fn auth_mode(&self) -> AuthMode {
        match self {
            Self::Anonymous => AuthMode::Anonymous,
            Self::UserName(_) => AuthMode::UsernamePassword,
        }
    }

    /// Returns the credentials for username sessions.
    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Self::Anonymous => None,
            Self::UserName(c) => Some(c),
        }
    }
}

// =============================================================================
// CredentialProtector
// =============================================================================

/// Seals credentials into an opaque, storable blob and back.
pub trait CredentialProtector: Send + Sync {
    /// Seals credentials.
    fn protect(&self, credentials: &Credentials) -> ClientResult<String>;

    /// Unseals a blob produced by [`protect`](Self::protect).
    fn unprotect(&self, blob: &str) -> ClientResult<Credentials>;
}

/// AES-256-GCM credential protector.
#[derive(Clone)]
pub struct AesGcmProtector {
    cipher: Aes256Gcm,
}

impl AesGcmProtector {
    /// Creates a protector from raw key bytes.
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Creates a protector from a base64-encoded key.
    pub fn from_base64(key_base64: &str) -> ClientResult<Self> {
        let bytes = STANDARD
            .decode(key_base64.trim())
            .map_err(|e| ClientError::credentials(format!("invalid key base64: {}", e)))?;

        let key: [u8; KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            ClientError::credentials(format!("expected {} key bytes, got {}", KEY_LENGTH, bytes.len()))
        })?;

        Ok(Self::new(key))
    }
}

impl CredentialProtector for AesGcmProtector {
    fn protect(&self, credentials: &Credentials) -> ClientResult<String> {
        let plaintext = serde_json::to_vec(credentials)
            .map_err(|e| ClientError::credentials(e.to_string()))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| ClientError::credentials(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(combined))
    }

    fn unprotect(&self, blob: &str) -> ClientResult<Credentials> {
        let combined = STANDARD
            .decode(blob.trim())
            .map_err(|e| ClientError::credentials(format!("invalid blob base64: {}", e)))?;

        if combined.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(ClientError::credentials("credential blob too short"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| ClientError::credentials("authentication failed"))?;

        serde_json::from_slice(&plaintext).map_err(|e| ClientError::credentials(e.to_string()))
    }
}

impl fmt::Debug for AesGcmProtector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmProtector")
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}

/// Generates a random 256-bit protection key.
pub fn generate_key() -> [u8; KEY_LENGTH] {
    use aes_gcm::aead::rand_core::RngCore;
    let mut key = [0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generates a random key encoded as base64.
pub fn generate_key_base64() -> String {
    STANDARD.encode(generate_key())
}

// =============================================================================
// Tests
// =============================================================================
