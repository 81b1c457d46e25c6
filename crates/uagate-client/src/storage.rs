// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Storage backends for persisted files.
//!
//! The manager only needs three calls: store bytes at a path, load bytes by
//! name, and find a file name under a directory. Paths are `/`-separated and
//! relative to the backend's root.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{ClientError, ClientResult};

// =============================================================================
// FileStorage Trait
// =============================================================================

/// Byte storage for persisted files.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Stores bytes at a path.
    ///
    /// Returns the confirmed path, or `None` if the backend did not confirm
    /// the write.
    async fn store(&self, path: &str, content: &[u8]) -> ClientResult<Option<String>>;

    /// Loads bytes by name. A missing file is `None`.
    async fn load(&self, name: &str) -> ClientResult<Option<Vec<u8>>>;

    /// Finds the first file under `prefix` whose name matches `pattern`.
    ///
    /// The pattern supports `*` wildcards.
    async fn find(&self, prefix: &str, pattern: &str) -> ClientResult<Option<String>>;
}

/// Matches a file name against a pattern with `*` wildcards.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !name.starts_with(first) || name.len() < first.len() + last.len() || !name.ends_with(last) {
        return false;
    }

    let mut rest = &name[first.len()..name.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

fn join(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

// =============================================================================
// LocalFileStorage
// =============================================================================

/// Filesystem storage rooted in a directory.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Creates a storage rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative path below the root, rejecting escapes.
    fn resolve(&self, path: &str) -> ClientResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.trim().is_empty() || escapes {
            return Err(ClientError::persistence(path, "path must be relative to the storage root"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn store(&self, path: &str, content: &[u8]) -> ClientResult<Option<String>> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::persistence(path, e.to_string()))?;
        }

        let tmp = target.with_extension("tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| ClientError::persistence(path, e.to_string()))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| ClientError::persistence(path, e.to_string()))?;

        tracing::debug!(path = %target.display(), bytes = content.len(), "File stored");
        Ok(Some(path.to_string()))
    }

    async fn load(&self, name: &str) -> ClientResult<Option<Vec<u8>>> {
        let target = self.resolve(name)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::persistence(name, e.to_string())),
        }
    }

    async fn find(&self, prefix: &str, pattern: &str) -> ClientResult<Option<String>> {
        let dir = if prefix.trim_matches('/').is_empty() {
            self.root.clone()
        } else {
            self.resolve(prefix)?
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::persistence(prefix, e.to_string())),
        };

        let mut matches = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ClientError::persistence(prefix, e.to_string()))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if let Some(name) = entry.file_name().to_str() {
                if is_file && matches_pattern(pattern, name) {
                    matches.push(name.to_string());
                }
            }
        }

        matches.sort();
        Ok(matches.into_iter().next().map(|name| join(prefix, &name)))
    }
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-memory storage.
///
/// Writes can be switched off to simulate a backend that does not confirm.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    reject_writes: AtomicBool,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, `store` returns `None` and keeps nothing.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Returns a copy of a stored file.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.read().get(path).cloned()
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn store(&self, path: &str, content: &[u8]) -> ClientResult<Option<String>> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.files.write().insert(path.to_string(), content.to_vec());
        Ok(Some(path.to_string()))
    }

    async fn load(&self, name: &str) -> ClientResult<Option<Vec<u8>>> {
        Ok(self.get(name))
    }

    async fn find(&self, prefix: &str, pattern: &str) -> ClientResult<Option<String>> {
        let dir = prefix.trim_end_matches('/');
        let files = self.files.read();
        Ok(files
            .keys()
            .find(|path| {
                let (parent, name) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
                parent == dir && matches_pattern(pattern, name)
            })
            .cloned())
    }
}
