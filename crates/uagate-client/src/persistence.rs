// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Topology snapshots and their storage.
//!
//! The persisted file is a JSON array of server entries:
//!
//! ```json
//! [
//!   {
//!     "EndpointUrl": "opc.tcp://plant1:4840",
//!     "OpcAuthenticationMode": "UsernamePassword",
//!     "EncryptedAuthCredential": "q83v...",
//!     "OpcNodes": [
//!       {
//!         "Id": "ns=2;s=Temperature",
//!         "OpcPublishingInterval": 1000,
//!         "OpcSamplingInterval": 500,
//!         "DisplayName": "Temperature",
//!         "HeartbeatInterval": 0,
//!         "SkipFirst": false
//!       }
//!     ]
//!   }
//! ]
//! ```
//!
//! The snapshot is rebuilt from live state on every mutation, never diffed.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::credentials::{AuthMode, CredentialProtector, Credentials};
use crate::error::{ClientError, ClientResult};
use crate::heartbeat::HeartbeatScheduler;
use crate::metrics::ClientMetrics;
use crate::session::pool::ManagedSession;
use crate::storage::FileStorage;
use crate::subscription::registry::SkipFirstRegistry;

// =============================================================================
// Persisted format
// =============================================================================

/// A full, order-preserving topology snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedTopology {
    /// Server entries in session order.
    pub servers: Vec<ServerEntry>,
}

/// One session in the persisted topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerEntry {
    /// Server endpoint URL.
    pub endpoint_url: String,
    /// Authentication mode of the session.
    #[serde(default)]
    pub opc_authentication_mode: AuthMode,
    /// Protected credential blob, absent for anonymous sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_auth_credential: Option<String>,
    /// Monitored nodes of the session.
    #[serde(default)]
    pub opc_nodes: Vec<NodeEntry>,
}

/// One monitored item in the persisted topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeEntry {
    /// Resolved node id.
    pub id: String,
    /// Publishing interval in milliseconds.
    pub opc_publishing_interval: u32,
    /// Sampling interval in milliseconds.
    pub opc_sampling_interval: u32,
    /// Display name.
    #[serde(default)]
    pub display_name: String,
    /// Heartbeat interval in seconds, 0 when disabled.
    #[serde(default)]
    pub heartbeat_interval: u64,
    /// Whether the first notification is suppressed.
    #[serde(default)]
    pub skip_first: bool,
    /// Namespace-URI qualified form of `id`, when the server table knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_node_id: Option<String>,
}

impl PersistedTopology {
    /// Total number of node entries.
    pub fn node_count(&self) -> usize {
        self.servers.iter().map(|s| s.opc_nodes.len()).sum()
    }

    /// Returns `true` if there are no server entries.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// A copy with servers sorted by URL and nodes by id, for comparisons
    /// that must not depend on in-memory ordering.
    pub fn normalized(&self) -> Self {
        let mut servers = self.servers.clone();
        for server in &mut servers {
            server.encrypted_auth_credential = None;
            server
                .opc_nodes
                .sort_by(|a, b| (&a.id, a.opc_publishing_interval).cmp(&(&b.id, b.opc_publishing_interval)));
        }
        servers.sort_by(|a, b| a.endpoint_url.cmp(&b.endpoint_url));
        Self { servers }
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> ClientResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| ClientError::persistence("<topology>", e.to_string()))
    }

    /// Parses JSON bytes.
    pub fn from_json(bytes: &[u8]) -> ClientResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ClientError::persistence("<topology>", e.to_string()))
    }
}

// =============================================================================
// PersistenceBridge
// =============================================================================

/// Builds topology snapshots and moves them through storage.
pub struct PersistenceBridge {
    storage: Arc<dyn FileStorage>,
    protector: Option<Arc<dyn CredentialProtector>>,
    heartbeats: Arc<HeartbeatScheduler>,
    skip_first: Arc<SkipFirstRegistry>,
    path: String,
    metrics: Arc<ClientMetrics>,
}

impl PersistenceBridge {
    /// Creates a bridge writing to `path`.
    pub fn new(
        storage: Arc<dyn FileStorage>,
        protector: Option<Arc<dyn CredentialProtector>>,
        heartbeats: Arc<HeartbeatScheduler>,
        skip_first: Arc<SkipFirstRegistry>,
        path: impl Into<String>,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        Self {
            storage,
            protector,
            heartbeats,
            skip_first,
            path: path.into(),
            metrics,
        }
    }

    /// The storage path of the snapshot.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Walks the given sessions and captures their topology.
    ///
    /// Each session's subscription lock is held only while that session is
    /// read.
    pub async fn snapshot(&self, sessions: &[Arc<ManagedSession>]) -> ClientResult<PersistedTopology> {
        let mut servers = Vec::with_capacity(sessions.len());

        for session in sessions {
            let identity = session.identity();
            let encrypted_auth_credential = match identity.credentials() {
                Some(credentials) => Some(self.protect(credentials)?),
                None => None,
            };

            let namespaces = session.stack_session().namespace_table();
            let group = session.subscriptions().lock().await;
            let mut opc_nodes = Vec::with_capacity(group.item_count());
            for subscription in group.subscriptions() {
                for record in &subscription.items {
                    let info = &record.info;
                    let key = info.key();
                    opc_nodes.push(NodeEntry {
                        id: info.node_id.to_string(),
                        opc_publishing_interval: subscription.requested_interval_ms,
                        opc_sampling_interval: info.sampling_interval_ms,
                        display_name: info.display_name.clone(),
                        heartbeat_interval: self
                            .heartbeats
                            .interval_for(&key)
                            .map_or(0, |interval| interval.as_secs()),
                        skip_first: self.skip_first.is_configured(&key),
                        expanded_node_id: namespaces.expand(&info.node_id).map(|e| e.to_string()),
                    });
                }
            }
            drop(group);

            servers.push(ServerEntry {
                endpoint_url: session.address().to_string(),
                opc_authentication_mode: identity.auth_mode(),
                encrypted_auth_credential,
                opc_nodes,
            });
        }

        Ok(PersistedTopology { servers })
    }

    fn protect(&self, credentials: &Credentials) -> ClientResult<String> {
        self.protector
            .as_ref()
            .ok_or_else(|| ClientError::credentials("no credential protector configured"))?
            .protect(credentials)
    }

    /// Recovers the credentials of a server entry.
    pub fn credentials_for(&self, entry: &ServerEntry) -> ClientResult<Option<Credentials>> {
        if entry.opc_authentication_mode.is_anonymous() {
            return Ok(None);
        }
        let blob = entry.encrypted_auth_credential.as_deref().ok_or_else(|| {
            ClientError::credentials(format!("no credential blob for '{}'", entry.endpoint_url))
        })?;
        let protector = self
            .protector
            .as_ref()
            .ok_or_else(|| ClientError::credentials("no credential protector configured"))?;
        protector.unprotect(blob).map(Some)
    }

    /// Writes a snapshot.
    ///
    /// A write the backend does not confirm is a `PersistenceFailed` error.
    /// Live state is unaffected either way.
    pub async fn store(&self, topology: &PersistedTopology, cancel: &CancellationToken) -> ClientResult<()> {
        let bytes = topology.to_json()?;

        let stored = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::cancelled("persist")),
            stored = self.storage.store(&self.path, &bytes) => stored,
        };

        match stored {
            Ok(Some(confirmed)) => {
                self.metrics.record_persist(true);
                tracing::debug!(
                    path = %confirmed,
                    servers = topology.servers.len(),
                    nodes = topology.node_count(),
                    "Topology persisted"
                );
                Ok(())
            }
            Ok(None) => {
                self.metrics.record_persist(false);
                Err(ClientError::persistence(
                    &self.path,
                    "storage did not confirm the write, published nodes won't be persisted",
                ))
            }
            Err(e) => {
                self.metrics.record_persist(false);
                Err(e)
            }
        }
    }

    /// Loads the persisted snapshot, `None` when there is none.
    pub async fn load(&self) -> ClientResult<Option<PersistedTopology>> {
        let path = Path::new(&self.path);
        let dir = path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ClientError::persistence(&self.path, "path has no file name"))?;

        let Some(found) = self.storage.find(&dir, &file_name).await? else {
            tracing::info!(path = %self.path, "No persisted topology found");
            return Ok(None);
        };
        let Some(bytes) = self.storage.load(&found).await? else {
            return Ok(None);
        };

        let topology = PersistedTopology::from_json(&bytes)
            .map_err(|e| ClientError::persistence(&found, e.to_string()))?;
        tracing::info!(
            path = %found,
            servers = topology.servers.len(),
            nodes = topology.node_count(),
            "Persisted topology loaded"
        );
        Ok(Some(topology))
    }
}

impl std::fmt::Debug for PersistenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge")
            .field("storage", &self.storage.name())
            .field("path", &self.path)
            .field("protected", &self.protector.is_some())
            .finish()
    }
}
