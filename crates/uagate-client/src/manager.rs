// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The client manager façade.
//!
//! [`ClientManager`] owns four independently locked collections:
//!
//! - the session pool
//! - the reconnect entries
//! - the heartbeat entries
//! - the endpoint cache (inside the pool)
//!
//! No code path acquires one of these locks while holding another. Per
//! session, subscription mutations are serialized by the session's own
//! async lock, which is never held across a persistence write. Writes of
//! the topology file are serialized by a separate async lock held from
//! snapshot to store, so a later snapshot is never overwritten by an
//! earlier one.
//!
//! Every mutation follows the order *mutate, then persist*. Cancellation
//! observed before the mutation leaves state untouched; cancellation
//! observed while persisting returns `Cancelled` with the mutation kept.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::credentials::{CredentialProtector, Credentials, Identity};
use crate::error::{ClientError, ClientResult, PublishFailureReason};
use crate::heartbeat::HeartbeatScheduler;
use crate::metrics::{ClientMetrics, MetricsSnapshot};
use crate::persistence::{PersistedTopology, PersistenceBridge};
use crate::session::pool::{ConnectionState, ManagedSession, SessionPool};
use crate::session::reconnect::ReconnectSupervisor;
use crate::sink::{NotificationSink, TracingSink};
use crate::stack::{MonitoredItemRequest, ProtocolStack};
use crate::storage::FileStorage;
use crate::subscription::filter::{EventFilter, FilterClauseError, SelectClauseRequest, WhereClauseRequest};
use crate::subscription::group::SubscriptionGroup;
use crate::subscription::registry::{ItemRouter, MonitoredItemInfo, SkipFirstRegistry};
use crate::types::{ExpandedNodeId, MonitoredItemKind, ServerAddress};

const KEEP_ALIVE_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Requests / Outcomes
// =============================================================================

/// A request to monitor one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishRequest {
    /// Server endpoint URL.
    pub endpoint_url: String,
    /// Node id, plain (`ns=2;s=X`) or namespace-URI qualified (`nsu=...;s=X`).
    pub node_id: String,
    /// Publishing interval in milliseconds, 0 for the default.
    pub publishing_interval_ms: u32,
    /// Sampling interval in milliseconds, 0 for the default.
    pub sampling_interval_ms: u32,
    /// Display name; read from the server when blank.
    pub display_name: String,
    /// Heartbeat interval in seconds, 0 to disable.
    pub heartbeat_interval_secs: u64,
    /// Suppress the first notification.
    pub skip_first: bool,
    /// Username/password; anonymous when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    /// Event select clauses; non-empty makes this an event item.
    pub select_clauses: Vec<SelectClauseRequest>,
    /// Event where clauses.
    pub where_clauses: Vec<WhereClauseRequest>,
}

impl PublishRequest {
    /// Creates a data-change request with default intervals.
    pub fn new(endpoint_url: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Sets the publishing interval.
    pub fn publishing_interval(mut self, ms: u32) -> Self {
        self.publishing_interval_ms = ms;
        self
    }

    /// Sets the sampling interval.
    pub fn sampling_interval(mut self, ms: u32) -> Self {
        self.sampling_interval_ms = ms;
        self
    }

    /// Sets the display name.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Enables a heartbeat.
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_secs = interval.as_secs();
        self
    }

    /// Enables skip-first.
    pub fn skip_first(mut self, skip: bool) -> Self {
        self.skip_first = skip;
        self
    }

    /// Authenticates with username and password.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Adds an event select clause.
    pub fn select(mut self, clause: SelectClauseRequest) -> Self {
        self.select_clauses.push(clause);
        self
    }

    /// Adds an event where clause.
    pub fn where_clause(mut self, clause: WhereClauseRequest) -> Self {
        self.where_clauses.push(clause);
        self
    }
}

/// A request to stop monitoring one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpublishRequest {
    /// Server endpoint URL.
    pub endpoint_url: String,
    /// Node id as used when publishing.
    pub node_id: String,
    /// Publishing interval the node was published with, 0 for the default.
    pub publishing_interval_ms: u32,
}

impl UnpublishRequest {
    /// Creates a request for the default publishing interval.
    pub fn new(endpoint_url: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            node_id: node_id.into(),
            publishing_interval_ms: 0,
        }
    }

    /// Sets the publishing interval.
    pub fn publishing_interval(mut self, ms: u32) -> Self {
        self.publishing_interval_ms = ms;
        self
    }
}

/// Result of a publish request that reached a session.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// The item was created on the server.
    Monitored {
        /// Server-assigned monitored item id.
        monitored_item_id: u32,
        /// Where clauses dropped during validation, as `(index, reason)`.
        rejected_where_clauses: Vec<(usize, FilterClauseError)>,
    },
    /// The node is already monitored at this interval; nothing changed.
    AlreadyMonitored,
    /// The server or validation rejected the item; nothing changed.
    Rejected {
        /// Classified reason.
        reason: PublishFailureReason,
        /// Failure description.
        message: String,
    },
}

impl PublishOutcome {
    /// Returns `true` if the node is monitored after the call.
    pub fn is_monitored(&self) -> bool {
        matches!(self, Self::Monitored { .. } | Self::AlreadyMonitored)
    }
}

/// Counts from a rehydration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RehydrateSummary {
    /// Server entries read.
    pub servers: usize,
    /// Nodes monitored again.
    pub published: usize,
    /// Nodes that were already monitored.
    pub already_monitored: usize,
    /// Nodes rejected or skipped.
    pub failed: usize,
}

// =============================================================================
// ClientManager
// =============================================================================

/// Session and subscription manager.
pub struct ClientManager {
    config: Arc<ClientConfig>,
    pool: Arc<SessionPool>,
    supervisor: Arc<ReconnectSupervisor>,
    heartbeats: Arc<HeartbeatScheduler>,
    skip_first: Arc<SkipFirstRegistry>,
    persistence: PersistenceBridge,
    persist_lock: tokio::sync::Mutex<()>,
    sink: Arc<dyn NotificationSink>,
    metrics: Arc<ClientMetrics>,
    shutdown: CancellationToken,
    supervisor_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientManager {
    /// Creates a new manager builder.
    pub fn builder(stack: Arc<dyn ProtocolStack>, storage: Arc<dyn FileStorage>) -> ClientManagerBuilder {
        ClientManagerBuilder::new(stack, storage)
    }

    // =========================================================================
    // Publish
    // =========================================================================

    /// Monitors a node, creating the session and subscription as needed.
    ///
    /// Protocol rejections come back as [`PublishOutcome::Rejected`]; only
    /// a session that cannot be obtained is an error.
    pub async fn publish_node(
        &self,
        request: PublishRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<PublishOutcome> {
        let outcome = self.publish_unpersisted(&request, cancel).await?;
        if matches!(outcome, PublishOutcome::Monitored { .. }) {
            self.persist_after_mutation(cancel).await?;
        }
        Ok(outcome)
    }

    async fn publish_unpersisted(
        &self,
        request: &PublishRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<PublishOutcome> {
        if cancel.is_cancelled() {
            return Err(ClientError::cancelled("publish"));
        }

        let address = ServerAddress::new(&request.endpoint_url);
        if address.is_empty() {
            return Err(ClientError::configuration("endpoint_url", "must not be empty"));
        }
        let expanded: ExpandedNodeId = match request.node_id.parse() {
            Ok(expanded) => expanded,
            Err(e) => return Ok(self.reject(&address, &request.node_id, PublishFailureReason::BadNodeId, e)),
        };

        // The pool refuses addresses held for reconnection.
        let identity = Identity::from_credentials(request.credentials.clone());
        let session = match self.pool.connect_session(&address, identity, cancel).await {
            Ok(session) => session,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                e.log("publish");
                return Err(ClientError::publish_failed(
                    &address,
                    &request.node_id,
                    PublishFailureReason::SessionUnavailable,
                    e.to_string(),
                ));
            }
        };

        let mut group = session.subscriptions().lock().await;
        if cancel.is_cancelled() {
            return Err(ClientError::cancelled("publish"));
        }
        Ok(self.publish_locked(&session, &mut group, request, &expanded).await)
    }

    async fn publish_locked(
        &self,
        session: &Arc<ManagedSession>,
        group: &mut SubscriptionGroup,
        request: &PublishRequest,
        expanded: &ExpandedNodeId,
    ) -> PublishOutcome {
        let address = session.address();
        let inner = session.stack_session();
        let namespaces = inner.namespace_table();

        let node_id = match namespaces.resolve(expanded) {
            Ok(node_id) => node_id,
            Err(e) => return self.reject(address, &request.node_id, PublishFailureReason::BadNodeId, e),
        };

        let publishing_interval_ms = self.config.effective_publishing_interval(request.publishing_interval_ms);
        if group.contains_node(publishing_interval_ms, &node_id) {
            tracing::debug!(
                address = %address,
                node_id = %node_id,
                interval_ms = publishing_interval_ms,
                "Node already monitored"
            );
            return PublishOutcome::AlreadyMonitored;
        }

        let build = match EventFilter::build(&request.select_clauses, &request.where_clauses, &namespaces) {
            Ok(build) => build,
            Err(e) => return self.reject(address, &request.node_id, PublishFailureReason::Other, e),
        };
        for (idx, reason) in &build.rejected {
            tracing::warn!(
                address = %address,
                node_id = %node_id,
                clause = idx,
                reason = %reason,
                "Where clause rejected"
            );
        }
        let kind = if build.filter.is_some() {
            MonitoredItemKind::Event
        } else {
            MonitoredItemKind::DataChange
        };

        let display_name = if request.display_name.trim().is_empty() {
            match inner.read_display_name(&node_id).await {
                Ok(name) => name,
                Err(e) => {
                    tracing::debug!(address = %address, node_id = %node_id, error = %e, "Display name read failed");
                    String::new()
                }
            }
        } else {
            request.display_name.clone()
        };

        if let Err(e) = group.ensure_subscription(inner.as_ref(), publishing_interval_ms).await {
            let reason = classify(&e);
            return self.reject(address, &request.node_id, reason, e);
        }

        let info = Arc::new(MonitoredItemInfo {
            address: address.clone(),
            node_id: node_id.clone(),
            requested_id: request.node_id.clone(),
            display_name: display_name.clone(),
            publishing_interval_ms,
            sampling_interval_ms: self.config.effective_sampling_interval(request.sampling_interval_ms),
            kind,
            filter: build.filter.clone(),
        });
        let key = info.key();

        if request.skip_first {
            self.skip_first.register(key.clone());
        }

        let item_request = MonitoredItemRequest {
            node_id,
            attribute_id: kind.attribute(),
            kind,
            sampling_interval_ms: info.sampling_interval_ms,
            display_name,
            filter: build.filter,
        };
        let observer = Arc::new(ItemRouter::new(
            Arc::clone(&info),
            Arc::clone(&self.skip_first),
            Arc::clone(&self.sink),
            Arc::clone(&self.metrics),
        ));

        let monitored_item_id = match group
            .add_item(inner.as_ref(), Arc::clone(&info), item_request, observer)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.skip_first.remove(&key);
                group.prune_empty(inner.as_ref(), publishing_interval_ms).await;
                let reason = classify(&e);
                return self.reject(address, &request.node_id, reason, e);
            }
        };

        if request.heartbeat_interval_secs > 0 {
            self.heartbeats.start(
                Arc::clone(inner),
                Arc::clone(&info),
                Duration::from_secs(request.heartbeat_interval_secs),
            );
        }

        PublishOutcome::Monitored {
            monitored_item_id,
            rejected_where_clauses: build.rejected,
        }
    }

    fn reject(
        &self,
        address: &ServerAddress,
        node: &str,
        reason: PublishFailureReason,
        error: ClientError,
    ) -> PublishOutcome {
        match reason {
            PublishFailureReason::StaleSession => {
                tracing::warn!(address = %address, node, error = %error, "Publish rejected: session id no longer valid")
            }
            PublishFailureReason::StaleSubscription => {
                tracing::warn!(address = %address, node, error = %error, "Publish rejected: subscription id no longer valid")
            }
            PublishFailureReason::BadNodeId => {
                tracing::error!(address = %address, node, error = %error, "Publish rejected: invalid or unknown node id")
            }
            PublishFailureReason::UnsupportedFilterOperator => {
                tracing::error!(address = %address, node, error = %error, "Publish rejected: unsupported filter operator")
            }
            PublishFailureReason::SessionUnavailable | PublishFailureReason::Other => {
                tracing::error!(address = %address, node, error = %error, "Publish rejected")
            }
        }

        PublishOutcome::Rejected {
            reason,
            message: error.to_string(),
        }
    }

    // =========================================================================
    // Unpublish
    // =========================================================================

    /// Stops monitoring a node.
    ///
    /// Fails with `NotFound` if the session or item does not exist; the
    /// subscription is deleted when its last item goes.
    pub async fn unpublish_node(&self, request: UnpublishRequest, cancel: &CancellationToken) -> ClientResult<()> {
        if cancel.is_cancelled() {
            return Err(ClientError::cancelled("unpublish"));
        }

        let address = ServerAddress::new(&request.endpoint_url);
        let expanded: ExpandedNodeId = request.node_id.parse()?;
        let session = self
            .pool
            .find_session(&address)
            .ok_or_else(|| ClientError::session_not_found(&address))?;
        let interval_ms = self.config.effective_publishing_interval(request.publishing_interval_ms);

        {
            let mut group = session.subscriptions().lock().await;
            if cancel.is_cancelled() {
                return Err(ClientError::cancelled("unpublish"));
            }

            let inner = session.stack_session();
            let node_id = inner
                .namespace_table()
                .resolve(&expanded)
                .map_err(|_| ClientError::item_not_found(request.node_id.clone()))?;

            let record = group.remove_item(inner.as_ref(), interval_ms, &node_id).await?;
            let key = record.info.key();
            self.heartbeats.stop(&key);
            self.skip_first.remove(&key);
        }

        self.persist_after_mutation(cancel).await
    }

    /// Closes every session and persists the now empty topology.
    ///
    /// Returns the number of sessions closed.
    pub async fn unpublish_all(&self, cancel: &CancellationToken) -> ClientResult<usize> {
        if cancel.is_cancelled() {
            return Err(ClientError::cancelled("unpublish_all"));
        }
        let closed = self.close_all().await;
        self.persist_after_mutation(cancel).await?;
        Ok(closed)
    }

    async fn close_all(&self) -> usize {
        let reconnecting = self.supervisor.cancel_all();
        for session in &reconnecting {
            session.teardown(&self.heartbeats).await;
        }

        let closed = self.pool.close_all(&self.heartbeats).await + reconnecting.len();
        self.heartbeats.stop_all();
        self.skip_first.clear();

        tracing::info!(sessions = closed, "All sessions closed");
        closed
    }

    // =========================================================================
    // Topology
    // =========================================================================

    /// Returns the current topology, as it would be persisted.
    pub async fn list_published_nodes(&self) -> ClientResult<PersistedTopology> {
        self.persistence.snapshot(&self.all_sessions()).await
    }

    /// Connected sessions followed by reconnecting ones.
    fn all_sessions(&self) -> Vec<Arc<ManagedSession>> {
        let mut sessions = self.pool.sessions();
        sessions.extend(self.supervisor.sessions());
        sessions
    }

    async fn persist_after_mutation(&self, cancel: &CancellationToken) -> ClientResult<()> {
        if !self.config.persist_on_change {
            return Ok(());
        }
        match self.persist(cancel).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                e.log("persist");
                Ok(())
            }
        }
    }

    /// Snapshots and stores the topology.
    pub async fn persist(&self, cancel: &CancellationToken) -> ClientResult<()> {
        let _write = self.persist_lock.lock().await;
        let topology = self.persistence.snapshot(&self.all_sessions()).await?;
        self.persistence.store(&topology, cancel).await
    }

    /// Replays the persisted topology.
    ///
    /// Nodes that fail are logged and skipped. The topology is persisted
    /// once at the end.
    pub async fn rehydrate(&self, cancel: &CancellationToken) -> ClientResult<RehydrateSummary> {
        let Some(topology) = self.persistence.load().await? else {
            return Ok(RehydrateSummary::default());
        };

        let mut summary = RehydrateSummary {
            servers: topology.servers.len(),
            ..RehydrateSummary::default()
        };

        for entry in topology.servers {
            let credentials = match self.persistence.credentials_for(&entry) {
                Ok(credentials) => credentials,
                Err(e) => {
                    e.log("rehydrate");
                    summary.failed += entry.opc_nodes.len();
                    continue;
                }
            };

            for node in entry.opc_nodes {
                let request = PublishRequest {
                    endpoint_url: entry.endpoint_url.clone(),
                    node_id: node.id,
                    publishing_interval_ms: node.opc_publishing_interval,
                    sampling_interval_ms: node.opc_sampling_interval,
                    display_name: node.display_name,
                    heartbeat_interval_secs: node.heartbeat_interval,
                    skip_first: node.skip_first,
                    credentials: credentials.clone(),
                    ..PublishRequest::default()
                };

                match self.publish_unpersisted(&request, cancel).await {
                    Ok(PublishOutcome::Monitored { .. }) => summary.published += 1,
                    Ok(PublishOutcome::AlreadyMonitored) => summary.already_monitored += 1,
                    Ok(PublishOutcome::Rejected { .. }) => summary.failed += 1,
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        e.log("rehydrate");
                        summary.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            servers = summary.servers,
            published = summary.published,
            failed = summary.failed,
            "Topology rehydrated"
        );

        if summary.published > 0 {
            self.persist_after_mutation(cancel).await?;
        }
        Ok(summary)
    }

    // =========================================================================
    // Lifecycle / Inspection
    // =========================================================================

    /// Stops supervision and closes every session without persisting.
    ///
    /// The persisted topology is left as is, so the next start can
    /// rehydrate it.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.supervisor_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.close_all().await;
        tracing::info!("Client manager shut down");
    }

    /// Returns a metrics snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session pool.
    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// The reconnect supervisor.
    pub fn supervisor(&self) -> &Arc<ReconnectSupervisor> {
        &self.supervisor
    }

    /// The heartbeat scheduler.
    pub fn heartbeats(&self) -> &Arc<HeartbeatScheduler> {
        &self.heartbeats
    }

    /// Connectivity of the session for an address, if one exists.
    pub fn session_state(&self, address: &ServerAddress) -> Option<ConnectionState> {
        if let Some(session) = self.pool.find_session(address) {
            return Some(session.state());
        }
        self.supervisor
            .is_reconnecting(address)
            .then_some(ConnectionState::Reconnecting)
    }
}

fn classify(error: &ClientError) -> PublishFailureReason {
    error
        .status()
        .map_or(PublishFailureReason::Other, PublishFailureReason::classify)
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("pool", &self.pool)
            .field("supervisor", &self.supervisor)
            .field("heartbeats", &self.heartbeats)
            .field("persistence", &self.persistence)
            .finish()
    }
}

// =============================================================================
// ClientManagerBuilder
// =============================================================================

/// Builder for [`ClientManager`].
pub struct ClientManagerBuilder {
    stack: Arc<dyn ProtocolStack>,
    storage: Arc<dyn FileStorage>,
    config: Option<ClientConfig>,
    sink: Option<Arc<dyn NotificationSink>>,
    protector: Option<Arc<dyn CredentialProtector>>,
}

impl ClientManagerBuilder {
    /// Creates a builder.
    pub fn new(stack: Arc<dyn ProtocolStack>, storage: Arc<dyn FileStorage>) -> Self {
        Self {
            stack,
            storage,
            config: None,
            sink: None,
            protector: None,
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the downstream notification sink.
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the credential protector used for persisted credentials.
    pub fn protector(mut self, protector: Arc<dyn CredentialProtector>) -> Self {
        self.protector = Some(protector);
        self
    }

    /// Builds the manager and starts keep-alive supervision.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> ClientResult<ClientManager> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let config = Arc::new(config);

        let metrics = Arc::new(ClientMetrics::new());
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let skip_first = Arc::new(SkipFirstRegistry::new());
        let heartbeats = Arc::new(HeartbeatScheduler::new(Arc::clone(&sink), Arc::clone(&metrics)));

        let (keep_alive_tx, keep_alive_rx) = mpsc::channel(KEEP_ALIVE_CHANNEL_CAPACITY);
        let pool = Arc::new(SessionPool::new(
            self.stack,
            Arc::clone(&config),
            Arc::clone(&metrics),
            keep_alive_tx,
        ));
        let supervisor = Arc::new(ReconnectSupervisor::new(
            Arc::clone(&pool),
            Arc::clone(&heartbeats),
            Arc::clone(&skip_first),
            config.reconnect,
            config.keep_alive_failure_threshold,
            Arc::clone(&metrics),
        ));

        let persistence = PersistenceBridge::new(
            self.storage,
            self.protector,
            Arc::clone(&heartbeats),
            Arc::clone(&skip_first),
            config.persistence_path.clone(),
            Arc::clone(&metrics),
        );

        let shutdown = CancellationToken::new();
        let supervisor_task = supervisor.spawn(keep_alive_rx, shutdown.child_token());

        tracing::info!(
            application = %config.application_name,
            persistence_path = %config.persistence_path,
            "Client manager started"
        );

        Ok(ClientManager {
            config,
            pool,
            supervisor,
            heartbeats,
            skip_first,
            persistence,
            persist_lock: tokio::sync::Mutex::new(()),
            sink,
            metrics,
            shutdown,
            supervisor_task: Mutex::new(Some(supervisor_task)),
        })
    }
}
