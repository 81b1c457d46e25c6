// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connected session pool.
//!
//! The pool holds every session currently `Connected`, in creation order.
//! A session in `Reconnecting` is removed from the pool and held by the
//! reconnect supervisor until it comes back. The pool remembers the
//! addresses held that way, under the same lock as the connected list, so
//! no second session is opened for an address while it is reconnecting.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::credentials::Identity;
use crate::endpoint::EndpointResolver;
use crate::error::{ClientError, ClientResult};
use crate::heartbeat::HeartbeatScheduler;
use crate::metrics::ClientMetrics;
use crate::session::reconnect::KeepAliveSignal;
use crate::stack::{ProtocolStack, StackSession};
use crate::subscription::group::SubscriptionGroup;
use crate::subscription::registry::MonitoredItemRecord;
use crate::types::{EndpointDescriptor, ServerAddress};

// =============================================================================
// ConnectionState
// =============================================================================

/// Connectivity of a managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// In the pool and usable.
    #[default]
    Connected,
    /// Held by the reconnect supervisor.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("Connected"),
            Self::Reconnecting => f.write_str("Reconnecting"),
        }
    }
}

// =============================================================================
// ManagedSession
// =============================================================================

/// One authenticated session plus the manager's state for it.
pub struct ManagedSession {
    address: ServerAddress,
    identity: Identity,
    endpoint: EndpointDescriptor,
    inner: Arc<dyn StackSession>,
    /// Serializes subscription mutations for this session.
    subscriptions: tokio::sync::Mutex<SubscriptionGroup>,
    missed_keep_alives: AtomicU32,
    state: RwLock<ConnectionState>,
    keep_alive_task: Mutex<Option<JoinHandle<()>>>,
}

impl ManagedSession {
    /// Wraps an open stack session.
    pub fn new(
        address: ServerAddress,
        identity: Identity,
        endpoint: EndpointDescriptor,
        inner: Arc<dyn StackSession>,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        Self {
            subscriptions: tokio::sync::Mutex::new(SubscriptionGroup::new(address.clone(), metrics)),
            address,
            identity,
            endpoint,
            inner,
            missed_keep_alives: AtomicU32::new(0),
            state: RwLock::new(ConnectionState::Connected),
            keep_alive_task: Mutex::new(None),
        }
    }

    /// Server address.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Identity the session authenticated with.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Endpoint the session was opened on.
    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.endpoint
    }

    /// The underlying stack session.
    pub fn stack_session(&self) -> &Arc<dyn StackSession> {
        &self.inner
    }

    /// The session's subscriptions, locked per session.
    pub fn subscriptions(&self) -> &tokio::sync::Mutex<SubscriptionGroup> {
        &self.subscriptions
    }

    /// Current connectivity state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Consecutive bad keep-alives seen.
    pub fn missed_keep_alives(&self) -> u32 {
        self.missed_keep_alives.load(Ordering::SeqCst)
    }

    pub(crate) fn record_missed_keep_alive(&self) -> u32 {
        self.missed_keep_alives.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Resets the counter and returns the previous value.
    pub(crate) fn reset_missed_keep_alives(&self) -> u32 {
        self.missed_keep_alives.swap(0, Ordering::SeqCst)
    }

    fn stop_keep_alive(&self) {
        if let Some(task) = self.keep_alive_task.lock().take() {
            task.abort();
        }
    }

    /// Removes all items and subscriptions, stops heartbeats and closes the session.
    ///
    /// Returns the removed records.
    pub async fn teardown(&self, heartbeats: &HeartbeatScheduler) -> Vec<MonitoredItemRecord> {
        heartbeats.stop_session(&self.address);
        let removed = {
            let mut group = self.subscriptions.lock().await;
            group.remove_all(self.inner.as_ref()).await
        };
        self.close().await;
        removed
    }

    /// Drops local state and closes the session without server cleanup.
    pub(crate) async fn abandon(&self, heartbeats: &HeartbeatScheduler) -> Vec<MonitoredItemRecord> {
        heartbeats.stop_session(&self.address);
        let removed = self.subscriptions.lock().await.discard_all();
        self.close().await;
        removed
    }

    /// Stops keep-alive forwarding and closes the stack session.
    pub(crate) async fn close(&self) {
        self.stop_keep_alive();
        match self.inner.close().await {
            Ok(()) => tracing::info!(address = %self.address, "Session closed"),
            Err(e) => tracing::warn!(address = %self.address, error = %e, "Session close failed"),
        }
    }
}

impl fmt::Debug for ManagedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedSession")
            .field("address", &self.address)
            .field("auth_mode", &self.identity.auth_mode())
            .field("state", &self.state())
            .field("missed_keep_alives", &self.missed_keep_alives())
            .finish()
    }
}

impl Drop for ManagedSession {
    fn drop(&mut self) {
        if let Some(task) = self.keep_alive_task.get_mut().take() {
            task.abort();
        }
    }
}

// =============================================================================
// SessionPool
// =============================================================================

#[derive(Default)]
struct PoolSlots {
    connected: Vec<Arc<ManagedSession>>,
    reconnecting: HashSet<ServerAddress>,
}

impl PoolSlots {
    /// Connected session for the address; an error while it is reconnecting.
    fn lookup(&self, address: &ServerAddress) -> ClientResult<Option<Arc<ManagedSession>>> {
        if self.reconnecting.contains(address) {
            return Err(ClientError::unreachable(address, "session is reconnecting"));
        }
        Ok(self.connected.iter().find(|s| s.address() == address).cloned())
    }
}

/// The set of connected sessions.
pub struct SessionPool {
    stack: Arc<dyn ProtocolStack>,
    resolver: EndpointResolver,
    slots: Mutex<PoolSlots>,
    config: Arc<ClientConfig>,
    metrics: Arc<ClientMetrics>,
    keep_alive_tx: mpsc::Sender<KeepAliveSignal>,
}

impl SessionPool {
    /// Creates an empty pool. Keep-alive results of every session are
    /// forwarded into `keep_alive_tx`.
    pub fn new(
        stack: Arc<dyn ProtocolStack>,
        config: Arc<ClientConfig>,
        metrics: Arc<ClientMetrics>,
        keep_alive_tx: mpsc::Sender<KeepAliveSignal>,
    ) -> Self {
        Self {
            resolver: EndpointResolver::new(Arc::clone(&stack)),
            stack,
            slots: Mutex::new(PoolSlots::default()),
            config,
            metrics,
            keep_alive_tx,
        }
    }

    /// The endpoint resolver used by this pool.
    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    /// Looks up a connected session. No I/O.
    pub fn find_session(&self, address: &ServerAddress) -> Option<Arc<ManagedSession>> {
        self.slots
            .lock()
            .connected
            .iter()
            .find(|s| s.address() == address)
            .cloned()
    }

    /// Returns `true` while the address's session is held for reconnection.
    pub fn is_reconnecting(&self, address: &ServerAddress) -> bool {
        self.slots.lock().reconnecting.contains(address)
    }

    /// Returns the connected session for an address, opening one if needed.
    ///
    /// Fails with `UnreachableServer` while the address is reconnecting.
    pub async fn connect_session(
        &self,
        address: &ServerAddress,
        identity: Identity,
        cancel: &CancellationToken,
    ) -> ClientResult<Arc<ManagedSession>> {
        if let Some(existing) = self.slots.lock().lookup(address)? {
            return Ok(existing);
        }

        let endpoint = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::cancelled("connect_session")),
            resolved = self.resolver.resolve(address) => resolved?,
        };

        tracing::info!(
            address = %address,
            auth_mode = %identity.auth_mode(),
            "Creating session"
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::cancelled("connect_session")),
            opened = self.stack.open_session(&endpoint, &identity, self.config.session_timeout) => opened,
        };
        let inner = opened.map_err(|e| match e {
            ClientError::SessionCreationFailed { .. } => e,
            other => ClientError::session_creation(address, other.to_string()),
        })?;

        if let Err(e) = inner.load_complex_types().await {
            tracing::warn!(address = %address, error = %e, "Failed to load complex types");
        }

        let session = Arc::new(ManagedSession::new(
            address.clone(),
            identity,
            endpoint,
            inner,
            Arc::clone(&self.metrics),
        ));

        let existing = {
            let mut slots = self.slots.lock();
            let existing = slots.lookup(address);
            if matches!(existing, Ok(None)) {
                slots.connected.push(Arc::clone(&session));
            }
            existing
        };

        match existing {
            Ok(None) => {}
            Ok(Some(existing)) => {
                tracing::debug!(address = %address, "Concurrent session creation, keeping the first");
                close_unused(&session).await;
                return Ok(existing);
            }
            Err(e) => {
                tracing::debug!(address = %address, "Session went into reconnect while opening, closing the new one");
                close_unused(&session).await;
                return Err(e);
            }
        }

        self.metrics.session_added();
        self.spawn_keep_alive(&session);

        tracing::info!(
            address = %address,
            session_id = %session.stack_session().session_id(),
            "Session created"
        );
        Ok(session)
    }

    fn spawn_keep_alive(&self, session: &Arc<ManagedSession>) {
        let mut events = session.stack_session().keep_alive_events();
        let tx = self.keep_alive_tx.clone();
        let weak = Arc::downgrade(session);

        let task = tokio::spawn(async move {
            while let Some(status) = events.recv().await {
                let Some(session) = weak.upgrade() else {
                    break;
                };
                if tx.send(KeepAliveSignal { session, status }).await.is_err() {
                    break;
                }
            }
        });

        *session.keep_alive_task.lock() = Some(task);
    }

    /// Removes a session from the pool. Returns `true` if it was present.
    pub fn remove_session(&self, session: &Arc<ManagedSession>) -> bool {
        let removed = detach(&mut self.slots.lock().connected, session);
        if removed {
            self.metrics.session_removed();
        }
        removed
    }

    /// Moves a session out of the pool and blocks new sessions for its
    /// address until [`add_session`](Self::add_session) or
    /// [`release`](Self::release). Returns `true` if it was connected.
    pub fn hold_for_reconnect(&self, session: &Arc<ManagedSession>) -> bool {
        let removed = {
            let mut slots = self.slots.lock();
            slots.reconnecting.insert(session.address().clone());
            detach(&mut slots.connected, session)
        };
        if removed {
            self.metrics.session_removed();
        }
        removed
    }

    /// Unblocks an address held for reconnection without restoring its session.
    pub fn release(&self, address: &ServerAddress) -> bool {
        self.slots.lock().reconnecting.remove(address)
    }

    /// Adds a session back to the pool and unblocks its address.
    ///
    /// Returns `false` if already present.
    pub fn add_session(&self, session: Arc<ManagedSession>) -> bool {
        let added = {
            let mut slots = self.slots.lock();
            slots.reconnecting.remove(session.address());
            if slots.connected.iter().any(|s| Arc::ptr_eq(s, &session)) {
                false
            } else {
                slots.connected.push(session);
                true
            }
        };
        if added {
            self.metrics.session_added();
        }
        added
    }

    /// A consistent copy of the connected sessions, in creation order.
    pub fn sessions(&self) -> Vec<Arc<ManagedSession>> {
        self.slots.lock().connected.clone()
    }

    /// Number of connected sessions.
    pub fn len(&self) -> usize {
        self.slots.lock().connected.len()
    }

    /// Returns `true` if no session is connected.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().connected.is_empty()
    }

    /// Tears down and closes every connected session.
    ///
    /// Returns the number of sessions closed.
    pub async fn close_all(&self, heartbeats: &HeartbeatScheduler) -> usize {
        let sessions = self.sessions();
        for session in &sessions {
            let removed = session.teardown(heartbeats).await;
            tracing::debug!(
                address = %session.address(),
                items = removed.len(),
                "Session torn down"
            );
            self.remove_session(session);
        }
        sessions.len()
    }
}

fn detach(connected: &mut Vec<Arc<ManagedSession>>, session: &Arc<ManagedSession>) -> bool {
    let before = connected.len();
    connected.retain(|s| !Arc::ptr_eq(s, session));
    connected.len() != before
}

async fn close_unused(session: &ManagedSession) {
    if let Err(e) = session.stack_session().close().await {
        tracing::debug!(address = %session.address(), error = %e, "Closing unused session failed");
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("sessions", &self.len())
            .field("resolver", &self.resolver)
            .finish()
    }
}
