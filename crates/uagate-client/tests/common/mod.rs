// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Protocol Stack
//!
//! In-memory [`ProtocolStack`] for exercising the client manager without a
//! server. Behavior is configured on [`MockBehavior`], which every session
//! opened by the stack shares, and interactions are recorded for assertions.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use uagate_client::{
    ClientError, ClientResult, CreatedSubscription, DataValue, EndpointDescriptor, Identity,
    ItemObserver, MonitoredItemRequest, NamespaceTable, NodeId, Notification, ProtocolStack,
    SecurityMode, ServerAddress, StackSession, StatusCode, Variant,
};

pub const PLANT_URL: &str = "opc.tcp://plant1:4840";
pub const PLANT_NS: &str = "urn:plant1";

// =============================================================================
// MockBehavior
// =============================================================================

/// Behavior shared by the stack and all of its sessions.
#[derive(Default)]
pub struct MockBehavior {
    /// Addresses that fail discovery.
    pub unreachable: Mutex<HashSet<String>>,
    /// Reject session activation.
    pub reject_session: AtomicBool,
    /// Status returned by `add_monitored_item`, keyed by node id string.
    pub reject_items: Mutex<HashMap<String, StatusCode>>,
    /// Revised publishing interval returned by the server.
    pub revised_interval: Mutex<Option<u32>>,
    /// Display names returned by `read_display_name`.
    pub display_names: Mutex<HashMap<String, String>>,
    /// Value returned by `read_value`.
    pub value: Mutex<Variant>,
    /// Fail every `read_value`.
    pub fail_reads: AtomicBool,
    /// Let `reconnect` succeed.
    pub reconnect_succeeds: AtomicBool,
}

// =============================================================================
// MockStack
// =============================================================================

/// A protocol stack that opens [`MockSession`]s.
pub struct MockStack {
    pub behavior: Arc<MockBehavior>,
    namespaces: Vec<String>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    pub discover_calls: AtomicU32,
    pub open_calls: AtomicU32,
}

impl MockStack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behavior: Arc::new(MockBehavior {
                value: Mutex::new(Variant::Double(21.5)),
                ..MockBehavior::default()
            }),
            namespaces: vec!["http://opcfoundation.org/UA/".into(), "urn:server".into(), PLANT_NS.into()],
            sessions: Mutex::new(Vec::new()),
            discover_calls: AtomicU32::new(0),
            open_calls: AtomicU32::new(0),
        })
    }

    /// Sessions opened so far, in order.
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().clone()
    }

    /// The most recently opened session.
    pub fn last_session(&self) -> Arc<MockSession> {
        self.sessions.lock().last().cloned().expect("no session opened")
    }
}

#[async_trait]
impl ProtocolStack for MockStack {
    async fn discover(&self, address: &ServerAddress) -> ClientResult<EndpointDescriptor> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.unreachable.lock().contains(address.as_str()) {
            return Err(ClientError::unreachable(address, "connection refused"));
        }
        Ok(EndpointDescriptor {
            address: address.clone(),
            endpoint_url: address.to_string(),
            security_policy_uri: "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256".into(),
            security_mode: SecurityMode::SignAndEncrypt,
            security_level: 3,
            server_certificate: None,
        })
    }

    async fn open_session(
        &self,
        endpoint: &EndpointDescriptor,
        identity: &Identity,
        _session_timeout: Duration,
    ) -> ClientResult<Arc<dyn StackSession>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.reject_session.load(Ordering::SeqCst) {
            return Err(ClientError::stack(
                "activate_session",
                StatusCode::BAD_UNEXPECTED_ERROR,
                "identity rejected",
            ));
        }

        let session = Arc::new(MockSession::new(
            format!("session-{}", self.open_calls.load(Ordering::SeqCst)),
            endpoint.address.clone(),
            identity.clone(),
            NamespaceTable::new(self.namespaces.clone()),
            Arc::clone(&self.behavior),
        ));
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }
}

// =============================================================================
// MockSession
// =============================================================================

struct MockItem {
    subscription_id: u32,
    request: MonitoredItemRequest,
    observer: Arc<dyn ItemObserver>,
}

/// A stack session that records what the manager does to it.
pub struct MockSession {
    id: String,
    pub address: ServerAddress,
    pub identity: Identity,
    namespaces: NamespaceTable,
    behavior: Arc<MockBehavior>,
    keep_alive: Mutex<Vec<mpsc::Sender<StatusCode>>>,
    next_id: AtomicU32,
    subscriptions: Mutex<BTreeMap<u32, u32>>,
    items: Mutex<BTreeMap<u32, MockItem>>,
    pub deleted_subscriptions: Mutex<Vec<u32>>,
    pub reconnect_calls: AtomicU32,
    pub closed: AtomicBool,
}

impl MockSession {
    fn new(
        id: String,
        address: ServerAddress,
        identity: Identity,
        namespaces: NamespaceTable,
        behavior: Arc<MockBehavior>,
    ) -> Self {
        Self {
            id,
            address,
            identity,
            namespaces,
            behavior,
            keep_alive: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            subscriptions: Mutex::new(BTreeMap::new()),
            items: Mutex::new(BTreeMap::new()),
            deleted_subscriptions: Mutex::new(Vec::new()),
            reconnect_calls: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Reports a keep-alive result to every subscriber.
    pub fn keep_alive(&self, status: StatusCode) {
        for tx in self.keep_alive.lock().iter() {
            let _ = tx.try_send(status);
        }
    }

    /// Server-side subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Publishing intervals of the server-side subscriptions.
    pub fn subscription_intervals(&self) -> Vec<u32> {
        self.subscriptions.lock().values().copied().collect()
    }

    /// Server-side monitored item count.
    pub fn item_count(&self) -> usize {
        self.items.lock().len()
    }

    /// The request an item was created with.
    pub fn request_for(&self, node_id: &NodeId) -> Option<MonitoredItemRequest> {
        self.items
            .lock()
            .values()
            .find(|item| &item.request.node_id == node_id)
            .map(|item| item.request.clone())
    }

    fn observers_for(&self, node_id: &NodeId) -> Vec<Arc<dyn ItemObserver>> {
        self.items
            .lock()
            .values()
            .filter(|item| &item.request.node_id == node_id)
            .map(|item| Arc::clone(&item.observer))
            .collect()
    }

    /// Delivers a data change for a node.
    pub fn notify(&self, node_id: &NodeId, value: Variant) {
        for observer in self.observers_for(node_id) {
            observer.on_data_change(DataValue::new(value.clone()));
        }
    }

    /// Delivers an event for a node.
    pub fn raise_event(&self, node_id: &NodeId, fields: Vec<Variant>) {
        for observer in self.observers_for(node_id) {
            observer.on_event(fields.clone());
        }
    }
}

#[async_trait]
impl StackSession for MockSession {
    fn session_id(&self) -> String {
        self.id.clone()
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn namespace_table(&self) -> NamespaceTable {
        self.namespaces.clone()
    }

    fn keep_alive_events(&self) -> mpsc::Receiver<StatusCode> {
        let (tx, rx) = mpsc::channel(64);
        self.keep_alive.lock().push(tx);
        rx
    }

    async fn load_complex_types(&self) -> ClientResult<()> {
        Ok(())
    }

    async fn create_subscription(&self, publishing_interval_ms: u32) -> ClientResult<CreatedSubscription> {
        let subscription_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().insert(subscription_id, publishing_interval_ms);
        Ok(CreatedSubscription {
            subscription_id,
            revised_publishing_interval_ms: self
                .behavior
                .revised_interval
                .lock()
                .unwrap_or(publishing_interval_ms),
        })
    }

    async fn delete_subscription(&self, subscription_id: u32) -> ClientResult<()> {
        self.subscriptions.lock().remove(&subscription_id);
        self.items.lock().retain(|_, item| item.subscription_id != subscription_id);
        self.deleted_subscriptions.lock().push(subscription_id);
        Ok(())
    }

    async fn add_monitored_item(
        &self,
        subscription_id: u32,
        request: MonitoredItemRequest,
        observer: Arc<dyn ItemObserver>,
    ) -> ClientResult<u32> {
        let node = request.node_id.to_string();
        if let Some(status) = self.behavior.reject_items.lock().get(&node).copied() {
            return Err(ClientError::stack("add_monitored_item", status, format!("{} rejected", node)));
        }
        if !self.subscriptions.lock().contains_key(&subscription_id) {
            return Err(ClientError::stack(
                "add_monitored_item",
                StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
                "unknown subscription",
            ));
        }

        let item_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.items.lock().insert(
            item_id,
            MockItem {
                subscription_id,
                request,
                observer,
            },
        );
        Ok(item_id)
    }

    async fn remove_monitored_item(&self, _subscription_id: u32, monitored_item_id: u32) -> ClientResult<()> {
        self.items.lock().remove(&monitored_item_id);
        Ok(())
    }

    async fn read_value(&self, _node_id: &NodeId) -> ClientResult<DataValue> {
        if self.behavior.fail_reads.load(Ordering::SeqCst) {
            return Err(ClientError::stack("read", StatusCode::BAD_TIMEOUT, "read timed out"));
        }
        Ok(DataValue::new(self.behavior.value.lock().clone()))
    }

    async fn read_display_name(&self, node_id: &NodeId) -> ClientResult<String> {
        self.behavior
            .display_names
            .lock()
            .get(&node_id.to_string())
            .cloned()
            .ok_or_else(|| ClientError::stack("read", StatusCode::BAD_NODE_ID_UNKNOWN, "no display name"))
    }

    async fn reconnect(&self) -> ClientResult<()> {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.reconnect_succeeds.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::stack("reconnect", StatusCode::BAD_NOT_CONNECTED, "server down"))
        }
    }

    async fn close(&self) -> ClientResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Drains every notification currently queued.
pub fn drain(rx: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}

