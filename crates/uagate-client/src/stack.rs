// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol stack collaborator traits.
//!
//! The manager never speaks the wire protocol itself. It drives an
//! underlying stack through these traits:
//!
//! ```text
//! ProtocolStack ── discover(address) ──────────────▶ EndpointDescriptor
//!               └─ open_session(endpoint, identity) ▶ StackSession
//!
//! StackSession ── create/delete_subscription
//!              ├─ add/remove_monitored_item (attach + apply)
//!              ├─ read_value / read_display_name
//!              ├─ keep_alive_events() ─▶ stream of StatusCode
//!              └─ reconnect() / close()
//! ```
//!
//! Notifications for a monitored item flow back through the
//! [`ItemObserver`] handed to the stack when the item is created.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::credentials::Identity;
use crate::error::ClientResult;
use crate::subscription::filter::EventFilter;
use crate::types::{
    AttributeId, DataValue, EndpointDescriptor, MonitoredItemKind, NamespaceTable, NodeId,
    ServerAddress, StatusCode, Variant,
};

// =============================================================================
// ProtocolStack
// =============================================================================

/// Entry point of the underlying protocol stack.
#[async_trait]
pub trait ProtocolStack: Send + Sync + 'static {
    /// Discovers the endpoints of a server and picks the most secure one.
    ///
    /// Fails with `UnreachableServer` when the address cannot be contacted.
    async fn discover(&self, address: &ServerAddress) -> ClientResult<EndpointDescriptor>;

    /// Opens and activates an authenticated session.
    async fn open_session(
        &self,
        endpoint: &EndpointDescriptor,
        identity: &Identity,
        session_timeout: Duration,
    ) -> ClientResult<Arc<dyn StackSession>>;
}

// =============================================================================
// StackSession
// =============================================================================

/// Server-assigned identifiers of a created subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedSubscription {
    /// Server subscription id.
    pub subscription_id: u32,
    /// Publishing interval granted by the server.
    pub revised_publishing_interval_ms: u32,
}

/// Parameters of a monitored item to create.
#[derive(Debug, Clone)]
pub struct MonitoredItemRequest {
    /// Node to monitor.
    pub node_id: NodeId,
    /// Attribute to monitor.
    pub attribute_id: AttributeId,
    /// Item flavour.
    pub kind: MonitoredItemKind,
    /// Sampling interval in milliseconds.
    pub sampling_interval_ms: u32,
    /// Display name attached to the item.
    pub display_name: String,
    /// Event filter for event items.
    pub filter: Option<EventFilter>,
}

/// One open session on the underlying stack.
#[async_trait]
pub trait StackSession: Send + Sync {
    /// Server-assigned session identifier, for logging.
    fn session_id(&self) -> String;

    /// Returns `true` while the transport reports the session connected.
    fn is_connected(&self) -> bool;

    /// The server's namespace URI table.
    fn namespace_table(&self) -> NamespaceTable;

    /// Subscribes to keep-alive results for this session.
    ///
    /// Each call returns a fresh receiver. The stack keeps reporting for as
    /// long as the session exists, including while reconnecting.
    fn keep_alive_events(&self) -> mpsc::Receiver<StatusCode>;

    /// Loads the server's complex type definitions.
    async fn load_complex_types(&self) -> ClientResult<()>;

    /// Creates a subscription.
    async fn create_subscription(&self, publishing_interval_ms: u32) -> ClientResult<CreatedSubscription>;

    /// Deletes a subscription and all of its items.
    async fn delete_subscription(&self, subscription_id: u32) -> ClientResult<()>;

    /// Adds a monitored item to a subscription and applies the change.
    ///
    /// Returns the server-assigned monitored item id.
    async fn add_monitored_item(
        &self,
        subscription_id: u32,
        request: MonitoredItemRequest,
        observer: Arc<dyn ItemObserver>,
    ) -> ClientResult<u32>;

    /// Removes a monitored item and applies the change.
    async fn remove_monitored_item(&self, subscription_id: u32, monitored_item_id: u32) -> ClientResult<()>;

    /// Reads the current value of a node.
    async fn read_value(&self, node_id: &NodeId) -> ClientResult<DataValue>;

    /// Reads the display name of a node.
    async fn read_display_name(&self, node_id: &NodeId) -> ClientResult<String>;

    /// Makes one attempt to re-establish the session.
    ///
    /// `Ok` is the reconnect-complete notification.
    async fn reconnect(&self) -> ClientResult<()>;

    /// Closes the session.
    async fn close(&self) -> ClientResult<()>;
}

// =============================================================================
// ItemObserver
// =============================================================================

/// Receives notifications for one monitored item from the stack.
pub trait ItemObserver: Send + Sync {
    /// Called for data-change notifications.
    fn on_data_change(&self, value: DataValue);

    /// Called for event notifications with the selected field values.
    fn on_event(&self, fields: Vec<Variant>);
}
