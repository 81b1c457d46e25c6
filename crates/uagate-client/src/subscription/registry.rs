// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitored item metadata, skip-first tracking and notification routing.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::metrics::ClientMetrics;
use crate::sink::NotificationSink;
use crate::stack::ItemObserver;
use crate::subscription::filter::EventFilter;
use crate::types::{DataValue, MonitoredItemKind, NodeId, ServerAddress, Variant};

// =============================================================================
// ItemKey
// =============================================================================

/// Identity of a monitored item across the manager.
///
/// A node may be monitored once per subscription, so the publishing
/// interval is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    /// Owning session address.
    pub address: ServerAddress,
    /// Resolved node id.
    pub node_id: NodeId,
    /// Publishing interval of the owning subscription.
    pub publishing_interval_ms: u32,
}

impl ItemKey {
    /// Creates a key.
    pub fn new(address: ServerAddress, node_id: NodeId, publishing_interval_ms: u32) -> Self {
        Self {
            address,
            node_id,
            publishing_interval_ms,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}ms", self.address, self.node_id, self.publishing_interval_ms)
    }
}

// =============================================================================
// MonitoredItemInfo
// =============================================================================

/// Everything the manager knows about one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemInfo {
    /// Owning session address.
    pub address: ServerAddress,
    /// Node id resolved against the session's namespace table.
    pub node_id: NodeId,
    /// Node id as the caller supplied it.
    pub requested_id: String,
    /// Display name.
    pub display_name: String,
    /// Effective publishing interval of the owning subscription.
    pub publishing_interval_ms: u32,
    /// Effective sampling interval.
    pub sampling_interval_ms: u32,
    /// Item flavour.
    pub kind: MonitoredItemKind,
    /// Event filter for event items.
    pub filter: Option<EventFilter>,
}

impl MonitoredItemInfo {
    /// Returns the manager-wide key of this item.
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.address.clone(), self.node_id.clone(), self.publishing_interval_ms)
    }
}

/// A monitored item applied on the server.
#[derive(Debug, Clone)]
pub struct MonitoredItemRecord {
    /// Server-assigned monitored item id.
    pub monitored_item_id: u32,
    /// Item metadata.
    pub info: Arc<MonitoredItemInfo>,
}

// =============================================================================
// SkipFirstRegistry
// =============================================================================

/// Tracks items whose first notification is suppressed.
///
/// The configured set survives the first notification so the flag can be
/// persisted; the pending set is consumed by it.
#[derive(Debug, Default)]
pub struct SkipFirstRegistry {
    inner: Mutex<SkipFirstState>,
}

#[derive(Debug, Default)]
struct SkipFirstState {
    configured: HashSet<ItemKey>,
    pending: HashSet<ItemKey>,
}

impl SkipFirstRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an item so its next notification is dropped.
    pub fn register(&self, key: ItemKey) {
        let mut state = self.inner.lock();
        state.pending.insert(key.clone());
        state.configured.insert(key);
    }

    /// Consumes the pending mark. Returns `true` if the notification must be dropped.
    pub fn consume(&self, key: &ItemKey) -> bool {
        self.inner.lock().pending.remove(key)
    }

    /// Returns `true` if the item was published with skip-first.
    pub fn is_configured(&self, key: &ItemKey) -> bool {
        self.inner.lock().configured.contains(key)
    }

    /// Forgets an item.
    pub fn remove(&self, key: &ItemKey) {
        let mut state = self.inner.lock();
        state.pending.remove(key);
        state.configured.remove(key);
    }

    /// Forgets every item of a session.
    pub fn remove_session(&self, address: &ServerAddress) {
        let mut state = self.inner.lock();
        state.pending.retain(|k| &k.address != address);
        state.configured.retain(|k| &k.address != address);
    }

    /// Forgets everything.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.pending.clear();
        state.configured.clear();
    }
}

// =============================================================================
// ItemRouter
// =============================================================================

/// The [`ItemObserver`] handed to the stack for each monitored item.
///
/// Applies skip-first and forwards everything else to the sink.
pub struct ItemRouter {
    info: Arc<MonitoredItemInfo>,
    key: ItemKey,
    skip_first: Arc<SkipFirstRegistry>,
    sink: Arc<dyn NotificationSink>,
    metrics: Arc<ClientMetrics>,
}

impl ItemRouter {
    /// Creates a router for one item.
    pub fn new(
        info: Arc<MonitoredItemInfo>,
        skip_first: Arc<SkipFirstRegistry>,
        sink: Arc<dyn NotificationSink>,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        let key = info.key();
        Self {
            info,
            key,
            skip_first,
            sink,
            metrics,
        }
    }

    fn should_skip(&self) -> bool {
        if self.skip_first.consume(&self.key) {
            self.metrics.notification_skipped();
            tracing::debug!(item = %self.key, "First notification skipped");
            return true;
        }
        false
    }
}

impl ItemObserver for ItemRouter {
    fn on_data_change(&self, value: DataValue) {
        if !self.should_skip() {
            self.sink.on_data_change(&self.info, value);
        }
    }

    fn on_event(&self, fields: Vec<Variant>) {
        if !self.should_skip() {
            self.sink.on_event(&self.info, fields);
        }
    }
}

impl fmt::Debug for ItemRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemRouter").field("item", &self.key).finish()
    }
}
