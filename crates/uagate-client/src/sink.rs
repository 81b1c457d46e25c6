// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Downstream notification sink.
//!
//! The manager hands every notification (real or heartbeat) to a
//! [`NotificationSink`]. Delivery is fire-and-forget: sinks must not block.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::subscription::registry::MonitoredItemInfo;
use crate::types::{DataValue, Variant};

/// Consumer of monitored item notifications.
pub trait NotificationSink: Send + Sync {
    /// A value changed, or a heartbeat fired.
    fn on_data_change(&self, item: &MonitoredItemInfo, value: DataValue);

    /// An event was reported with its selected fields.
    fn on_event(&self, item: &MonitoredItemInfo, fields: Vec<Variant>);
}

// =============================================================================
// Notification
// =============================================================================

/// An owned notification as delivered by [`ChannelSink`].
#[derive(Debug, Clone)]
pub enum Notification {
    /// Data change (or synthetic heartbeat).
    DataChange {
        /// The item the value belongs to.
        item: Arc<MonitoredItemInfo>,
        /// The value.
        value: DataValue,
    },
    /// Event with selected fields.
    Event {
        /// The item the event belongs to.
        item: Arc<MonitoredItemInfo>,
        /// Field values in select-clause order.
        fields: Vec<Variant>,
        /// Time the manager received the event.
        received_at: DateTime<Utc>,
    },
}

impl Notification {
    /// Returns the item this notification belongs to.
    pub fn item(&self) -> &MonitoredItemInfo {
        match self {
            Self::DataChange { item, .. } | Self::Event { item, .. } => item,
        }
    }

    /// Returns `true` for heartbeat notifications.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::DataChange { value, .. } if value.synthetic)
    }
}

// =============================================================================
// ChannelSink
// =============================================================================

/// Forwards notifications into a bounded tokio channel.
///
/// When the channel is full the notification is dropped and a warning is
/// logged.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Notification>,
}

impl ChannelSink {
    /// Creates a sink around an existing sender.
    pub fn new(sender: mpsc::Sender<Notification>) -> Self {
        Self { sender }
    }

    /// Creates a sink and its receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    fn forward(&self, notification: Notification) {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.sender.try_send(notification) {
            tracing::warn!(
                address = %dropped.item().address,
                node_id = %dropped.item().node_id,
                "Notification channel full, dropping notification"
            );
        }
    }
}

impl NotificationSink for ChannelSink {
    fn on_data_change(&self, item: &MonitoredItemInfo, value: DataValue) {
        self.forward(Notification::DataChange {
            item: Arc::new(item.clone()),
            value,
        });
    }

    fn on_event(&self, item: &MonitoredItemInfo, fields: Vec<Variant>) {
        self.forward(Notification::Event {
            item: Arc::new(item.clone()),
            fields,
            received_at: Utc::now(),
        });
    }
}

// =============================================================================
// TracingSink
// =============================================================================

/// Logs every notification at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn on_data_change(&self, item: &MonitoredItemInfo, value: DataValue) {
        tracing::debug!(
            address = %item.address,
            node_id = %item.node_id,
            display_name = %item.display_name,
            value = %value.value,
            status = %value.status,
            synthetic = value.synthetic,
            "Data change"
        );
    }

    fn on_event(&self, item: &MonitoredItemInfo, fields: Vec<Variant>) {
        tracing::debug!(
            address = %item.address,
            node_id = %item.node_id,
            fields = fields.len(),
            "Event"
        );
    }
}
