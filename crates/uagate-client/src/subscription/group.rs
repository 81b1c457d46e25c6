// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-session subscriptions grouped by publishing interval.
//!
//! A session holds at most one subscription per effective publishing
//! interval. Items are appended to the matching subscription and a
//! subscription is deleted as soon as its last item is removed.
//!
//! The group is not synchronized itself: it lives behind the owning
//! session's async mutex, which serializes every mutation per session.

use std::sync::Arc;

use crate::error::{ClientError, ClientResult};
use crate::metrics::ClientMetrics;
use crate::stack::{ItemObserver, MonitoredItemRequest, StackSession};
use crate::subscription::registry::{MonitoredItemInfo, MonitoredItemRecord};
use crate::types::{NodeId, ServerAddress};

// =============================================================================
// ManagedSubscription
// =============================================================================

/// One server subscription and its items.
#[derive(Debug, Clone)]
pub struct ManagedSubscription {
    /// Server subscription id.
    pub subscription_id: u32,
    /// Interval the subscription was requested with; the lookup key.
    pub requested_interval_ms: u32,
    /// Interval granted by the server.
    pub revised_interval_ms: u32,
    /// Items in creation order.
    pub items: Vec<MonitoredItemRecord>,
}

impl ManagedSubscription {
    /// Finds an item by resolved node id.
    pub fn find_item(&self, node_id: &NodeId) -> Option<&MonitoredItemRecord> {
        self.items.iter().find(|r| &r.info.node_id == node_id)
    }

    /// Returns `true` if the node is monitored here.
    pub fn contains_node(&self, node_id: &NodeId) -> bool {
        self.find_item(node_id).is_some()
    }
}

// =============================================================================
// SubscriptionGroup
// =============================================================================

/// The subscriptions of one session.
#[derive(Debug)]
pub struct SubscriptionGroup {
    address: ServerAddress,
    subscriptions: Vec<ManagedSubscription>,
    metrics: Arc<ClientMetrics>,
}

impl SubscriptionGroup {
    /// Creates an empty group.
    pub fn new(address: ServerAddress, metrics: Arc<ClientMetrics>) -> Self {
        Self {
            address,
            subscriptions: Vec::new(),
            metrics,
        }
    }

    /// Subscriptions in creation order.
    pub fn subscriptions(&self) -> &[ManagedSubscription] {
        &self.subscriptions
    }

    /// Finds the subscription for an effective interval.
    pub fn find(&self, interval_ms: u32) -> Option<&ManagedSubscription> {
        self.subscriptions
            .iter()
            .find(|s| s.requested_interval_ms == interval_ms)
    }

    fn position(&self, interval_ms: u32) -> Option<usize> {
        self.subscriptions
            .iter()
            .position(|s| s.requested_interval_ms == interval_ms)
    }

    /// Returns `true` if the node is monitored under the interval's subscription.
    pub fn contains_node(&self, interval_ms: u32, node_id: &NodeId) -> bool {
        self.find(interval_ms)
            .is_some_and(|s| s.contains_node(node_id))
    }

    /// Total number of items across subscriptions.
    pub fn item_count(&self) -> usize {
        self.subscriptions.iter().map(|s| s.items.len()).sum()
    }

    /// Returns `true` when the session has no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Returns the subscription for an interval, creating it if needed.
    ///
    /// Returns the server subscription id.
    pub async fn ensure_subscription(
        &mut self,
        session: &dyn StackSession,
        interval_ms: u32,
    ) -> ClientResult<u32> {
        if let Some(existing) = self.find(interval_ms) {
            return Ok(existing.subscription_id);
        }

        let created = session.create_subscription(interval_ms).await?;
        if created.revised_publishing_interval_ms != interval_ms {
            tracing::warn!(
                address = %self.address,
                requested_ms = interval_ms,
                revised_ms = created.revised_publishing_interval_ms,
                "Server revised publishing interval"
            );
        }

        self.subscriptions.push(ManagedSubscription {
            subscription_id: created.subscription_id,
            requested_interval_ms: interval_ms,
            revised_interval_ms: created.revised_publishing_interval_ms,
            items: Vec::new(),
        });
        self.metrics.subscription_created();

        tracing::info!(
            address = %self.address,
            subscription_id = created.subscription_id,
            interval_ms,
            "Subscription created"
        );
        Ok(created.subscription_id)
    }

    /// Creates a monitored item in the interval's subscription.
    ///
    /// The record is kept only after the server accepted the item.
    pub async fn add_item(
        &mut self,
        session: &dyn StackSession,
        info: Arc<MonitoredItemInfo>,
        request: MonitoredItemRequest,
        observer: Arc<dyn ItemObserver>,
    ) -> ClientResult<u32> {
        let interval_ms = info.publishing_interval_ms;
        let idx = self
            .position(interval_ms)
            .ok_or_else(|| ClientError::subscription_not_found(interval_ms))?;
        let subscription_id = self.subscriptions[idx].subscription_id;

        let monitored_item_id = session
            .add_monitored_item(subscription_id, request, observer)
            .await?;

        tracing::info!(
            address = %self.address,
            subscription_id,
            monitored_item_id,
            node_id = %info.node_id,
            kind = %info.kind,
            "Monitored item created"
        );

        self.subscriptions[idx].items.push(MonitoredItemRecord {
            monitored_item_id,
            info,
        });
        self.metrics.item_added();
        Ok(monitored_item_id)
    }

    /// Removes a monitored item, deleting its subscription when it empties.
    ///
    /// On failure the item stays in place.
    pub async fn remove_item(
        &mut self,
        session: &dyn StackSession,
        interval_ms: u32,
        node_id: &NodeId,
    ) -> ClientResult<MonitoredItemRecord> {
        let idx = self
            .position(interval_ms)
            .ok_or_else(|| ClientError::subscription_not_found(interval_ms))?;
        let subscription_id = self.subscriptions[idx].subscription_id;
        let item_idx = self.subscriptions[idx]
            .items
            .iter()
            .position(|r| &r.info.node_id == node_id)
            .ok_or_else(|| ClientError::item_not_found(node_id.to_string()))?;

        let monitored_item_id = self.subscriptions[idx].items[item_idx].monitored_item_id;
        session
            .remove_monitored_item(subscription_id, monitored_item_id)
            .await?;

        let record = self.subscriptions[idx].items.remove(item_idx);
        self.metrics.item_removed();
        tracing::info!(
            address = %self.address,
            subscription_id,
            node_id = %node_id,
            "Monitored item removed"
        );

        if self.subscriptions[idx].items.is_empty() {
            self.subscriptions.remove(idx);
            self.metrics.subscription_deleted();
            if let Err(e) = session.delete_subscription(subscription_id).await {
                tracing::warn!(
                    address = %self.address,
                    subscription_id,
                    error = %e,
                    "Failed to delete empty subscription"
                );
            } else {
                tracing::info!(address = %self.address, subscription_id, "Subscription deleted");
            }
        }

        Ok(record)
    }

    /// Deletes the interval's subscription if it has no items.
    ///
    /// Used after a failed item creation left a fresh subscription empty.
    pub async fn prune_empty(&mut self, session: &dyn StackSession, interval_ms: u32) {
        let Some(idx) = self.position(interval_ms) else {
            return;
        };
        if !self.subscriptions[idx].items.is_empty() {
            return;
        }

        let subscription = self.subscriptions.remove(idx);
        self.metrics.subscription_deleted();
        if let Err(e) = session.delete_subscription(subscription.subscription_id).await {
            tracing::debug!(
                address = %self.address,
                subscription_id = subscription.subscription_id,
                error = %e,
                "Failed to delete empty subscription"
            );
        }
    }

    /// Removes every item and subscription on the server, best effort.
    ///
    /// Returns the removed records.
    pub async fn remove_all(&mut self, session: &dyn StackSession) -> Vec<MonitoredItemRecord> {
        let mut removed = Vec::new();

        for subscription in std::mem::take(&mut self.subscriptions) {
            for record in subscription.items {
                if let Err(e) = session
                    .remove_monitored_item(subscription.subscription_id, record.monitored_item_id)
                    .await
                {
                    tracing::debug!(
                        address = %self.address,
                        node_id = %record.info.node_id,
                        error = %e,
                        "Failed to remove monitored item"
                    );
                }
                self.metrics.item_removed();
                removed.push(record);
            }

            if let Err(e) = session.delete_subscription(subscription.subscription_id).await {
                tracing::debug!(
                    address = %self.address,
                    subscription_id = subscription.subscription_id,
                    error = %e,
                    "Failed to delete subscription"
                );
            }
            self.metrics.subscription_deleted();
        }

        removed
    }

    /// Drops all local state without talking to the server.
    pub fn discard_all(&mut self) -> Vec<MonitoredItemRecord> {
        let mut removed = Vec::new();
        for subscription in self.subscriptions.drain(..) {
            for record in subscription.items {
                self.metrics.item_removed();
                removed.push(record);
            }
            self.metrics.subscription_deleted();
        }
        removed
    }
}
