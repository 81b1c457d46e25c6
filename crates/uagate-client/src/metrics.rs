// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client manager counters.
//!
//! One [`ClientMetrics`] is owned by the manager and shared by reference
//! with its components. Each gauge or counter has exactly one writer:
//!
//! | Counter                     | Writer              |
//! |-----------------------------|---------------------|
//! | sessions                    | SessionPool         |
//! | subscriptions, items        | SubscriptionGroup   |
//! | reconnects, keep-alive miss | ReconnectSupervisor |
//! | heartbeats                  | HeartbeatScheduler  |
//! | skipped notifications       | item router         |
//! | persistence writes/failures | PersistenceBridge   |
//!
//! External reporting reads [`MetricsSnapshot`] only.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live counters of the client manager.
#[derive(Debug, Default)]
pub struct ClientMetrics {
    sessions: AtomicU64,
    subscriptions: AtomicU64,
    monitored_items: AtomicU64,
    reconnects_started: AtomicU64,
    reconnects_completed: AtomicU64,
    reconnects_abandoned: AtomicU64,
    keep_alive_misses: AtomicU64,
    heartbeats_emitted: AtomicU64,
    notifications_skipped: AtomicU64,
    persistence_writes: AtomicU64,
    persistence_failures: AtomicU64,
    /// Unix timestamp of the last confirmed write.
    last_persisted: AtomicU64,
}

impl ClientMetrics {
    /// Creates empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Session pool
    // =========================================================================

    /// A session entered the connected pool.
    pub fn session_added(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// A session left the connected pool.
    pub fn session_removed(&self) {
        saturating_dec(&self.sessions);
    }

    // =========================================================================
    // Subscription group
    // =========================================================================

    /// A subscription was created.
    pub fn subscription_created(&self) {
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// A subscription was deleted.
    pub fn subscription_deleted(&self) {
        saturating_dec(&self.subscriptions);
    }

    /// A monitored item was applied on the server.
    pub fn item_added(&self) {
        self.monitored_items.fetch_add(1, Ordering::Relaxed);
    }

    /// A monitored item was removed.
    pub fn item_removed(&self) {
        saturating_dec(&self.monitored_items);
    }

    // =========================================================================
    // Reconnect supervisor
    // =========================================================================

    /// A bad keep-alive was counted.
    pub fn keep_alive_missed(&self) {
        self.keep_alive_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A reconnect entry was created.
    pub fn reconnect_started(&self) {
        self.reconnects_started.fetch_add(1, Ordering::Relaxed);
    }

    /// A session came back.
    pub fn reconnect_completed(&self) {
        self.reconnects_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A session was given up after exhausting its reconnect policy.
    pub fn reconnect_abandoned(&self) {
        self.reconnects_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// A heartbeat notification was emitted.
    pub fn heartbeat_emitted(&self) {
        self.heartbeats_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A first notification was suppressed.
    pub fn notification_skipped(&self) {
        self.notifications_skipped.fetch_add(1, Ordering::Relaxed);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Records the outcome of a snapshot write.
    pub fn record_persist(&self, success: bool) {
        if success {
            self.persistence_writes.fetch_add(1, Ordering::Relaxed);
            self.last_persisted
                .store(Utc::now().timestamp() as u64, Ordering::Relaxed);
        } else {
            self.persistence_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a read-only snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_persisted = self.last_persisted.load(Ordering::Relaxed);

        MetricsSnapshot {
            sessions: self.sessions.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
            monitored_items: self.monitored_items.load(Ordering::Relaxed),
            reconnects_started: self.reconnects_started.load(Ordering::Relaxed),
            reconnects_completed: self.reconnects_completed.load(Ordering::Relaxed),
            reconnects_abandoned: self.reconnects_abandoned.load(Ordering::Relaxed),
            keep_alive_misses: self.keep_alive_misses.load(Ordering::Relaxed),
            heartbeats_emitted: self.heartbeats_emitted.load(Ordering::Relaxed),
            notifications_skipped: self.notifications_skipped.load(Ordering::Relaxed),
            persistence_writes: self.persistence_writes.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            last_persisted: if last_persisted > 0 {
                DateTime::from_timestamp(last_persisted as i64, 0)
            } else {
                None
            },
        }
    }
}

fn saturating_dec(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}

/// A point-in-time copy of [`ClientMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Sessions in the connected pool.
    pub sessions: u64,
    /// Live subscriptions.
    pub subscriptions: u64,
    /// Live monitored items.
    pub monitored_items: u64,
    /// Reconnects started.
    pub reconnects_started: u64,
    /// Reconnects completed.
    pub reconnects_completed: u64,
    /// Sessions given up after the reconnect limit.
    pub reconnects_abandoned: u64,
    /// Bad keep-alives counted.
    pub keep_alive_misses: u64,
    /// Heartbeat notifications emitted.
    pub heartbeats_emitted: u64,
    /// First notifications suppressed by skip-first.
    pub notifications_skipped: u64,
    /// Confirmed snapshot writes.
    pub persistence_writes: u64,
    /// Failed snapshot writes.
    pub persistence_failures: u64,
    /// Time of the last confirmed write.
    pub last_persisted: Option<DateTime<Utc>>,
}
