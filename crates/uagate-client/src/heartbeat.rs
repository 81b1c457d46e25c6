// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Heartbeat (synthetic periodic) notifications.
//!
//! Each heartbeat runs its own timer task. On every tick it reads the
//! node's current value and hands it to the sink marked as synthetic,
//! whether or not the value changed. The scheduler doubles as the lookup
//! table `(address, node id, publishing interval) -> heartbeat interval`
//! used when snapshotting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::metrics::ClientMetrics;
use crate::sink::NotificationSink;
use crate::stack::StackSession;
use crate::subscription::registry::{ItemKey, MonitoredItemInfo};
use crate::types::ServerAddress;

struct HeartbeatEntry {
    interval: Duration,
    task: JoinHandle<()>,
}

/// Owns all heartbeat timers.
pub struct HeartbeatScheduler {
    entries: Mutex<HashMap<ItemKey, HeartbeatEntry>>,
    sink: Arc<dyn NotificationSink>,
    metrics: Arc<ClientMetrics>,
}

impl HeartbeatScheduler {
    /// Creates a scheduler emitting into `sink`.
    pub fn new(sink: Arc<dyn NotificationSink>, metrics: Arc<ClientMetrics>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            sink,
            metrics,
        }
    }

    /// Starts a heartbeat for an item, replacing any previous one.
    ///
    /// The first tick fires one interval after the call.
    pub fn start(&self, session: Arc<dyn StackSession>, item: Arc<MonitoredItemInfo>, interval: Duration) {
        if interval.is_zero() {
            return;
        }

        let key = item.key();
        let sink = Arc::clone(&self.sink);
        let metrics = Arc::clone(&self.metrics);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match session.read_value(&item.node_id).await {
                    Ok(value) => {
                        metrics.heartbeat_emitted();
                        sink.on_data_change(&item, value.into_synthetic());
                    }
                    Err(e) => {
                        tracing::debug!(
                            address = %item.address,
                            node_id = %item.node_id,
                            error = %e,
                            "Heartbeat read failed"
                        );
                    }
                }
            }
        });

        tracing::debug!(item = %key, interval_secs = interval.as_secs(), "Heartbeat started");
        let previous = self.entries.lock().insert(key, HeartbeatEntry { interval, task });
        if let Some(previous) = previous {
            previous.task.abort();
        }
    }

    /// Stops the heartbeat of one item. Returns `true` if one was running.
    pub fn stop(&self, key: &ItemKey) -> bool {
        match self.entries.lock().remove(key) {
            Some(entry) => {
                entry.task.abort();
                tracing::debug!(item = %key, "Heartbeat stopped");
                true
            }
            None => false,
        }
    }

    /// Stops every heartbeat of a session.
    pub fn stop_session(&self, address: &ServerAddress) -> usize {
        let stopped: Vec<HeartbeatEntry> = {
            let mut entries = self.entries.lock();
            let keys: Vec<ItemKey> = entries
                .keys()
                .filter(|k| &k.address == address)
                .cloned()
                .collect();
            keys.iter().filter_map(|k| entries.remove(k)).collect()
        };
        for entry in &stopped {
            entry.task.abort();
        }
        stopped.len()
    }

    /// Stops every heartbeat.
    pub fn stop_all(&self) -> usize {
        let stopped: Vec<HeartbeatEntry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in &stopped {
            entry.task.abort();
        }
        stopped.len()
    }

    /// Heartbeat interval of an item, if one is running.
    pub fn interval_for(&self, key: &ItemKey) -> Option<Duration> {
        self.entries.lock().get(key).map(|e| e.interval)
    }

    /// Number of running heartbeats.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no heartbeat is running.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        for (_, entry) in self.entries.get_mut().drain() {
            entry.task.abort();
        }
    }
}

impl std::fmt::Debug for HeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatScheduler")
            .field("running", &self.len())
            .finish()
    }
}
