// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Keep-alive driven reconnection.
//!
//! ```text
//!                  bad keep-alive, missed >= threshold
//!   ┌───────────┐ ─────────────────────────────────────▶ ┌──────────────┐
//!   │ Connected │                                        │ Reconnecting │
//!   └───────────┘ ◀───────────────────────────────────── └──────────────┘
//!     ▲      │            reconnect complete                    │
//!     └──────┘                                                  │ attempts
//!   good keep-alive resets the missed counter                   ▼ exhausted
//!                                                          closed, dropped
//! ```
//!
//! Keep-alive results of all sessions arrive on one channel and are handled
//! by a single task, so transitions for a session are strictly ordered.
//! Reconnect attempts run in their own tasks, at most one per address.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ReconnectPolicy;
use crate::heartbeat::HeartbeatScheduler;
use crate::metrics::ClientMetrics;
use crate::session::pool::{ConnectionState, ManagedSession, SessionPool};
use crate::subscription::registry::SkipFirstRegistry;
use crate::types::{ServerAddress, StatusCode};

/// A keep-alive result for one session.
#[derive(Debug, Clone)]
pub struct KeepAliveSignal {
    /// The session that reported.
    pub session: Arc<ManagedSession>,
    /// Reported status.
    pub status: StatusCode,
}

/// What a keep-alive result did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveOutcome {
    /// Good status, nothing to reset.
    Healthy,
    /// Good status after misses; the counter was reset.
    Recovered {
        /// Misses before the reset.
        previous: u32,
    },
    /// Bad status counted, below the threshold.
    Missed {
        /// Consecutive misses so far.
        count: u32,
    },
    /// Bad status reached the threshold and a reconnect started.
    ReconnectStarted,
    /// The session is already reconnecting; nothing changed.
    AlreadyReconnecting,
}

struct ReconnectEntry {
    session: Arc<ManagedSession>,
    /// When the next attempt is due.
    deadline: Instant,
    attempts: u32,
    task: JoinHandle<()>,
}

/// Supervises sessions that lost their keep-alive.
pub struct ReconnectSupervisor {
    pool: Arc<SessionPool>,
    heartbeats: Arc<HeartbeatScheduler>,
    skip_first: Arc<SkipFirstRegistry>,
    policy: ReconnectPolicy,
    threshold: u32,
    metrics: Arc<ClientMetrics>,
    entries: Mutex<HashMap<ServerAddress, ReconnectEntry>>,
}

impl ReconnectSupervisor {
    /// Creates a supervisor.
    pub fn new(
        pool: Arc<SessionPool>,
        heartbeats: Arc<HeartbeatScheduler>,
        skip_first: Arc<SkipFirstRegistry>,
        policy: ReconnectPolicy,
        threshold: u32,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        Self {
            pool,
            heartbeats,
            skip_first,
            policy,
            threshold,
            metrics,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns the task consuming keep-alive signals until `cancel` fires.
    pub fn spawn(
        self: &Arc<Self>,
        mut signals: mpsc::Receiver<KeepAliveSignal>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    signal = signals.recv() => match signal {
                        Some(signal) => {
                            this.on_keep_alive(&signal.session, signal.status);
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!("Keep-alive supervisor stopped");
        })
    }

    /// Applies one keep-alive result to a session.
    pub fn on_keep_alive(self: &Arc<Self>, session: &Arc<ManagedSession>, status: StatusCode) -> KeepAliveOutcome {
        let reconnecting =
            session.state() == ConnectionState::Reconnecting || self.is_reconnecting(session.address());

        if status.is_good() {
            if reconnecting {
                return KeepAliveOutcome::AlreadyReconnecting;
            }
            let previous = session.reset_missed_keep_alives();
            if previous > 0 {
                tracing::info!(address = %session.address(), previous, "Keep-alive recovered");
                return KeepAliveOutcome::Recovered { previous };
            }
            return KeepAliveOutcome::Healthy;
        }

        if reconnecting {
            return KeepAliveOutcome::AlreadyReconnecting;
        }

        let count = session.record_missed_keep_alive();
        self.metrics.keep_alive_missed();
        tracing::warn!(
            address = %session.address(),
            status = %status,
            missed = count,
            threshold = self.threshold,
            "Keep-alive failed"
        );

        if count < self.threshold {
            return KeepAliveOutcome::Missed { count };
        }

        if self.begin_reconnect(session) {
            KeepAliveOutcome::ReconnectStarted
        } else {
            KeepAliveOutcome::AlreadyReconnecting
        }
    }

    /// Moves a session to `Reconnecting` and schedules attempts.
    ///
    /// Returns `false` if an entry already exists for the address. The
    /// attempt task is spawned under the entries lock, so `cancel_all`
    /// always finds it.
    fn begin_reconnect(self: &Arc<Self>, session: &Arc<ManagedSession>) -> bool {
        let address = session.address().clone();
        {
            let mut entries = self.entries.lock();
            if entries.contains_key(&address) {
                return false;
            }
            let task = tokio::spawn(Arc::clone(self).run_attempts(Arc::clone(session)));
            entries.insert(
                address.clone(),
                ReconnectEntry {
                    session: Arc::clone(session),
                    deadline: Instant::now() + self.policy.interval,
                    attempts: 0,
                    task,
                },
            );
        }

        self.pool.hold_for_reconnect(session);
        session.set_state(ConnectionState::Reconnecting);
        self.metrics.reconnect_started();
        tracing::info!(
            address = %address,
            interval_secs = self.policy.interval.as_secs(),
            max_attempts = ?self.policy.max_attempts,
            "Reconnect started"
        );
        true
    }

    async fn run_attempts(self: Arc<Self>, session: Arc<ManagedSession>) {
        let address = session.address().clone();
        let mut attempts = 0u32;

        loop {
            tokio::time::sleep(self.policy.interval).await;
            attempts += 1;
            if !self.record_attempt(&address, attempts) {
                return;
            }

            match session.stack_session().reconnect().await {
                Ok(()) => {
                    if !self.reconnect_complete(&session) {
                        tracing::debug!(address = %address, "Reconnected after cancellation, closing");
                        session.close().await;
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!(address = %address, attempt = attempts, error = %e, "Reconnect attempt failed");
                    if self.policy.is_exhausted(attempts) {
                        self.abandon(&session).await;
                        return;
                    }
                }
            }
        }
    }

    /// Returns `false` if the entry was cancelled in the meantime.
    fn record_attempt(&self, address: &ServerAddress, attempts: u32) -> bool {
        match self.entries.lock().get_mut(address) {
            Some(entry) => {
                entry.attempts = attempts;
                entry.deadline = Instant::now() + self.policy.interval;
                true
            }
            None => false,
        }
    }

    /// Handles the stack's reconnect-complete notification.
    ///
    /// Returns `false` if the session had no reconnect entry.
    pub fn reconnect_complete(&self, session: &Arc<ManagedSession>) -> bool {
        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(session.address()) {
                Some(entry) if Arc::ptr_eq(&entry.session, session) => entries.remove(session.address()),
                _ => None,
            }
        };
        let Some(entry) = entry else {
            return false;
        };

        session.reset_missed_keep_alives();
        session.set_state(ConnectionState::Connected);
        self.pool.add_session(Arc::clone(session));
        self.metrics.reconnect_completed();

        tracing::info!(
            address = %session.address(),
            attempts = entry.attempts.max(1),
            "Reconnect complete"
        );
        true
    }

    async fn abandon(&self, session: &Arc<ManagedSession>) {
        self.entries.lock().remove(session.address());
        let dropped = session.abandon(&self.heartbeats).await;
        self.skip_first.remove_session(session.address());
        self.pool.release(session.address());
        self.metrics.reconnect_abandoned();
        tracing::error!(
            address = %session.address(),
            items = dropped.len(),
            "Reconnect attempts exhausted, session dropped"
        );
    }

    /// Returns `true` while a reconnect entry exists for the address.
    pub fn is_reconnecting(&self, address: &ServerAddress) -> bool {
        self.entries.lock().contains_key(address)
    }

    /// Failed attempts so far for an address.
    pub fn attempts(&self, address: &ServerAddress) -> Option<u32> {
        self.entries.lock().get(address).map(|e| e.attempts)
    }

    /// When the next attempt for an address is due.
    pub fn next_attempt(&self, address: &ServerAddress) -> Option<Instant> {
        self.entries.lock().get(address).map(|e| e.deadline)
    }

    /// Sessions currently reconnecting.
    pub fn sessions(&self) -> Vec<Arc<ManagedSession>> {
        self.entries.lock().values().map(|e| Arc::clone(&e.session)).collect()
    }

    /// Number of reconnect entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is reconnecting.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Cancels every reconnect and returns the sessions they held.
    pub fn cancel_all(&self) -> Vec<Arc<ManagedSession>> {
        let entries: Vec<ReconnectEntry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        entries
            .into_iter()
            .map(|entry| {
                entry.task.abort();
                self.pool.release(entry.session.address());
                tracing::debug!(address = %entry.session.address(), "Reconnect cancelled");
                entry.session
            })
            .collect()
    }
}

impl fmt::Debug for ReconnectSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectSupervisor")
            .field("policy", &self.policy)
            .field("threshold", &self.threshold)
            .field("reconnecting", &self.len())
            .finish()
    }
}
