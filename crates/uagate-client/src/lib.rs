// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uagate-client
//!
//! Session and subscription manager for the uagate telemetry gateway.
//!
//! The crate keeps one session per server, groups monitored items into
//! subscriptions by publishing interval, and forwards every notification to
//! a single downstream [`NotificationSink`]. The published topology is
//! written to a [`FileStorage`] after each change and replayed on start.
//!
//! - **Endpoint**: endpoint discovery with a per-address cache
//! - **Session**: the session pool and keep-alive driven reconnection
//! - **Subscription**: subscription groups, item routing, event filters
//! - **Heartbeat**: synthetic periodic re-emission of item values
//! - **Persistence**: topology snapshots and credential protection
//! - **Manager**: the [`ClientManager`] façade
//!
//! ```text
//!                    ┌───────────────┐
//!   publish/unpub ──▶│ ClientManager │──▶ PersistenceBridge ──▶ FileStorage
//!                    └──────┬────────┘
//!                           │
//!        ┌──────────────────┼───────────────────┐
//!        ▼                  ▼                   ▼
//!   SessionPool ◀──── ReconnectSupervisor  HeartbeatScheduler
//!        │   keep-alive        ▲                 │
//!        ▼                     │                 ▼
//!   SubscriptionGroup ── ItemRouter ──────▶ NotificationSink
//! ```
//!
//! The protocol itself is behind [`ProtocolStack`] and [`StackSession`];
//! the crate never speaks the wire format.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use uagate_client::{ClientConfig, ClientManager, LocalFileStorage, PublishRequest};
//!
//! let manager = ClientManager::builder(stack, Arc::new(LocalFileStorage::new("/var/lib/uagate")))
//!     .config(ClientConfig::default())
//!     .build()?;
//!
//! let cancel = CancellationToken::new();
//! manager.rehydrate(&cancel).await?;
//! manager
//!     .publish_node(PublishRequest::new("opc.tcp://plc:4840", "ns=2;s=Temperature"), &cancel)
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod config;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod stack;
pub mod types;

// =============================================================================
// Session & Subscription Modules
// =============================================================================

pub mod endpoint;
pub mod heartbeat;
pub mod session;
pub mod sink;
pub mod subscription;

// =============================================================================
// Persistence Modules
// =============================================================================

pub mod persistence;
pub mod storage;

// =============================================================================
// Façade
// =============================================================================

pub mod manager;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::{ClientError, ClientResult, ErrorCode, ErrorSeverity, NotFoundKind, PublishFailureReason};
pub use types::*;

pub use config::{ClientConfig, ClientConfigBuilder, ReconnectPolicy, DEFAULT_PERSISTENCE_PATH};
pub use credentials::{
    generate_key, generate_key_base64, AesGcmProtector, AuthMode, CredentialProtector, Credentials,
    Identity, KEY_LENGTH,
};
pub use endpoint::EndpointResolver;
pub use heartbeat::HeartbeatScheduler;
pub use manager::{
    ClientManager, ClientManagerBuilder, PublishOutcome, PublishRequest, RehydrateSummary,
    UnpublishRequest,
};
pub use metrics::{ClientMetrics, MetricsSnapshot};
pub use persistence::{NodeEntry, PersistedTopology, PersistenceBridge, ServerEntry};
pub use session::{
    ConnectionState, KeepAliveOutcome, KeepAliveSignal, ManagedSession, ReconnectSupervisor,
    SessionPool,
};
pub use sink::{ChannelSink, Notification, NotificationSink, TracingSink};
pub use stack::{CreatedSubscription, ItemObserver, MonitoredItemRequest, ProtocolStack, StackSession};
pub use storage::{FileStorage, LocalFileStorage, MemoryStorage};
pub use subscription::{
    EventFilter, FilterBuild, FilterClauseError, FilterOperator, ItemKey, MonitoredItemInfo,
    SelectClause, SelectClauseRequest, WhereClause, WhereClauseRequest,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
