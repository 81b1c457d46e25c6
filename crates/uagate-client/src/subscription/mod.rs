// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscriptions, monitored items and event filters.
//!
//! - [`group`]: per-session subscriptions keyed by publishing interval
//! - [`registry`]: item metadata, skip-first tracking, notification routing
//! - [`filter`]: event filter construction and validation

pub mod filter;
pub mod group;
pub mod registry;

pub use filter::{
    EventFilter, FilterBuild, FilterClauseError, FilterOperator, SelectClause, SelectClauseRequest,
    WhereClause, WhereClauseRequest,
};
pub use group::{ManagedSubscription, SubscriptionGroup};
pub use registry::{ItemKey, ItemRouter, MonitoredItemInfo, MonitoredItemRecord, SkipFirstRegistry};
