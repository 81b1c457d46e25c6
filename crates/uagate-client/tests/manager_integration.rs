// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Client Manager Integration Tests
//!
//! End-to-end tests of [`ClientManager`] against the mock protocol stack.
//!
//! ## Test Categories
//!
//! - `test_publish_*`: session, subscription and item creation
//! - `test_unpublish_*`: removal and not-found handling
//! - `test_keep_alive_*` / `test_reconnect_*`: the reconnect state machine
//! - `test_heartbeat_*` / `test_skip_first_*`: notification shaping
//! - `test_persist_*` / `test_rehydrate_*`: topology durability

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{drain, MockStack, PLANT_URL};
use uagate_client::{
    generate_key, AesGcmProtector, AuthMode, ClientConfig, ClientError, ClientManager, ClientResult,
    ChannelSink, ConnectionState, Credentials, FileStorage, Identity, MemoryStorage, MonitoredItemKind, NodeId, Notification,
    PersistedTopology, PublishFailureReason, PublishOutcome, PublishRequest, SelectClauseRequest,
    ServerAddress, StatusCode, UnpublishRequest, Variant, WhereClauseRequest, DEFAULT_PERSISTENCE_PATH,
};

const LINE2_URL: &str = "opc.tcp://plant2:4840";

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    stack: Arc<MockStack>,
    storage: Arc<MemoryStorage>,
    manager: ClientManager,
    notifications: mpsc::Receiver<Notification>,
}

fn test_config() -> ClientConfig {
    ClientConfig::builder()
        .keep_alive_failure_threshold(3)
        .reconnect_interval(Duration::from_secs(10))
        .build()
        .unwrap()
}

fn harness_with(config: ClientConfig, storage: Arc<MemoryStorage>, protector: Arc<AesGcmProtector>) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let stack = MockStack::new();
    let (sink, notifications) = ChannelSink::with_channel(256);
    let manager = ClientManager::builder(stack.clone(), storage.clone())
        .config(config)
        .sink(Arc::new(sink))
        .protector(protector)
        .build()
        .unwrap();

    Harness {
        stack,
        storage,
        manager,
        notifications,
    }
}

fn harness() -> Harness {
    harness_with(
        test_config(),
        Arc::new(MemoryStorage::new()),
        Arc::new(AesGcmProtector::new(generate_key())),
    )
}

fn temperature() -> PublishRequest {
    PublishRequest::new(PLANT_URL, "ns=2;s=Temperature")
        .publishing_interval(1000)
        .sampling_interval(500)
        .display_name("Temperature")
}

fn plant() -> ServerAddress {
    ServerAddress::new(PLANT_URL)
}

fn select(field: &str) -> SelectClauseRequest {
    SelectClauseRequest {
        attribute_id: "Value".into(),
        index_range: None,
        type_id: "i=2041".into(),
        browse_paths: vec![field.into()],
    }
}

fn stored_topology(storage: &MemoryStorage) -> PersistedTopology {
    let bytes = storage.get(DEFAULT_PERSISTENCE_PATH).expect("topology not stored");
    PersistedTopology::from_json(&bytes).unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

// =============================================================================
// Publish
// =============================================================================

#[tokio::test]
async fn test_publish_creates_session_subscription_and_item() {
    let h = harness();
    let cancel = CancellationToken::new();

    let outcome = h.manager.publish_node(temperature(), &cancel).await.unwrap();
    assert!(matches!(outcome, PublishOutcome::Monitored { ref rejected_where_clauses, .. } if rejected_where_clauses.is_empty()));

    let topology = h.manager.list_published_nodes().await.unwrap();
    assert_eq!(topology.servers.len(), 1);
    let server = &topology.servers[0];
    assert_eq!(server.endpoint_url, PLANT_URL);
    assert_eq!(server.opc_authentication_mode, AuthMode::Anonymous);
    assert_eq!(server.opc_nodes.len(), 1);
    let node = &server.opc_nodes[0];
    assert_eq!(node.id, "ns=2;s=Temperature");
    assert_eq!(node.opc_publishing_interval, 1000);
    assert_eq!(node.opc_sampling_interval, 500);
    assert_eq!(node.heartbeat_interval, 0);
    assert!(!node.skip_first);

    let session = h.stack.last_session();
    assert_eq!(session.subscription_intervals(), vec![1000]);
    assert_eq!(session.item_count(), 1);
    let request = session.request_for(&NodeId::string(2, "Temperature")).unwrap();
    assert_eq!(request.kind, MonitoredItemKind::DataChange);
    assert_eq!(request.sampling_interval_ms, 500);

    let metrics = h.manager.metrics();
    assert_eq!(metrics.sessions, 1);
    assert_eq!(metrics.subscriptions, 1);
    assert_eq!(metrics.monitored_items, 1);
    assert_eq!(h.manager.session_state(&plant()), Some(ConnectionState::Connected));
}

#[tokio::test]
async fn test_publish_second_node_shares_subscription() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    h.manager
        .publish_node(
            PublishRequest::new(PLANT_URL, "ns=2;s=Pressure").publishing_interval(1000),
            &cancel,
        )
        .await
        .unwrap();

    let session = h.stack.last_session();
    assert_eq!(h.stack.sessions().len(), 1);
    assert_eq!(session.subscription_count(), 1);
    assert_eq!(session.item_count(), 2);
    assert_eq!(h.manager.list_published_nodes().await.unwrap().node_count(), 2);
}

#[tokio::test]
async fn test_publish_one_subscription_per_interval() {
    let h = harness();
    let cancel = CancellationToken::new();

    for (node, interval) in [("A", 1000), ("B", 2000), ("C", 1000), ("D", 0), ("E", 2000)] {
        let request = PublishRequest::new(PLANT_URL, format!("ns=2;s={}", node)).publishing_interval(interval);
        h.manager.publish_node(request, &cancel).await.unwrap();
    }

    let mut intervals = h.stack.last_session().subscription_intervals();
    intervals.sort_unstable();
    // 0 maps to the configured default of 1000
    assert_eq!(intervals, vec![1000, 2000]);
    assert_eq!(h.manager.metrics().subscriptions, 2);
    assert_eq!(h.manager.metrics().monitored_items, 5);
}

#[tokio::test]
async fn test_publish_is_idempotent() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    let again = h.manager.publish_node(temperature(), &cancel).await.unwrap();

    assert_eq!(again, PublishOutcome::AlreadyMonitored);
    assert!(again.is_monitored());
    assert_eq!(h.stack.last_session().item_count(), 1);
    assert_eq!(h.manager.metrics().monitored_items, 1);
}

#[tokio::test]
async fn test_publish_revised_interval_keeps_requested_lookup() {
    let h = harness();
    let cancel = CancellationToken::new();
    *h.stack.behavior.revised_interval.lock() = Some(2500);

    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    h.manager
        .publish_node(PublishRequest::new(PLANT_URL, "ns=2;s=Flow").publishing_interval(1000), &cancel)
        .await
        .unwrap();

    assert_eq!(h.stack.last_session().subscription_count(), 1);
    let topology = h.manager.list_published_nodes().await.unwrap();
    assert!(topology.servers[0].opc_nodes.iter().all(|n| n.opc_publishing_interval == 1000));
}

#[tokio::test]
async fn test_publish_resolves_namespace_uri() {
    let h = harness();
    let cancel = CancellationToken::new();

    let outcome = h
        .manager
        .publish_node(PublishRequest::new(PLANT_URL, "nsu=urn:plant1;s=Flow"), &cancel)
        .await
        .unwrap();
    assert!(outcome.is_monitored());

    let topology = h.manager.list_published_nodes().await.unwrap();
    let node = &topology.servers[0].opc_nodes[0];
    assert_eq!(node.id, "ns=2;s=Flow");
    assert_eq!(node.expanded_node_id.as_deref(), Some("nsu=urn:plant1;s=Flow"));

    let unknown = h
        .manager
        .publish_node(PublishRequest::new(PLANT_URL, "nsu=urn:nowhere;s=Flow"), &cancel)
        .await
        .unwrap();
    assert!(matches!(
        unknown,
        PublishOutcome::Rejected {
            reason: PublishFailureReason::BadNodeId,
            ..
        }
    ));
}

#[tokio::test]
async fn test_publish_reads_display_name_when_blank() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.stack
        .behavior
        .display_names
        .lock()
        .insert("ns=2;s=Level".into(), "Tank Level".into());

    h.manager
        .publish_node(PublishRequest::new(PLANT_URL, "ns=2;s=Level"), &cancel)
        .await
        .unwrap();

    let topology = h.manager.list_published_nodes().await.unwrap();
    assert_eq!(topology.servers[0].opc_nodes[0].display_name, "Tank Level");
}

#[tokio::test]
async fn test_publish_rejected_item_leaves_nothing_behind() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.stack
        .behavior
        .reject_items
        .lock()
        .insert("ns=2;s=Missing".into(), StatusCode::BAD_NODE_ID_UNKNOWN);

    let outcome = h
        .manager
        .publish_node(PublishRequest::new(PLANT_URL, "ns=2;s=Missing").skip_first(true), &cancel)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        PublishOutcome::Rejected {
            reason: PublishFailureReason::BadNodeId,
            ..
        }
    ));
    let session = h.stack.last_session();
    assert_eq!(session.item_count(), 0);
    assert_eq!(session.subscription_count(), 0);
    assert_eq!(h.manager.metrics().monitored_items, 0);
    assert_eq!(h.manager.metrics().subscriptions, 0);
    assert!(h.manager.list_published_nodes().await.unwrap().servers[0].opc_nodes.is_empty());
}

#[tokio::test]
async fn test_publish_rejection_keeps_shared_subscription() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    h.stack
        .behavior
        .reject_items
        .lock()
        .insert("ns=2;s=Bad".into(), StatusCode::BAD_FILTER_OPERATOR_UNSUPPORTED);

    let outcome = h
        .manager
        .publish_node(PublishRequest::new(PLANT_URL, "ns=2;s=Bad").publishing_interval(1000), &cancel)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        PublishOutcome::Rejected {
            reason: PublishFailureReason::UnsupportedFilterOperator,
            ..
        }
    ));
    assert_eq!(h.stack.last_session().subscription_count(), 1);
    assert_eq!(h.stack.last_session().item_count(), 1);
}

#[tokio::test]
async fn test_publish_unreachable_server() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.stack.behavior.unreachable.lock().insert(PLANT_URL.to_string());

    let err = h.manager.publish_node(temperature(), &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::PublishFailed {
            reason: PublishFailureReason::SessionUnavailable,
            ..
        }
    ));
    assert!(h.manager.pool().is_empty());

    // failed discovery is not cached
    h.stack.behavior.unreachable.lock().clear();
    assert!(h.manager.publish_node(temperature(), &cancel).await.is_ok());
    assert_eq!(h.stack.discover_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_publish_session_rejected() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.stack.behavior.reject_session.store(true, Ordering::SeqCst);

    let err = h.manager.publish_node(temperature(), &cancel).await.unwrap_err();
    assert!(matches!(err, ClientError::PublishFailed { .. }));
    assert!(h.manager.pool().is_empty());
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_publish_cancelled_before_mutation() {
    let h = harness();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.manager.publish_node(temperature(), &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(h.stack.open_calls.load(Ordering::SeqCst), 0);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_publish_invalid_node_id() {
    let h = harness();
    let cancel = CancellationToken::new();

    let outcome = h
        .manager
        .publish_node(PublishRequest::new(PLANT_URL, "ns=2;q=bad"), &cancel)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        PublishOutcome::Rejected {
            reason: PublishFailureReason::BadNodeId,
            ..
        }
    ));
    assert!(h.manager.pool().is_empty());
    assert_eq!(h.stack.open_calls.load(Ordering::SeqCst), 0);
    assert!(h.storage.is_empty());
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_publish_event_item_with_three_selects() {
    let mut h = harness();
    let cancel = CancellationToken::new();

    let request = PublishRequest::new(PLANT_URL, "i=2253")
        .select(select("EventId"))
        .select(select("Message"))
        .select(select("Severity"));
    h.manager.publish_node(request, &cancel).await.unwrap();

    let session = h.stack.last_session();
    let item = session.request_for(&NodeId::numeric(0, 2253)).unwrap();
    assert_eq!(item.kind, MonitoredItemKind::Event);
    let filter = item.filter.unwrap();
    assert_eq!(filter.select_clauses.len(), 3);
    assert!(filter.where_clause.is_empty());

    session.raise_event(
        &NodeId::numeric(0, 2253),
        vec![
            Variant::ByteString(vec![1, 2]),
            Variant::String("Overpressure".into()),
            Variant::UInt32(800),
        ],
    );
    let received = drain(&mut h.notifications);
    assert_eq!(received.len(), 1);
    match &received[0] {
        Notification::Event { item, fields, .. } => {
            assert_eq!(item.kind, MonitoredItemKind::Event);
            assert_eq!(fields.len(), 3);
        }
        other => panic!("expected event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_event_drops_invalid_where_clause() {
    let h = harness();
    let cancel = CancellationToken::new();

    let request = PublishRequest::new(PLANT_URL, "i=2253")
        .select(select("Message"))
        .where_clause(WhereClauseRequest {
            operator: "OfType".into(),
            operands: vec!["i=2041".into()],
        })
        .where_clause(WhereClauseRequest {
            operator: "Frobnicate".into(),
            operands: vec![],
        });

    match h.manager.publish_node(request, &cancel).await.unwrap() {
        PublishOutcome::Monitored {
            rejected_where_clauses,
            ..
        } => {
            assert_eq!(rejected_where_clauses.len(), 1);
            assert_eq!(rejected_where_clauses[0].0, 1);
        }
        other => panic!("expected monitored, got {:?}", other),
    }

    let item = h.stack.last_session().request_for(&NodeId::numeric(0, 2253)).unwrap();
    assert_eq!(item.filter.unwrap().where_clause.len(), 1);
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_skip_first_drops_only_first_notification() {
    let mut h = harness();
    let cancel = CancellationToken::new();
    let node = NodeId::string(2, "Temperature");

    h.manager.publish_node(temperature().skip_first(true), &cancel).await.unwrap();
    let session = h.stack.last_session();
    session.notify(&node, Variant::Double(20.0));
    session.notify(&node, Variant::Double(21.0));
    session.notify(&node, Variant::Double(22.0));

    let received = drain(&mut h.notifications);
    assert_eq!(received.len(), 2);
    assert!(matches!(
        &received[0],
        Notification::DataChange { value, .. } if value.value == Variant::Double(21.0)
    ));
    assert_eq!(h.manager.metrics().notifications_skipped, 1);

    // the flag stays in the topology after the first notification
    let topology = h.manager.list_published_nodes().await.unwrap();
    assert!(topology.servers[0].opc_nodes[0].skip_first);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_emits_synthetic_values() {
    let mut h = harness();
    let cancel = CancellationToken::new();

    h.manager
        .publish_node(temperature().heartbeat(Duration::from_secs(2)), &cancel)
        .await
        .unwrap();
    assert_eq!(h.manager.heartbeats().len(), 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(drain(&mut h.notifications).is_empty());

    tokio::time::sleep(Duration::from_millis(4600)).await;
    let received = drain(&mut h.notifications);
    assert_eq!(received.len(), 3);
    assert!(received.iter().all(Notification::is_synthetic));
    assert_eq!(h.manager.metrics().heartbeats_emitted, 3);

    let topology = h.manager.list_published_nodes().await.unwrap();
    assert_eq!(topology.servers[0].opc_nodes[0].heartbeat_interval, 2);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_skips_failed_reads_and_stops_on_unpublish() {
    let mut h = harness();
    let cancel = CancellationToken::new();

    h.manager
        .publish_node(temperature().heartbeat(Duration::from_secs(1)), &cancel)
        .await
        .unwrap();

    h.stack.behavior.fail_reads.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(drain(&mut h.notifications).is_empty());

    h.stack.behavior.fail_reads.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(drain(&mut h.notifications).len(), 1);

    h.manager
        .unpublish_node(UnpublishRequest::new(PLANT_URL, "ns=2;s=Temperature").publishing_interval(1000), &cancel)
        .await
        .unwrap();
    assert!(h.manager.heartbeats().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(drain(&mut h.notifications).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_same_node_at_two_intervals_keeps_separate_state() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.manager
        .publish_node(temperature().heartbeat(Duration::from_secs(5)).skip_first(true), &cancel)
        .await
        .unwrap();
    h.manager
        .publish_node(
            temperature()
                .publishing_interval(2000)
                .heartbeat(Duration::from_secs(7))
                .skip_first(true),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(h.manager.heartbeats().len(), 2);

    h.manager
        .unpublish_node(UnpublishRequest::new(PLANT_URL, "ns=2;s=Temperature").publishing_interval(1000), &cancel)
        .await
        .unwrap();

    assert_eq!(h.manager.heartbeats().len(), 1);
    let topology = stored_topology(&h.storage);
    assert_eq!(topology.node_count(), 1);
    let remaining = &topology.servers[0].opc_nodes[0];
    assert_eq!(remaining.opc_publishing_interval, 2000);
    assert_eq!(remaining.heartbeat_interval, 7);
    assert!(remaining.skip_first);
}

// =============================================================================
// Unpublish
// =============================================================================

#[tokio::test]
async fn test_unpublish_last_item_removes_subscription() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    h.manager
        .unpublish_node(UnpublishRequest::new(PLANT_URL, "ns=2;s=Temperature").publishing_interval(1000), &cancel)
        .await
        .unwrap();

    let session = h.stack.last_session();
    assert_eq!(session.item_count(), 0);
    assert_eq!(session.subscription_count(), 0);
    assert_eq!(session.deleted_subscriptions.lock().len(), 1);
    assert_eq!(h.manager.metrics().subscriptions, 0);
    assert_eq!(h.manager.metrics().monitored_items, 0);
    assert_eq!(stored_topology(&h.storage).node_count(), 0);
}

#[tokio::test]
async fn test_unpublish_keeps_subscription_with_remaining_items() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    h.manager
        .publish_node(PublishRequest::new(PLANT_URL, "ns=2;s=Pressure").publishing_interval(1000), &cancel)
        .await
        .unwrap();
    h.manager
        .unpublish_node(UnpublishRequest::new(PLANT_URL, "ns=2;s=Temperature").publishing_interval(1000), &cancel)
        .await
        .unwrap();

    let session = h.stack.last_session();
    assert_eq!(session.subscription_count(), 1);
    assert_eq!(session.item_count(), 1);
}

#[tokio::test]
async fn test_unpublish_unknown_session_is_not_found() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    let before = h.manager.list_published_nodes().await.unwrap();

    let err = h
        .manager
        .unpublish_node(UnpublishRequest::new(LINE2_URL, "ns=2;s=Temperature"), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(h.stack.open_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.manager.list_published_nodes().await.unwrap(), before);
}

#[tokio::test]
async fn test_unpublish_unknown_item_is_not_found() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.manager.publish_node(temperature(), &cancel).await.unwrap();

    let wrong_node = h
        .manager
        .unpublish_node(UnpublishRequest::new(PLANT_URL, "ns=2;s=Other").publishing_interval(1000), &cancel)
        .await
        .unwrap_err();
    assert!(wrong_node.is_not_found());

    let wrong_interval = h
        .manager
        .unpublish_node(UnpublishRequest::new(PLANT_URL, "ns=2;s=Temperature").publishing_interval(5000), &cancel)
        .await
        .unwrap_err();
    assert!(wrong_interval.is_not_found());
    assert_eq!(h.stack.last_session().item_count(), 1);
}

#[tokio::test]
async fn test_unpublish_all_closes_sessions_and_persists_empty_topology() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    h.manager
        .publish_node(PublishRequest::new(LINE2_URL, "ns=2;s=Speed"), &cancel)
        .await
        .unwrap();

    let closed = h.manager.unpublish_all(&cancel).await.unwrap();
    assert_eq!(closed, 2);
    assert!(h.manager.pool().is_empty());
    assert!(h.stack.sessions().iter().all(|s| s.closed.load(Ordering::SeqCst)));
    assert!(stored_topology(&h.storage).is_empty());
    assert_eq!(h.manager.metrics().sessions, 0);
}

// =============================================================================
// Keep-alive / Reconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_keep_alive_misses_below_threshold_do_not_reconnect() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    let session = h.stack.last_session();
    let managed = h.manager.pool().find_session(&plant()).unwrap();

    session.keep_alive(StatusCode::BAD_TIMEOUT);
    session.keep_alive(StatusCode::BAD_TIMEOUT);
    settle().await;
    assert_eq!(managed.missed_keep_alives(), 2);
    assert!(!h.manager.supervisor().is_reconnecting(&plant()));

    session.keep_alive(StatusCode::GOOD);
    settle().await;
    assert_eq!(managed.missed_keep_alives(), 0);

    session.keep_alive(StatusCode::BAD_TIMEOUT);
    session.keep_alive(StatusCode::BAD_TIMEOUT);
    settle().await;
    assert!(h.manager.supervisor().is_empty());
    assert_eq!(h.manager.metrics().keep_alive_misses, 4);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_round_trip() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    let session = h.stack.last_session();
    let managed = h.manager.pool().find_session(&plant()).unwrap();

    for _ in 0..3 {
        session.keep_alive(StatusCode::BAD_COMMUNICATION_ERROR);
    }
    settle().await;

    assert!(h.manager.pool().find_session(&plant()).is_none());
    assert_eq!(h.manager.supervisor().len(), 1);
    assert!(h.manager.supervisor().is_reconnecting(&plant()));
    assert_eq!(managed.state(), ConnectionState::Reconnecting);
    assert_eq!(h.manager.session_state(&plant()), Some(ConnectionState::Reconnecting));
    assert_eq!(h.manager.metrics().reconnects_started, 1);

    // more bad statuses do not start a second reconnect
    session.keep_alive(StatusCode::BAD_COMMUNICATION_ERROR);
    settle().await;
    assert_eq!(h.manager.supervisor().len(), 1);
    assert_eq!(h.manager.metrics().reconnects_started, 1);

    // the topology still lists the reconnecting session
    assert_eq!(h.manager.list_published_nodes().await.unwrap().node_count(), 1);

    // publishing to a reconnecting address does not open a second session
    let err = h
        .manager
        .publish_node(PublishRequest::new(PLANT_URL, "ns=2;s=Pressure"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::PublishFailed {
            reason: PublishFailureReason::SessionUnavailable,
            ..
        }
    ));
    assert_eq!(h.stack.open_calls.load(Ordering::SeqCst), 1);

    // the pool refuses the address while it is held
    assert!(h.manager.pool().is_reconnecting(&plant()));
    let direct = h
        .manager
        .pool()
        .connect_session(&plant(), Identity::Anonymous, &cancel)
        .await;
    assert!(direct.is_err());
    assert_eq!(h.stack.open_calls.load(Ordering::SeqCst), 1);

    // first attempt fails, second succeeds
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(session.reconnect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.manager.supervisor().attempts(&plant()), Some(1));

    h.stack.behavior.reconnect_succeeds.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let restored = h.manager.pool().find_session(&plant()).unwrap();
    assert!(Arc::ptr_eq(&restored, &managed));
    assert!(!h.manager.pool().is_reconnecting(&plant()));
    assert_eq!(restored.state(), ConnectionState::Connected);
    assert_eq!(restored.missed_keep_alives(), 0);
    assert!(h.manager.supervisor().is_empty());
    assert_eq!(h.manager.metrics().reconnects_completed, 1);
    assert_eq!(session.item_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_abandoned_after_max_attempts() {
    let config = ClientConfig::builder()
        .keep_alive_failure_threshold(1)
        .reconnect_interval(Duration::from_secs(5))
        .reconnect_max_attempts(2)
        .build()
        .unwrap();
    let h = harness_with(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(AesGcmProtector::new(generate_key())),
    );
    let cancel = CancellationToken::new();
    h.manager
        .publish_node(temperature().heartbeat(Duration::from_secs(1)), &cancel)
        .await
        .unwrap();
    let session = h.stack.last_session();

    session.keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    settle().await;
    assert!(h.manager.supervisor().is_reconnecting(&plant()));

    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(session.reconnect_calls.load(Ordering::SeqCst), 2);
    assert!(h.manager.supervisor().is_empty());
    assert!(h.manager.pool().is_empty());
    assert!(session.closed.load(Ordering::SeqCst));
    assert!(h.manager.heartbeats().is_empty());
    assert_eq!(h.manager.session_state(&plant()), None);
    assert!(h.manager.list_published_nodes().await.unwrap().is_empty());

    let metrics = h.manager.metrics();
    assert_eq!(metrics.reconnects_abandoned, 1);
    assert_eq!(metrics.monitored_items, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_abandoned_then_republish_without_skip_first() {
    let config = ClientConfig::builder()
        .keep_alive_failure_threshold(1)
        .reconnect_interval(Duration::from_secs(5))
        .reconnect_max_attempts(1)
        .build()
        .unwrap();
    let mut h = harness_with(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(AesGcmProtector::new(generate_key())),
    );
    let cancel = CancellationToken::new();
    let node = NodeId::string(2, "Temperature");

    h.manager.publish_node(temperature().skip_first(true), &cancel).await.unwrap();
    h.stack.last_session().keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    settle().await;
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.manager.metrics().reconnects_abandoned, 1);
    assert!(!h.manager.pool().is_reconnecting(&plant()));

    let outcome = h.manager.publish_node(temperature(), &cancel).await.unwrap();
    assert!(matches!(outcome, PublishOutcome::Monitored { .. }));
    assert_eq!(h.stack.open_calls.load(Ordering::SeqCst), 2);

    let topology = h.manager.list_published_nodes().await.unwrap();
    assert!(!topology.servers[0].opc_nodes[0].skip_first);

    h.stack.last_session().notify(&node, Variant::Double(20.0));
    let received = drain(&mut h.notifications);
    assert_eq!(received.len(), 1);
    assert_eq!(h.manager.metrics().notifications_skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unpublish_all_stops_pending_reconnect() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    let session = h.stack.last_session();

    for _ in 0..3 {
        session.keep_alive(StatusCode::BAD_COMMUNICATION_ERROR);
    }
    settle().await;
    assert!(h.manager.supervisor().is_reconnecting(&plant()));

    assert_eq!(h.manager.unpublish_all(&cancel).await.unwrap(), 1);
    assert!(h.manager.supervisor().is_empty());
    assert!(!h.manager.pool().is_reconnecting(&plant()));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(session.reconnect_calls.load(Ordering::SeqCst), 0);
    assert!(h.manager.pool().is_empty());

    // the address is usable again
    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    assert_eq!(h.stack.open_calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_persist_after_each_mutation() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    assert_eq!(stored_topology(&h.storage).node_count(), 1);

    h.manager
        .publish_node(PublishRequest::new(PLANT_URL, "ns=2;s=Pressure"), &cancel)
        .await
        .unwrap();
    assert_eq!(stored_topology(&h.storage).node_count(), 2);
    assert_eq!(h.manager.metrics().persistence_writes, 2);

    // an idempotent publish does not write
    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    assert_eq!(h.manager.metrics().persistence_writes, 2);
}

/// Memory storage whose first write completes late.
struct SlowFirstWrite {
    inner: MemoryStorage,
    writes: std::sync::atomic::AtomicU32,
}

#[async_trait]
impl FileStorage for SlowFirstWrite {
    fn name(&self) -> &str {
        "slow-first-write"
    }

    async fn store(&self, path: &str, content: &[u8]) -> ClientResult<Option<String>> {
        if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.store(path, content).await
    }

    async fn load(&self, name: &str) -> ClientResult<Option<Vec<u8>>> {
        self.inner.load(name).await
    }

    async fn find(&self, prefix: &str, pattern: &str) -> ClientResult<Option<String>> {
        self.inner.find(prefix, pattern).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_persist_concurrent_publishes_store_latest_topology() {
    let storage = Arc::new(SlowFirstWrite {
        inner: MemoryStorage::new(),
        writes: std::sync::atomic::AtomicU32::new(0),
    });
    let manager = ClientManager::builder(MockStack::new(), storage.clone())
        .config(test_config())
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let (first, second) = tokio::join!(
        manager.publish_node(temperature(), &cancel),
        manager.publish_node(PublishRequest::new(PLANT_URL, "ns=2;s=Pressure"), &cancel),
    );
    assert!(first.unwrap().is_monitored());
    assert!(second.unwrap().is_monitored());

    assert_eq!(storage.writes.load(Ordering::SeqCst), 2);
    assert_eq!(stored_topology(&storage.inner).node_count(), 2);
}

#[tokio::test]
async fn test_persist_failure_is_not_fatal() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.storage.set_reject_writes(true);

    let outcome = h.manager.publish_node(temperature(), &cancel).await.unwrap();
    assert!(outcome.is_monitored());
    assert_eq!(h.stack.last_session().item_count(), 1);
    assert_eq!(h.manager.metrics().persistence_failures, 1);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_persist_credentials_are_encrypted() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.manager
        .publish_node(temperature().credentials(Credentials::new("operator", "s3cret")), &cancel)
        .await
        .unwrap();

    let raw = String::from_utf8(h.storage.get(DEFAULT_PERSISTENCE_PATH).unwrap()).unwrap();
    assert!(!raw.contains("s3cret"));
    assert!(raw.contains("\"OpcAuthenticationMode\""));

    let topology = stored_topology(&h.storage);
    let server = &topology.servers[0];
    assert_eq!(server.opc_authentication_mode, AuthMode::UsernamePassword);
    assert!(server.encrypted_auth_credential.is_some());
}

#[tokio::test]
async fn test_persist_disabled() {
    let config = ClientConfig::builder().persist_on_change(false).build().unwrap();
    let h = harness_with(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(AesGcmProtector::new(generate_key())),
    );
    let cancel = CancellationToken::new();

    h.manager.publish_node(temperature(), &cancel).await.unwrap();
    assert!(h.storage.is_empty());

    h.manager.persist(&cancel).await.unwrap();
    assert_eq!(stored_topology(&h.storage).node_count(), 1);
}

#[tokio::test]
async fn test_shutdown_keeps_persisted_topology() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.manager.publish_node(temperature(), &cancel).await.unwrap();

    h.manager.shutdown().await;

    assert!(h.manager.pool().is_empty());
    assert!(h.stack.last_session().closed.load(Ordering::SeqCst));
    assert_eq!(stored_topology(&h.storage).node_count(), 1);
}

#[tokio::test]
async fn test_rehydrate_round_trip() {
    let storage = Arc::new(MemoryStorage::new());
    let protector = Arc::new(AesGcmProtector::new(generate_key()));
    let cancel = CancellationToken::new();

    let first = harness_with(test_config(), storage.clone(), protector.clone());
    first
        .manager
        .publish_node(
            temperature()
                .heartbeat(Duration::from_secs(30))
                .skip_first(true)
                .credentials(Credentials::new("operator", "s3cret")),
            &cancel,
        )
        .await
        .unwrap();
    first
        .manager
        .publish_node(PublishRequest::new(LINE2_URL, "ns=2;s=Speed").publishing_interval(250), &cancel)
        .await
        .unwrap();
    let expected = first.manager.list_published_nodes().await.unwrap();
    first.manager.shutdown().await;

    let second = harness_with(test_config(), storage.clone(), protector.clone());
    let summary = second.manager.rehydrate(&cancel).await.unwrap();
    assert_eq!(summary.servers, 2);
    assert_eq!(summary.published, 2);
    assert_eq!(summary.failed, 0);

    let restored = second.manager.list_published_nodes().await.unwrap();
    assert_eq!(restored.normalized(), expected.normalized());

    let plant_session = second
        .stack
        .sessions()
        .into_iter()
        .find(|s| s.address == plant())
        .unwrap();
    assert_eq!(
        plant_session.identity.credentials(),
        Some(&Credentials::new("operator", "s3cret"))
    );
    assert_eq!(second.manager.heartbeats().len(), 1);
}

#[tokio::test]
async fn test_rehydrate_without_file() {
    let h = harness();
    let summary = h.manager.rehydrate(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.servers, 0);
    assert!(h.manager.pool().is_empty());
}
