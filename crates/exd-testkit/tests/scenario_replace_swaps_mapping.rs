//! Scenario: replace retires the old order and swaps the id mapping to
//! the replacement.

use exd_schemas::{Event, OrderStatus, ReplaceSignal, Side};
use exd_testkit::TestRig;

#[tokio::test]
async fn replace_swaps_ids_and_store_state() {
    let rig = TestRig::new("TEST").await;

    let old_local = rig.submit("AAPL", Side::Buy, 10.0).await;
    let old_broker = rig.last_broker_id();

    let new_local = rig
        .manager
        .process_replace(&ReplaceSignal {
            strategy_id: "TEST".to_string(),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            target_quantity: 20.0,
            order_id: old_local.clone(),
        })
        .await
        .unwrap();

    assert_ne!(new_local, old_local, "replacement gets a fresh local id");

    // Old order: REPLACED, unmapped; its broker id was cancelled upstream.
    let old = rig.store.get_order(&old_local).await.unwrap();
    assert_eq!(old.status, OrderStatus::Replaced);
    assert!(rig.manager.id_map().get_broker(&old_local).is_none());
    assert!(rig.manager.id_map().get_local(&old_broker).is_none());

    // New order: SUBMITTED under the new broker id, fully mapped.
    let new_broker = rig.last_broker_id();
    assert_ne!(new_broker, old_broker);
    let new = rig.store.get_order(&new_local).await.unwrap();
    assert_eq!(new.status, OrderStatus::Submitted);
    assert_eq!(new.broker_id(), Some(new_broker.as_str()));
    assert_eq!(new.order.quantity, 20.0);
    assert_eq!(
        rig.manager.id_map().get_local(&new_broker),
        Some(new_local.clone())
    );

    // The replacement is journaled against the old order's trail.
    let history = rig.journal.get_order_history(&old_local).await.unwrap();
    assert!(history.iter().any(|e| e.event_type == Event::OrderReplaced));
}

#[tokio::test]
async fn fills_for_the_replacement_resolve_to_the_new_local_id() {
    let rig = TestRig::new("TEST").await;

    let old_local = rig.submit("AAPL", Side::Buy, 10.0).await;
    let new_local = rig
        .manager
        .process_replace(&ReplaceSignal {
            strategy_id: "TEST".to_string(),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            target_quantity: 20.0,
            order_id: old_local,
        })
        .await
        .unwrap();

    let new_broker = rig.last_broker_id();
    rig.gateway
        .push_cumulative_fill(&new_broker, "AAPL", Side::Buy, 20.0, 150.0);
    rig.manager.process_fills().await;

    let stored = rig.store.get_order(&new_local).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Filled);
    assert_eq!(stored.filled_quantity, 20.0);
}
