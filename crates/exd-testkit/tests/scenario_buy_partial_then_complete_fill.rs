//! Scenario: a 10-lot buy fills in two cumulative reports (4 @ 150, then
//! 10 @ 152.5).
//!
//! Invariants under test:
//! 1. The store tracks the broker's cumulative quantity and average.
//! 2. PARTIALLY_FILLED until the cumulative reaches the order quantity,
//!    FILLED after.
//! 3. The position's average equals the broker's cumulative average at
//!    every step — the manager feeds the keeper per-increment prices.
//! 4. The broker mapping dies with the final fill.

use exd_schemas::{Event, OrderStatus, Side};
use exd_testkit::TestRig;

#[tokio::test]
async fn partial_then_complete_fill() {
    let rig = TestRig::new("S").await;

    let local_id = rig.submit("AAPL", Side::Buy, 10.0).await;
    let broker_id = rig.last_broker_id();

    // First report: 4 of 10 filled at 150.
    rig.gateway
        .push_cumulative_fill(&broker_id, "AAPL", Side::Buy, 4.0, 150.0);
    rig.manager.process_fills().await;

    let stored = rig.store.get_order(&local_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::PartiallyFilled);
    assert_eq!(stored.filled_quantity, 4.0);
    assert_eq!(stored.avg_fill_price, 150.0);

    let pos = rig.positions.get_position("AAPL").unwrap();
    assert_eq!(pos.quantity, 4.0);
    assert_eq!(pos.avg_price, 150.0);

    // Mapping still live: more fills are coming.
    assert_eq!(rig.manager.id_map().get_local(&broker_id), Some(local_id.clone()));

    // Second report: cumulative 10 at a cumulative average of 152.5.
    rig.gateway
        .push_cumulative_fill(&broker_id, "AAPL", Side::Buy, 10.0, 152.5);
    rig.manager.process_fills().await;

    let stored = rig.store.get_order(&local_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Filled);
    assert_eq!(stored.filled_quantity, 10.0);
    assert_eq!(stored.avg_fill_price, 152.5);

    let pos = rig.positions.get_position("AAPL").unwrap();
    assert_eq!(pos.quantity, 10.0);
    assert!(
        (pos.avg_price - 152.5).abs() < 1e-9,
        "position average must match the broker's cumulative average, got {}",
        pos.avg_price
    );

    // Terminal: mapping removed, both directions.
    assert!(rig.manager.id_map().get_local(&broker_id).is_none());
    assert!(rig.manager.id_map().get_broker(&local_id).is_none());

    // Journal carries one partial and one final fill event.
    let history = rig.journal.get_order_history(&local_id).await.unwrap();
    let fills: Vec<Event> = history
        .iter()
        .map(|e| e.event_type)
        .filter(|e| matches!(e, Event::OrderPartiallyFilled | Event::OrderFilled))
        .collect();
    assert_eq!(fills, vec![Event::OrderPartiallyFilled, Event::OrderFilled]);
}
