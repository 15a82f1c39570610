//! Scenario: cancel keeps the broker mapping alive for a grace window so
//! late fills can still be attributed, then the fill pass sweeps it.
//!
//! Invariants under test:
//! 1. Cancel transitions the store to CANCELLED and journals it, but the
//!    local ↔ broker mapping survives.
//! 2. A fill arriving inside the grace window still updates fill info and
//!    the position; the terminal CANCELLED status is left alone.
//! 3. A fully-filled late report removes the mapping immediately.
//! 4. With a zero grace the next fill pass sweeps the mapping.

use std::time::Duration;

use exd_schemas::{CancelSignal, Event, OrderStatus, Side};
use exd_testkit::TestRig;

fn cancel(order_id: &str) -> CancelSignal {
    CancelSignal {
        strategy_id: "TEST".to_string(),
        order_id: order_id.to_string(),
    }
}

#[tokio::test]
async fn cancel_keeps_mapping_during_grace() {
    let rig = TestRig::with_cancel_grace("TEST", Duration::from_secs(3600)).await;

    let local_id = rig.submit("AAPL", Side::Buy, 10.0).await;
    let broker_id = rig.last_broker_id();

    rig.manager.process_cancel(&cancel(&local_id)).await.unwrap();

    assert_eq!(
        rig.store.get_order(&local_id).await.unwrap().status,
        OrderStatus::Cancelled
    );
    assert_eq!(rig.gateway.cancelled(), vec![broker_id.clone()]);

    // Grace window: mapping survives an empty fill pass.
    rig.manager.process_fills().await;
    assert_eq!(rig.manager.id_map().get_broker(&local_id), Some(broker_id));
}

#[tokio::test]
async fn late_fill_during_grace_is_attributed() {
    let rig = TestRig::with_cancel_grace("TEST", Duration::from_secs(3600)).await;

    let local_id = rig.submit("AAPL", Side::Buy, 10.0).await;
    let broker_id = rig.last_broker_id();
    rig.manager.process_cancel(&cancel(&local_id)).await.unwrap();

    // The broker filled 6 lots before honoring the cancel.
    rig.gateway
        .push_cumulative_fill(&broker_id, "AAPL", Side::Buy, 6.0, 150.0);
    rig.manager.process_fills().await;

    let stored = rig.store.get_order(&local_id).await.unwrap();
    assert_eq!(stored.filled_quantity, 6.0);
    // Terminal CANCELLED is not overwritten by the late partial.
    assert_eq!(stored.status, OrderStatus::Cancelled);

    let pos = rig.positions.get_position("AAPL").unwrap();
    assert_eq!(pos.quantity, 6.0);
    assert_eq!(pos.avg_price, 150.0);
}

#[tokio::test]
async fn fully_filled_late_report_removes_mapping() {
    let rig = TestRig::with_cancel_grace("TEST", Duration::from_secs(3600)).await;

    let local_id = rig.submit("AAPL", Side::Buy, 10.0).await;
    let broker_id = rig.last_broker_id();
    rig.manager.process_cancel(&cancel(&local_id)).await.unwrap();

    rig.gateway
        .push_cumulative_fill(&broker_id, "AAPL", Side::Buy, 10.0, 150.0);
    rig.manager.process_fills().await;

    assert!(rig.manager.id_map().get_broker(&local_id).is_none());
    assert_eq!(rig.positions.get_position("AAPL").unwrap().quantity, 10.0);
}

#[tokio::test]
async fn zero_grace_sweeps_mapping_on_next_pass() {
    let rig = TestRig::with_cancel_grace("TEST", Duration::ZERO).await;

    let local_id = rig.submit("AAPL", Side::Buy, 10.0).await;
    rig.manager.process_cancel(&cancel(&local_id)).await.unwrap();
    assert!(rig.manager.id_map().get_broker(&local_id).is_some());

    rig.manager.process_fills().await;
    assert!(
        rig.manager.id_map().get_broker(&local_id).is_none(),
        "expired grace must sweep the mapping"
    );

    let history = rig.journal.get_order_history(&local_id).await.unwrap();
    assert!(history.iter().any(|e| e.event_type == Event::OrderCancelled));
}
