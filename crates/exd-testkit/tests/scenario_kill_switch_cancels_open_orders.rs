//! Scenario: kill switch with two open orders, one of which the broker
//! refuses to cancel.
//!
//! Invariants under test:
//! 1. KILL_SWITCH_ACTIVATED is journaled before any cancels go out.
//! 2. Every open order with a broker id gets a gateway cancel; a failure
//!    on one does not stop the sweep.
//! 3. Successfully cancelled orders transition to CANCELLED and lose
//!    their mapping; the failed one keeps both.
//! 4. At the engine level the kill switch stops new submissions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use exd_engine::Engine;
use exd_schemas::{ErrorKind, Event, KillSwitchRequest, OrderStatus, Side};
use exd_testkit::{signal, TestRig};

#[tokio::test]
async fn sweep_continues_past_a_failing_cancel() {
    let rig = TestRig::new("TEST").await;

    let local_a = rig.submit("AAPL", Side::Buy, 5.0).await;
    let broker_a = rig.last_broker_id();
    let local_b = rig.submit("MSFT", Side::Sell, 3.0).await;
    let broker_b = rig.last_broker_id();

    rig.gateway.fail_cancel_of(&broker_a);

    rig.manager.cancel_all("emergency", "ops").await.unwrap();

    // The failing order is untouched but the error is journaled.
    assert_eq!(
        rig.store.get_order(&local_a).await.unwrap().status,
        OrderStatus::Submitted
    );
    assert_eq!(
        rig.manager.id_map().get_broker(&local_a),
        Some(broker_a.clone())
    );

    // The other order was still processed.
    assert_eq!(
        rig.store.get_order(&local_b).await.unwrap().status,
        OrderStatus::Cancelled
    );
    assert!(rig.manager.id_map().get_broker(&local_b).is_none());
    assert_eq!(rig.gateway.cancelled(), vec![broker_b]);

    let minute_ago = Utc::now() - chrono::Duration::minutes(1);
    let entries = rig
        .journal
        .get_history(minute_ago, Utc::now(), None)
        .await
        .unwrap();
    assert!(entries
        .iter()
        .any(|e| e.event_type == Event::KillSwitchActivated));
    assert!(entries.iter().any(|e| e.event_type == Event::ErrorOccurred));
}

#[tokio::test]
async fn both_orders_cancelled_when_the_broker_cooperates() {
    let rig = TestRig::new("TEST").await;

    let local_a = rig.submit("AAPL", Side::Buy, 5.0).await;
    let local_b = rig.submit("MSFT", Side::Sell, 3.0).await;

    rig.manager.cancel_all("emergency", "ops").await.unwrap();

    for local in [&local_a, &local_b] {
        assert_eq!(
            rig.store.get_order(local).await.unwrap().status,
            OrderStatus::Cancelled
        );
        assert!(rig.manager.id_map().get_broker(local).is_none());
    }
    assert_eq!(rig.gateway.cancelled().len(), 2);
}

#[tokio::test]
async fn engine_kill_switch_stops_new_submissions() {
    let rig = TestRig::new("TEST").await;
    let mut engine = Engine::new(Duration::from_millis(50));
    engine.register_strategy(rig.manager.clone());
    let engine = Arc::new(engine);

    engine
        .activate_kill_switch(&KillSwitchRequest {
            reason: "emergency".to_string(),
            initiated_by: "ops".to_string(),
        })
        .await
        .unwrap();

    assert!(!engine.is_running());

    let err = engine
        .submit_signal(&signal("TEST", "AAPL", Side::Buy, 1.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::State);
}
