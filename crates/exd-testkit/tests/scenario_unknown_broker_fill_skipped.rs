//! Scenario: a fill report for a broker id the engine never issued.
//!
//! The report is journaled as ERROR_OCCURRED and skipped; the rest of the
//! batch is still processed and the pass never aborts.

use chrono::{Duration, Utc};
use exd_schemas::{Event, OrderStatus, Side};
use exd_testkit::TestRig;

#[tokio::test]
async fn unknown_broker_id_is_logged_and_skipped() {
    let rig = TestRig::new("TEST").await;

    let local_id = rig.submit("AAPL", Side::Buy, 10.0).await;
    let broker_id = rig.last_broker_id();

    // A ghost report ahead of a real one in the same batch.
    rig.gateway
        .push_cumulative_fill("GHOST_BROKER", "MSFT", Side::Buy, 5.0, 300.0);
    rig.gateway
        .push_cumulative_fill(&broker_id, "AAPL", Side::Buy, 10.0, 150.0);

    rig.manager.process_fills().await;

    // The ghost changed nothing but left a trace.
    assert!(rig.positions.get_position("MSFT").is_none());
    let errors = rig
        .journal
        .get_history(
            Utc::now() - Duration::minutes(1),
            Utc::now(),
            Some(Event::ErrorOccurred),
        )
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].data.contains("GHOST_BROKER"));

    // The real report behind it still applied.
    let stored = rig.store.get_order(&local_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Filled);
    assert_eq!(rig.positions.get_position("AAPL").unwrap().quantity, 10.0);
}
