//! Scenario rig: a fully wired order manager over in-memory databases.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use exd_execution::{AllowAll, OrderManager, OrderManagerConfig};
use exd_journal::Journal;
use exd_portfolio::PositionKeeper;
use exd_schemas::{Order, OrderType, Side, StrategySignal, TimeInForce};
use exd_store::OrderStore;

use crate::scripted_gateway::ScriptedGateway;

pub struct TestRig {
    pub gateway: Arc<ScriptedGateway>,
    pub journal: Arc<Journal>,
    pub store: Arc<OrderStore>,
    pub positions: Arc<PositionKeeper>,
    pub manager: Arc<OrderManager>,
}

impl TestRig {
    /// Manager with the default 30 s cancel grace.
    pub async fn new(strategy_id: &str) -> Self {
        Self::with_cancel_grace(strategy_id, Duration::from_secs(30)).await
    }

    /// Manager with an explicit cancel grace (zero = sweep on next poll).
    pub async fn with_cancel_grace(strategy_id: &str, grace: Duration) -> Self {
        let gateway = Arc::new(ScriptedGateway::new());
        let journal = Arc::new(Journal::open_in_memory().await.unwrap());
        let store = Arc::new(OrderStore::open_in_memory().await.unwrap());
        let positions = Arc::new(PositionKeeper::new());

        let manager = Arc::new(OrderManager::new(
            OrderManagerConfig::new(strategy_id).cancel_grace(grace),
            gateway.clone(),
            journal.clone(),
            store.clone(),
            positions.clone(),
            Arc::new(AllowAll),
        ));

        Self {
            gateway,
            journal,
            store,
            positions,
            manager,
        }
    }

    /// Submit a market-buy style signal and return the local id.
    pub async fn submit(&self, symbol: &str, side: Side, qty: f64) -> String {
        self.manager
            .process_signal(&signal(self.manager.strategy_id(), symbol, side, qty))
            .await
            .unwrap()
    }

    /// Broker id the gateway assigned to the most recent submit.
    pub fn last_broker_id(&self) -> String {
        self.gateway.last_broker_id().expect("nothing submitted")
    }
}

/// A bare order, for tests that seed store state directly.
pub fn order(local_id: &str, strategy_id: &str, symbol: &str, side: Side, qty: f64) -> Order {
    Order {
        local_id: local_id.to_string(),
        broker_id: None,
        symbol: symbol.to_string(),
        side,
        quantity: qty,
        limit_price: None,
        order_type: OrderType::Market,
        time_in_force: TimeInForce::Day,
        account_id: "paper".to_string(),
        strategy_id: strategy_id.to_string(),
        created_at: Utc::now(),
        metadata: Default::default(),
    }
}

/// A minimal well-formed strategy signal.
pub fn signal(strategy_id: &str, symbol: &str, side: Side, qty: f64) -> StrategySignal {
    StrategySignal {
        strategy_id: strategy_id.to_string(),
        symbol: symbol.to_string(),
        side,
        target_quantity: qty,
        confidence: None,
        order_type: None,
        limit_price: None,
        time_in_force: None,
        metadata: Default::default(),
    }
}
