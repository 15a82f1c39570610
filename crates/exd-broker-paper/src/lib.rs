//! In-memory "paper" execution gateway.
//!
//! Accepts every order and reports it fully filled on the next poll; once
//! reported, an order never appears in `get_fills` again. Broker ids are
//! minted locally with a `BRK` prefix. Fill prices come from the order's
//! limit price when present, else from a per-symbol mark set by the host,
//! else zero (the position keeper treats a zero price as quantity-only).
//!
//! Used for dry runs and integration tests; a live adapter implements the
//! same trait against a real broker API.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use exd_execution::ExecutionGateway;
use exd_schemas::{EngineResult, ExecutionReport, Order, OrderIdGenerator};

#[derive(Debug)]
pub struct PaperGateway {
    /// Orders accepted but not yet reported filled, keyed by broker id.
    /// BTreeMap keeps report order deterministic.
    pending: Mutex<BTreeMap<String, Order>>,
    marks: Mutex<BTreeMap<String, f64>>,
    id_gen: OrderIdGenerator,
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperGateway {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            marks: Mutex::new(BTreeMap::new()),
            id_gen: OrderIdGenerator::new("BRK"),
        }
    }

    /// Set the price at which market orders in `symbol` will fill.
    pub fn set_mark(&self, symbol: impl Into<String>, price: f64) {
        self.marks
            .lock()
            .expect("marks lock poisoned")
            .insert(symbol.into(), price);
    }

    /// Number of orders awaiting their fill report.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }

    fn fill_price_for(&self, order: &Order) -> f64 {
        // Limit orders fill at their limit; market orders at the mark.
        if let Some(limit) = order.limit_price {
            return limit;
        }
        self.marks
            .lock()
            .expect("marks lock poisoned")
            .get(&order.symbol)
            .copied()
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn submit_order(&self, order: &Order) -> EngineResult<String> {
        let broker_id = self.id_gen.next_id();
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(broker_id.clone(), order.clone());
        Ok(broker_id)
    }

    async fn cancel_order(&self, broker_id: &str) -> EngineResult<()> {
        // Idempotent: cancelling an unknown or already-reported order is fine.
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .remove(broker_id);
        Ok(())
    }

    async fn replace_order(&self, broker_id: &str, new_order: &Order) -> EngineResult<String> {
        let new_broker_id = self.id_gen.next_id();
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        pending.remove(broker_id);
        pending.insert(new_broker_id.clone(), new_order.clone());
        Ok(new_broker_id)
    }

    async fn get_fills(&self) -> Vec<ExecutionReport> {
        let drained: Vec<(String, Order)> = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            std::mem::take(&mut *pending).into_iter().collect()
        };

        drained
            .into_iter()
            .map(|(broker_id, order)| {
                let price = self.fill_price_for(&order);
                ExecutionReport {
                    broker_order_id: broker_id,
                    symbol: order.symbol.clone(),
                    side: order.side,
                    filled_quantity: order.quantity,
                    avg_fill_price: price,
                    fill_time: Utc::now(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exd_schemas::{OrderType, Side, TimeInForce};

    fn order(local_id: &str, symbol: &str, qty: f64, limit: Option<f64>) -> Order {
        Order {
            local_id: local_id.to_string(),
            broker_id: None,
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity: qty,
            limit_price: limit,
            order_type: if limit.is_some() {
                OrderType::Limit
            } else {
                OrderType::Market
            },
            time_in_force: TimeInForce::Day,
            account_id: "paper".to_string(),
            strategy_id: "TEST".to_string(),
            created_at: Utc::now(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn submitted_order_fills_fully_on_next_poll() {
        let gw = PaperGateway::new();
        let broker_id = gw.submit_order(&order("ORD_1", "AAPL", 10.0, Some(150.0))).await.unwrap();

        let fills = gw.get_fills().await;
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].broker_order_id, broker_id);
        assert_eq!(fills[0].filled_quantity, 10.0);
        assert_eq!(fills[0].avg_fill_price, 150.0);

        // Fully reported orders never reappear.
        assert!(gw.get_fills().await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_order_is_never_reported() {
        let gw = PaperGateway::new();
        let broker_id = gw.submit_order(&order("ORD_2", "AAPL", 10.0, None)).await.unwrap();
        gw.cancel_order(&broker_id).await.unwrap();

        assert!(gw.get_fills().await.is_empty());
        // Cancel is idempotent.
        gw.cancel_order(&broker_id).await.unwrap();
    }

    #[tokio::test]
    async fn replace_retires_the_old_id() {
        let gw = PaperGateway::new();
        let old = gw.submit_order(&order("ORD_3", "AAPL", 10.0, None)).await.unwrap();
        let new = gw
            .replace_order(&old, &order("ORD_4", "AAPL", 20.0, None))
            .await
            .unwrap();
        assert_ne!(old, new);

        let fills = gw.get_fills().await;
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].broker_order_id, new);
        assert_eq!(fills[0].filled_quantity, 20.0);
    }

    #[tokio::test]
    async fn market_orders_fill_at_the_mark() {
        let gw = PaperGateway::new();
        gw.set_mark("AAPL", 191.25);
        gw.submit_order(&order("ORD_5", "AAPL", 5.0, None)).await.unwrap();

        let fills = gw.get_fills().await;
        assert_eq!(fills[0].avg_fill_price, 191.25);
    }

    #[tokio::test]
    async fn unmarked_market_orders_fill_with_zero_price() {
        let gw = PaperGateway::new();
        gw.submit_order(&order("ORD_6", "TSLA", 5.0, None)).await.unwrap();

        let fills = gw.get_fills().await;
        assert_eq!(fills[0].avg_fill_price, 0.0);
    }
}
