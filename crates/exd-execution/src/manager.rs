//! Order Manager — the state machine from strategy signal to terminal
//! order outcome, one instance per strategy.
//!
//! # Identity spaces
//!
//! The manager mints the local id before submission and records the
//! broker's id in the [`OrderIdMap`] immediately after a successful
//! submit. Cancels and replaces resolve local → broker before calling the
//! gateway; fill reports resolve broker → local on the way back.
//!
//! # Side-effect ordering
//!
//! Every mutation is journaled. Persistence failures *before* the gateway
//! submit abort the operation. Persistence failures *after* a successful
//! submit are journaled and surfaced, but the broker-side effect has
//! already happened — the caller must expect local and broker state to
//! disagree until reconciliation. Any mapping added in the failed attempt
//! is rolled back.
//!
//! # Locks
//!
//! The id map and the cancel-grace set use short critical sections only;
//! no in-memory lock is ever held across a gateway, store, or journal
//! call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use exd_journal::Journal;
use exd_portfolio::PositionKeeper;
use exd_schemas::{
    CancelSignal, EngineError, EngineResult, Event, Order, OrderIdGenerator, OrderStatus,
    OrderType, Position, ReplaceSignal, StoredOrder, StrategySignal, TimeInForce,
};
use exd_store::OrderStore;

use crate::gateway::ExecutionGateway;
use crate::id_map::OrderIdMap;
use crate::risk::RiskCheck;

/// Construction-time knobs for one manager.
#[derive(Debug, Clone)]
pub struct OrderManagerConfig {
    pub strategy_id: String,
    /// Stamped onto every order this manager creates.
    pub account_id: String,
    /// How long a cancelled order keeps its broker mapping so late fills
    /// can still be attributed. Swept at the end of each fill pass.
    pub cancel_grace: std::time::Duration,
}

impl OrderManagerConfig {
    pub fn new(strategy_id: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            account_id: "paper".to_string(),
            cancel_grace: std::time::Duration::from_secs(30),
        }
    }

    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn cancel_grace(mut self, grace: std::time::Duration) -> Self {
        self.cancel_grace = grace;
        self
    }
}

pub struct OrderManager {
    strategy_id: String,
    account_id: String,
    cancel_grace: ChronoDuration,

    gateway: Arc<dyn ExecutionGateway>,
    journal: Arc<Journal>,
    store: Arc<OrderStore>,
    positions: Arc<PositionKeeper>,
    risk: Arc<dyn RiskCheck>,

    id_map: OrderIdMap,
    id_gen: OrderIdGenerator,
    /// Cancelled orders still inside the grace window, local id → cancel time.
    cancelled_pending_sweep: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl OrderManager {
    pub fn new(
        config: OrderManagerConfig,
        gateway: Arc<dyn ExecutionGateway>,
        journal: Arc<Journal>,
        store: Arc<OrderStore>,
        positions: Arc<PositionKeeper>,
        risk: Arc<dyn RiskCheck>,
    ) -> Self {
        let cancel_grace =
            ChronoDuration::from_std(config.cancel_grace).unwrap_or_else(|_| ChronoDuration::zero());
        Self {
            strategy_id: config.strategy_id,
            account_id: config.account_id,
            cancel_grace,
            gateway,
            journal,
            store,
            positions,
            risk,
            id_map: OrderIdMap::new(),
            id_gen: OrderIdGenerator::new("ORD"),
            cancelled_pending_sweep: Mutex::new(HashMap::new()),
        }
    }

    pub fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    pub fn id_map(&self) -> &OrderIdMap {
        &self.id_map
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    // -----------------------------------------------------------------------
    // Signal → order
    // -----------------------------------------------------------------------

    /// Materialize a strategy signal as an order and submit it.
    ///
    /// Returns the new local id on success. The gateway's rejection, when
    /// it rejects, is returned unchanged.
    pub async fn process_signal(&self, signal: &StrategySignal) -> EngineResult<String> {
        self.journal
            .log(
                Event::SignalReceived,
                &json!({
                    "strategy_id": signal.strategy_id,
                    "symbol": signal.symbol,
                    "side": signal.side.as_str(),
                    "target_quantity": signal.target_quantity,
                })
                .to_string(),
                None,
            )
            .await?;

        if let Err(err) = validate_signal(signal) {
            self.journal
                .log(
                    Event::SignalIgnored,
                    &json!({ "reason": err.message }).to_string(),
                    None,
                )
                .await?;
            return Err(err);
        }

        let order = self.order_from_signal(signal);
        let local_id = order.local_id.clone();

        self.journal
            .log(
                Event::OrderCreated,
                &json!({
                    "symbol": order.symbol,
                    "side": order.side.as_str(),
                    "quantity": order.quantity,
                })
                .to_string(),
                Some(&local_id),
            )
            .await?;

        if let Err(err) = self.store.store_order(&StoredOrder::pending(order.clone())).await {
            self.journal_error(&err, Some(&local_id)).await;
            return Err(err);
        }

        if let Err(err) = self.risk.evaluate(&order) {
            let refusal = EngineError::validation(err.message.clone());
            self.reject_order(&local_id, &refusal.message).await;
            return Err(refusal);
        }

        self.journal
            .log(Event::OrderValidated, "{}", Some(&local_id))
            .await?;

        let broker_id = match self.gateway.submit_order(&order).await {
            Ok(broker_id) => broker_id,
            Err(err) => {
                // Broker refused: terminal REJECTED, error forwarded verbatim.
                self.reject_order(&local_id, &err.message).await;
                return Err(err);
            }
        };

        self.id_map.add(&local_id, &broker_id);

        if let Err(err) = self.store.update_broker_id(&local_id, &broker_id).await {
            self.id_map.remove(&local_id);
            self.journal_error(&err, Some(&local_id)).await;
            return Err(err);
        }

        self.journal
            .log(
                Event::OrderSubmitted,
                &json!({ "broker_id": broker_id }).to_string(),
                Some(&local_id),
            )
            .await?;

        if let Err(err) = self
            .store
            .update_order_status(&local_id, OrderStatus::Submitted)
            .await
        {
            self.id_map.remove(&local_id);
            self.journal_error(&err, Some(&local_id)).await;
            return Err(err);
        }

        self.journal
            .log(Event::SignalProcessed, "{}", Some(&local_id))
            .await?;

        info!(
            strategy = %self.strategy_id,
            local_id = %local_id,
            broker_id = %broker_id,
            symbol = %order.symbol,
            "order submitted"
        );

        Ok(local_id)
    }

    /// Cancel a previously submitted order, addressed by local id.
    ///
    /// The broker mapping survives for the grace window so late fills can
    /// still be attributed; the fill pass sweeps it afterwards.
    pub async fn process_cancel(&self, signal: &CancelSignal) -> EngineResult<()> {
        let local_id = &signal.order_id;
        let broker_id = self.id_map.get_broker(local_id).ok_or_else(|| {
            EngineError::state(format!("No broker mapping for order: {local_id}"))
        })?;

        self.gateway.cancel_order(&broker_id).await?;

        if let Err(err) = self
            .store
            .update_order_status(local_id, OrderStatus::Cancelled)
            .await
        {
            self.journal_error(&err, Some(local_id)).await;
            return Err(err);
        }

        self.journal
            .log(
                Event::OrderCancelled,
                &json!({ "broker_id": broker_id }).to_string(),
                Some(local_id),
            )
            .await?;

        self.cancelled_pending_sweep
            .lock()
            .expect("cancel sweep lock poisoned")
            .insert(local_id.clone(), Utc::now());

        info!(strategy = %self.strategy_id, local_id = %local_id, "order cancelled");
        Ok(())
    }

    /// Replace a previously submitted order. The replacement gets a fresh
    /// local id, which is returned; the old order becomes REPLACED.
    pub async fn process_replace(&self, signal: &ReplaceSignal) -> EngineResult<String> {
        let old_local = &signal.order_id;
        let old_broker = self.id_map.get_broker(old_local).ok_or_else(|| {
            EngineError::state(format!("No broker mapping for order: {old_local}"))
        })?;

        let new_order = Order {
            local_id: self.id_gen.next_id(),
            broker_id: None,
            symbol: signal.symbol.clone(),
            side: signal.side,
            quantity: signal.target_quantity,
            limit_price: None,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            account_id: self.account_id.clone(),
            strategy_id: self.strategy_id.clone(),
            created_at: Utc::now(),
            metadata: Default::default(),
        };
        let new_local = new_order.local_id.clone();

        self.journal
            .log(
                Event::OrderReplaced,
                &json!({
                    "new_order_id": new_local,
                    "symbol": new_order.symbol,
                    "quantity": new_order.quantity,
                })
                .to_string(),
                Some(old_local),
            )
            .await?;

        let new_broker = self.gateway.replace_order(&old_broker, &new_order).await?;

        if let Err(err) = self
            .store
            .update_order_status(old_local, OrderStatus::Replaced)
            .await
        {
            self.journal_error(&err, Some(old_local)).await;
            return Err(err);
        }

        let mut stored = StoredOrder::pending(new_order);
        stored.order.broker_id = Some(new_broker.clone());
        stored.status = OrderStatus::Submitted;
        if let Err(err) = self.store.store_order(&stored).await {
            self.journal_error(&err, Some(&new_local)).await;
            return Err(err);
        }

        self.id_map.remove(old_local);
        self.id_map.add(&new_local, &new_broker);

        info!(
            strategy = %self.strategy_id,
            old_local_id = %old_local,
            new_local_id = %new_local,
            "order replaced"
        );

        Ok(new_local)
    }

    // -----------------------------------------------------------------------
    // Fill reconciliation
    // -----------------------------------------------------------------------

    /// Pull fills from the gateway and reconcile them into the store and
    /// the position ledger. Per-report failures are journaled and skipped;
    /// a bad report never aborts the pass.
    pub async fn process_fills(&self) {
        let reports = self.gateway.get_fills().await;

        for report in reports {
            let Some(local_id) = self.id_map.get_local(&report.broker_order_id) else {
                warn!(
                    strategy = %self.strategy_id,
                    broker_id = %report.broker_order_id,
                    "fill report for unknown broker order id"
                );
                self.journal_error(
                    &EngineError::state(format!(
                        "Fill report for unknown broker order id: {}",
                        report.broker_order_id
                    )),
                    Some(&report.broker_order_id),
                )
                .await;
                continue;
            };

            let stored = match self.store.get_order(&local_id).await {
                Ok(stored) => stored,
                Err(err) => {
                    self.journal_error(&err, Some(&local_id)).await;
                    continue;
                }
            };

            // Reports are cumulative; anything not strictly ahead of what we
            // already recorded is a duplicate or stale replay.
            if report.filled_quantity <= stored.filled_quantity {
                debug!(local_id = %local_id, "stale fill report ignored");
                continue;
            }
            let delta_qty = report.filled_quantity - stored.filled_quantity;

            if let Err(err) = self
                .store
                .update_fill_info(&local_id, report.filled_quantity, report.avg_fill_price)
                .await
            {
                self.journal_error(&err, Some(&local_id)).await;
                continue;
            }

            let fully_filled = report.filled_quantity >= stored.order.quantity;
            if !stored.status.is_terminal() {
                let new_status = if fully_filled {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartiallyFilled
                };
                if let Err(err) = self.store.update_order_status(&local_id, new_status).await {
                    self.journal_error(&err, Some(&local_id)).await;
                }
            }

            // The report's price is the cumulative average for the whole
            // order. Recover the increment's own price so the position's
            // average lands on the broker's cumulative average.
            let delta_price = increment_price(
                stored.filled_quantity,
                stored.avg_fill_price,
                report.filled_quantity,
                report.avg_fill_price,
            );
            self.positions
                .on_fill(&stored.order.symbol, delta_qty, delta_price, report.side);

            let event = if fully_filled {
                Event::OrderFilled
            } else {
                Event::OrderPartiallyFilled
            };
            if let Err(err) = self
                .journal
                .log(
                    event,
                    &json!({
                        "filled_quantity": report.filled_quantity,
                        "avg_fill_price": report.avg_fill_price,
                    })
                    .to_string(),
                    Some(&local_id),
                )
                .await
            {
                warn!(local_id = %local_id, error = %err, "journal write failed");
            }

            if fully_filled {
                self.id_map.remove(&local_id);
                self.cancelled_pending_sweep
                    .lock()
                    .expect("cancel sweep lock poisoned")
                    .remove(&local_id);
            }
        }

        self.sweep_cancelled_mappings();
    }

    /// Drop mappings of cancelled orders whose grace window has elapsed.
    fn sweep_cancelled_mappings(&self) {
        let now = Utc::now();
        let expired: Vec<String> = {
            let mut pending = self
                .cancelled_pending_sweep
                .lock()
                .expect("cancel sweep lock poisoned");
            let expired: Vec<String> = pending
                .iter()
                .filter(|(_, cancelled_at)| {
                    now.signed_duration_since(**cancelled_at) >= self.cancel_grace
                })
                .map(|(local_id, _)| local_id.clone())
                .collect();
            for local_id in &expired {
                pending.remove(local_id);
            }
            expired
        };

        for local_id in expired {
            self.id_map.remove(&local_id);
            debug!(local_id = %local_id, "cancelled order mapping swept");
        }
    }

    // -----------------------------------------------------------------------
    // Kill switch
    // -----------------------------------------------------------------------

    /// Best-effort cancel of every open order. A gateway failure on one
    /// order is journaled and the sweep continues with the rest.
    pub async fn cancel_all(&self, reason: &str, initiated_by: &str) -> EngineResult<()> {
        self.journal
            .log(
                Event::KillSwitchActivated,
                &json!({ "reason": reason, "initiated_by": initiated_by }).to_string(),
                None,
            )
            .await?;

        let open = self.store.get_open_orders().await?;
        info!(
            strategy = %self.strategy_id,
            open_orders = open.len(),
            reason = %reason,
            "kill switch sweep"
        );

        for stored in open {
            let local_id = stored.local_id().to_string();
            let Some(broker_id) = stored.broker_id().map(str::to_string) else {
                continue; // never reached the broker; recovery handles it
            };

            match self.gateway.cancel_order(&broker_id).await {
                Ok(()) => {
                    if let Err(err) = self
                        .store
                        .update_order_status(&local_id, OrderStatus::Cancelled)
                        .await
                    {
                        self.journal_error(&err, Some(&local_id)).await;
                        continue;
                    }
                    if let Err(err) = self
                        .journal
                        .log(
                            Event::OrderCancelled,
                            &json!({ "reason": reason }).to_string(),
                            Some(&local_id),
                        )
                        .await
                    {
                        warn!(local_id = %local_id, error = %err, "journal write failed");
                    }
                    self.id_map.remove(&local_id);
                }
                Err(err) => {
                    warn!(local_id = %local_id, error = %err, "kill-switch cancel failed");
                    self.journal_error(&err, Some(&local_id)).await;
                }
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_position(&self, symbol: &str) -> Option<Position> {
        self.positions.get_position(symbol)
    }

    pub fn get_all_positions(&self) -> Vec<Position> {
        self.positions.get_all_positions()
    }

    // -----------------------------------------------------------------------
    // Startup recovery
    // -----------------------------------------------------------------------

    /// Rebuild in-memory state from the store and the journal after a
    /// restart.
    ///
    /// PENDING_SUBMISSION orders with no `ORDER_SUBMITTED` journal entry
    /// died mid-submit and are marked REJECTED; every other open order
    /// with a broker id gets its mapping re-registered so fills keep
    /// flowing. Returns the number of restored mappings.
    pub async fn recover(&self) -> EngineResult<usize> {
        let open = self.store.get_open_orders().await?;
        let mut restored = 0usize;

        for stored in open {
            let local_id = stored.local_id().to_string();

            if stored.status == OrderStatus::PendingSubmission {
                let history = self.journal.get_order_history(&local_id).await?;
                let submitted = history
                    .iter()
                    .any(|entry| entry.event_type == Event::OrderSubmitted);
                if !submitted {
                    self.store
                        .update_order_status(&local_id, OrderStatus::Rejected)
                        .await?;
                    self.journal
                        .log(
                            Event::OrderRejected,
                            &json!({ "reason": "crash during submission" }).to_string(),
                            Some(&local_id),
                        )
                        .await?;
                    warn!(local_id = %local_id, "pending order rejected: crash during submission");
                    continue;
                }
            }

            if let Some(broker_id) = stored.broker_id() {
                self.id_map.add(&local_id, broker_id);
                restored += 1;
            }
        }

        info!(strategy = %self.strategy_id, restored, "recovery complete");
        Ok(restored)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn order_from_signal(&self, signal: &StrategySignal) -> Order {
        Order {
            local_id: self.id_gen.next_id(),
            broker_id: None,
            symbol: signal.symbol.clone(),
            side: signal.side,
            quantity: signal.target_quantity,
            limit_price: signal.limit_price,
            order_type: signal.order_type.unwrap_or(OrderType::Market),
            time_in_force: signal.time_in_force.unwrap_or(TimeInForce::Day),
            account_id: self.account_id.clone(),
            strategy_id: signal.strategy_id.clone(),
            created_at: Utc::now(),
            metadata: signal.metadata.clone(),
        }
    }

    /// Terminal rejection: status + journal, both best-effort.
    async fn reject_order(&self, local_id: &str, reason: &str) {
        if let Err(err) = self
            .store
            .update_order_status(local_id, OrderStatus::Rejected)
            .await
        {
            self.journal_error(&err, Some(local_id)).await;
        }
        if let Err(err) = self
            .journal
            .log(
                Event::OrderRejected,
                &json!({ "reason": reason }).to_string(),
                Some(local_id),
            )
            .await
        {
            warn!(local_id = %local_id, error = %err, "journal write failed");
        }
    }

    /// Journal ERROR_OCCURRED; the journal being down too is only logged.
    async fn journal_error(&self, err: &EngineError, correlation_id: Option<&str>) {
        if let Err(journal_err) = self
            .journal
            .log(
                Event::ErrorOccurred,
                &json!({ "message": err.to_string() }).to_string(),
                correlation_id,
            )
            .await
        {
            warn!(error = %journal_err, "failed to journal error");
        }
    }
}

fn validate_signal(signal: &StrategySignal) -> EngineResult<()> {
    if signal.symbol.trim().is_empty() {
        return Err(EngineError::validation("Signal has an empty symbol"));
    }
    if signal.target_quantity <= 0.0 || !signal.target_quantity.is_finite() {
        return Err(EngineError::validation(format!(
            "Signal quantity must be positive, got {}",
            signal.target_quantity
        )));
    }
    Ok(())
}

/// Price of the increment between two cumulative (quantity, average) pairs.
///
/// Falls back to the reported cumulative average when the algebra produces
/// garbage (a broker misreporting averages), and to zero when the broker
/// omits prices entirely.
fn increment_price(prev_qty: f64, prev_avg: f64, cum_qty: f64, cum_avg: f64) -> f64 {
    if cum_avg <= 0.0 {
        return 0.0;
    }
    let delta = cum_qty - prev_qty;
    if delta <= 0.0 {
        return cum_avg;
    }
    let price = (cum_qty * cum_avg - prev_qty * prev_avg) / delta;
    if price.is_finite() && price > 0.0 {
        price
    } else {
        cum_avg
    }
}
