//! The engine: one process-wide owner of every per-strategy
//! [`OrderManager`], the background fill-poll loop, startup recovery, and
//! the kill switch.
//!
//! The engine is also the RPC handler surface: the daemon's routes call
//! straight into [`Engine::submit_signal`] and friends. Dispatch is by
//! `strategy_id`; an unknown strategy is a validation error.
//!
//! Cross-strategy position queries sum signed quantities per symbol and
//! weight the combined average by quantity (zero when the sum nets flat).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use exd_execution::OrderManager;
use exd_portfolio::aggregate_positions;
use exd_schemas::{
    CancelSignal, EngineError, EngineResult, Event, KillSwitchRequest, Position, ReplaceSignal,
    StrategySignal,
};

pub const DEFAULT_FILL_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct Engine {
    managers: HashMap<String, Arc<OrderManager>>,
    fill_poll_interval: Duration,
    running: AtomicBool,
}

impl Engine {
    pub fn new(fill_poll_interval: Duration) -> Self {
        Self {
            managers: HashMap::new(),
            fill_poll_interval,
            running: AtomicBool::new(true),
        }
    }

    /// Register a strategy's manager. Call before the engine is shared;
    /// the strategy set is fixed once the poller starts.
    pub fn register_strategy(&mut self, manager: Arc<OrderManager>) {
        self.managers
            .insert(manager.strategy_id().to_string(), manager);
    }

    pub fn strategy_ids(&self) -> Vec<&str> {
        self.managers.keys().map(String::as_str).collect()
    }

    pub fn fill_poll_interval(&self) -> Duration {
        self.fill_poll_interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Startup: replay each strategy's open orders against its journal to
    /// rebuild id mappings, then journal SYSTEM_STARTED everywhere.
    pub async fn start(&self) -> EngineResult<()> {
        for manager in self.managers.values() {
            let restored = manager.recover().await?;
            manager
                .journal()
                .log(
                    Event::SystemStarted,
                    &json!({ "restored_mappings": restored }).to_string(),
                    None,
                )
                .await?;
        }
        info!(strategies = self.managers.len(), "engine started");
        Ok(())
    }

    /// Orderly shutdown: journal SYSTEM_STOPPED and flush every journal.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        for manager in self.managers.values() {
            if let Err(err) = manager.journal().log(Event::SystemStopped, "{}", None).await {
                warn!(strategy = manager.strategy_id(), error = %err, "shutdown journal write failed");
            }
            if let Err(err) = manager.journal().flush().await {
                warn!(strategy = manager.strategy_id(), error = %err, "journal flush failed");
            }
        }
        info!("engine stopped");
    }

    // -----------------------------------------------------------------------
    // RPC handler surface
    // -----------------------------------------------------------------------

    pub async fn submit_signal(&self, signal: &StrategySignal) -> EngineResult<String> {
        self.ensure_running()?;
        self.manager_for(&signal.strategy_id)?
            .process_signal(signal)
            .await
    }

    pub async fn cancel_order(&self, signal: &CancelSignal) -> EngineResult<()> {
        self.manager_for(&signal.strategy_id)?
            .process_cancel(signal)
            .await
    }

    pub async fn replace_order(&self, signal: &ReplaceSignal) -> EngineResult<String> {
        self.ensure_running()?;
        self.manager_for(&signal.strategy_id)?
            .process_replace(signal)
            .await
    }

    /// Combined position for one symbol across every strategy.
    pub fn get_position(&self, symbol: &str) -> EngineResult<Position> {
        let per_strategy: Vec<Position> = self
            .managers
            .values()
            .filter_map(|manager| manager.get_position(symbol))
            .collect();

        if per_strategy.is_empty() {
            return Err(EngineError::state(format!(
                "No position found for {symbol}"
            )));
        }

        Ok(aggregate_positions(per_strategy)
            .into_iter()
            .next()
            .expect("aggregate of a non-empty set is non-empty"))
    }

    /// Combined positions for every symbol any strategy has touched.
    pub fn get_all_positions(&self) -> Vec<Position> {
        aggregate_positions(
            self.managers
                .values()
                .flat_map(|manager| manager.get_all_positions()),
        )
    }

    /// Soft-stop the engine and best-effort cancel every open order. One
    /// strategy failing its sweep does not stop the others.
    pub async fn activate_kill_switch(&self, request: &KillSwitchRequest) -> EngineResult<()> {
        self.running.store(false, Ordering::SeqCst);
        info!(
            reason = %request.reason,
            initiated_by = %request.initiated_by,
            "kill switch activated"
        );

        for manager in self.managers.values() {
            if let Err(err) = manager
                .cancel_all(&request.reason, &request.initiated_by)
                .await
            {
                warn!(
                    strategy = manager.strategy_id(),
                    error = %err,
                    "kill-switch sweep failed for strategy"
                );
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fill polling
    // -----------------------------------------------------------------------

    /// One polling pass over every manager, in sequence.
    pub async fn poll_fills_once(&self) {
        for manager in self.managers.values() {
            manager.process_fills().await;
        }
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(EngineError::state("Kill switch active; engine is stopped"))
        }
    }

    fn manager_for(&self, strategy_id: &str) -> EngineResult<&Arc<OrderManager>> {
        self.managers
            .get(strategy_id)
            .ok_or_else(|| EngineError::validation(format!("Unknown strategy: {strategy_id}")))
    }
}

/// Spawn the background fill poller. Runs until the kill switch or
/// [`Engine::shutdown`] clears the running flag.
pub fn spawn_fill_poller(engine: Arc<Engine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(engine.fill_poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while engine.is_running() {
            ticker.tick().await;
            debug!("fill poll tick");
            engine.poll_fills_once().await;
        }
    })
}
