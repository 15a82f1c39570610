//! A gateway whose behavior the test scripts.
//!
//! Unlike the paper gateway, nothing fills on its own: the test queues the
//! exact `ExecutionReport`s the next poll returns, and can force submit or
//! cancel failures to exercise the error paths.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use exd_execution::ExecutionGateway;
use exd_schemas::{EngineError, EngineResult, ExecutionReport, Order, OrderIdGenerator, Side};

#[derive(Debug)]
pub struct ScriptedGateway {
    id_gen: OrderIdGenerator,
    submitted: Mutex<Vec<(String, Order)>>,
    cancelled: Mutex<Vec<String>>,
    queued_fills: Mutex<VecDeque<ExecutionReport>>,
    reject_submits_with: Mutex<Option<String>>,
    failing_cancels: Mutex<HashSet<String>>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            id_gen: OrderIdGenerator::new("BRK"),
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            queued_fills: Mutex::new(VecDeque::new()),
            reject_submits_with: Mutex::new(None),
            failing_cancels: Mutex::new(HashSet::new()),
        }
    }

    /// Every subsequent submit fails with this message (forwarded verbatim
    /// by the manager) until cleared.
    pub fn reject_submits_with(&self, message: impl Into<String>) {
        *self.reject_submits_with.lock().unwrap() = Some(message.into());
    }

    pub fn accept_submits(&self) {
        *self.reject_submits_with.lock().unwrap() = None;
    }

    /// Cancel of this broker id will fail with a gateway error.
    pub fn fail_cancel_of(&self, broker_id: impl Into<String>) {
        self.failing_cancels.lock().unwrap().insert(broker_id.into());
    }

    /// Queue a report for the next `get_fills` poll.
    pub fn push_fill(&self, report: ExecutionReport) {
        self.queued_fills.lock().unwrap().push_back(report);
    }

    /// Convenience: queue a cumulative fill report.
    pub fn push_cumulative_fill(
        &self,
        broker_id: &str,
        symbol: &str,
        side: Side,
        filled_quantity: f64,
        avg_fill_price: f64,
    ) {
        self.push_fill(ExecutionReport {
            broker_order_id: broker_id.to_string(),
            symbol: symbol.to_string(),
            side,
            filled_quantity,
            avg_fill_price,
            fill_time: Utc::now(),
        });
    }

    /// Everything submitted so far, in order: (broker id, order).
    pub fn submitted(&self) -> Vec<(String, Order)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn last_broker_id(&self) -> Option<String> {
        self.submitted
            .lock()
            .unwrap()
            .last()
            .map(|(broker_id, _)| broker_id.clone())
    }

    /// Broker ids whose cancel the gateway acknowledged.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionGateway for ScriptedGateway {
    async fn submit_order(&self, order: &Order) -> EngineResult<String> {
        if let Some(message) = self.reject_submits_with.lock().unwrap().clone() {
            return Err(EngineError::gateway(message));
        }
        let broker_id = self.id_gen.next_id();
        self.submitted
            .lock()
            .unwrap()
            .push((broker_id.clone(), order.clone()));
        Ok(broker_id)
    }

    async fn cancel_order(&self, broker_id: &str) -> EngineResult<()> {
        if self.failing_cancels.lock().unwrap().contains(broker_id) {
            return Err(EngineError::gateway(format!(
                "Cancel rejected by broker for {broker_id}"
            )));
        }
        self.cancelled.lock().unwrap().push(broker_id.to_string());
        Ok(())
    }

    async fn replace_order(&self, broker_id: &str, new_order: &Order) -> EngineResult<String> {
        if let Some(message) = self.reject_submits_with.lock().unwrap().clone() {
            return Err(EngineError::gateway(message));
        }
        // The old order dies at the broker; record it as cancelled.
        self.cancelled.lock().unwrap().push(broker_id.to_string());
        let new_broker_id = self.id_gen.next_id();
        self.submitted
            .lock()
            .unwrap()
            .push((new_broker_id.clone(), new_order.clone()));
        Ok(new_broker_id)
    }

    async fn get_fills(&self) -> Vec<ExecutionReport> {
        self.queued_fills.lock().unwrap().drain(..).collect()
    }
}
