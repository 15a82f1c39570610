//! Broker gateway boundary.

use async_trait::async_trait;

use exd_schemas::{EngineResult, ExecutionReport, Order};

/// The capability set every broker adapter provides: submit, cancel,
/// replace, and fill polling. The engine holds one implementer per
/// strategy behind `Arc<dyn ExecutionGateway>`.
///
/// Implementations must tolerate concurrent invocation: the RPC side calls
/// `submit_order` / `cancel_order` / `replace_order` while the fill poller
/// calls `get_fills`.
///
/// # `get_fills` contract
///
/// Each call returns reports for orders with new activity since the
/// previous call. An order may appear in several successive calls
/// (partial → filled) but its `filled_quantity` is cumulative and
/// monotonically non-decreasing, and once reported fully filled the order
/// never appears again.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submit a new order; returns the broker-assigned order id.
    async fn submit_order(&self, order: &Order) -> EngineResult<String>;

    /// Cancel the order with the given broker id.
    async fn cancel_order(&self, broker_id: &str) -> EngineResult<()>;

    /// Replace the order with the given broker id; returns the (possibly
    /// new) broker id of the replacement.
    async fn replace_order(&self, broker_id: &str, new_order: &Order) -> EngineResult<String>;

    /// Fills observed since the previous poll.
    async fn get_fills(&self) -> Vec<ExecutionReport>;
}
