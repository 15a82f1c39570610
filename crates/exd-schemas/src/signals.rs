//! Inbound signal types — the call contract of the RPC surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::order::{OrderType, Side, TimeInForce};

/// A strategy's request to put on (or add to) a position.
///
/// `order_type` and `time_in_force` default to market/day when absent;
/// `metadata` is carried onto the resulting order untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub strategy_id: String,
    pub symbol: String,
    pub side: Side,
    pub target_quantity: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub order_type: Option<OrderType>,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Request to cancel a previously submitted order, addressed by local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelSignal {
    pub strategy_id: String,
    /// The engine-assigned local id of the order to cancel.
    pub order_id: String,
}

/// Request to replace a previously submitted order, addressed by local id.
/// The replacement gets a fresh local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceSignal {
    pub strategy_id: String,
    pub symbol: String,
    pub side: Side,
    pub target_quantity: f64,
    /// Local id of the order being replaced.
    pub order_id: String,
}

/// Operator-initiated cancel-all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchRequest {
    pub reason: String,
    pub initiated_by: String,
}
