//! Order domain types.
//!
//! An [`Order`] is intent + identity: the `local_id` is minted by the engine
//! before submission and never changes; the `broker_id` is assigned by the
//! gateway on acceptance and may change on replace. [`StoredOrder`] is the
//! durable view the order store persists alongside lifecycle state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn code(self) -> i64 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type. Signals default to `Market` unless they override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    pub fn code(self) -> i64 {
        match self {
            OrderType::Market => 0,
            OrderType::Limit => 1,
            OrderType::Stop => 2,
            OrderType::StopLimit => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(OrderType::Market),
            1 => Some(OrderType::Limit),
            2 => Some(OrderType::Stop),
            3 => Some(OrderType::StopLimit),
            _ => None,
        }
    }
}

/// Time in force. Signals default to `Day` unless they override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    pub fn code(self) -> i64 {
        match self {
            TimeInForce::Day => 0,
            TimeInForce::Gtc => 1,
            TimeInForce::Ioc => 2,
            TimeInForce::Fok => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TimeInForce::Day),
            1 => Some(TimeInForce::Gtc),
            2 => Some(TimeInForce::Ioc),
            3 => Some(TimeInForce::Fok),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an order.
///
/// Transitions are forward-only:
///
/// ```text
/// PendingSubmission ──► Submitted ──► Accepted ──► { PartiallyFilled, Filled,
///        │                  │                        Cancelled, Replaced,
///        └──► Rejected      └── (same branch set)    Rejected, Expired }
/// ```
///
/// `Filled`, `Cancelled`, `Rejected`, `Expired` and `Replaced` are terminal;
/// once an order reaches one of them no further transition is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingSubmission,
    Submitted,
    Accepted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Replaced,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Stable integer encoding used by the order store.
    pub fn code(self) -> i64 {
        match self {
            OrderStatus::PendingSubmission => 0,
            OrderStatus::Submitted => 1,
            OrderStatus::Accepted => 2,
            OrderStatus::PartiallyFilled => 3,
            OrderStatus::Filled => 4,
            OrderStatus::Cancelled => 5,
            OrderStatus::Replaced => 6,
            OrderStatus::Rejected => 7,
            OrderStatus::Expired => 8,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(OrderStatus::PendingSubmission),
            1 => Some(OrderStatus::Submitted),
            2 => Some(OrderStatus::Accepted),
            3 => Some(OrderStatus::PartiallyFilled),
            4 => Some(OrderStatus::Filled),
            5 => Some(OrderStatus::Cancelled),
            6 => Some(OrderStatus::Replaced),
            7 => Some(OrderStatus::Rejected),
            8 => Some(OrderStatus::Expired),
            _ => None,
        }
    }

    /// `true` if no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
                | OrderStatus::Replaced
        )
    }

    /// "Open" orders are the ones a fill or a kill-switch sweep can still touch.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            OrderStatus::PendingSubmission
                | OrderStatus::Submitted
                | OrderStatus::Accepted
                | OrderStatus::PartiallyFilled
        )
    }

    /// Whether moving from `self` to `next` follows the lifecycle DAG.
    ///
    /// `PartiallyFilled -> PartiallyFilled` is legal (repeated partial
    /// reports); every other self-transition is not a transition at all and
    /// is handled idempotently by the store layer.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            PendingSubmission => matches!(next, Submitted | Rejected),
            Submitted => matches!(
                next,
                Accepted | PartiallyFilled | Filled | Cancelled | Replaced | Rejected | Expired
            ),
            Accepted => matches!(
                next,
                PartiallyFilled | Filled | Cancelled | Replaced | Rejected | Expired
            ),
            PartiallyFilled => matches!(
                next,
                PartiallyFilled | Filled | Cancelled | Replaced | Expired
            ),
            Filled | Cancelled | Replaced | Rejected | Expired => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::PendingSubmission => "PENDING_SUBMISSION",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Replaced => "REPLACED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Order / StoredOrder
// ---------------------------------------------------------------------------

/// A single order as built from a strategy signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Engine-assigned identifier, unique for the order's whole life.
    pub local_id: String,
    /// Broker-assigned identifier; `None` until the gateway accepts.
    pub broker_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub account_id: String,
    pub strategy_id: String,
    pub created_at: DateTime<Utc>,
    /// Opaque key/value pairs copied from the originating signal.
    pub metadata: BTreeMap<String, String>,
}

/// Durable view of an order: the order itself plus its lifecycle state and
/// cumulative fill accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOrder {
    pub order: Order,
    pub status: OrderStatus,
    /// Cumulative filled quantity; monotonically non-decreasing.
    pub filled_quantity: f64,
    /// Weighted average price across all fills, as reported by the broker.
    pub avg_fill_price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredOrder {
    /// Wrap a freshly-built order before its first persistence.
    pub fn pending(order: Order) -> Self {
        let created_at = order.created_at;
        Self {
            order,
            status: OrderStatus::PendingSubmission,
            filled_quantity: 0.0,
            avg_fill_price: 0.0,
            created_at,
            updated_at: None,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.order.local_id
    }

    pub fn broker_id(&self) -> Option<&str> {
        self.order.broker_id.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Position / ExecutionReport
// ---------------------------------------------------------------------------

/// Per-symbol position: signed quantity (+long / -short) and average cost.
///
/// Invariant: `quantity == 0.0` implies `avg_price == 0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_price: f64,
}

/// Broker-originated fill notification. `filled_quantity` and
/// `avg_fill_price` are cumulative for the order, not per-fill deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub broker_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub filled_quantity: f64,
    pub avg_fill_price: f64,
    pub fill_time: DateTime<Utc>,
}
