//! exd-schemas
//!
//! Shared domain vocabulary for the execution engine: orders, signals,
//! journal events, the error taxonomy, and local-id generation. Every other
//! crate in the workspace speaks these types; none of them carry any I/O.

mod error;
mod events;
mod ids;
mod order;
mod signals;

pub use error::{EngineError, EngineResult, ErrorKind};
pub use events::Event;
pub use ids::{iso_millis, parse_iso_millis, OrderIdGenerator};
pub use order::{
    ExecutionReport, Order, OrderStatus, OrderType, Position, Side, StoredOrder, TimeInForce,
};
pub use signals::{CancelSignal, KillSwitchRequest, ReplaceSignal, StrategySignal};
