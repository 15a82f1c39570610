//! exd-execution
//!
//! The broker-facing half of the engine: the [`ExecutionGateway`] trait
//! every broker adapter implements, the bidirectional [`OrderIdMap`], the
//! [`RiskCheck`] extension point, and the [`OrderManager`] that drives one
//! strategy's orders from signal to terminal state.

mod gateway;
mod id_map;
mod manager;
mod risk;

pub use gateway::ExecutionGateway;
pub use id_map::OrderIdMap;
pub use manager::{OrderManager, OrderManagerConfig};
pub use risk::{AllowAll, RiskCheck};
