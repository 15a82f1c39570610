//! Pre-submission risk gate.

use exd_schemas::{EngineResult, Order};

/// Evaluated between persisting the pending order and the gateway submit.
/// A refusal rejects the order before it ever reaches the broker.
pub trait RiskCheck: Send + Sync {
    fn evaluate(&self, order: &Order) -> EngineResult<()>;
}

/// Default risk policy: everything passes. Real deployments inject their
/// own implementation at engine wiring time.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl RiskCheck for AllowAll {
    fn evaluate(&self, _order: &Order) -> EngineResult<()> {
        Ok(())
    }
}
