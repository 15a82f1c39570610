//! JSON request/response bodies for the daemon's HTTP surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use exd_schemas::Position;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    /// Stable per-binary session label (no RNG; derived from build metadata).
    pub run_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitSignalResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelOrderResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplaceOrderResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionListResponse {
    pub positions: Vec<Position>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KillSwitchResponse {
    pub accepted: bool,
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_kind: String,
    pub rejection_reason: String,
}
