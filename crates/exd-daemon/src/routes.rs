//! Axum router and all HTTP handlers.
//!
//! `build_router` is the single entry point; `main.rs` calls it and
//! attaches middleware layers afterwards so tests can use the bare router.
//!
//! Error mapping follows the engine's taxonomy: `Validation` → 400,
//! `State` → 409, `Gateway` and `Persistence` → 500. The engine's message
//! is forwarded verbatim as `rejection_reason`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use exd_schemas::{
    CancelSignal, EngineError, ErrorKind, KillSwitchRequest, ReplaceSignal, StrategySignal,
};

use crate::api_types::{
    CancelOrderResponse, ErrorResponse, HealthResponse, KillSwitchResponse, PositionListResponse,
    ReplaceOrderResponse, SubmitSignalResponse,
};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/signals", post(submit_signal))
        .route("/v1/orders/cancel", post(cancel_order))
        .route("/v1/orders/replace", post(replace_order))
        .route("/v1/positions", get(all_positions))
        .route("/v1/positions/:symbol", get(position))
        .route("/v1/kill-switch", post(kill_switch))
        .with_state(state)
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::State => StatusCode::CONFLICT,
        ErrorKind::Gateway | ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &EngineError) -> Response {
    (
        status_for(err.kind),
        Json(ErrorResponse {
            error_kind: err.kind.as_str().to_string(),
            rejection_reason: err.message.clone(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: st.engine.is_running(),
            service: st.build.service,
            version: st.build.version,
            run_id: st.run_id,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/signals
// ---------------------------------------------------------------------------

pub(crate) async fn submit_signal(
    State(st): State<Arc<AppState>>,
    Json(signal): Json<StrategySignal>,
) -> Response {
    info!(
        strategy = %signal.strategy_id,
        symbol = %signal.symbol,
        side = %signal.side,
        qty = signal.target_quantity,
        "signal received"
    );

    match st.engine.submit_signal(&signal).await {
        Ok(order_id) => (
            StatusCode::OK,
            Json(SubmitSignalResponse {
                accepted: true,
                order_id: Some(order_id),
                rejection_reason: None,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/orders/cancel
// ---------------------------------------------------------------------------

pub(crate) async fn cancel_order(
    State(st): State<Arc<AppState>>,
    Json(signal): Json<CancelSignal>,
) -> Response {
    info!(strategy = %signal.strategy_id, order_id = %signal.order_id, "cancel received");

    match st.engine.cancel_order(&signal).await {
        Ok(()) => (
            StatusCode::OK,
            Json(CancelOrderResponse {
                accepted: true,
                rejection_reason: None,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/orders/replace
// ---------------------------------------------------------------------------

pub(crate) async fn replace_order(
    State(st): State<Arc<AppState>>,
    Json(signal): Json<ReplaceSignal>,
) -> Response {
    info!(strategy = %signal.strategy_id, order_id = %signal.order_id, "replace received");

    match st.engine.replace_order(&signal).await {
        Ok(order_id) => (
            StatusCode::OK,
            Json(ReplaceOrderResponse {
                accepted: true,
                order_id: Some(order_id),
                rejection_reason: None,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/positions, GET /v1/positions/:symbol
// ---------------------------------------------------------------------------

pub(crate) async fn all_positions(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(PositionListResponse {
            positions: st.engine.get_all_positions(),
        }),
    )
}

pub(crate) async fn position(
    State(st): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Response {
    match st.engine.get_position(&symbol) {
        Ok(pos) => (StatusCode::OK, Json(pos)).into_response(),
        Err(err) => error_response(&err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/kill-switch
// ---------------------------------------------------------------------------

pub(crate) async fn kill_switch(
    State(st): State<Arc<AppState>>,
    Json(request): Json<KillSwitchRequest>,
) -> Response {
    info!(reason = %request.reason, initiated_by = %request.initiated_by, "kill switch requested");

    match st.engine.activate_kill_switch(&request).await {
        Ok(()) => (StatusCode::OK, Json(KillSwitchResponse { accepted: true })).into_response(),
        Err(err) => error_response(&err),
    }
}
