//! API route handlers.
//!
//! The handlers only move data between JSON and the engine; every decision
//! about accepting a trade lives in `engine`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info_span, warn, Instrument};

use crate::engine::{RetrievalStrategy, TradeStore};
use crate::types::{Trade, TradeStoreError, TradeUpdateRequest};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ApiState {
    pub store: TradeStore,
    /// Strategy used by `POST /trades`.
    pub strategy: RetrievalStrategy,
}

impl ApiState {
    pub fn new(store: TradeStore, strategy: RetrievalStrategy) -> Self {
        Self { store, strategy }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

/// Body returned for every failed request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub error_message: String,
    pub error_code: u16,
    pub timestamp: String,
}

impl ErrorInfo {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            error_code: status.as_u16(),
            timestamp: chrono::Local::now().naive_local().to_string(),
        }
    }
}

const GENERIC_FAILURE: &str = "The trade store could not process the request. Please try again later.";

impl IntoResponse for TradeStoreError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            TradeStoreError::InvalidMaturityDate { .. } => (
                StatusCode::BAD_REQUEST,
                "Trade rejected: maturity date is earlier than today.".to_string(),
            ),
            TradeStoreError::StaleVersion { latest, .. } => (
                StatusCode::BAD_REQUEST,
                format!("Trade rejected: a higher version (v{latest}) is already stored."),
            ),
            TradeStoreError::Repository(e) => {
                error!(error = %format!("{e:#}"), "Trade store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
            }
        };
        (status, Json(ErrorInfo::new(status, message))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// Unreadable or incomplete JSON bodies, reported as `ErrorInfo`.
fn reject_payload(rejection: JsonRejection) -> Response {
    let status = StatusCode::BAD_REQUEST;
    warn!(error = %rejection.body_text(), "Rejected unreadable trade payload");
    let message = format!("Trade rejected: {}", rejection.body_text());
    (status, Json(ErrorInfo::new(status, message))).into_response()
}

/// POST /api/v1/store/trades
pub async fn submit_trade(
    State(state): State<AppState>,
    payload: Result<Json<TradeUpdateRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return reject_payload(rejection),
    };

    let span = info_span!(
        "submit_trade",
        request_id = %uuid::Uuid::new_v4(),
        trade_id = %request.trade_id,
        version = request.version,
        strategy = %state.strategy,
    );
    match state
        .store
        .submit_with(state.strategy, request)
        .instrument(span)
        .await
    {
        Ok(trade) => Json(trade).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/v1/store/trades/:trade_id
pub async fn get_trade_versions(
    State(state): State<AppState>,
    Path(trade_id): Path<String>,
) -> Result<Json<Vec<Trade>>, TradeStoreError> {
    let trades = state.store.versions_of(&trade_id).await?;
    Ok(Json(trades))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
