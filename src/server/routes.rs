//! HTTP route handlers.
//!
//! The allocation endpoint streams newline-delimited progress; the others
//! return JSON. State is shared via `Arc<ServerState>`.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::engine::pipeline::AllocationPipeline;
use crate::engine::progress::ProgressChannel;
use crate::types::WalletInfo;
use crate::wallet::{self, WalletProvider};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ServerState {
    pub pipeline: Arc<AllocationPipeline>,
    pub wallet: Arc<dyn WalletProvider>,
    /// Progress lines buffered per request.
    pub stream_capacity: usize,
}

pub type AppState = Arc<ServerState>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /api/allocator`: run the pipeline in the background and stream its
/// progress back.
///
/// The status is always 200; failure is signalled in-band by an `Error:`
/// line and the absence of a terminal result.
pub async fn allocate(State(state): State<AppState>, body: Bytes) -> Response {
    let (progress, stream) = ProgressChannel::new(state.stream_capacity);
    let pipeline = Arc::clone(&state.pipeline);

    info!(bytes = body.len(), "Allocation request received");
    tokio::spawn(async move {
        pipeline.run(&body, progress).await;
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream.into_stream()),
    )
        .into_response()
}

/// `GET /api/wallet/info`
pub async fn get_wallet_info(
    State(state): State<AppState>,
) -> Result<Json<WalletInfo>, (StatusCode, Json<serde_json::Value>)> {
    let address = state.pipeline.wallet_address();
    match wallet::wallet_info(state.wallet.as_ref(), address).await {
        Ok(info) => Ok(Json(info)),
        Err(e) => {
            error!(error = format!("{e:#}"), "Wallet info lookup failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to get wallet information" })),
            ))
        }
    }
}

/// `GET /health`
pub async fn health() -> StatusCode {
    StatusCode::OK
}
