use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use clipcast_auth_types::cron::CronAuth;

use crate::error::SchedulerError;
use crate::state::AppState;
use crate::usecase::dispatch::{BatchReport, DispatchBatchInput};

// ── GET|POST /cron/dispatch ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DispatchQuery {
    pub limit: Option<u64>,
}

#[derive(Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: BatchReport,
}

/// Run one dispatcher batch.
///
/// The batch runs in its own task. If the client disconnects, the request
/// future is dropped, which cancels the token: deliveries already in flight
/// finish and are recorded, nothing new is started.
pub async fn run_dispatch(
    _auth: CronAuth,
    State(state): State<AppState>,
    Query(query): Query<DispatchQuery>,
) -> Result<Json<DispatchResponse>, SchedulerError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let usecase = state.dispatch_usecase();
    let input = DispatchBatchInput {
        now: Utc::now(),
        limit: query.limit,
    };
    let report = tokio::spawn(async move { usecase.execute(input, &cancel).await })
        .await
        .map_err(|e| SchedulerError::Internal(e.into()))??;

    Ok(Json(DispatchResponse {
        success: true,
        report,
    }))
}
