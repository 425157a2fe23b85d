//! Operator queue tooling: DLQ inspection and replay

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// Replay a dead-lettered grant job onto the primary queue
pub async fn replay_grant(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.access.queue.replay_grant_access(&job_id).await?;
    tracing::info!(job_id = %job_id, "Grant job replayed by operator");
    Ok(Json(json!({ "replayed": job_id })))
}

/// Replay a dead-lettered revoke job onto the primary queue
pub async fn replay_revoke(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.access.queue.replay_revoke_access(&job_id).await?;
    tracing::info!(job_id = %job_id, "Revoke job replayed by operator");
    Ok(Json(json!({ "replayed": job_id })))
}

#[derive(Debug, Deserialize)]
pub struct DeadJobsQuery {
    pub queue: Option<String>,
    pub limit: Option<i64>,
}

/// List dead-lettered jobs for inspection
pub async fn list_dead_jobs(
    State(state): State<AppState>,
    Query(query): Query<DeadJobsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let jobs = state
        .access
        .queue
        .dead_letter_jobs(query.queue.as_deref(), limit)
        .await?;
    Ok(Json(json!({ "jobs": jobs })))
}
