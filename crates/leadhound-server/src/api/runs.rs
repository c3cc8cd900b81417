use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use leadhound_core::RunStatus;
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct RunItem {
    run_id: Uuid,
    status: String,
    platform: String,
    lead_tier: Option<String>,
    time_window: Option<String>,
    target_count: i32,
    lead_count: i32,
    warning_count: usize,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(super) struct LeadItem {
    id: i64,
    source: String,
    external_id: String,
    title: String,
    content: String,
    author: String,
    url: String,
    community: Option<String>,
    score: i64,
    num_comments: i64,
    published_at: Option<DateTime<Utc>>,
    intent: Option<String>,
    relevance: Option<i16>,
    relevance_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct TriggerResult {
    run_id: Uuid,
    status: String,
    /// `false` when the run was already executing on this server.
    dispatched: bool,
}

fn parse_run_id(request_id: &str, raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::new(
            request_id,
            "bad_request",
            format!("run id {raw:?} is not a UUID"),
        )
    })
}

pub(super) async fn get_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<String>,
) -> Result<Json<ApiResponse<RunItem>>, ApiError> {
    let public_id = parse_run_id(&req_id.0, &run_id)?;
    let row = leadhound_db::get_run(&state.pool, public_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = RunItem {
        run_id: row.public_id,
        warning_count: row.warnings.as_array().map_or(0, Vec::len),
        status: row.status,
        platform: row.platform,
        lead_tier: row.lead_tier,
        time_window: row.time_window,
        target_count: row.target_count,
        lead_count: row.lead_count,
        error_message: row.error_message,
        created_at: row.created_at,
        started_at: row.started_at,
        completed_at: row.completed_at,
    };

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_run_leads(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<LeadItem>>>, ApiError> {
    let public_id = parse_run_id(&req_id.0, &run_id)?;
    let run = leadhound_db::get_run(&state.pool, public_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let rows = leadhound_db::list_leads(&state.pool, run.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| LeadItem {
            id: row.id,
            source: row.source,
            external_id: row.external_id,
            title: row.title,
            content: row.content,
            author: row.author,
            url: row.url,
            community: row.community,
            score: row.score,
            num_comments: row.num_comments,
            published_at: row.published_at,
            intent: row.intent,
            relevance: row.relevance,
            relevance_reason: row.relevance_reason,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Inbound trigger event: hands a runnable run to the dispatcher.
pub(super) async fn trigger_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<TriggerResult>>), ApiError> {
    let public_id = parse_run_id(&req_id.0, &run_id)?;
    let row = leadhound_db::get_run(&state.pool, public_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let status: RunStatus = row.status.parse().map_err(|e| {
        tracing::error!(run_id = %public_id, error = %e, "stored run has an unknown status");
        ApiError::new(req_id.0.clone(), "internal_error", "run has an unknown status")
    })?;
    if !status.is_runnable() {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            format!("run is {status} and cannot be executed yet"),
        ));
    }

    let dispatched = state.dispatcher.dispatch(public_id);
    tracing::info!(run_id = %public_id, %status, dispatched, "run trigger received");

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: TriggerResult {
                run_id: public_id,
                status: status.as_str().to_owned(),
                dispatched,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}
