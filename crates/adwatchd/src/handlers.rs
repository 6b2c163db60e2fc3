//! Route handlers
//!
//! Engine calls touch SQLite, so they run on the blocking pool.

use adwatch_api::{
    Ad, ClaimedCompletionRequest, CompleteWatchResponse, EarningsView, HealthStatus,
    StartWatchResponse,
};
use adwatch_core::CoreResult;
use adwatch_util::AdId;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::{Actor, ApiError, ApiResult, AppState};

async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn parse_ad_id(raw: &str) -> ApiResult<AdId> {
    raw.parse::<i64>()
        .map(AdId::new)
        .map_err(|_| ApiError::InvalidRequest(format!("Invalid ad id '{}'", raw)))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let mode = state.primary.mode();
    let healthy = tokio::task::spawn_blocking(move || state.primary.is_healthy())
        .await
        .unwrap_or(false);

    Json(HealthStatus::new(healthy, mode.as_str()))
}

pub async fn list_user_ads(
    State(state): State<Arc<AppState>>,
    Actor(viewer): Actor,
) -> ApiResult<Json<Vec<Ad>>> {
    let ads = blocking(move || state.primary.list_watchable(&viewer.user_id, state.now())).await?;
    Ok(Json(ads))
}

pub async fn start_view(
    State(state): State<Arc<AppState>>,
    Actor(viewer): Actor,
    Path(ad_id): Path<String>,
) -> ApiResult<Json<StartWatchResponse>> {
    let ad_id = parse_ad_id(&ad_id)?;
    let started = blocking(move || state.primary.start(&viewer, ad_id, state.now())).await?;
    Ok(Json(started))
}

pub async fn complete_view(
    State(state): State<Arc<AppState>>,
    Actor(viewer): Actor,
    Path(ad_id): Path<String>,
) -> ApiResult<Json<CompleteWatchResponse>> {
    let ad_id = parse_ad_id(&ad_id)?;
    let done =
        blocking(move || state.primary.complete(&viewer, ad_id, None, state.now())).await?;
    Ok(Json(done))
}

pub async fn third_party_start(
    State(state): State<Arc<AppState>>,
    Actor(viewer): Actor,
    Path(ad_id): Path<String>,
) -> ApiResult<Json<StartWatchResponse>> {
    let ad_id = parse_ad_id(&ad_id)?;
    let started = blocking(move || state.claimed.start(&viewer, ad_id, state.now())).await?;
    Ok(Json(started))
}

pub async fn third_party_complete(
    State(state): State<Arc<AppState>>,
    Actor(viewer): Actor,
    Path(ad_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<CompleteWatchResponse>> {
    let ad_id = parse_ad_id(&ad_id)?;

    // An empty body is reported as missing fields by the engine
    let claim: ClaimedCompletionRequest = if body.is_empty() {
        ClaimedCompletionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid JSON body: {}", e)))?
    };

    let done = blocking(move || {
        state
            .claimed
            .complete(&viewer, ad_id, Some(&claim), state.now())
    })
    .await?;
    Ok(Json(done))
}

pub async fn third_party_ads(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Ad>>> {
    let ads = blocking(move || state.claimed.third_party_catalog()).await?;
    Ok(Json(ads))
}

pub async fn earnings(
    State(state): State<Arc<AppState>>,
    Actor(viewer): Actor,
) -> ApiResult<Json<EarningsView>> {
    let view = blocking(move || state.primary.earnings(&viewer.user_id)).await?;
    Ok(Json(view))
}
