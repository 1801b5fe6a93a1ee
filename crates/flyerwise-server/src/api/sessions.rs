//! Migration wizard endpoints. Each handler maps 1:1 onto a
//! [`flyerwise_wizard::WizardManager`] operation.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use flyerwise_wizard::{
    BulkDecision, BulkOutcome, CompleteOutcome, DecisionRequest, Progress, SessionFilters,
    StartOutcome, SuggestionsOutcome, WizardSession,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_wizard_error, ApiError, ApiResponse, AppState, ResponseMeta};

const IDEMPOTENCY_KEY: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
pub(super) struct SuggestionsQuery {
    pub item_id: Option<Uuid>,
}

fn respond<T: serde::Serialize>(req_id: RequestId, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    })
}

/// `201 Created` for a new session, `200 OK` when an open one is resumed.
pub(super) async fn start_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(list_id): Path<Uuid>,
    filters: Option<Json<SessionFilters>>,
) -> Result<(StatusCode, Json<ApiResponse<StartOutcome>>), ApiError> {
    let filters = filters.map(|Json(f)| f).unwrap_or_default();
    let outcome = state
        .wizard
        .start_for_list(list_id, filters)
        .await
        .map_err(|e| map_wizard_error(req_id.0.clone(), &e))?;

    let status = if outcome.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, respond(req_id, outcome)))
}

pub(super) async fn get_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WizardSession>>, ApiError> {
    let session = state
        .wizard
        .get_session(id)
        .await
        .map_err(|e| map_wizard_error(req_id.0.clone(), &e))?;
    Ok(respond(req_id, session))
}

pub(super) async fn get_suggestions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Query(query): Query<SuggestionsQuery>,
) -> Result<Json<ApiResponse<SuggestionsOutcome>>, ApiError> {
    let outcome = state
        .wizard
        .suggestions(id, query.item_id)
        .await
        .map_err(|e| map_wizard_error(req_id.0.clone(), &e))?;
    Ok(respond(req_id, outcome))
}

pub(super) async fn record_decision(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<ApiResponse<Progress>>, ApiError> {
    let progress = state
        .wizard
        .record_decision(id, request)
        .await
        .map_err(|e| map_wizard_error(req_id.0.clone(), &e))?;
    Ok(respond(req_id, progress))
}

pub(super) async fn apply_bulk(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(request): Json<BulkDecision>,
) -> Result<Json<ApiResponse<BulkOutcome>>, ApiError> {
    let outcome = state
        .wizard
        .apply_bulk(id, request)
        .await
        .map_err(|e| map_wizard_error(req_id.0.clone(), &e))?;
    Ok(respond(req_id, outcome))
}

/// `StaleData` is a normal `200` outcome; the client re-decides the listed
/// items and calls again.
pub(super) async fn complete_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<CompleteOutcome>>, ApiError> {
    let key = headers
        .get(IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let outcome = state
        .wizard
        .complete(id, key)
        .await
        .map_err(|e| map_wizard_error(req_id.0.clone(), &e))?;
    Ok(respond(req_id, outcome))
}

pub(super) async fn cancel_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WizardSession>>, ApiError> {
    let session = state
        .wizard
        .cancel(id)
        .await
        .map_err(|e| map_wizard_error(req_id.0.clone(), &e))?;
    Ok(respond(req_id, session))
}
