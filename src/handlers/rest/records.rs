use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    response::{IntoResponse, Json, Response},
};
use serde_json::{Map, Value};

use crate::api::format::TypedRecords;
use crate::database::parse_request;
use crate::middleware::{ApiResponse, ApiResult};
use crate::permission::Identity;
use crate::state::AppState;

/// POST /rest/:group - Create records of one or more types
pub async fn create(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<TypedRecords> {
    let Json(body) = payload?;
    let batch = parse_request(body)?;
    let records = state.store.create(&identity, &group, &batch).await?;
    Ok(ApiResponse::created(records))
}

/// PUT /rest/:group - Update records, creating any whose key is unknown
pub async fn update(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<TypedRecords> {
    let Json(body) = payload?;
    let batch = parse_request(body)?;
    let records = state.store.update(&identity, &group, &batch).await?;
    Ok(ApiResponse::success(records))
}

/// DELETE /rest/:group - Delete records by key; responds with `{}`
pub async fn delete(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, crate::error::ApiError> {
    let Json(body) = payload?;
    let batch = parse_request(body)?;
    state.store.delete(&identity, &group, &batch).await?;
    Ok(Json(Map::new()).into_response())
}
