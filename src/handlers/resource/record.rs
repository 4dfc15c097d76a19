use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde_json::{json, Map, Value};

use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::tenancy::TenantContext;

use super::repository;

/// GET /api/:resource/:id
pub async fn show(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Value> {
    let repo = repository(&state, &resource)?;
    let mut target = tenant.store().await;
    let record = repo.find_one(target.connection_mut()?, &id).await?;
    Ok(ApiResponse::success(record))
}

/// PUT|PATCH /api/:resource/:id - partial update
pub async fn update(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Extension(tenant): Extension<TenantContext>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(payload) = payload?;
    let repo = repository(&state, &resource)?;
    let mut target = tenant.store().await;
    let record = repo.update(target.connection_mut()?, &id, payload).await?;
    Ok(ApiResponse::success(record))
}

/// DELETE /api/:resource/:id - soft delete, following cascade rules
pub async fn destroy(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Value> {
    let repo = repository(&state, &resource)?;
    let mut target = tenant.store().await;
    let affected = repo.delete(target.connection_mut()?, &id, &state.cascades).await?;
    Ok(ApiResponse::success(json!({ "outcome": "success", "affected": affected })))
}

/// POST /api/:resource/:id/restore
pub async fn restore(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Value> {
    let repo = repository(&state, &resource)?;
    let mut target = tenant.store().await;
    let record = repo.restore(target.connection_mut()?, &id).await?;
    Ok(ApiResponse::success(record))
}
