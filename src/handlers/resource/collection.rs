use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    Json,
};
use serde_json::{Map, Value};

use crate::database::repository::Paginated;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::tenancy::TenantContext;

use super::{repository, ListQuery};

/// GET /api/:resource - paginated listing with orderBy/filters
pub async fn index(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): Query<ListQuery>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Paginated> {
    let repo = repository(&state, &resource)?;
    let plan = query.plan(&state);

    let mut target = tenant.store().await;
    let page = repo.find_all(target.connection_mut()?, plan, query.page(&state.settings)).await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/:resource/search/:q - LIKE search over `fields` (default `name`)
pub async fn search(
    State(state): State<AppState>,
    Path((resource, term)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Paginated> {
    let repo = repository(&state, &resource)?;
    let plan = query.plan(&state);
    let fields = query.search_fields();

    let mut target = tenant.store().await;
    let page = repo
        .search(target.connection_mut()?, &term, &fields, plan, query.page(&state.settings))
        .await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/:resource - store a new record
pub async fn store(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Extension(tenant): Extension<TenantContext>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(payload) = payload?;
    let repo = repository(&state, &resource)?;

    let mut target = tenant.store().await;
    let created = repo.create(target.connection_mut()?, payload).await?;
    Ok(ApiResponse::created(created))
}
