use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::handlers::{resource, system};
use crate::middleware::{service_tenancy_middleware, tenancy_middleware};
use crate::state::AppState;

/// Full application router. Tenant-scoped routes sit behind the tenancy
/// middleware; `/` and `/health` stay public.
pub fn app(state: AppState) -> Router {
    let tenant_routes = if state.settings.trust_forwarded_tenant {
        resource_routes().route_layer(middleware::from_fn_with_state(state.clone(), service_tenancy_middleware))
    } else {
        resource_routes().route_layer(middleware::from_fn_with_state(state.clone(), tenancy_middleware))
    };

    Router::new()
        // Public
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .merge(tenant_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

fn resource_routes() -> Router<AppState> {
    Router::new()
        // Collection
        .route("/api/:resource", get(resource::index).post(resource::store))
        .route("/api/:resource/search/:q", get(resource::search))
        // Record
        .route(
            "/api/:resource/:id",
            get(resource::show)
                .put(resource::update)
                .patch(resource::update)
                .delete(resource::destroy),
        )
        .route("/api/:resource/:id/restore", post(resource::restore))
}
