use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::database::manager::is_valid_identifier;
use crate::error::ApiError;
use crate::state::{AppState, RequestSettings};
use crate::tenancy::{TenancyError, TenantConnectionFacts, TenantContext, TenantKey};

/// Resolve the caller's tenant, route a fresh data store to it and hand the
/// resulting [`TenantContext`] to the handler.
///
/// The tenant comes from the API key header, or from the `Host` header when
/// hostname resolution is enabled. Nothing reaches the handler unless both
/// resolution and routing succeed.
pub async fn tenancy_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = tenant_key(&state.settings, request.headers())?;
    let facts = state.resolver.resolve(&key).await.map_err(|e| {
        warn!("Rejected tenant {}: {}", key, e);
        e
    })?;
    debug!("Resolved {} to {} tenant", key, facts.mode_name());

    let context = route(&state, facts).await?;
    Ok(forward(&state, context, request, next).await)
}

/// Internal service-to-service hops: trust the forwarded tenant header as the
/// schema name and route in shared mode without a lookup.
pub async fn service_tenancy_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.settings.trust_forwarded_tenant {
        return Err(ApiError::forbidden("Forwarded tenant headers are not accepted"));
    }

    let schema = forwarded_schema(&state.settings, request.headers())?;
    debug!("Routing forwarded tenant {}", schema);

    let context = route(&state, TenantConnectionFacts::shared(schema)).await?;
    Ok(forward(&state, context, request, next).await)
}

/// Tenant key for the request: API key first, then hostname when enabled
pub fn tenant_key(settings: &RequestSettings, headers: &HeaderMap) -> Result<TenantKey, TenancyError> {
    let name = settings.api_key_header.as_str();
    if let Some(value) = headers.get(name) {
        let key = value
            .to_str()
            .map_err(|_| TenancyError::InvalidTenantHeader(format!("{} header is not valid text", name)))?
            .trim();
        if key.is_empty() {
            return Err(TenancyError::InvalidTenantHeader(format!("{} header is empty", name)));
        }
        return Ok(TenantKey::ApiKey(key.to_string()));
    }

    if settings.resolve_by_hostname {
        if let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
            let host = strip_port(host.trim()).to_ascii_lowercase();
            if !host.is_empty() {
                return Ok(TenantKey::Hostname(host));
            }
        }
    }

    warn!("Request without {} header", name);
    Err(TenancyError::InvalidTenantHeader(format!("Missing {} header", name)))
}

fn forwarded_schema(settings: &RequestSettings, headers: &HeaderMap) -> Result<String, TenancyError> {
    let name = settings.tenant_header.as_str();
    let schema = headers
        .get(name)
        .ok_or_else(|| TenancyError::InvalidTenantHeader(format!("Missing {} header", name)))?
        .to_str()
        .map_err(|_| TenancyError::InvalidTenantHeader(format!("{} header is not valid text", name)))?
        .trim();

    if !is_valid_identifier(schema) {
        return Err(TenancyError::InvalidTenantHeader(format!("{} header is not a schema name", name)));
    }
    Ok(schema.to_string())
}

async fn route(state: &AppState, facts: TenantConnectionFacts) -> Result<TenantContext, TenancyError> {
    let mut store = state.stores.open();
    state
        .router
        .apply_route(store.as_mut(), &facts)
        .await
        .map_err(TenancyError::DataStore)?;
    Ok(TenantContext::new(facts, store))
}

async fn forward(state: &AppState, context: TenantContext, mut request: Request, next: Next) -> Response {
    let echo = state.settings.echo_tenant_header.then(|| {
        let facts = context.facts();
        (facts.schema.clone(), facts.mode_name())
    });

    request.extensions_mut().insert(context);
    let mut response = next.run(request).await;

    if let Some((schema, mode)) = echo {
        let headers = response.headers_mut();
        if let Some(schema) = schema.and_then(|s| HeaderValue::from_str(&s).ok()) {
            if let Ok(name) = HeaderName::from_bytes(state.settings.tenant_header.as_bytes()) {
                headers.insert(name, schema);
            }
        }
        headers.insert(HeaderName::from_static("x-tenant-mode"), HeaderValue::from_static(mode));
    }

    response
}

fn strip_port(host: &str) -> &str {
    // bracketed IPv6 literals keep their colons
    if let Some(end) = host.strip_prefix('[').and_then(|rest| rest.find(']')) {
        return &host[..end + 2];
    }
    host.split(':').next().unwrap_or(host)
}
