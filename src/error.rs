// HTTP API Error Types
use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::database::manager::DatabaseError;
use crate::filter::FilterError;
use crate::tenancy::TenancyError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        let message = match &err {
            FilterError::InvalidTableName(_) => "Invalid resource",
            FilterError::InvalidOrderToken(_) => "Invalid syntax for orderBy parameter",
            FilterError::InvalidFilterToken(_) => "Invalid syntax for filter parameter",
            FilterError::InvalidSearchField(_) => "Invalid search fields",
            FilterError::UnknownField(_) => "Unknown field",
        };
        ApiError::validation_error(message, Some(err.field_errors()))
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Filter(filter_err) => filter_err.into(),
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::InvalidIdentifier(name) => {
                let field_errors = HashMap::from([(name, "Invalid field name".to_string())]);
                ApiError::validation_error("Invalid field name", Some(field_errors))
            }
            DatabaseError::InvalidValue(msg) => {
                tracing::debug!("Rejected value: {}", msg);
                ApiError::bad_request("Invalid value for field type")
            }
            DatabaseError::Constraint(msg) => {
                tracing::debug!("Constraint violation: {}", msg);
                ApiError::conflict("Request conflicts with existing data")
            }
            ref connectivity if connectivity.is_connectivity() => {
                tracing::error!("Database unreachable: {}", connectivity);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
            other => {
                tracing::error!("Database error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<TenancyError> for ApiError {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::TenantNotFound(key) => {
                tracing::warn!("Rejected request for unknown tenant {}", key);
                ApiError::forbidden("Tenant not found or inactive")
            }
            TenancyError::InvalidTenantHeader(msg) => ApiError::unauthorized(msg),
            TenancyError::IncompleteTenant(key) => {
                tracing::error!("Tenant {} has no connection target", key);
                ApiError::internal_server_error("Tenant is not configured")
            }
            TenancyError::Lookup(db_err) if db_err.is_connectivity() => {
                tracing::error!("Tenant lookup unavailable: {}", db_err);
                ApiError::service_unavailable("Tenant directory temporarily unavailable")
            }
            TenancyError::Lookup(db_err) => {
                tracing::error!("Tenant lookup failed: {}", db_err);
                ApiError::internal_server_error("Failed to resolve tenant")
            }
            TenancyError::DataStore(db_err) => {
                tracing::error!("Tenant routing failed: {}", db_err);
                ApiError::internal_server_error("Failed to connect to tenant data store")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_json(rejection.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_errors_name_the_token() {
        let err: ApiError = FilterError::InvalidFilterToken("price|>abc".into()).into();
        assert_eq!(err.status_code(), 400);
        let body = err.to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["price|>abc"], "Invalid syntax for filter parameter");
    }

    #[test]
    fn tenancy_errors_map_to_auth_statuses() {
        let err: ApiError = TenancyError::TenantNotFound("api-key abcd…".into()).into();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.error_code(), "FORBIDDEN");

        let err: ApiError = TenancyError::InvalidTenantHeader("Missing X-Api-Key header".into()).into();
        assert_eq!(err.status_code(), 401);

        let err: ApiError = TenancyError::IncompleteTenant("t".into()).into();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn lookup_connectivity_is_service_unavailable() {
        let err: ApiError = TenancyError::Lookup(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut)).into();
        assert_eq!(err.status_code(), 503);

        let err: ApiError = TenancyError::Lookup(DatabaseError::QueryError("boom".into())).into();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn routing_failures_are_server_errors() {
        let err: ApiError = TenancyError::DataStore(DatabaseError::NotConnected).into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_json()["error"], true);
    }

    #[test]
    fn database_errors_map_by_kind() {
        let err: ApiError = DatabaseError::NotFound("products 1 not found".into()).into();
        assert_eq!(err.status_code(), 404);

        let err: ApiError = DatabaseError::Filter(FilterError::UnknownField("colour|red".into())).into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_json()["field_errors"]["colour|red"], "Unknown field");

        let err: ApiError = DatabaseError::Constraint("dup".into()).into();
        assert_eq!(err.status_code(), 409);

        let err: ApiError = DatabaseError::InvalidValue("invalid input syntax for type integer".into()).into();
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }
}
