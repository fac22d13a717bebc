//! # Error Handling
//!
//! Unified error handling for the probe ingestion API: a problem+json
//! response type with trace ID propagation, plus the repository error shared
//! by the hierarchy resolver and the measurement store.

use axum::{
    extract::rejection::{BytesRejection, QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::ingest::IngestError;
use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active request scope (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

pub(crate) fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    match db_error.code() {
        Some(code) => {
            let code_str: &str = code.as_ref();
            code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str)
        }
        None => false,
    }
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Payload exceeds the configured limit")]
    PayloadTooLarge,
    #[error("Database error occurred")]
    InternalServerError,
    #[error("Database service unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code string for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Errors raised by the hierarchy resolver, the measurement store and the
/// hierarchy queries.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("site '{site_id}' belongs to a different customer than '{claimed_customer_id}'")]
    SiteConflict {
        site_id: String,
        claimed_customer_id: String,
    },
    #[error("probe '{address}' is bound to a different site than '{claimed_site_id}'")]
    ProbeConflict {
        address: String,
        claimed_site_id: String,
    },
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },
    #[error("store call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// True for parent/child binding conflicts in the hierarchy.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::SiteConflict { .. } | Self::ProbeConflict { .. })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            &error_type.to_string(),
        )
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ErrorType::PayloadTooLarge.into();
        }

        Self::new(
            StatusCode::BAD_REQUEST,
            "MALFORMED_DOCUMENT",
            &format!("Failed to read request body: {}", rejection.body_text()),
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        let message = match rejection {
            QueryRejection::FailedToDeserializeQueryString(err) => {
                format!("Invalid query string: {}", err.body_text())
            }
            _ => "Invalid query string".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::from(ErrorType::ServiceUnavailable).with_retry_after(5)
            }
            sea_orm::DbErr::ConnectionAcquire(acquire_err) => {
                tracing::error!("Database pool exhausted: {:?}", acquire_err);
                Self::from(ErrorType::ServiceUnavailable).with_retry_after(5)
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                ErrorType::InternalServerError.into()
            }
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { entity, key } => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("{} '{}' not found", entity, key),
            )
            .with_details(serde_json::json!({ "entity": entity, "key": key })),
            conflict @ (RepositoryError::SiteConflict { .. }
            | RepositoryError::ProbeConflict { .. }) => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", &conflict.to_string())
            }
            RepositoryError::Timeout { timeout_ms } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_TIMEOUT",
                &format!("Store call timed out after {}ms", timeout_ms),
            )
            .with_retry_after(5),
            RepositoryError::Database(db_err) => db_err.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        let (code, message) = match &error {
            IngestError::Decode(_) => ("MALFORMED_DOCUMENT", "Failed to parse XML data"),
            IngestError::Document(_) => ("INVALID_SITE_IDENTIFIER", "Invalid site identifiers"),
        };

        tracing::warn!(error = %error, code, "Rejected batch document");

        Self::new(StatusCode::BAD_REQUEST, code, message)
            .with_details(serde_json::json!({ "error": error.to_string() }))
    }
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{DecodeError, DocumentError};
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
    }

    #[test]
    fn test_error_type_mapping() {
        let too_large: ApiError = ErrorType::PayloadTooLarge.into();
        assert_eq!(too_large.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(too_large.code, Box::from("PAYLOAD_TOO_LARGE"));

        let unavailable: ApiError = sea_orm::DbErr::Conn(sea_orm::RuntimeErr::Internal(
            "refused".to_string(),
        ))
        .into();
        assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.message, Box::from("Database service unavailable"));
        assert_eq!(unavailable.retry_after, Some(5));

        let internal: ApiError = sea_orm::DbErr::Custom("boom".to_string()).into();
        assert_eq!(internal.code, Box::from("INTERNAL_SERVER_ERROR"));
    }

    #[test]
    fn test_content_type_header() {
        let response =
            ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Test error").into_response();

        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_retry_after_header() {
        let response = ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database service unavailable",
        )
        .with_retry_after(5)
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("retry-after").unwrap(), "5");
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );

        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }

    #[test]
    fn test_repository_not_found_maps_to_404() {
        let api_error: ApiError = RepositoryError::not_found("site", "S404").into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert!(api_error.message.contains("S404"));
        let details = api_error.details.unwrap();
        assert_eq!(details["entity"], "site");
    }

    #[test]
    fn test_repository_conflict_maps_to_409() {
        let error = RepositoryError::ProbeConflict {
            address: "068745".to_string(),
            claimed_site_id: "S2".to_string(),
        };
        assert!(error.is_conflict());

        let api_error: ApiError = error.into();
        assert_eq!(api_error.status, StatusCode::CONFLICT);
        assert!(api_error.message.contains("068745"));
    }

    #[test]
    fn test_repository_timeout_is_retryable() {
        let api_error: ApiError = RepositoryError::Timeout { timeout_ms: 250 }.into();

        assert_eq!(api_error.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api_error.code, Box::from("STORE_TIMEOUT"));
        assert_eq!(api_error.retry_after, Some(5));
    }

    #[test]
    fn test_database_error_mapping() {
        let api_error: ApiError = sea_orm::DbErr::RecordNotFound("probe".to_string()).into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert!(api_error.message.contains("probe"));
    }

    #[test]
    fn test_document_fatal_errors_map_to_400() {
        let decode: ApiError = IngestError::Decode(DecodeError::MissingSite).into();
        assert_eq!(decode.status, StatusCode::BAD_REQUEST);
        assert_eq!(decode.code, Box::from("MALFORMED_DOCUMENT"));

        let document: ApiError = IngestError::Document(DocumentError::InvalidSiteId {
            value: "S 1".to_string(),
            reason: "contains unsupported characters",
        })
        .into();
        assert_eq!(document.code, Box::from("INVALID_SITE_IDENTIFIER"));
        assert!(document.details.is_some());
    }

    #[test]
    fn test_validation_error_with_details() {
        let field_errors = json!({ "page": "must be at least 1" });
        let error = validation_error("Validation failed", field_errors.clone());

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.details, Some(Box::new(field_errors)));
    }
}
