//! # Probe Data Ingestion Handler
//!
//! Accepts raw XML batch documents posted by site controllers.

use axum::{
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::StatusCode,
    response::Json,
};

use crate::error::ApiError;
use crate::ingest::BatchResult;
use crate::server::AppState;

/// Submit a batch of probe readings for one site
///
/// Returns 200 with per-entry outcomes whenever the document itself is
/// acceptable, even if some or all entries failed.
#[utoipa::path(
    post,
    path = "/api/probe/data",
    request_body(content = String, content_type = "application/xml", description = "Site batch document"),
    responses(
        (status = 200, description = "Batch processed; see per-entry results", body = BatchResult, headers(
            ("X-Trace-Id", description = "Trace identifier for request correlation")
        )),
        (status = 400, description = "Document is malformed or has invalid site identifiers", body = ApiError),
        (status = 413, description = "Payload exceeds the configured limit", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "ingest"
)]
pub async fn receive_probe_data(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let body = body?;
    if body.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "MALFORMED_DOCUMENT",
            "No data received",
        ));
    }

    // Server shutdown stops the batch before its next entry.
    let cancel = state.shutdown.child_token();
    let result = state.ingestion.ingest(&body, &cancel).await?;
    Ok(Json(result))
}
