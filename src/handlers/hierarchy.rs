//! # Hierarchy Query Handlers
//!
//! Read-side endpoints for customers, sites, probes and measurement history.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State, rejection::QueryRejection},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, RepositoryError, validation_error};
use crate::ingest::FieldValue;
use crate::models::{customer, measurement, probe, probe_latest_reading, site};
use crate::repositories::TimeRange;
use crate::server::AppState;
use crate::status::{AlarmState, Connectivity, connectivity};

const DEFAULT_PER_PAGE: u64 = 200;
const MAX_PER_PAGE: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerDto {
    #[schema(example = "C1")]
    pub customer_id: String,
    #[schema(example = "Customer C1")]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomersResponse {
    pub customers: Vec<CustomerDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SiteDto {
    #[schema(example = "S1")]
    pub site_id: String,
    #[schema(example = "Site S1")]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SitesResponse {
    pub customer_id: String,
    pub sites: Vec<SiteDto>,
}

/// Latest projected reading of a probe
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LatestReadingDto {
    pub measurement_id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub primary_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProbeStatusDto {
    #[schema(example = "068745")]
    pub address: String,
    pub alarm_state: AlarmState,
    pub connectivity: Connectivity,
    pub latest: Option<LatestReadingDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProbesResponse {
    pub site_id: String,
    pub customer_id: String,
    pub probes: Vec<ProbeStatusDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MeasurementDto {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MeasurementsResponse {
    pub probe: String,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub measurements: Vec<MeasurementDto>,
}

/// Query parameters for measurement history
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Inclusive lower bound (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339)
    pub to: Option<DateTime<Utc>>,
    /// 1-based page number (default 1)
    pub page: Option<u64>,
    /// Page size (default 200, max 1000)
    pub per_page: Option<u64>,
}

impl From<customer::Model> for CustomerDto {
    fn from(model: customer::Model) -> Self {
        Self {
            customer_id: model.external_id,
            name: model.name,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<site::Model> for SiteDto {
    fn from(model: site::Model) -> Self {
        Self {
            site_id: model.external_id,
            name: model.name,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<measurement::Model> for MeasurementDto {
    fn from(model: measurement::Model) -> Self {
        Self {
            id: model.id,
            timestamp: model.timestamp.with_timezone(&Utc),
            received_at: model.received_at.with_timezone(&Utc),
            fields: serde_json::from_value(model.fields).unwrap_or_default(),
        }
    }
}

fn probe_status(
    probe: probe::Model,
    latest: Option<probe_latest_reading::Model>,
    now: DateTime<Utc>,
    stale_after: std::time::Duration,
) -> ProbeStatusDto {
    let last_seen = latest.as_ref().map(|l| l.timestamp.with_timezone(&Utc));
    ProbeStatusDto {
        address: probe.address,
        alarm_state: latest
            .as_ref()
            .map_or(AlarmState::Unknown, |l| AlarmState::parse(&l.alarm_state)),
        connectivity: connectivity(last_seen, now, stale_after),
        latest: latest.map(|l| LatestReadingDto {
            measurement_id: l.measurement_id,
            timestamp: l.timestamp.with_timezone(&Utc),
            primary_value: l.primary_value,
        }),
    }
}

/// List all known customers
#[utoipa::path(
    get,
    path = "/api/v1/customers",
    responses(
        (status = 200, description = "Customers ordered by id", body = CustomersResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "hierarchy"
)]
pub async fn list_customers(
    State(state): State<AppState>,
) -> Result<Json<CustomersResponse>, ApiError> {
    let customers = state.ingestion.hierarchy().list_customers().await?;
    Ok(Json(CustomersResponse {
        customers: customers.into_iter().map(CustomerDto::from).collect(),
    }))
}

/// List the sites of a customer
#[utoipa::path(
    get,
    path = "/api/v1/customers/{customer_id}/sites",
    params(("customer_id" = String, Path, description = "External customer id")),
    responses(
        (status = 200, description = "Sites ordered by id", body = SitesResponse),
        (status = 404, description = "Unknown customer", body = ApiError)
    ),
    tag = "hierarchy"
)]
pub async fn list_sites(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<SitesResponse>, ApiError> {
    let (customer, sites) = state.ingestion.hierarchy().list_sites(&customer_id).await?;
    Ok(Json(SitesResponse {
        customer_id: customer.external_id,
        sites: sites.into_iter().map(SiteDto::from).collect(),
    }))
}

/// List the probes of a site with their latest reading and status
#[utoipa::path(
    get,
    path = "/api/v1/sites/{site_id}/probes",
    params(("site_id" = String, Path, description = "External site id")),
    responses(
        (status = 200, description = "Probes ordered by address", body = ProbesResponse),
        (status = 404, description = "Unknown site", body = ApiError)
    ),
    tag = "hierarchy"
)]
pub async fn list_probes(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<ProbesResponse>, ApiError> {
    let (customer, site, probes) = state
        .ingestion
        .hierarchy()
        .list_probes_with_latest(&site_id)
        .await?;

    let now = Utc::now();
    let stale_after = state.config.status.stale_after();

    Ok(Json(ProbesResponse {
        site_id: site.external_id,
        customer_id: customer.external_id,
        probes: probes
            .into_iter()
            .map(|(probe, latest)| probe_status(probe, latest, now, stale_after))
            .collect(),
    }))
}

/// Measurement history for one probe, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/probes/{address}/measurements",
    params(
        ("address" = String, Path, description = "Probe address"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "One page of measurements", body = MeasurementsResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 404, description = "Unknown probe", body = ApiError)
    ),
    tag = "hierarchy"
)]
pub async fn list_measurements(
    State(state): State<AppState>,
    Path(address): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<MeasurementsResponse>, ApiError> {
    let Query(query) = query?;

    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
    if page == 0 {
        return Err(validation_error(
            "Invalid pagination",
            serde_json::json!({ "page": "must be at least 1" }),
        ));
    }
    if per_page == 0 || per_page > MAX_PER_PAGE {
        return Err(validation_error(
            "Invalid pagination",
            serde_json::json!({ "per_page": format!("must be between 1 and {MAX_PER_PAGE}") }),
        ));
    }
    if let (Some(from), Some(to)) = (query.from, query.to)
        && from > to
    {
        return Err(validation_error(
            "Invalid time range",
            serde_json::json!({ "from": "must not be after 'to'" }),
        ));
    }

    let probe = state
        .ingestion
        .hierarchy()
        .find_probe(&address)
        .await?
        .ok_or_else(|| RepositoryError::not_found("probe", address.clone()))?;

    let history = state
        .ingestion
        .measurements()
        .list_history(
            probe.id,
            TimeRange {
                from: query.from,
                to: query.to,
            },
            page,
            per_page,
        )
        .await?;

    Ok(Json(MeasurementsResponse {
        probe: probe.address,
        page,
        per_page,
        total: history.total,
        measurements: history.items.into_iter().map(MeasurementDto::from).collect(),
    }))
}
