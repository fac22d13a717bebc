//! # Measurement Repository
//!
//! Append-only measurement history plus the per-probe latest-reading
//! projection. An append and its projection update commit together.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{Measurement, ProbeLatestReading, measurement, probe_latest_reading};
use crate::status::ReadingSummary;

/// Effect an append had on the latest-reading projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionUpdate {
    /// The new reading is now the probe's latest.
    Advanced,
    /// A newer reading was already projected and was kept.
    Retained,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMeasurement {
    pub measurement: measurement::Model,
    pub projection: ProjectionUpdate,
}

/// Inclusive time window for history queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One page of a probe's history, oldest first.
#[derive(Debug, Clone)]
pub struct MeasurementPage {
    pub items: Vec<measurement::Model>,
    pub total: u64,
}

/// Repository for measurement history and the latest-reading projection
#[derive(Debug, Clone)]
pub struct MeasurementRepository {
    db: Arc<DatabaseConnection>,
}

impl MeasurementRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record a reading and advance the projection if it is not older than
    /// the one currently projected. Equal timestamps go to the newest arrival.
    pub async fn append(
        &self,
        probe_id: Uuid,
        timestamp: DateTime<Utc>,
        fields: JsonValue,
        summary: ReadingSummary,
    ) -> Result<StoredMeasurement, RepositoryError> {
        let now: DateTimeWithTimeZone = Utc::now().fixed_offset();
        let model = measurement::Model {
            id: Uuid::new_v4(),
            probe_id,
            timestamp: timestamp.fixed_offset(),
            fields,
            received_at: now,
        };

        let txn = self.db.begin().await?;

        Measurement::insert(measurement::ActiveModel {
            id: Set(model.id),
            probe_id: Set(model.probe_id),
            timestamp: Set(model.timestamp),
            fields: Set(model.fields.clone()),
            received_at: Set(model.received_at),
        })
        .exec_without_returning(&txn)
        .await?;

        let projection = advance_projection(&txn, &model, summary, now).await?;

        txn.commit().await?;

        Ok(StoredMeasurement {
            measurement: model,
            projection,
        })
    }

    /// History for a probe ordered by timestamp ascending. `page` is 1-based.
    pub async fn list_history(
        &self,
        probe_id: Uuid,
        range: TimeRange,
        page: u64,
        per_page: u64,
    ) -> Result<MeasurementPage, RepositoryError> {
        let mut query = Measurement::find().filter(measurement::Column::ProbeId.eq(probe_id));
        if let Some(from) = range.from {
            query = query.filter(measurement::Column::Timestamp.gte(from.fixed_offset()));
        }
        if let Some(to) = range.to {
            query = query.filter(measurement::Column::Timestamp.lte(to.fixed_offset()));
        }

        let paginator = query
            .order_by_asc(measurement::Column::Timestamp)
            .order_by_asc(measurement::Column::ReceivedAt)
            .order_by_asc(measurement::Column::Id)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(MeasurementPage { items, total })
    }

    /// Whether a reading with exactly this timestamp is already stored.
    pub async fn exists(
        &self,
        probe_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let count = Measurement::find()
            .filter(measurement::Column::ProbeId.eq(probe_id))
            .filter(measurement::Column::Timestamp.eq(timestamp.fixed_offset()))
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }

    pub async fn latest(
        &self,
        probe_id: Uuid,
    ) -> Result<Option<probe_latest_reading::Model>, RepositoryError> {
        Ok(ProbeLatestReading::find_by_id(probe_id)
            .one(&*self.db)
            .await?)
    }
}

async fn advance_projection<C: ConnectionTrait>(
    conn: &C,
    reading: &measurement::Model,
    summary: ReadingSummary,
    now: DateTime<FixedOffset>,
) -> Result<ProjectionUpdate, RepositoryError> {
    if conditional_update(conn, reading, summary, now).await? {
        return Ok(ProjectionUpdate::Advanced);
    }

    let seeded = ProbeLatestReading::insert(probe_latest_reading::ActiveModel {
        probe_id: Set(reading.probe_id),
        measurement_id: Set(reading.id),
        timestamp: Set(reading.timestamp),
        alarm_state: Set(summary.alarm_state.as_str().to_string()),
        primary_value: Set(summary.primary_value),
        updated_at: Set(now),
    })
    .on_conflict(
        OnConflict::column(probe_latest_reading::Column::ProbeId)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;
    if seeded > 0 {
        return Ok(ProjectionUpdate::Advanced);
    }

    // Another writer seeded the row between our update and insert.
    if conditional_update(conn, reading, summary, now).await? {
        Ok(ProjectionUpdate::Advanced)
    } else {
        Ok(ProjectionUpdate::Retained)
    }
}

/// `UPDATE ... WHERE probe_id = ? AND timestamp <= ?`; true if a row moved.
async fn conditional_update<C: ConnectionTrait>(
    conn: &C,
    reading: &measurement::Model,
    summary: ReadingSummary,
    now: DateTime<FixedOffset>,
) -> Result<bool, RepositoryError> {
    let result = ProbeLatestReading::update_many()
        .col_expr(
            probe_latest_reading::Column::MeasurementId,
            Expr::value(reading.id),
        )
        .col_expr(
            probe_latest_reading::Column::Timestamp,
            Expr::value(reading.timestamp),
        )
        .col_expr(
            probe_latest_reading::Column::AlarmState,
            Expr::value(summary.alarm_state.as_str()),
        )
        .col_expr(
            probe_latest_reading::Column::PrimaryValue,
            Expr::value(summary.primary_value),
        )
        .col_expr(probe_latest_reading::Column::UpdatedAt, Expr::value(now))
        .filter(probe_latest_reading::Column::ProbeId.eq(reading.probe_id))
        .filter(probe_latest_reading::Column::Timestamp.lte(reading.timestamp))
        .exec(conn)
        .await?;

    Ok(result.rows_affected > 0)
}
