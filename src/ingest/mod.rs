//! # Ingestion
//!
//! Decoding, validation and storage of tank-probe batch documents.
//!
//! A batch is processed in document order. Problems with the document as a
//! whole reject it before anything is stored; problems with a single probe
//! entry are reported in that entry's outcome and the rest of the batch
//! carries on.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::IngestConfig;
use crate::error::RepositoryError;
use crate::repositories::{HierarchyRepository, MeasurementRepository};
use crate::status;

pub mod decoder;
pub mod outcome;
pub mod validator;

pub use decoder::{DecodeError, FieldValue, ProbeEntry, SiteBatch, decode};
pub use outcome::{BatchResult, EntryOutcome, EntryStatus, FieldError, ReasonCode};
pub use validator::{
    DocumentError, EntryRejection, ValidatedBatch, ValidatedEntry, ValidationRules,
    validate_batch,
};

/// Document-fatal ingestion failure; nothing from the batch was stored.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Runs batches through decode → validate → resolve → store.
#[derive(Debug, Clone)]
pub struct IngestionService {
    hierarchy: HierarchyRepository,
    measurements: MeasurementRepository,
    rules: ValidationRules,
    store_timeout: Duration,
    skip_existing: bool,
}

impl IngestionService {
    pub fn new(db: Arc<DatabaseConnection>, config: &IngestConfig) -> Self {
        Self {
            hierarchy: HierarchyRepository::new(db.clone()),
            measurements: MeasurementRepository::new(db),
            rules: ValidationRules::from_config(config),
            store_timeout: config.store_timeout(),
            skip_existing: false,
        }
    }

    /// Leave readings whose (probe, timestamp) is already stored untouched
    /// instead of appending them again. Used by bulk re-imports; the HTTP
    /// endpoint always appends.
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    pub fn hierarchy(&self) -> &HierarchyRepository {
        &self.hierarchy
    }

    pub fn measurements(&self) -> &MeasurementRepository {
        &self.measurements
    }

    /// Ingest one raw batch document.
    ///
    /// Entries are attempted one at a time in document order. When `cancel`
    /// fires, entries not yet started are left out of the result and
    /// `cancelled` is set; entries already stored stay stored.
    pub async fn ingest(
        &self,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<BatchResult, IngestError> {
        let started = Instant::now();

        let batch = decoder::decode(payload).inspect_err(|_| {
            counter!("probe_ingest_batches_total", "outcome" => "malformed").increment(1);
        })?;
        let validated = validate_batch(batch, &self.rules, Utc::now()).inspect_err(|_| {
            counter!("probe_ingest_batches_total", "outcome" => "rejected").increment(1);
        })?;

        let ValidatedBatch {
            customer_id,
            site_id,
            entries,
        } = validated;

        let mut result = BatchResult::new(customer_id.clone(), site_id.clone(), entries.len());

        for entry in entries {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            let outcome = match entry {
                Ok(entry) => self.store_entry(&customer_id, &site_id, entry).await,
                Err(rejection) => EntryOutcome::failed(
                    rejection.address,
                    rejection.code,
                    rejection.errors,
                ),
            };

            if let Some(code) = outcome.code {
                tracing::warn!(
                    customer_id = %customer_id,
                    site_id = %site_id,
                    probe = outcome.probe.as_deref().unwrap_or("<none>"),
                    code = code.as_str(),
                    reason = code.reason(),
                    "Probe entry rejected"
                );
                counter!("probe_ingest_entries_total", "outcome" => code.as_str()).increment(1);
            } else if outcome.status == EntryStatus::Duplicate {
                counter!("probe_ingest_entries_total", "outcome" => "duplicate").increment(1);
            } else {
                counter!("probe_ingest_entries_total", "outcome" => "success").increment(1);
            }

            result.push(outcome);
        }

        let outcome_label = if result.cancelled {
            "cancelled"
        } else if result.failed == 0 {
            "success"
        } else if result.processed == 0 && result.duplicates == 0 && result.attempted > 0 {
            "failed"
        } else {
            "partial"
        };
        counter!("probe_ingest_batches_total", "outcome" => outcome_label).increment(1);
        histogram!("probe_ingest_batch_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);

        tracing::info!(
            customer_id = %result.customer_id,
            site_id = %result.site_id,
            entries = result.entries,
            processed = result.processed,
            failed = result.failed,
            duplicates = result.duplicates,
            cancelled = result.cancelled,
            duration_ms = started.elapsed().as_millis() as u64,
            "Batch ingested"
        );

        Ok(result)
    }

    async fn store_entry(
        &self,
        customer_id: &str,
        site_id: &str,
        entry: ValidatedEntry,
    ) -> EntryOutcome {
        let resolved = match self
            .bounded(self.hierarchy.resolve(customer_id, site_id, &entry.address))
            .await
        {
            Ok(resolved) => resolved,
            Err(err) => return store_failure(entry.address, err),
        };

        if self.skip_existing {
            match self
                .bounded(self.measurements.exists(resolved.probe_id, entry.timestamp))
                .await
            {
                Ok(true) => return EntryOutcome::duplicate(entry.address, entry.timestamp),
                Ok(false) => {}
                Err(err) => return store_failure(entry.address, err),
            }
        }

        let summary = status::summarize(&entry.fields);
        let fields = match serde_json::to_value(&entry.fields) {
            Ok(fields) => fields,
            Err(err) => {
                return EntryOutcome::failed(
                    Some(entry.address),
                    ReasonCode::InvalidValue,
                    vec![FieldError::new(
                        "fields",
                        ReasonCode::InvalidValue,
                        err.to_string(),
                    )],
                );
            }
        };

        match self
            .bounded(
                self.measurements
                    .append(resolved.probe_id, entry.timestamp, fields, summary),
            )
            .await
        {
            Ok(stored) => {
                tracing::debug!(
                    probe = %entry.address,
                    measurement_id = %stored.measurement.id,
                    projection = ?stored.projection,
                    "Stored measurement"
                );
                EntryOutcome::success(entry.address, entry.timestamp)
            }
            Err(err) => store_failure(entry.address, err),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, RepositoryError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout {
                timeout_ms: self.store_timeout.as_millis() as u64,
            }),
        }
    }
}

fn store_failure(address: String, err: RepositoryError) -> EntryOutcome {
    let code = match &err {
        RepositoryError::SiteConflict { .. } | RepositoryError::ProbeConflict { .. } => {
            ReasonCode::HierarchyConflict
        }
        RepositoryError::Timeout { .. } => ReasonCode::StoreTimeout,
        RepositoryError::NotFound { .. } | RepositoryError::Database(_) => {
            ReasonCode::StoreUnavailable
        }
    };

    if code == ReasonCode::StoreUnavailable {
        tracing::error!(probe = %address, error = %err, "Store call failed");
    }

    let field = if code == ReasonCode::HierarchyConflict {
        "address"
    } else {
        "store"
    };
    let errors = vec![FieldError::new(field, code, err.to_string())];
    EntryOutcome::failed(Some(address), code, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_map_to_reason_codes() {
        let conflict = store_failure(
            "068745".into(),
            RepositoryError::ProbeConflict {
                address: "068745".into(),
                claimed_site_id: "S2".into(),
            },
        );
        assert_eq!(conflict.code, Some(ReasonCode::HierarchyConflict));
        assert_eq!(conflict.reason.as_deref(), Some("hierarchy conflict"));

        let timeout = store_failure("068745".into(), RepositoryError::Timeout { timeout_ms: 5 });
        assert_eq!(timeout.code, Some(ReasonCode::StoreTimeout));

        let db = store_failure(
            "068745".into(),
            RepositoryError::Database(sea_orm::DbErr::Custom("down".into())),
        );
        assert_eq!(db.code, Some(ReasonCode::StoreUnavailable));
        assert_eq!(db.probe.as_deref(), Some("068745"));
    }
}
