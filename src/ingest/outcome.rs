//! Per-entry and per-batch results reported back to the submitter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Machine-readable reason for an item-fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    MissingField,
    InvalidTimestamp,
    InvalidValue,
    InvalidIdentifier,
    DuplicateProbe,
    HierarchyConflict,
    StoreTimeout,
    StoreUnavailable,
}

impl ReasonCode {
    /// Human-readable reason reported alongside the code.
    pub const fn reason(self) -> &'static str {
        match self {
            Self::MissingField => "missing required field",
            Self::InvalidTimestamp => "invalid timestamp",
            Self::InvalidValue => "invalid field value",
            Self::InvalidIdentifier => "invalid probe address",
            Self::DuplicateProbe => "duplicate probe address in batch",
            Self::HierarchyConflict => "hierarchy conflict",
            Self::StoreTimeout => "store timeout",
            Self::StoreUnavailable => "store unavailable",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
            Self::InvalidValue => "INVALID_VALUE",
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::DuplicateProbe => "DUPLICATE_PROBE",
            Self::HierarchyConflict => "HIERARCHY_CONFLICT",
            Self::StoreTimeout => "STORE_TIMEOUT",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Success,
    Failed,
    /// Already stored; left alone when importing with duplicate skipping.
    Duplicate,
}

/// A single field-level problem found while validating an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub code: ReasonCode,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

/// Outcome of one probe entry, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EntryOutcome {
    /// Probe address, when the entry carried one.
    #[schema(example = "068745")]
    pub probe: Option<String>,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "invalid timestamp")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl EntryOutcome {
    pub fn success(probe: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            probe: Some(probe),
            status: EntryStatus::Success,
            timestamp: Some(timestamp),
            code: None,
            reason: None,
            errors: Vec::new(),
        }
    }

    pub fn failed(probe: Option<String>, code: ReasonCode, errors: Vec<FieldError>) -> Self {
        Self {
            probe,
            status: EntryStatus::Failed,
            timestamp: None,
            code: Some(code),
            reason: Some(code.reason().to_string()),
            errors,
        }
    }

    pub fn duplicate(probe: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            probe: Some(probe),
            status: EntryStatus::Duplicate,
            timestamp: Some(timestamp),
            code: None,
            reason: Some("already stored".to_string()),
            errors: Vec::new(),
        }
    }
}

/// Aggregate result of processing one batch document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchResult {
    #[schema(example = "C1")]
    pub customer_id: String,
    #[schema(example = "S1")]
    pub site_id: String,
    /// Number of probe entries in the document.
    pub entries: usize,
    /// Number of entries that were reached before any cancellation.
    pub attempted: usize,
    pub processed: usize,
    pub failed: usize,
    /// Entries skipped because the same reading was already stored.
    #[serde(default)]
    pub duplicates: usize,
    pub cancelled: bool,
    pub results: Vec<EntryOutcome>,
}

impl BatchResult {
    pub(crate) fn new(customer_id: String, site_id: String, entries: usize) -> Self {
        Self {
            customer_id,
            site_id,
            entries,
            attempted: 0,
            processed: 0,
            failed: 0,
            duplicates: 0,
            cancelled: false,
            results: Vec::with_capacity(entries),
        }
    }

    pub(crate) fn push(&mut self, outcome: EntryOutcome) {
        self.attempted += 1;
        match outcome.status {
            EntryStatus::Success => self.processed += 1,
            EntryStatus::Failed => self.failed += 1,
            EntryStatus::Duplicate => self.duplicates += 1,
        }
        self.results.push(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_serializes_code_and_reason() {
        let outcome = EntryOutcome::failed(
            Some("068746".to_string()),
            ReasonCode::InvalidTimestamp,
            vec![FieldError::new(
                "timestamp",
                ReasonCode::InvalidTimestamp,
                "timestamp is empty",
            )],
        );

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["probe"], "068746");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["code"], "INVALID_TIMESTAMP");
        assert_eq!(json["reason"], "invalid timestamp");
        assert!(json.get("timestamp").is_none());
        assert_eq!(json["errors"][0]["field"], "timestamp");
    }

    #[test]
    fn success_outcome_omits_failure_fields() {
        let ts = DateTime::parse_from_rfc3339("2025-03-28T15:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_value(EntryOutcome::success("068745".into(), ts)).unwrap();

        assert_eq!(json["status"], "success");
        assert_eq!(json["timestamp"], "2025-03-28T15:30:00Z");
        assert!(json.get("code").is_none());
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn batch_counts_follow_pushed_outcomes() {
        let mut batch = BatchResult::new("C1".into(), "S1".into(), 3);
        batch.push(EntryOutcome::failed(None, ReasonCode::MissingField, vec![]));
        batch.push(EntryOutcome::success("a".into(), Utc::now()));
        batch.push(EntryOutcome::duplicate("b".into(), Utc::now()));

        assert_eq!(batch.entries, 3);
        assert_eq!(batch.attempted, 3);
        assert_eq!(batch.processed, 1);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.duplicates, 1);
        assert_eq!(serde_json::to_value(&batch.results[2]).unwrap()["status"], "duplicate");
        assert_eq!(batch.results[0].code.map(ReasonCode::as_str), Some("MISSING_FIELD"));
    }
}
