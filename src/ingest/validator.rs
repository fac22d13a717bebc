//! Schema validation for decoded batches.
//!
//! Site-level identifiers are document-fatal; everything inside a `<Probe>`
//! is item-fatal and reported per entry.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use thiserror::Error;

use super::decoder::{FieldValue, ProbeEntry, SiteBatch};
use super::outcome::{FieldError, ReasonCode};
use crate::config::IngestConfig;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DISCRIMINATORS: &[&str] = &["D", "P", "N"];

#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub max_identifier_len: usize,
    pub max_future_skew: Duration,
}

impl ValidationRules {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            max_identifier_len: config.max_identifier_len,
            max_future_skew: i64::try_from(config.max_future_skew_seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
        }
    }
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// Document-fatal validation failure.
#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("invalid customer id '{value}': {reason}")]
    InvalidCustomerId { value: String, reason: &'static str },
    #[error("invalid site id '{value}': {reason}")]
    InvalidSiteId { value: String, reason: &'static str },
}

/// An entry that passed validation and is ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEntry {
    pub index: usize,
    pub address: String,
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
}

/// An entry that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRejection {
    pub index: usize,
    pub address: Option<String>,
    pub code: ReasonCode,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    pub customer_id: String,
    pub site_id: String,
    pub entries: Vec<Result<ValidatedEntry, EntryRejection>>,
}

/// Validate a decoded batch against `rules`, relative to `now`.
pub fn validate_batch(
    batch: SiteBatch,
    rules: &ValidationRules,
    now: DateTime<Utc>,
) -> Result<ValidatedBatch, DocumentError> {
    if let Err(reason) = check_identifier(&batch.customer_id, rules.max_identifier_len) {
        return Err(DocumentError::InvalidCustomerId {
            value: batch.customer_id,
            reason,
        });
    }
    if let Err(reason) = check_identifier(&batch.site_id, rules.max_identifier_len) {
        return Err(DocumentError::InvalidSiteId {
            value: batch.site_id,
            reason,
        });
    }

    let mut seen = HashSet::new();
    let entries = batch
        .entries
        .into_iter()
        .map(|entry| {
            // Claimed by the first occurrence even when that one is invalid.
            if let Some(address) = entry.address.as_deref().filter(|a| !a.is_empty())
                && !seen.insert(address.to_string())
            {
                return Err(EntryRejection {
                    index: entry.index,
                    code: ReasonCode::DuplicateProbe,
                    errors: vec![FieldError::new(
                        "address",
                        ReasonCode::DuplicateProbe,
                        format!("address '{address}' already appears earlier in this batch"),
                    )],
                    address: Some(address.to_string()),
                });
            }
            validate_entry(entry, rules, now)
        })
        .collect();

    Ok(ValidatedBatch {
        customer_id: batch.customer_id,
        site_id: batch.site_id,
        entries,
    })
}

/// Validate a single probe entry. All problems are collected; the first one
/// determines the entry's reason code.
pub fn validate_entry(
    entry: ProbeEntry,
    rules: &ValidationRules,
    now: DateTime<Utc>,
) -> Result<ValidatedEntry, EntryRejection> {
    let mut errors = Vec::new();

    let address = match entry.address.as_deref() {
        None | Some("") => {
            errors.push(FieldError::new(
                "address",
                ReasonCode::MissingField,
                "probe address is missing",
            ));
            None
        }
        Some(address) => match check_identifier(address, rules.max_identifier_len) {
            Ok(()) => Some(address.to_string()),
            Err(reason) => {
                errors.push(FieldError::new(
                    "address",
                    ReasonCode::InvalidIdentifier,
                    format!("probe address {reason}"),
                ));
                None
            }
        },
    };

    let timestamp = match entry.timestamp.as_deref() {
        None => {
            errors.push(FieldError::new(
                "timestamp",
                ReasonCode::MissingField,
                "timestamp is missing",
            ));
            None
        }
        Some(raw) => match parse_timestamp(raw) {
            None => {
                errors.push(FieldError::new(
                    "timestamp",
                    ReasonCode::InvalidTimestamp,
                    if raw.is_empty() {
                        "timestamp is empty".to_string()
                    } else {
                        format!("unrecognised timestamp '{raw}'")
                    },
                ));
                None
            }
            Some(ts)
                if now
                    .checked_add_signed(rules.max_future_skew)
                    .is_some_and(|limit| ts > limit) =>
            {
                errors.push(FieldError::new(
                    "timestamp",
                    ReasonCode::InvalidTimestamp,
                    format!("timestamp {raw} is too far in the future"),
                ));
                None
            }
            Some(ts) => Some(ts),
        },
    };

    for (name, value) in &entry.fields {
        if let Err(message) = check_field(name, value) {
            errors.push(FieldError::new(name.clone(), ReasonCode::InvalidValue, message));
        }
    }

    if !entry.fields.values().any(|v| v.as_number().is_some()) {
        errors.push(FieldError::new(
            "fields",
            ReasonCode::MissingField,
            "entry carries no numeric measurement value",
        ));
    }

    match (address, timestamp) {
        (Some(address), Some(timestamp)) if errors.is_empty() => Ok(ValidatedEntry {
            index: entry.index,
            address,
            timestamp,
            fields: entry.fields,
        }),
        _ => Err(EntryRejection {
            index: entry.index,
            address: entry.address.filter(|a| !a.is_empty()),
            code: errors
                .first()
                .map(|e| e.code)
                .unwrap_or(ReasonCode::InvalidValue),
            errors,
        }),
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn check_identifier(value: &str, max_len: usize) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("is empty");
    }
    if value.len() > max_len {
        return Err("exceeds the maximum length");
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("contains unsupported characters");
    }
    Ok(())
}

fn check_field(name: &str, value: &FieldValue) -> Result<(), String> {
    match name {
        "probe_status" | "tank_status" => check_integer(value, 0, 99),
        "alarm_status" => check_integer(value, 0, 2),
        "product" | "water" | "ullage" => check_decimal(value, 5, 2),
        "density" => check_decimal(value, 4, 2),
        "discriminator" => match value {
            FieldValue::Text(text) if DISCRIMINATORS.contains(&text.as_str()) => Ok(()),
            _ => Err(format!("must be one of {}", DISCRIMINATORS.join(", "))),
        },
        _ if name.starts_with("temperature_") => {
            check_decimal(value, 3, 1)?;
            match value.as_number() {
                Some(t) if (-30.0..=80.0).contains(&t) => Ok(()),
                _ => Err("must be between -30 and 80".to_string()),
            }
        }
        _ => Ok(()),
    }
}

fn check_integer(value: &FieldValue, min: i64, max: i64) -> Result<(), String> {
    match value.as_number() {
        Some(n) if n.fract() == 0.0 && (min as f64..=max as f64).contains(&n) => Ok(()),
        Some(_) => Err(format!("must be an integer between {min} and {max}")),
        None => Err("must be numeric".to_string()),
    }
}

/// Digit limits apply to the parsed number's shortest rendering, so
/// trailing zeros in the source text (`840.500`) do not count.
fn check_decimal(value: &FieldValue, int_digits: usize, decimals: usize) -> Result<(), String> {
    let Some(n) = value.as_number() else {
        return Err("must be numeric".to_string());
    };

    let rendered = n.abs().to_string();
    let (whole, fraction) = rendered
        .split_once('.')
        .unwrap_or((rendered.as_str(), ""));

    if whole.trim_start_matches('0').len() > int_digits {
        return Err(format!("must have at most {int_digits} integer digits"));
    }
    if fraction.len() > decimals {
        return Err(format!("must have at most {decimals} decimal places"));
    }
    Ok(())
}
