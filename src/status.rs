//! Probe status classification.
//!
//! Alarm state is derived from the reading when it is stored; connectivity
//! is derived at query time from how old the latest reading is.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ingest::FieldValue;

/// Field holding the probe's alarm code.
pub const ALARM_FIELD: &str = "alarm_status";
/// Field reported as a probe's headline value.
pub const PRIMARY_FIELD: &str = "product";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Ok,
    Acknowledged,
    Alarm,
    Unknown,
}

impl AlarmState {
    pub fn from_code(code: f64) -> Self {
        match code {
            c if c == 0.0 => Self::Ok,
            c if c == 1.0 => Self::Acknowledged,
            c if c == 2.0 => Self::Alarm,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Acknowledged => "acknowledged",
            Self::Alarm => "alarm",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the stored representation; unrecognised values read as unknown.
    pub fn parse(value: &str) -> Self {
        match value {
            "ok" => Self::Ok,
            "acknowledged" => Self::Acknowledged,
            "alarm" => Self::Alarm,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
    NeverReported,
}

/// What the latest-reading projection stores besides the timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingSummary {
    pub alarm_state: AlarmState,
    pub primary_value: Option<f64>,
}

pub fn summarize(fields: &BTreeMap<String, FieldValue>) -> ReadingSummary {
    ReadingSummary {
        alarm_state: fields
            .get(ALARM_FIELD)
            .and_then(FieldValue::as_number)
            .map_or(AlarmState::Unknown, AlarmState::from_code),
        primary_value: fields.get(PRIMARY_FIELD).and_then(FieldValue::as_number),
    }
}

pub fn connectivity(
    last_reading: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Connectivity {
    let Some(last) = last_reading else {
        return Connectivity::NeverReported;
    };

    // Readings stamped ahead of the server clock count as fresh.
    match (now - last).to_std() {
        Ok(age) if age > stale_after => Connectivity::Offline,
        _ => Connectivity::Online,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn summarize_reads_alarm_and_product() {
        let summary = summarize(&fields(&[
            ("alarm_status", FieldValue::Number(2.0)),
            ("product", FieldValue::Number(840.5)),
        ]));
        assert_eq!(summary.alarm_state, AlarmState::Alarm);
        assert_eq!(summary.primary_value, Some(840.5));
    }

    #[test]
    fn summarize_without_alarm_field_is_unknown() {
        let summary = summarize(&fields(&[("water", FieldValue::Number(1.0))]));
        assert_eq!(summary.alarm_state, AlarmState::Unknown);
        assert_eq!(summary.primary_value, None);
    }

    #[test]
    fn alarm_state_round_trips_through_storage_text() {
        for state in [
            AlarmState::Ok,
            AlarmState::Acknowledged,
            AlarmState::Alarm,
            AlarmState::Unknown,
        ] {
            assert_eq!(AlarmState::parse(state.as_str()), state);
        }
        assert_eq!(AlarmState::from_code(7.0), AlarmState::Unknown);
    }

    #[test]
    fn connectivity_uses_stale_threshold() {
        let now = Utc.with_ymd_and_hms(2025, 3, 28, 16, 0, 0).unwrap();
        let hour = Duration::from_secs(3600);

        assert_eq!(connectivity(None, now, hour), Connectivity::NeverReported);
        assert_eq!(
            connectivity(Some(now - chrono::Duration::minutes(30)), now, hour),
            Connectivity::Online
        );
        assert_eq!(
            connectivity(Some(now - chrono::Duration::hours(2)), now, hour),
            Connectivity::Offline
        );
        assert_eq!(
            connectivity(Some(now + chrono::Duration::minutes(5)), now, hour),
            Connectivity::Online
        );
    }
}
