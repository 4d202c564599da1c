//! Core domain types for meeting-to-work-order reconciliation.

use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Console placeholder for a match without a work order.
pub const NO_WORKORDER_LABEL: &str = "No matching work order";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one reconciliation run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MeetingRecord
// ---------------------------------------------------------------------------

/// One calendar event after normalization, before matching.
///
/// Only `label` is sent to the oracle; the oracle infers the exact
/// timestamps itself. The parsed times are kept when the source line
/// carried a recognizable date and time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingRecord {
    /// Canonical `"{date}: {time} - {title}"` or `"{details}: {title}"` line.
    pub label: String,
    /// Start time, when the source line could be read strictly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    /// End time, when the source line could be read strictly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveDateTime>,
}

impl MeetingRecord {
    /// A record whose timestamps are left for the oracle to infer.
    pub fn untimed(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start_time: None,
            end_time: None,
        }
    }
}

impl std::fmt::Display for MeetingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

// ---------------------------------------------------------------------------
// WorkOrderRecord
// ---------------------------------------------------------------------------

/// One row of the work-order source: header name → cell value.
///
/// Fields keep the header's column order, both in memory and when
/// serialized into the oracle request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkOrderRecord {
    fields: Vec<(String, String)>,
}

impl WorkOrderRecord {
    /// Build a record from `(field, value)` pairs in column order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of the named field, if the header has it.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }

    /// All fields in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for WorkOrderRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// MatchRecord
// ---------------------------------------------------------------------------

/// A meeting matched (or explicitly not matched) to a work order, with its
/// computed duration. Read-only once recovered from the oracle response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Date and title of the meeting, as written by the oracle.
    pub meeting: String,
    /// Matched work order; `None` means no plausible match.
    pub workorder: Option<String>,
    /// ISO-8601 start timestamp as returned by the oracle.
    pub start_time: String,
    /// ISO-8601 end timestamp as returned by the oracle.
    pub end_time: String,
    /// `end_time - start_time` in hours, rounded to two decimals.
    pub duration: f64,
    /// Any other keys the oracle emitted, preserved untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MatchRecord {
    /// Work order for display, with the placeholder for unmatched meetings.
    pub fn workorder_label(&self) -> &str {
        self.workorder.as_deref().unwrap_or(NO_WORKORDER_LABEL)
    }

    /// True when the end time precedes the start time (a data-quality defect).
    pub fn is_inverted(&self) -> bool {
        self.duration < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_match() -> MatchRecord {
        MatchRecord {
            meeting: "2024-03-01 Standup".into(),
            workorder: Some("WO-1".into()),
            start_time: "2024-03-01T09:00:00".into(),
            end_time: "2024-03-01T10:00:00".into(),
            duration: 1.0,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn run_id_display_is_uuid() {
        let id = RunId::new();
        let parsed = Uuid::parse_str(&id.to_string()).expect("uuid");
        assert_eq!(parsed, id.0);
    }

    #[test]
    fn workorder_record_serializes_in_column_order() {
        let record = WorkOrderRecord::from_pairs([("title", "Migration"), ("id", "WO-7")]);
        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"title":"Migration","id":"WO-7"}"#);
        assert_eq!(record.get("id"), Some("WO-7"));
        assert_eq!(record.get("owner"), None);
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn null_workorder_serializes_as_null() {
        let mut record = sample_match();
        record.workorder = None;
        let json = serde_json::to_value(&record).expect("serialize");
        assert!(json["workorder"].is_null());
        assert_eq!(record.workorder_label(), NO_WORKORDER_LABEL);
    }

    #[test]
    fn extra_keys_survive_roundtrip() {
        let mut record = sample_match();
        record
            .extra
            .insert("confidence".into(), serde_json::json!("high"));
        let json = serde_json::to_string(&record).expect("serialize");
        assert!(json.contains(r#""confidence":"high""#));

        let parsed: MatchRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, record);
    }

    #[test]
    fn negative_duration_is_inverted() {
        let mut record = sample_match();
        assert!(!record.is_inverted());
        record.duration = -0.5;
        assert!(record.is_inverted());
    }

    #[test]
    fn meeting_record_displays_label() {
        let meeting = MeetingRecord::untimed("Mon 3/4 10:00 AM: Design review");
        assert_eq!(meeting.to_string(), "Mon 3/4 10:00 AM: Design review");
        assert!(meeting.start_time.is_none());
    }
}
