//! Match Response Recovery Engine.
//!
//! The oracle is asked for a JSON list of match objects but answers in free
//! text: the list may be wrapped in commentary or a code fence, and it may be
//! cut off mid-record when the oracle hits its token ceiling. Recovery:
//!
//! 1. Slice from the first `[` to the last `]` (or to the end of the text
//!    when no `]` follows, i.e. the list itself was truncated).
//! 2. Parse the slice as a list. On failure, apply one truncation repair:
//!    cut at the last `},` and close the list with `}]`, which keeps every
//!    complete record and discards the incomplete trailing one.
//! 3. Parse again. A second failure is final; there is no further repair.
//! 4. Validate each record and attach its duration in hours. A defective
//!    record is skipped and reported; the rest of the batch survives.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use meetingorder_shared::MatchRecord;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Keys every match record must carry.
pub const REQUIRED_FIELDS: [&str; 4] = ["meeting", "workorder", "start_time", "end_time"];

/// Separator between complete top-level records.
const RECORD_SEPARATOR: &str = "},";

/// Batch-level recovery failure. Either way the response yields no records.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The response contains no `[` at all.
    #[error("no JSON list found in oracle response")]
    NoBracket { raw: String },

    /// The list could not be parsed even after the truncation repair.
    #[error("oracle response is not a valid list after truncation repair: {source}")]
    Unparsable {
        #[source]
        source: serde_json::Error,
        /// The repaired text that failed to parse.
        text: String,
    },
}

/// Why a single record was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordDefect {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has an unexpected type")]
    InvalidField { field: &'static str },

    #[error("field `{field}` is not an ISO-8601 timestamp: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("start_time and end_time mix UTC-offset and local timestamps")]
    MixedOffsets,
}

/// A record left out of the result, with enough context to diagnose it.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    /// Position in the recovered list.
    pub index: usize,
    pub defect: RecordDefect,
    /// The record as the oracle wrote it.
    pub record: Value,
}

/// Successful recovery of a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recovered {
    /// Enriched records, in response order.
    pub records: Vec<MatchRecord>,
    /// Records that failed validation.
    pub skipped: Vec<SkippedRecord>,
    /// True when the truncation repair was needed.
    pub repaired: bool,
}

/// Recover the match list from a raw oracle response.
pub fn recover_matches(raw: &str) -> Result<Recovered, RecoveryError> {
    let (items, repaired) = parse_list(raw)?;

    let mut recovered = Recovered {
        repaired,
        ..Default::default()
    };

    for (index, item) in items.into_iter().enumerate() {
        match enrich_record(&item) {
            Ok(record) => {
                if record.is_inverted() {
                    warn!(
                        index,
                        meeting = %record.meeting,
                        start_time = %record.start_time,
                        end_time = %record.end_time,
                        duration = record.duration,
                        "end time precedes start time"
                    );
                }
                recovered.records.push(record);
            }
            Err(defect) => {
                warn!(index, %defect, record = %item, "skipping malformed match record");
                recovered.skipped.push(SkippedRecord {
                    index,
                    defect,
                    record: item,
                });
            }
        }
    }

    info!(
        records = recovered.records.len(),
        skipped = recovered.skipped.len(),
        repaired,
        "oracle response recovered"
    );
    Ok(recovered)
}

/// Locate, repair if needed, and parse the list. Returns the items and
/// whether the repair was applied.
fn parse_list(raw: &str) -> Result<(Vec<Value>, bool), RecoveryError> {
    let start = raw.find('[').ok_or_else(|| RecoveryError::NoBracket {
        raw: raw.to_string(),
    })?;
    let tail = &raw[start..];
    let slice = match tail.rfind(']') {
        Some(end) => &tail[..=end],
        None => tail,
    };

    match serde_json::from_str::<Vec<Value>>(slice) {
        Ok(items) => Ok((items, false)),
        Err(first) => {
            debug!(error = %first, "list did not parse, applying truncation repair");
            let repaired = repair_truncated(slice);
            serde_json::from_str::<Vec<Value>>(&repaired)
                .map(|items| (items, true))
                .map_err(|source| RecoveryError::Unparsable {
                    source,
                    text: repaired,
                })
        }
    }
}

/// Drop everything after the last complete record and close the list.
/// Without a record separator there is nothing to cut, so the slice is
/// returned as-is.
fn repair_truncated(slice: &str) -> String {
    match slice.rfind(RECORD_SEPARATOR) {
        Some(cut) => format!("{}}}]", &slice[..cut]),
        None => slice.to_string(),
    }
}

/// Validate one record and attach its duration. Unknown keys are kept.
pub fn enrich_record(item: &Value) -> Result<MatchRecord, RecordDefect> {
    let Value::Object(map) = item else {
        return Err(RecordDefect::NotAnObject);
    };

    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !map.contains_key(**f)) {
        return Err(RecordDefect::MissingField(*missing));
    }

    let meeting = string_field(map, "meeting")?;
    let workorder = match &map["workorder"] {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => return Err(RecordDefect::InvalidField { field: "workorder" }),
    };
    let start_time = string_field(map, "start_time")?;
    let end_time = string_field(map, "end_time")?;

    let start = parse_timestamp(&start_time).ok_or_else(|| RecordDefect::InvalidTimestamp {
        field: "start_time",
        value: start_time.clone(),
    })?;
    let end = parse_timestamp(&end_time).ok_or_else(|| RecordDefect::InvalidTimestamp {
        field: "end_time",
        value: end_time.clone(),
    })?;
    let duration = duration_hours(start, end)?;

    let mut extra = map.clone();
    for key in REQUIRED_FIELDS.iter().chain(&["duration"]) {
        extra.remove(*key);
    }

    Ok(MatchRecord {
        meeting,
        workorder,
        start_time,
        end_time,
        duration,
        extra,
    })
}

fn string_field(
    map: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<String, RecordDefect> {
    match &map[field] {
        Value::String(s) => Ok(s.clone()),
        _ => Err(RecordDefect::InvalidField { field }),
    }
}

// ---------------------------------------------------------------------------
// Timestamps and duration
// ---------------------------------------------------------------------------

/// An ISO-8601 timestamp, with or without a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Local(NaiveDateTime),
    Offset(DateTime<FixedOffset>),
}

const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp. A trailing `Z` is read as `+00:00`.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let trimmed = raw.trim();
    let normalized = match trimmed.strip_suffix('Z') {
        Some(head) => format!("{head}+00:00"),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(Timestamp::Offset(dt));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(Timestamp::Offset(dt));
        }
    }
    for fmt in LOCAL_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(Timestamp::Local(dt));
        }
    }
    None
}

/// `end - start` in hours, rounded to two decimals.
/// Negative when `end` precedes `start`.
pub fn duration_hours(start: Timestamp, end: Timestamp) -> Result<f64, RecordDefect> {
    let delta = match (start, end) {
        (Timestamp::Local(a), Timestamp::Local(b)) => b - a,
        (Timestamp::Offset(a), Timestamp::Offset(b)) => b.signed_duration_since(a),
        _ => return Err(RecordDefect::MixedOffsets),
    };
    let hours = delta.num_milliseconds() as f64 / 3_600_000.0;
    Ok(round_hundredths(hours))
}

/// Round the exact binary value of `x` to two decimals, ties to even.
///
/// A two-decimal tie is exactly representable only as an odd multiple of
/// 1/8, where scaling by 100 is exact. Every other value is rounded from its
/// exact decimal expansion, so `0.005000000000000000104` (18 s) goes up.
fn round_hundredths(x: f64) -> f64 {
    let eighths = x * 8.0;
    if eighths.fract() == 0.0 && eighths.rem_euclid(2.0) == 1.0 {
        return (x * 100.0).round_ties_even() / 100.0;
    }
    format!("{x:.2}").parse().unwrap_or(x)
}
