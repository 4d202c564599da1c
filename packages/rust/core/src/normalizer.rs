//! Meeting Normalizer.
//!
//! Turns raw meeting descriptors into one canonical line per meeting:
//! - vision lines `"{date}, {time-range}, {title...}"` become
//!   `"{date}: {time-range} - {title}"`
//! - scraped events become `"{details}: {title}"`
//!
//! Lines that cannot be read are dropped, but every dropped line is kept in
//! [`Normalized::dropped`] and logged so nothing disappears silently.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use meetingorder_capture::ScrapedEvent;
use meetingorder_shared::MeetingRecord;
use regex::Regex;
use tracing::{debug, warn};

/// Field separator of vision lines and accessible names.
const SEPARATOR: &str = ", ";

/// Output of a normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    /// Meetings in input order.
    pub meetings: Vec<MeetingRecord>,
    /// Non-blank input lines that could not be read as meetings.
    pub dropped: Vec<String>,
}

impl Normalized {
    /// Newline-joined canonical lines, as embedded in the match request.
    pub fn text(&self) -> String {
        self.meetings
            .iter()
            .map(|m| m.label.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.meetings.is_empty()
    }
}

/// Normalize newline-separated vision output.
///
/// Canonical lines with a strict date and time range pass through unchanged,
/// so normalizing [`Normalized::text`] again keeps every strictly timed
/// meeting. Loosely timed canonical lines are not recognized a second time.
pub fn normalize_lines(raw: &str) -> Normalized {
    let mut out = Normalized::default();

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match normalize_line(line) {
            Some(meeting) => out.meetings.push(meeting),
            None => out.dropped.push(line.to_string()),
        }
    }

    if !out.dropped.is_empty() {
        warn!(
            dropped = out.dropped.len(),
            kept = out.meetings.len(),
            lines = ?out.dropped,
            "dropped meeting lines that are not 'date, time, title'"
        );
    }
    debug!(meetings = out.meetings.len(), "normalized meeting lines");
    out
}

/// Normalize scraped calendar events. Details are passed through verbatim;
/// timestamp inference is left to the oracle.
pub fn normalize_events(events: &[ScrapedEvent]) -> Normalized {
    Normalized {
        meetings: events
            .iter()
            .map(|e| MeetingRecord::untimed(format!("{}: {}", e.details, e.title)))
            .collect(),
        dropped: Vec::new(),
    }
}

fn normalize_line(line: &str) -> Option<MeetingRecord> {
    if let Some(meeting) = canonical_line(line) {
        return Some(meeting);
    }

    let parts: Vec<&str> = line.split(SEPARATOR).collect();
    if parts.len() < 3 {
        return None;
    }

    let date = parts[0];
    let time = parts[1];
    let title = parts[2..].join(SEPARATOR);
    let (start_time, end_time) = parse_time_range(date, time).unzip();

    Some(MeetingRecord {
        label: format!("{date}: {time} - {title}"),
        start_time,
        end_time,
    })
}

/// Recognize a line that is already `"{date}: {time} - {title}"`.
///
/// Only strictly readable lines qualify: a `YYYY-MM-DD` date and a leading
/// `HH:MM - HH:MM` range. Anything looser goes through the comma rule, which
/// keeps prose like `"Week 10: no meetings - enjoy"` out.
fn canonical_line(line: &str) -> Option<MeetingRecord> {
    let (date, rest) = line.split_once(": ")?;
    let range = leading_time_range(rest)?;
    if !rest[range.len()..].starts_with(" - ") {
        return None;
    }
    let (start_time, end_time) = parse_time_range(date, range)?;

    Some(MeetingRecord {
        label: line.to_string(),
        start_time: Some(start_time),
        end_time: Some(end_time),
    })
}

/// The `HH:MM - HH:MM` prefix of a canonical remainder.
fn leading_time_range(rest: &str) -> Option<&str> {
    static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\d{1,2}:\d{2}\s*-\s*\d{1,2}:\d{2}").expect("valid regex")
    });
    RANGE_RE.find(rest).map(|m| m.as_str())
}

/// Strict reading of `YYYY-MM-DD` plus `HH:MM - HH:MM`.
fn parse_time_range(date: &str, range: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let (start, end) = range.split_once('-')?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
    Some((date.and_time(start), date.and_time(end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn vision_line_is_canonicalized() {
        let out = normalize_lines("2024-03-01, 09:00 - 10:00, Standup");
        assert_eq!(out.text(), "2024-03-01: 09:00 - 10:00 - Standup");
        assert_eq!(out.meetings[0].start_time, Some(at("2024-03-01", "09:00")));
        assert_eq!(out.meetings[0].end_time, Some(at("2024-03-01", "10:00")));
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn title_commas_are_kept() {
        let out = normalize_lines("2024-03-05, 10:00 - 11:30, Design system, phase 2, review");
        assert_eq!(
            out.text(),
            "2024-03-05: 10:00 - 11:30 - Design system, phase 2, review"
        );
    }

    #[test]
    fn malformed_lines_are_dropped_and_reported() {
        let raw = "Here are your meetings:\n\
                   2024-03-01, 09:00 - 10:00, Standup\n\
                   \n\
                   2024-03-01 Lunch\n\
                   2024-03-01, 13:00 - 14:00, Planning";
        let out = normalize_lines(raw);

        assert_eq!(out.meetings.len(), 2);
        assert_eq!(out.dropped, ["Here are your meetings:", "2024-03-01 Lunch"]);
    }

    #[test]
    fn order_is_preserved() {
        let raw = "2024-03-02, 09:00 - 09:30, B\n2024-03-01, 09:00 - 09:30, A";
        let out = normalize_lines(raw);
        assert_eq!(
            out.text(),
            "2024-03-02: 09:00 - 09:30 - B\n2024-03-01: 09:00 - 09:30 - A"
        );
    }

    #[test]
    fn loose_time_ranges_keep_the_line_untimed() {
        let out = normalize_lines("Mon 3/4, 9am - 10am, Standup");
        assert_eq!(out.text(), "Mon 3/4: 9am - 10am - Standup");
        assert!(out.meetings[0].start_time.is_none());
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = "2024-03-01, 09:00 - 10:00, Standup\n\
                   2024-03-05, 10:00 - 11:30, Design system, phase 2, review\n\
                   2024-03-06, 14:00 - 15:00, Client call - Acme";
        let once = normalize_lines(raw);
        let twice = normalize_lines(&once.text());

        assert_eq!(twice.meetings, once.meetings);
        assert!(twice.dropped.is_empty());
    }

    #[test]
    fn prose_with_colon_is_not_canonical() {
        let out = normalize_lines("Note: times below - local");
        assert!(out.is_empty());
        assert_eq!(out.dropped.len(), 1);
    }

    #[test]
    fn prose_with_digits_before_colon_is_dropped() {
        let raw = "Week 10: no meetings - enjoy\nRoom 4B: closed - see facilities";
        let out = normalize_lines(raw);
        assert!(out.is_empty());
        assert_eq!(
            out.dropped,
            ["Week 10: no meetings - enjoy", "Room 4B: closed - see facilities"]
        );
    }

    #[test]
    fn canonical_line_needs_a_title_after_the_range() {
        let out = normalize_lines("2024-03-01: 09:00 - 10:00\n2024-03-01: 09:00 - 10:00 - Standup");
        assert_eq!(out.dropped, ["2024-03-01: 09:00 - 10:00"]);
        assert_eq!(out.meetings[0].start_time, Some(at("2024-03-01", "09:00")));
    }

    #[test]
    fn carriage_returns_are_trimmed() {
        let out = normalize_lines("2024-03-01, 09:00 - 10:00, Standup\r\n");
        assert_eq!(out.text(), "2024-03-01: 09:00 - 10:00 - Standup");
    }

    #[test]
    fn scraped_events_put_details_first() {
        let events = vec![
            ScrapedEvent {
                title: "Standup".into(),
                details: "9:00 AM to 9:15 AM, Monday, March 4, 2024".into(),
            },
            ScrapedEvent {
                title: "Design review".into(),
                details: "Tuesday".into(),
            },
        ];
        let out = normalize_events(&events);
        assert_eq!(
            out.text(),
            "9:00 AM to 9:15 AM, Monday, March 4, 2024: Standup\nTuesday: Design review"
        );
        assert!(out.meetings.iter().all(|m| m.start_time.is_none()));
    }
}
