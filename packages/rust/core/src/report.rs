//! Result Reporter: console rendering and CSV export of recovered matches.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use meetingorder_shared::{MatchRecord, MeetingOrderError, Result};
use serde::Deserialize;
use tracing::{debug, info};

/// Column order of the export file.
pub const EXPORT_HEADER: [&str; 3] = ["meeting", "workorder", "duration"];

const RULE: &str = "----------------------------------";

/// Render the human-readable result block.
pub fn render_console(records: &[MatchRecord]) -> String {
    if records.is_empty() {
        return "No meetings found.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Matched Meetings and Work Orders:");
    let _ = writeln!(out, "{RULE}");
    for record in records {
        let _ = writeln!(out, "Meeting: {}", record.meeting);
        let _ = writeln!(out, "Work Order: {}", record.workorder_label());
        let _ = writeln!(out, "Duration: {} hours", format_hours(record.duration));
        let _ = writeln!(out, "{RULE}");
    }
    out
}

/// Two-decimal rendering used on the console and in the export.
pub fn format_hours(hours: f64) -> String {
    format!("{hours:.2}")
}

/// Write `records` to `path` as CSV, replacing any existing file.
///
/// Rows go to a temporary file next to the target, which is renamed over
/// it only once every row is flushed. An empty list writes nothing.
pub fn export_csv(records: &[MatchRecord], path: &Path) -> Result<bool> {
    if records.is_empty() {
        debug!(path = %path.display(), "no records, export skipped");
        return Ok(false);
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .map_err(|e| MeetingOrderError::io(&dir, e))?;

    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        writer.write_record(EXPORT_HEADER).map_err(csv_error)?;
        for record in records {
            writer
                .write_record([
                    record.meeting.as_str(),
                    record.workorder.as_deref().unwrap_or(""),
                    format_hours(record.duration).as_str(),
                ])
                .map_err(csv_error)?;
        }
        writer.flush().map_err(|e| MeetingOrderError::io(path, e))?;
    }
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| MeetingOrderError::io(tmp.path(), e))?;

    tmp.persist(path)
        .map_err(|e| MeetingOrderError::io(path, e.error))?;

    info!(path = %path.display(), rows = records.len(), "results exported");
    Ok(true)
}

/// One row of an export file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExportRow {
    pub meeting: String,
    /// Empty cells read back as `None`.
    pub workorder: Option<String>,
    pub duration: f64,
}

/// Read an export file back.
pub fn read_export(path: &Path) -> Result<Vec<ExportRow>> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<ExportRow>, _>>()
        .map_err(csv_error)
}

fn csv_error(e: csv::Error) -> MeetingOrderError {
    MeetingOrderError::Csv(e.to_string())
}
