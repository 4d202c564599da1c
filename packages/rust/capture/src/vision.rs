//! Screenshot-to-text extraction through the oracle's vision model.

use std::path::Path;
use std::sync::LazyLock;

use base64::{Engine as _, engine::general_purpose};
use meetingorder_oracle::{ChatMessage, ChatRequest, ContentPart, OracleClient};
use meetingorder_shared::{MeetingOrderError, Result};
use regex::Regex;
use tracing::{info, instrument};

/// Fixed instruction sent with every screenshot.
pub const SCREENSHOT_INSTRUCTION: &str = "Please list all the meetings in this calendar \
screenshot. For each meeting, provide the date, exact start time, exact end time, and title \
in the format: 'YYYY-MM-DD, HH:MM - HH:MM, Title'";

/// Read and base64-encode a screenshot.
///
/// A missing file is reported as [`MeetingOrderError::InputMissing`] so the
/// run aborts before any oracle call.
pub fn encode_image(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(MeetingOrderError::input_missing(path));
    }
    let bytes = std::fs::read(path).map_err(|e| MeetingOrderError::io(path, e))?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

/// MIME type for the `data:` URL, by file extension.
fn image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Build the vision request for one screenshot.
pub fn screenshot_request(model: &str, max_tokens: u32, path: &Path) -> Result<ChatRequest> {
    let encoded = encode_image(path)?;
    Ok(ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user_parts(vec![
            ContentPart::text(SCREENSHOT_INSTRUCTION),
            ContentPart::inline_image(image_mime(path), &encoded),
        ])],
        max_tokens,
    })
}

/// Ask the vision model to list the meetings in a screenshot.
///
/// Returns the raw newline-separated text with list bullets stripped; the
/// lines are not validated here.
#[instrument(skip_all, fields(path = %path.display(), model = %model))]
pub async fn extract_meetings(
    client: &OracleClient,
    model: &str,
    max_tokens: u32,
    path: &Path,
) -> Result<String> {
    let request = screenshot_request(model, max_tokens, path)?;
    let completion = client.complete(&request).await?;
    let text = strip_list_markers(&completion.content);

    info!(lines = text.lines().count(), "meetings extracted from screenshot");
    Ok(text)
}

/// Remove leading `- `, `* `, `• `, `1. ` or `1) ` markers from each line.
fn strip_list_markers(text: &str) -> String {
    static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^[ \t]*(?:[-*•]|\d+[.)])[ \t]+").expect("valid regex")
    });
    MARKER_RE.replace_all(text, "").into_owned()
}
