//! Match Request Builder.
//!
//! Pure and deterministic: the same meetings and work orders always produce
//! the same payload. No chunking is done; an oversized payload is left for
//! the oracle to reject.

use meetingorder_oracle::{ChatMessage, ChatRequest};
use meetingorder_shared::{Result, WorkOrderRecord};

/// Fixed system instruction describing the expected output shape.
pub const MATCH_INSTRUCTION: &str = "You are a helpful assistant that matches meetings with \
work orders. Please provide your response as a list of dictionaries, where each dictionary \
contains 'meeting', 'workorder', 'start_time', and 'end_time' keys. The 'meeting' value should \
be a string containing the date and title of the meeting. The 'start_time' and 'end_time' \
should be in ISO format (YYYY-MM-DDTHH:MM:SS).";

/// The two-part oracle payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRequest {
    pub system: String,
    pub user: String,
}

impl MatchRequest {
    /// Wrap the payload for a chat-completions call.
    pub fn into_chat(self, model: &str, max_tokens: u32) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::system(self.system), ChatMessage::user(self.user)],
            max_tokens,
        }
    }
}

/// Compose the match request from normalized meeting text and work orders.
///
/// An encoding failure is returned rather than sending an empty work-order list.
pub fn build_match_request(meetings: &str, workorders: &[WorkOrderRecord]) -> Result<MatchRequest> {
    let workorders_json = serde_json::to_string_pretty(workorders)?;

    Ok(MatchRequest {
        system: MATCH_INSTRUCTION.to_string(),
        user: format!(
            "Given these meetings:\n{meetings}\n\n\
             And these workorders:\n{workorders_json}\n\n\
             Please match each meeting with the most logical workorder. If there's no matching \
             workorder, use null for the workorder value. Include the exact start and end times \
             for each meeting in ISO format."
        ),
    })
}
