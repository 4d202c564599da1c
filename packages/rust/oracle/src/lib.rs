//! Client for the external matching oracle.
//!
//! The oracle is a chat-completions style HTTP API. meetingorder uses it twice
//! per screenshot run (read the screenshot, then match meetings to work
//! orders) and once per scrape run. Every call is a single attempt: transport
//! failures are reported to the caller, never retried here.

mod protocol;

use std::time::{Duration, Instant};

use meetingorder_shared::{MeetingOrderError, OracleConfig, Result};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use protocol::{ChatMessage, ChatRequest, ContentPart, ImageUrl, MessageContent, Role, Usage};

use protocol::ChatResponse;

/// User-Agent string for oracle requests.
const USER_AGENT: &str = concat!("meetingorder/", env!("CARGO_PKG_VERSION"));

/// How much of an unexpected response body is echoed into errors.
const BODY_EXCERPT_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// The text answer of one oracle call.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Free-form message content of the first choice.
    pub content: String,
    /// Why generation stopped (`"stop"`, `"length"`, ...), when reported.
    pub finish_reason: Option<String>,
    /// Token accounting, when reported.
    pub usage: Option<Usage>,
}

impl Completion {
    /// True when the oracle stopped because it hit the token ceiling, which
    /// usually means the structured payload is cut off mid-record.
    pub fn hit_token_limit(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

// ---------------------------------------------------------------------------
// OracleClient
// ---------------------------------------------------------------------------

/// HTTP client bound to one oracle endpoint and credential.
#[derive(Debug, Clone)]
pub struct OracleClient {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl OracleClient {
    /// Build a client posting to `{base_url}/chat/completions`.
    pub fn new(base_url: &Url, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = completions_endpoint(base_url)?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                MeetingOrderError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// Build a client from the `[oracle]` config section and a resolved key.
    pub fn from_config(config: &OracleConfig, api_key: impl Into<String>) -> Result<Self> {
        Self::new(
            &config.base_url()?,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// The resolved completions endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send one chat request and return the first choice's text.
    #[instrument(skip_all, fields(model = %request.model, messages = request.messages.len()))]
    pub async fn complete(&self, request: &ChatRequest) -> Result<Completion> {
        let started = Instant::now();

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| MeetingOrderError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            MeetingOrderError::Network(format!("{}: failed to read body: {e}", self.endpoint))
        })?;

        if !status.is_success() {
            return Err(MeetingOrderError::Network(format!(
                "{}: HTTP {status}: {}",
                self.endpoint,
                excerpt(&body)
            )));
        }

        debug!(body = %body, "raw oracle response");

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            MeetingOrderError::Oracle(format!(
                "invalid response envelope: {e} (got: {})",
                excerpt(&body)
            ))
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            MeetingOrderError::Oracle(format!("response has no choices (got: {})", excerpt(&body)))
        })?;

        let content = choice.message.content.ok_or_else(|| {
            MeetingOrderError::Oracle(format!(
                "first choice has no message content (got: {})",
                excerpt(&body)
            ))
        })?;

        let completion = Completion {
            content,
            finish_reason: choice.finish_reason,
            usage: parsed.usage,
        };

        if completion.hit_token_limit() {
            warn!(
                max_tokens = request.max_tokens,
                "oracle stopped at the token ceiling, response is likely truncated"
            );
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            tokens_in = completion.usage.map(|u| u.prompt_tokens),
            tokens_out = completion.usage.map(|u| u.completion_tokens),
            chars = completion.content.len(),
            "oracle call complete"
        );

        Ok(completion)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Append `chat/completions` to the base URL, keeping any path prefix (`/v1`).
fn completions_endpoint(base_url: &Url) -> Result<Url> {
    let raw = format!("{}/chat/completions", base_url.as_str().trim_end_matches('/'));
    Url::parse(&raw)
        .map_err(|e| MeetingOrderError::config(format!("invalid oracle endpoint '{raw}': {e}")))
}

/// First few hundred characters of a body, on a char boundary.
fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
