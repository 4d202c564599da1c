//! End-to-end reconcile pipeline: capture → normalize → match → recover → export.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use meetingorder_capture::{CalendarSession, CalendarSource, SessionTimeouts, extract_meetings};
use meetingorder_oracle::OracleClient;
use meetingorder_shared::{AppConfig, MatchRecord, MeetingOrderError, Result, RunId};

use crate::normalizer::{self, Normalized};
use crate::recovery::{self, Recovered, RecoveryError, SkippedRecord};
use crate::report;
use crate::request::build_match_request;
use crate::workorders::load_workorders;

/// Configuration for one reconcile run.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Work-order CSV to match against.
    pub workorders_path: PathBuf,
    /// Export destination, overwritten on every run with matches.
    pub output_path: PathBuf,
    /// Model used for the match request.
    pub match_model: String,
    /// Model used to read screenshots.
    pub vision_model: String,
    /// Output token ceiling for both oracle calls.
    pub max_tokens: u32,
    /// Calendar readiness waits.
    pub calendar: SessionTimeouts,
}

impl From<&AppConfig> for ReconcileConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workorders_path: config.paths.workorders.clone(),
            output_path: config.paths.output.clone(),
            match_model: config.oracle.match_model.clone(),
            vision_model: config.oracle.vision_model.clone(),
            max_tokens: config.oracle.max_tokens,
            calendar: SessionTimeouts::from(&config.calendar),
        }
    }
}

/// Where the meetings come from.
#[derive(Debug, Clone)]
pub enum MeetingSource {
    /// A calendar screenshot read by the vision model.
    Screenshot(PathBuf),
    /// A calendar page, live or saved.
    Calendar(CalendarSource),
}

/// How the oracle stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    /// A list was recovered; `repaired` if the truncation repair was needed.
    Recovered { repaired: bool },
    /// Capture produced no meetings, so the match call was not made.
    NoMeetings,
    /// An oracle call failed in transport or returned a non-success status.
    TransportFailed(String),
    /// The oracle answered but no list could be recovered from it.
    Unrecoverable(String),
}

/// Result of a reconcile run.
#[derive(Debug)]
pub struct ReconcileResult {
    pub run_id: RunId,
    /// Recovered matches, in oracle response order.
    pub matches: Vec<MatchRecord>,
    /// Records rejected by the recovery engine.
    pub skipped: Vec<SkippedRecord>,
    /// Meeting lines the normalizer could not read.
    pub dropped_lines: Vec<String>,
    pub outcome: OracleOutcome,
    /// Raw text of the match response, when one was received.
    pub raw_response: Option<String>,
    /// Export path, when matches were written.
    pub exported: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &ReconcileResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &ReconcileResult) {}
}

/// Intermediate state threaded through the stages.
struct Run {
    run_id: RunId,
    started: Instant,
    dropped_lines: Vec<String>,
}

impl Run {
    fn finish(
        self,
        outcome: OracleOutcome,
        recovered: Recovered,
        raw_response: Option<String>,
        exported: Option<PathBuf>,
    ) -> ReconcileResult {
        ReconcileResult {
            run_id: self.run_id,
            matches: recovered.records,
            skipped: recovered.skipped,
            dropped_lines: self.dropped_lines,
            outcome,
            raw_response,
            exported,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Run the full reconcile pipeline once.
///
/// 1. Capture meetings (screenshot via the vision model, or calendar DOM)
/// 2. Normalize to one canonical line per meeting
/// 3. Load work orders
/// 4. Send the match request
/// 5. Recover the match list from the response
/// 6. Export to CSV
///
/// Missing inputs and export I/O failures are returned as errors. Oracle
/// failures end the run with zero matches and are reported in
/// [`ReconcileResult::outcome`].
#[instrument(skip_all, fields(workorders = %config.workorders_path.display()))]
pub async fn reconcile(
    config: &ReconcileConfig,
    source: &MeetingSource,
    oracle: &OracleClient,
    progress: &dyn ProgressReporter,
) -> Result<ReconcileResult> {
    let mut run = Run {
        run_id: RunId::new(),
        started: Instant::now(),
        dropped_lines: Vec::new(),
    };
    info!(run_id = %run.run_id, "starting reconcile run");

    // --- Phase 1: Capture ---
    let normalized = match capture(config, source, oracle, progress).await? {
        Ok(normalized) => normalized,
        Err(outcome) => {
            return Ok(finish(run, outcome, Recovered::default(), None, None, progress));
        }
    };
    run.dropped_lines = normalized.dropped.clone();

    // --- Phase 2: Work orders ---
    progress.phase("Loading work orders");
    let workorders = load_workorders(&config.workorders_path)?;

    if normalized.is_empty() {
        warn!("no meetings captured, skipping match request");
        return Ok(finish(
            run,
            OracleOutcome::NoMeetings,
            Recovered::default(),
            None,
            None,
            progress,
        ));
    }

    // --- Phase 3: Match ---
    progress.phase("Matching meetings to work orders");
    let request = build_match_request(&normalized.text(), &workorders)?
        .into_chat(&config.match_model, config.max_tokens);

    let completion = match oracle.complete(&request).await {
        Ok(completion) => completion,
        Err(e) => {
            let outcome = oracle_failure(&e);
            warn!(error = %e, "match request failed");
            return Ok(finish(run, outcome, Recovered::default(), None, None, progress));
        }
    };

    // --- Phase 4: Recover ---
    progress.phase("Recovering matches");
    let raw = completion.content;
    let recovered = match recovery::recover_matches(&raw) {
        Ok(recovered) => recovered,
        Err(e) => {
            warn_unrecoverable(&e, &raw);
            let outcome = OracleOutcome::Unrecoverable(e.to_string());
            return Ok(finish(run, outcome, Recovered::default(), Some(raw), None, progress));
        }
    };

    // --- Phase 5: Export ---
    progress.phase("Exporting results");
    let exported = report::export_csv(&recovered.records, &config.output_path)?
        .then(|| config.output_path.clone());

    let outcome = OracleOutcome::Recovered {
        repaired: recovered.repaired,
    };
    Ok(finish(run, outcome, recovered, Some(raw), exported, progress))
}

fn finish(
    run: Run,
    outcome: OracleOutcome,
    recovered: Recovered,
    raw_response: Option<String>,
    exported: Option<PathBuf>,
    progress: &dyn ProgressReporter,
) -> ReconcileResult {
    let result = run.finish(outcome, recovered, raw_response, exported);
    progress.done(&result);

    info!(
        run_id = %result.run_id,
        matches = result.matches.len(),
        skipped = result.skipped.len(),
        dropped_lines = result.dropped_lines.len(),
        outcome = ?result.outcome,
        exported = result.exported.is_some(),
        elapsed_ms = result.elapsed.as_millis(),
        "reconcile run complete"
    );
    result
}

/// Produce normalized meetings, or the outcome that ends the run early.
async fn capture(
    config: &ReconcileConfig,
    source: &MeetingSource,
    oracle: &OracleClient,
    progress: &dyn ProgressReporter,
) -> Result<std::result::Result<Normalized, OracleOutcome>> {
    match source {
        MeetingSource::Screenshot(path) => {
            if !path.exists() {
                return Err(MeetingOrderError::input_missing(path));
            }
            progress.phase("Reading screenshot");
            match extract_meetings(oracle, &config.vision_model, config.max_tokens, path).await {
                Ok(text) => Ok(Ok(normalizer::normalize_lines(&text))),
                Err(e @ (MeetingOrderError::Network(_) | MeetingOrderError::Oracle(_))) => {
                    warn!(error = %e, "vision request failed");
                    Ok(Err(oracle_failure(&e)))
                }
                Err(e) => Err(e),
            }
        }
        MeetingSource::Calendar(calendar) => {
            progress.phase("Opening calendar");
            let mut session = CalendarSession::open(calendar.clone(), config.calendar).await?;

            progress.phase("Waiting for calendar");
            let events = if session.wait_for_grid().await {
                progress.phase("Scraping events");
                session.events().await
            } else {
                Vec::new()
            };
            session.close();

            Ok(Ok(normalizer::normalize_events(&events)))
        }
    }
}

fn oracle_failure(error: &MeetingOrderError) -> OracleOutcome {
    match error {
        MeetingOrderError::Network(msg) => OracleOutcome::TransportFailed(msg.clone()),
        other => OracleOutcome::Unrecoverable(other.to_string()),
    }
}

fn warn_unrecoverable(error: &RecoveryError, raw: &str) {
    match error {
        RecoveryError::NoBracket { .. } => {
            warn!(raw = %raw, "oracle response contains no match list")
        }
        RecoveryError::Unparsable { source, text } => {
            warn!(error = %source, repaired = %text, raw = %raw, "oracle match list is unparsable")
        }
    }
}

/// Run the recovery engine over a saved oracle response.
pub fn recover_file(path: &Path) -> Result<Recovered> {
    if !path.exists() {
        return Err(MeetingOrderError::input_missing(path));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| MeetingOrderError::io(path, e))?;
    recovery::recover_matches(&raw).map_err(|e| MeetingOrderError::parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WORKORDERS: &str = "../../../fixtures/csv/workorder.csv";
    const SNAPSHOT: &str = "../../../fixtures/html/owa-week.html";
    const TRUNCATED: &str = "../../../fixtures/oracle/truncated.txt";

    const VISION_LINES: &str = "- 2024-03-04, 09:00 - 09:15, Standup\n\
                                - 2024-03-05, 10:00 - 11:30, Design review\n\
                                - Thursday looks free";

    const MATCHES: &str = r#"Here you go:
[
  {"meeting": "2024-03-04 Standup", "workorder": "WO-1003", "start_time": "2024-03-04T09:00:00", "end_time": "2024-03-04T09:15:00"},
  {"meeting": "2024-03-05 Design review", "workorder": null, "start_time": "2024-03-05T10:00:00", "end_time": "2024-03-05T11:30:00"}
]"#;

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
        done: Mutex<usize>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn done(&self, _result: &ReconcileResult) {
            *self.done.lock().unwrap() += 1;
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
        })
    }

    fn config(dir: &tempfile::TempDir) -> ReconcileConfig {
        ReconcileConfig {
            workorders_path: PathBuf::from(WORKORDERS),
            output_path: dir.path().join("meetingorder.csv"),
            match_model: "gpt-4o-mini".into(),
            vision_model: "gpt-4o".into(),
            max_tokens: 3000,
            calendar: SessionTimeouts {
                grid: Duration::from_millis(200),
                events: Duration::from_millis(200),
                poll_interval: Duration::from_millis(20),
            },
        }
    }

    fn client(server: &MockServer) -> OracleClient {
        let base = Url::parse(&server.uri()).unwrap();
        OracleClient::new(&base, "sk-test", Duration::from_secs(5)).unwrap()
    }

    fn screenshot(dir: &tempfile::TempDir) -> MeetingSource {
        let path = dir.path().join("week.png");
        std::fs::write(&path, b"\x89PNG\r\n").unwrap();
        MeetingSource::Screenshot(path)
    }

    async fn mount_vision(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("image_url"))
            .respond_with(response)
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_match(server: &MockServer, content: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("Given these meetings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(content)))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn screenshot_run_exports_matches() {
        let server = MockServer::start().await;
        mount_vision(&server, ResponseTemplate::new(200).set_body_json(chat_body(VISION_LINES)))
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("2024-03-04: 09:00 - 09:15 - Standup"))
            .and(body_string_contains("WO-1002"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(MATCHES)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let progress = RecordingProgress::default();

        let result = reconcile(&cfg, &screenshot(&dir), &client(&server), &progress)
            .await
            .unwrap();

        assert_eq!(result.outcome, OracleOutcome::Recovered { repaired: false });
        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.matches[0].duration, 0.25);
        assert_eq!(result.matches[1].workorder, None);
        assert_eq!(result.dropped_lines, ["Thursday looks free"]);
        assert_eq!(result.exported.as_deref(), Some(cfg.output_path.as_path()));

        let rows = report::read_export(&cfg.output_path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].workorder, None);

        assert_eq!(*progress.done.lock().unwrap(), 1);
        assert!(progress.phases.lock().unwrap().contains(&"Exporting results".to_string()));
    }

    #[tokio::test]
    async fn missing_screenshot_is_fatal() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let source = MeetingSource::Screenshot(dir.path().join("absent.png"));

        let err = reconcile(&config(&dir), &source, &client(&server), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, MeetingOrderError::InputMissing { .. }));
    }

    #[tokio::test]
    async fn vision_transport_failure_yields_zero_matches() {
        let server = MockServer::start().await;
        mount_vision(&server, ResponseTemplate::new(503).set_body_string("overloaded")).await;
        mount_match(&server, MATCHES, 0).await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let result = reconcile(&cfg, &screenshot(&dir), &client(&server), &SilentProgress)
            .await
            .unwrap();

        assert!(matches!(result.outcome, OracleOutcome::TransportFailed(ref m) if m.contains("503")));
        assert!(result.matches.is_empty());
        assert!(result.exported.is_none());
        assert!(!cfg.output_path.exists());
    }

    #[tokio::test]
    async fn no_meetings_skips_match_request() {
        let server = MockServer::start().await;
        mount_vision(&server, ResponseTemplate::new(200).set_body_json(chat_body("")))
            .await;
        mount_match(&server, MATCHES, 0).await;

        let dir = tempfile::tempdir().unwrap();
        let result = reconcile(&config(&dir), &screenshot(&dir), &client(&server), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.outcome, OracleOutcome::NoMeetings);
        assert!(result.exported.is_none());
    }

    #[tokio::test]
    async fn unreadable_workorders_is_fatal() {
        let server = MockServer::start().await;
        mount_vision(&server, ResponseTemplate::new(200).set_body_json(chat_body(VISION_LINES)))
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.workorders_path = dir.path().join("missing.csv");

        let err = reconcile(&cfg, &screenshot(&dir), &client(&server), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, MeetingOrderError::Io { .. }));
    }

    #[tokio::test]
    async fn prose_only_response_is_unrecoverable() {
        let server = MockServer::start().await;
        mount_vision(&server, ResponseTemplate::new(200).set_body_json(chat_body(VISION_LINES)))
            .await;
        mount_match(&server, "Sorry, I can't match these meetings.", 1).await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let result = reconcile(&cfg, &screenshot(&dir), &client(&server), &SilentProgress)
            .await
            .unwrap();

        assert!(matches!(result.outcome, OracleOutcome::Unrecoverable(_)));
        assert_eq!(
            result.raw_response.as_deref(),
            Some("Sorry, I can't match these meetings.")
        );
        assert!(!cfg.output_path.exists());
    }

    #[tokio::test]
    async fn calendar_snapshot_run_recovers_truncated_response() {
        let server = MockServer::start().await;
        let truncated = std::fs::read_to_string(TRUNCATED).unwrap();
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("Standup"))
            .and(body_string_contains("Design review"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(&truncated)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let source = MeetingSource::Calendar(CalendarSource::Snapshot(PathBuf::from(SNAPSHOT)));

        let result = reconcile(&cfg, &source, &client(&server), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.outcome, OracleOutcome::Recovered { repaired: true });
        assert_eq!(result.matches.len(), 3);
        assert_eq!(report::read_export(&cfg.output_path).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn match_transport_failure_is_reported() {
        let server = MockServer::start().await;
        mount_vision(&server, ResponseTemplate::new(200).set_body_json(chat_body(VISION_LINES)))
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("Given these meetings"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let result = reconcile(&config(&dir), &screenshot(&dir), &client(&server), &SilentProgress)
            .await
            .unwrap();
        assert!(matches!(result.outcome, OracleOutcome::TransportFailed(_)));
        assert!(result.raw_response.is_none());
    }

    #[test]
    fn recover_file_replays_saved_response() {
        let recovered = recover_file(Path::new(TRUNCATED)).unwrap();
        assert!(recovered.repaired);
        assert_eq!(recovered.records.len(), 3);
    }

    #[test]
    fn recover_file_missing_input() {
        let err = recover_file(Path::new("/nonexistent/response.txt")).unwrap_err();
        assert!(matches!(err, MeetingOrderError::InputMissing { .. }));
    }

    #[test]
    fn config_follows_app_config() {
        let app = AppConfig::default();
        let cfg = ReconcileConfig::from(&app);
        assert_eq!(cfg.workorders_path, PathBuf::from("workorder.csv"));
        assert_eq!(cfg.match_model, "gpt-4o-mini");
        assert_eq!(cfg.calendar.grid, Duration::from_secs(30));
    }
}
