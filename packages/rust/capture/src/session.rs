//! Exclusively-owned calendar page session.
//!
//! A session reads the rendered calendar either from a saved page snapshot
//! or from a live URL. Waits for UI readiness are bounded: when a timeout
//! elapses the session carries on with whatever the page holds, which may be
//! no events at all. Callers must [`CalendarSession::close`] the session when
//! the run ends, whatever its outcome.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use meetingorder_shared::{CalendarConfig, MeetingOrderError, Result};
use reqwest::Client;
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dom::{self, ScrapedEvent};

/// User-Agent string for live calendar fetches.
const USER_AGENT: &str = concat!("meetingorder/", env!("CARGO_PKG_VERSION"));

/// Where the rendered calendar comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarSource {
    /// A saved HTML snapshot of the calendar week view.
    Snapshot(PathBuf),
    /// A live page, re-fetched until it renders or the wait times out.
    Live(Url),
}

impl std::fmt::Display for CalendarSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Snapshot(path) => write!(f, "snapshot {}", path.display()),
            Self::Live(url) => write!(f, "{url}"),
        }
    }
}

/// Readiness wait bounds.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// Maximum wait for the calendar grid.
    pub grid: Duration,
    /// Maximum wait for event elements once the grid is up.
    pub events: Duration,
    /// Delay between polls of a live page.
    pub poll_interval: Duration,
}

impl From<&CalendarConfig> for SessionTimeouts {
    fn from(config: &CalendarConfig) -> Self {
        Self {
            grid: Duration::from_secs(config.grid_timeout_secs),
            events: Duration::from_secs(config.event_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// An open calendar page.
pub struct CalendarSession {
    source: CalendarSource,
    client: Option<Client>,
    timeouts: SessionTimeouts,
    page_source: String,
}

impl CalendarSession {
    /// Acquire the session. A snapshot is read once here; a live page is
    /// fetched lazily by the readiness waits.
    #[instrument(skip_all, fields(source = %source))]
    pub async fn open(source: CalendarSource, timeouts: SessionTimeouts) -> Result<Self> {
        let (client, page_source) = match &source {
            CalendarSource::Snapshot(path) => {
                if !path.exists() {
                    return Err(MeetingOrderError::input_missing(path));
                }
                let html = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| MeetingOrderError::io(path, e))?;
                (None, html)
            }
            CalendarSource::Live(_) => {
                let client = Client::builder()
                    .user_agent(USER_AGENT)
                    .timeout(timeouts.grid.max(Duration::from_secs(1)))
                    .build()
                    .map_err(|e| {
                        MeetingOrderError::Network(format!("failed to build HTTP client: {e}"))
                    })?;
                (Some(client), String::new())
            }
        };

        info!("calendar session opened");
        Ok(Self {
            source,
            client,
            timeouts,
            page_source,
        })
    }

    /// Wait until the calendar grid is present.
    ///
    /// Returns `false` when the wait timed out; the session stays usable.
    pub async fn wait_for_grid(&mut self) -> bool {
        let ready = self
            .poll_until(self.timeouts.grid, |html| {
                dom::has_calendar_grid(&Html::parse_document(html))
            })
            .await;

        if ready {
            info!("calendar grid detected");
        } else {
            warn!(
                timeout_secs = self.timeouts.grid.as_secs(),
                "timed out waiting for calendar grid"
            );
        }
        ready
    }

    /// Scrape the event elements, waiting briefly for them to appear.
    pub async fn events(&mut self) -> Vec<ScrapedEvent> {
        let found = self
            .poll_until(self.timeouts.events, |html| {
                !dom::scrape_events(&Html::parse_document(html)).is_empty()
            })
            .await;

        if !found {
            warn!("no calendar event elements found");
        }

        let events = dom::scrape_events(&Html::parse_document(&self.page_source));
        info!(count = events.len(), "calendar events scraped");
        events
    }

    /// Release the session.
    pub fn close(self) {
        info!(source = %self.source, "calendar session closed");
    }

    /// Re-check `ready` against the page until it holds or `timeout` elapses.
    /// Snapshots are checked exactly once.
    async fn poll_until(&mut self, timeout: Duration, ready: impl Fn(&str) -> bool) -> bool {
        let url = match &self.source {
            CalendarSource::Snapshot(_) => return ready(&self.page_source),
            CalendarSource::Live(url) => url.clone(),
        };

        let started = Instant::now();
        loop {
            match self.fetch(&url).await {
                Ok(html) => self.page_source = html,
                Err(e) => debug!(error = %e, "calendar page not available yet"),
            }

            if ready(&self.page_source) {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let Some(client) = &self.client else {
            return Err(MeetingOrderError::Capture("session has no HTTP client".into()));
        };

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MeetingOrderError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MeetingOrderError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| MeetingOrderError::Network(format!("{url}: failed to read body: {e}")))
    }
}
