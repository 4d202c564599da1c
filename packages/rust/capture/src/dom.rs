//! Calendar DOM scraping.
//!
//! Calendar web UIs expose each event as a button whose accessible name
//! reads like `"Title, 9:00 AM to 9:30 AM, Monday, March 4, 2024, ..."`.
//! The first comma-separated segment is taken as the title and the rest is
//! kept verbatim as free-form details for the oracle to interpret.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::debug;

static GRID_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[role='grid']").expect("valid selector"));

static EVENT_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[role='button'][aria-label]").expect("valid selector")
});

/// One calendar event as read from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedEvent {
    /// First segment of the accessible name.
    pub title: String,
    /// Remaining segments rejoined with `", "`. No structure is guaranteed.
    pub details: String,
}

/// True once the calendar grid has rendered.
pub fn has_calendar_grid(doc: &Html) -> bool {
    doc.select(&GRID_SEL).next().is_some()
}

/// Collect every event button with a usable accessible name, in document order.
pub fn scrape_events(doc: &Html) -> Vec<ScrapedEvent> {
    let events: Vec<ScrapedEvent> = doc
        .select(&EVENT_SEL)
        .filter_map(|el| el.value().attr("aria-label"))
        .filter_map(|label| {
            let event = parse_accessible_name(label);
            if event.is_none() {
                debug!(label, "skipping element without event details");
            }
            event
        })
        .collect();

    debug!(count = events.len(), "scraped calendar events");
    events
}

/// Split an accessible name into title and details.
///
/// Returns `None` for empty names and names with a single segment
/// (toolbar buttons such as "New event").
pub fn parse_accessible_name(label: &str) -> Option<ScrapedEvent> {
    let label = label.trim();
    let (title, details) = label.split_once(", ")?;
    if title.is_empty() || details.is_empty() {
        return None;
    }
    Some(ScrapedEvent {
        title: title.to_string(),
        details: details.to_string(),
    })
}
