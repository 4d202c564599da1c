//! Meeting capture collaborators.
//!
//! This crate provides the two ways meetings enter the pipeline:
//! - [`vision`]: a calendar screenshot read by the oracle's vision model
//! - [`dom`] + [`session`]: event elements scraped from a calendar page

pub mod dom;
pub mod session;
pub mod vision;

pub use dom::{ScrapedEvent, has_calendar_grid, parse_accessible_name, scrape_events};
pub use session::{CalendarSession, CalendarSource, SessionTimeouts};
pub use vision::{SCREENSHOT_INSTRUCTION, encode_image, extract_meetings, screenshot_request};
