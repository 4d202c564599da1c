//! Shared types, error model, and configuration for meetingorder.
//!
//! This crate is the foundation depended on by all other meetingorder crates.
//! It provides:
//! - [`MeetingOrderError`], the unified error type
//! - Domain types ([`MeetingRecord`], [`WorkOrderRecord`], [`MatchRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading, credential resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CalendarConfig, OracleConfig, PathsConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{MeetingOrderError, Result};
pub use types::{MatchRecord, MeetingRecord, NO_WORKORDER_LABEL, RunId, WorkOrderRecord};
