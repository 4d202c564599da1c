//! Core reconcile logic for MeetingOrder.
//!
//! This crate turns captured meetings into matched, timed work-order records:
//! normalization, work-order loading, the match request, recovery of the
//! oracle's answer, and the CSV export, tied together by [`pipeline::reconcile`].

pub mod normalizer;
pub mod pipeline;
pub mod recovery;
pub mod report;
pub mod request;
pub mod workorders;
