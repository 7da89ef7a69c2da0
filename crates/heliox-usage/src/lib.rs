//! Outcome recording and usage reporting
//!
//! [`OutcomeRecorder`] takes one [`heliox_core::RequestLog`] per request off
//! the hot path and hands batches to a [`heliox_core::RequestLogSink`].
//! [`UsageSummary`] derives per-key usage figures from recorded outcomes.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod recorder;
mod sink;
mod summary;

pub use recorder::{OutcomeRecorder, RecorderSettings};
pub use sink::HttpRequestLogSink;
pub use summary::UsageSummary;
