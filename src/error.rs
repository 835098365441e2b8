//! Failure categories of a report run.
//!
//! Each stage tags its own failures (bad config, sales backend or quote
//! service, workbook rendering, mail delivery) with a `ReportError`; callers
//! layer `anyhow` context on top, so the dispatcher's `{:#}` log line reads
//! from the run step down to the root cause.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("config error: {0}")]
    Config(String),

    /// HTTP transport, status or body failure talking to a remote service
    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("delivery error: {0}")]
    Delivery(String),
}

pub type Result<T> = anyhow::Result<T>;
