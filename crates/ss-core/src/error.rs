//! Errors raised by host capabilities.
//!
//! None of these stop the monitor. Callers log them and carry on with a
//! retry, a fallback or a conservative default.

/// Error type for host operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Failed to observe container: {0}")]
    Observe(String),
    #[error("Failed to advance feed: {0}")]
    Navigate(String),
    #[error("Failed to report activity: {0}")]
    Report(String),
    #[error("Failed to arm timer: {0}")]
    Timer(String),
}
