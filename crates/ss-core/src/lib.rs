//! Shorts Skipper Core Library
//!
//! This crate provides the decision engine for the Shorts Skipper content script.
//! It watches the Shorts feed, reads the like count of the visible item and
//! advances past items that fall below a threshold.
//!
//! # Architecture
//!
//! Everything here is host-independent. The browser (or a simulation) is reached
//! through the traits in [`dom`], and the [`Monitor`] is driven by [`Event`]s:
//! navigation notifications, content changes, fired timers and settings updates.
//! The monitor never sleeps; it asks the host to arm timers and tracks the
//! pending work itself, so cancelling a timer is just forgetting its token.
//!
//! # Modules
//!
//! - `route`: Feed detection and item identity from the location path
//! - `count`: Abbreviated like-count parsing ("1.2K", "3M", "12,345")
//! - `dom`: Host traits for DOM queries, timers, observation and navigation
//! - `extract`: Ordered like-count extraction strategies
//! - `poll`: Retry loop around the extractor with a timeout
//! - `policy`: Skip/keep decision with a consecutive-skip cap
//! - `monitor`: The feed monitor state machine
//! - `report`: Activity reporting to the extension badge
//! - `diagnostics`: Markup dumps for selector maintenance
//! - `sim`: Deterministic in-memory host for tests and replays

pub mod config;
pub mod count;
pub mod diagnostics;
pub mod dom;
pub mod error;
pub mod extract;
pub mod monitor;
pub mod poll;
pub mod policy;
pub mod report;
pub mod route;
pub mod sim;
pub mod types;

/// Prefix carried by every log line, so the console output can be filtered.
pub const TAG: &str = "[YT Shorts Skipper]";

// Re-export commonly used types
pub use config::{ConfigError, MonitorConfig, Settings};
pub use count::{parse_abbreviated, CountError};
pub use dom::{Element, Host, Navigator, Page};
pub use error::HostError;
pub use extract::Extractor;
pub use monitor::{Event, Monitor};
pub use policy::SkipPolicy;
pub use report::{ActivityMessage, ActivityReporter, ActivitySink};
pub use types::{Decision, Evaluation, ItemId, Signal, TimerToken, Verdict};
