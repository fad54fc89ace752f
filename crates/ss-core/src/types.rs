//! Core type definitions for Shorts Skipper
//!
//! These types flow between the extractor, the poller, the policy and the
//! feed monitor.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

// =============================================================================
// Item Identity
// =============================================================================

/// Stable identity of a feed item, taken from the location path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Timer Tokens
// =============================================================================

/// Cancellation token for one armed timer.
///
/// Tokens are never reused within a monitor, so a token that is no longer in
/// the monitor's task table belongs to a cancelled or superseded timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Popularity Signal
// =============================================================================

/// Which tier of the extractor produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Text of a known like-count element
    Structural,
    /// Number inside an accessible label
    Labelled,
}

/// Where a like count was read from (for logging).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub tier: Tier,
    pub selector: String,
    pub text: String,
}

/// Result of one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A like count was parsed
    Counted { value: u64, source: Source },
    /// A like element exists but shows no number yet ("" or "Like")
    Uninitialized { source: Source },
    /// Like elements exist but none of their texts parsed
    Ambiguous,
    /// Nothing like-related was found
    Absent,
}

impl Signal {
    /// The popularity value, if this signal resolves the poll.
    ///
    /// Uninitialized and ambiguous markup both count as zero likes.
    pub fn value(&self) -> Option<u64> {
        match self {
            Signal::Counted { value, .. } => Some(*value),
            Signal::Uninitialized { .. } | Signal::Ambiguous => Some(0),
            Signal::Absent => None,
        }
    }
}

// =============================================================================
// Evaluation State
// =============================================================================

/// One in-flight poll for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationAttempt {
    pub item: ItemId,
    pub elapsed: Duration,
}

impl EvaluationAttempt {
    pub fn new(item: ItemId) -> Self {
        Self {
            item,
            elapsed: Duration::ZERO,
        }
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// What to do with the current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Skip,
    Keep,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Skip => f.write_str("SKIP"),
            Decision::Keep => f.write_str("KEEP"),
        }
    }
}

/// A decision together with the updated consecutive-skip counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub decision: Decision,
    pub consecutive_skips: u32,
    /// The item was below threshold but kept because the skip cap was hit
    pub cap_tripped: bool,
}

/// How the like count for an evaluation was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The extractor produced a value
    Extracted,
    /// The poll ran out of time and fell back to zero
    TimedOut,
}

/// A completed evaluation of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub item: ItemId,
    pub count: u64,
    pub threshold: u64,
    pub resolution: Resolution,
    pub verdict: Verdict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_value() {
        let source = Source {
            tier: Tier::Structural,
            selector: "#like-button yt-formatted-string".to_string(),
            text: "1.2K".to_string(),
        };
        assert_eq!(Signal::Counted { value: 1200, source: source.clone() }.value(), Some(1200));
        assert_eq!(Signal::Uninitialized { source }.value(), Some(0));
        assert_eq!(Signal::Ambiguous.value(), Some(0));
        assert_eq!(Signal::Absent.value(), None);
    }

    #[test]
    fn test_item_id_display() {
        let id = ItemId::new("abc_-123");
        assert_eq!(id.to_string(), "abc_-123");
        assert_eq!(id.as_str(), "abc_-123");
    }
}
