//! Skip/keep policy
//!
//! Items below the threshold are skipped, but never more than
//! `max_consecutive_skips` in a row: when extraction is failing across the
//! board, or the whole feed is unpopular, the cap stops runaway navigation.

use log::{info, warn};

use crate::config::MAX_CONSECUTIVE_SKIPS;
use crate::dom::Navigator;
use crate::types::{Decision, ItemId, Verdict};
use crate::TAG;

/// Skip policy with a consecutive-skip cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipPolicy {
    max_consecutive_skips: u32,
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self::new(MAX_CONSECUTIVE_SKIPS)
    }
}

impl SkipPolicy {
    pub fn new(max_consecutive_skips: u32) -> Self {
        Self { max_consecutive_skips }
    }

    pub fn max_consecutive_skips(&self) -> u32 {
        self.max_consecutive_skips
    }

    /// Decide the fate of `item` given its like count.
    pub fn decide(&self, item: &ItemId, count: u64, threshold: u64, consecutive_skips: u32) -> Verdict {
        if count >= threshold {
            info!("{TAG} KEEP {} ({} >= {})", item, count, threshold);
            return Verdict {
                decision: Decision::Keep,
                consecutive_skips: 0,
                cap_tripped: false,
            };
        }

        if consecutive_skips >= self.max_consecutive_skips {
            info!("{TAG} Skip cap reached ({}). Keeping {}.", self.max_consecutive_skips, item);
            return Verdict {
                decision: Decision::Keep,
                consecutive_skips: 0,
                cap_tripped: true,
            };
        }

        info!("{TAG} SKIP {} ({} < {})", item, count, threshold);
        Verdict {
            decision: Decision::Skip,
            consecutive_skips: consecutive_skips + 1,
            cap_tripped: false,
        }
    }

    /// Carry out a verdict. Skips advance the feed; the resulting content
    /// change drives the next evaluation.
    pub fn enact(&self, verdict: &Verdict, navigator: &mut dyn Navigator) {
        if verdict.decision != Decision::Skip {
            return;
        }
        if let Err(e) = navigator.advance() {
            warn!("{TAG} {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;

    #[derive(Default)]
    struct RecordingNavigator {
        advances: u32,
        fail: bool,
    }

    impl Navigator for RecordingNavigator {
        fn advance(&mut self) -> Result<(), HostError> {
            self.advances += 1;
            if self.fail {
                return Err(HostError::Navigate("detached".to_string()));
            }
            Ok(())
        }
    }

    fn item() -> ItemId {
        ItemId::new("abc")
    }

    #[test]
    fn test_skip_iff_below_threshold() {
        let policy = SkipPolicy::default();
        for threshold in [0u64, 1, 999, 1000, 1_000_000] {
            for count in [0u64, 1, 500, 999, 1000, 1001, 2_000_000] {
                for skips in [0u32, 5, 19] {
                    let verdict = policy.decide(&item(), count, threshold, skips);
                    let expected = if count < threshold { Decision::Skip } else { Decision::Keep };
                    assert_eq!(verdict.decision, expected, "count={count} threshold={threshold}");
                }
            }
        }
    }

    #[test]
    fn test_counter_updates() {
        let policy = SkipPolicy::default();
        assert_eq!(policy.decide(&item(), 10, 1000, 3).consecutive_skips, 4);
        assert_eq!(policy.decide(&item(), 5000, 1000, 3).consecutive_skips, 0);
    }

    #[test]
    fn test_cap_trip() {
        let policy = SkipPolicy::default();
        let verdict = policy.decide(&item(), 0, 1000, 20);
        assert_eq!(verdict.decision, Decision::Keep);
        assert_eq!(verdict.consecutive_skips, 0);
        assert!(verdict.cap_tripped);

        let verdict = policy.decide(&item(), 0, 1000, 19);
        assert_eq!(verdict.decision, Decision::Skip);
        assert_eq!(verdict.consecutive_skips, 20);
    }

    #[test]
    fn test_sequence_trace() {
        let policy = SkipPolicy::default();
        let mut skips = 0;
        let mut decisions = Vec::new();
        let mut trace = Vec::new();
        for count in [500, 2000, 999, 1000] {
            let verdict = policy.decide(&item(), count, 1000, skips);
            skips = verdict.consecutive_skips;
            decisions.push(verdict.decision);
            trace.push(skips);
        }
        assert_eq!(decisions, vec![Decision::Skip, Decision::Keep, Decision::Skip, Decision::Keep]);
        assert_eq!(trace, vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_enact() {
        let policy = SkipPolicy::default();
        let mut navigator = RecordingNavigator::default();

        policy.enact(&policy.decide(&item(), 5000, 1000, 0), &mut navigator);
        assert_eq!(navigator.advances, 0);

        policy.enact(&policy.decide(&item(), 5, 1000, 0), &mut navigator);
        assert_eq!(navigator.advances, 1);

        // Navigation failures are swallowed
        navigator.fail = true;
        policy.enact(&policy.decide(&item(), 5, 1000, 0), &mut navigator);
        assert_eq!(navigator.advances, 2);
    }
}
