//! Like-count polling
//!
//! The like count renders some time after the item itself. The poller runs
//! one extraction per tick and tells the monitor whether to decide, retry or
//! drop the attempt. It never waits itself; the monitor schedules retries.

use std::time::Duration;

use log::{debug, warn};

use crate::config::MonitorConfig;
use crate::diagnostics;
use crate::dom::Page;
use crate::extract::Extractor;
use crate::route;
use crate::types::{EvaluationAttempt, Signal};
use crate::TAG;

/// Outcome of one poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// The extractor produced a value
    Resolved(Signal),
    /// Nothing yet; tick again after the interval with this attempt
    Retry(EvaluationAttempt),
    /// Gave up waiting; the count is taken as zero
    TimedOut,
    /// The user moved on; no decision for this item
    Abandoned,
}

impl PollStep {
    /// The count to decide on, if the poll is over.
    pub fn count(&self) -> Option<u64> {
        match self {
            PollStep::Resolved(signal) => signal.value(),
            PollStep::TimedOut => Some(0),
            PollStep::Retry(_) | PollStep::Abandoned => None,
        }
    }
}

/// Poll timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
    max_wait: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl Poller {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.poll_interval(), config.poll_max_wait())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one tick for `attempt`.
    pub fn tick<P: Page>(
        &self,
        page: &P,
        extractor: &Extractor<P::Element>,
        attempt: &EvaluationAttempt,
    ) -> PollStep {
        if route::current_item(&page.pathname()).as_ref() != Some(&attempt.item) {
            debug!("{TAG} Item changed during poll, aborting {}", attempt.item);
            return PollStep::Abandoned;
        }

        let signal = extractor.extract(page);
        if let Some(count) = signal.value() {
            debug!("{TAG} Like count for {}: {}", attempt.item, count);
            return PollStep::Resolved(signal);
        }

        if attempt.elapsed >= self.max_wait {
            warn!("{TAG} Like count poll timed out for {} - treating as 0", attempt.item);
            diagnostics::dump_like_button(page);
            return PollStep::TimedOut;
        }

        PollStep::Retry(EvaluationAttempt {
            item: attempt.item.clone(),
            elapsed: attempt.elapsed + self.interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::RENDERER_SELECTOR;
    use crate::sim::{SimElement, SimPage};
    use crate::types::ItemId;

    fn page(path: &str, like: Option<&str>) -> SimPage {
        let mut renderer = SimElement::new(RENDERER_SELECTOR).rect(0.0, 800.0);
        if let Some(text) = like {
            renderer = renderer.child(
                "#like-button yt-formatted-string",
                SimElement::new("yt-formatted-string").text(text),
            );
        }
        SimPage::new(path).with(RENDERER_SELECTOR, renderer)
    }

    fn attempt(id: &str, elapsed_ms: u64) -> EvaluationAttempt {
        EvaluationAttempt {
            item: ItemId::new(id),
            elapsed: Duration::from_millis(elapsed_ms),
        }
    }

    #[test]
    fn test_resolves_immediately() {
        let step = Poller::default().tick(&page("/shorts/a", Some("2K")), &Extractor::default(), &attempt("a", 0));
        assert_eq!(step.count(), Some(2000));
    }

    #[test]
    fn test_retry_advances_elapsed() {
        let step = Poller::default().tick(&page("/shorts/a", None), &Extractor::default(), &attempt("a", 800));
        assert_eq!(step, PollStep::Retry(attempt("a", 1200)));
        assert_eq!(step.count(), None);
    }

    #[test]
    fn test_timeout_is_zero() {
        let poller = Poller::default();
        let extractor = Extractor::default();
        let page = page("/shorts/a", None);

        let mut current = attempt("a", 0);
        let mut ticks = 0;
        let step = loop {
            ticks += 1;
            match poller.tick(&page, &extractor, &current) {
                PollStep::Retry(next) => current = next,
                other => break other,
            }
        };
        assert_eq!(step, PollStep::TimedOut);
        assert_eq!(step.count(), Some(0));
        // 0, 400, ..., 4000
        assert_eq!(ticks, 11);
    }

    #[test]
    fn test_abandoned_on_item_change() {
        let poller = Poller::default();
        let extractor = Extractor::default();
        assert_eq!(
            poller.tick(&page("/shorts/b", Some("5")), &extractor, &attempt("a", 0)),
            PollStep::Abandoned
        );
        assert_eq!(
            poller.tick(&page("/watch", Some("5")), &extractor, &attempt("a", 0)),
            PollStep::Abandoned
        );
    }
}
