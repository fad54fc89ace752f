//! Feed Monitor
//!
//! The state machine that ties everything together:
//!
//! ```text
//!              RouteChanged (on feed)            container found
//!   Inactive ─────────────────────────▶ Discovering ───────────────▶ Active
//!      ▲                                    │  retry every 500ms        │
//!      │         retries exhausted          │  (10 retries)             │ ContentChanged:
//!      ├────────────────────────────────────┘                           │ restart settle timer
//!      │                  RouteChanged (off feed)                       │
//!      └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! While active, every content change restarts an 800ms settle timer, so a
//! burst of changes (the feed animating after a skip) collapses into a single
//! evaluation. An evaluation polls the like count of the current item, which
//! is never evaluated twice in a row, and hands it to the [`SkipPolicy`].
//!
//! All waiting goes through timers armed on the [`Host`]. Each timer carries a
//! [`TimerToken`]; the monitor keeps the task for every armed token and drops
//! it on cancellation, so a timer that fires late for a cancelled task does
//! nothing.

use std::collections::BTreeMap;
use std::mem;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::diagnostics;
use crate::dom::{Element, Host, Navigator, Page};
use crate::extract::Extractor;
use crate::poll::{PollStep, Poller};
use crate::policy::SkipPolicy;
use crate::report::{ActivityReporter, ActivitySink};
use crate::route;
use crate::types::{Evaluation, EvaluationAttempt, ItemId, Resolution, TimerToken};
use crate::TAG;

// =============================================================================
// Events and Tasks
// =============================================================================

/// Input to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The page finished an in-app navigation (or the script just started)
    RouteChanged,
    /// The observed container reported structural changes
    ContentChanged,
    /// A timer armed through [`Host::set_timer`] elapsed
    Timer(TimerToken),
    /// The stored threshold changed
    ThresholdChanged(u64),
}

/// Work attached to an armed timer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Task {
    Discover { attempt: u32 },
    Evaluate,
    Poll(EvaluationAttempt),
}

/// Armed timers and the work they carry.
#[derive(Debug, Default)]
struct Timers {
    next: u64,
    tasks: BTreeMap<TimerToken, Task>,
}

impl Timers {
    fn schedule<H: Host>(&mut self, host: &mut H, delay: Duration, task: Task) -> Option<TimerToken> {
        let token = TimerToken(self.next);
        self.next += 1;

        match host.set_timer(token, delay) {
            Ok(()) => {
                self.tasks.insert(token, task);
                Some(token)
            }
            Err(e) => {
                warn!("{TAG} {}", e);
                None
            }
        }
    }

    fn cancel<H: Host>(&mut self, host: &mut H, token: TimerToken) {
        if self.tasks.remove(&token).is_some() {
            host.clear_timer(token);
        }
    }

    /// Claim the task of a fired timer.
    fn take<H: Host>(&mut self, host: &mut H, token: TimerToken) -> Option<Task> {
        let task = self.tasks.remove(&token)?;
        host.clear_timer(token);
        Some(task)
    }

    fn cancel_all<H: Host>(&mut self, host: &mut H) {
        for token in mem::take(&mut self.tasks).into_keys() {
            host.clear_timer(token);
        }
    }
}

// =============================================================================
// State
// =============================================================================

/// Lifecycle of the monitor.
///
/// Only `Active` holds a subscription, so a subscription exists exactly while
/// the monitor is active.
enum Lifecycle<S> {
    Inactive,
    /// Looking for the feed container; a retry timer may be armed
    Discovering,
    Active { subscription: S },
}

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Inactive,
    Discovering,
    Active,
}

struct MonitorState<S> {
    lifecycle: Lifecycle<S>,
    last_item: Option<ItemId>,
    consecutive_skips: u32,
    pending_evaluation: Option<TimerToken>,
}

impl<S> Default for MonitorState<S> {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::Inactive,
            last_item: None,
            consecutive_skips: 0,
            pending_evaluation: None,
        }
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// The feed monitor.
pub struct Monitor<H: Host> {
    host: H,
    config: MonitorConfig,
    extractor: Extractor<H::Element>,
    poller: Poller,
    policy: SkipPolicy,
    navigator: Box<dyn Navigator>,
    reporter: ActivityReporter,
    threshold: u64,
    state: MonitorState<H::Subscription>,
    timers: Timers,
}

impl<H: Host> Monitor<H> {
    /// Create an inactive monitor. Nothing happens until the first
    /// [`Event::RouteChanged`].
    pub fn new(
        host: H,
        config: MonitorConfig,
        navigator: Box<dyn Navigator>,
        sink: Box<dyn ActivitySink>,
    ) -> Self {
        Self {
            host,
            extractor: Extractor::default(),
            poller: Poller::from_config(&config),
            policy: SkipPolicy::new(config.max_consecutive_skips),
            navigator,
            reporter: ActivityReporter::new(sink),
            threshold: config.default_threshold,
            config,
            state: MonitorState::default(),
            timers: Timers::default(),
        }
    }

    /// Replace the like-count extractor.
    pub fn with_extractor(mut self, extractor: Extractor<H::Element>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Process one event. Returns the evaluation it completed, if any.
    pub fn handle(&mut self, event: Event) -> Option<Evaluation> {
        match event {
            Event::RouteChanged => {
                self.on_route_change();
                None
            }
            Event::ContentChanged => {
                if self.phase() == Phase::Active {
                    self.schedule_evaluation();
                }
                None
            }
            Event::Timer(token) => self.on_timer(token),
            Event::ThresholdChanged(threshold) => {
                info!("{TAG} Threshold updated: {}", threshold);
                self.threshold = threshold;
                None
            }
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state.lifecycle {
            Lifecycle::Inactive => Phase::Inactive,
            Lifecycle::Discovering => Phase::Discovering,
            Lifecycle::Active { .. } => Phase::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase() == Phase::Active
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn consecutive_skips(&self) -> u32 {
        self.state.consecutive_skips
    }

    pub fn last_item(&self) -> Option<&ItemId> {
        self.state.last_item.as_ref()
    }

    /// Whether an evaluation is waiting for the page to settle.
    pub fn evaluation_pending(&self) -> bool {
        self.state.pending_evaluation.is_some()
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.tasks.len()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn on_route_change(&mut self) {
        let path = self.host.pathname();
        info!("{TAG} Route change: {}", path);

        if route::is_feed(&path) {
            self.activate();
        } else {
            self.deactivate();
        }
    }

    fn activate(&mut self) {
        if !matches!(self.state.lifecycle, Lifecycle::Inactive) {
            return;
        }
        info!("{TAG} Activating...");
        self.state.lifecycle = Lifecycle::Discovering;
        self.discover(0);
    }

    fn discover(&mut self, attempt: u32) {
        if !matches!(self.state.lifecycle, Lifecycle::Discovering) {
            return;
        }
        if !route::is_feed(&self.host.pathname()) {
            self.state.lifecycle = Lifecycle::Inactive;
            return;
        }

        let found = self.config.container_selectors.iter().find_map(|selector| {
            self.host
                .query(selector)
                .map(|container| (selector.clone(), container))
        });

        if let Some((selector, container)) = found {
            info!("{TAG} Container found: {}", selector);
            match self.host.observe(&container) {
                Ok(subscription) => {
                    info!("{TAG} Observer started on {}", container.tag_name());
                    self.state.lifecycle = Lifecycle::Active { subscription };
                    self.schedule_evaluation();
                    self.reporter.report(true);
                    return;
                }
                Err(e) => warn!("{TAG} {}", e),
            }
        }

        let max_retries = self.config.discovery_max_retries;
        if attempt < max_retries {
            info!("{TAG} Container not ready, retry {} / {}", attempt + 1, max_retries);
            let delay = self.config.discovery_interval();
            let retry = Task::Discover { attempt: attempt + 1 };
            if self.timers.schedule(&mut self.host, delay, retry).is_none() {
                self.state.lifecycle = Lifecycle::Inactive;
            }
        } else {
            warn!("{TAG} No container found after retries.");
            diagnostics::dump_page(&self.host);
            self.state.lifecycle = Lifecycle::Inactive;
        }
    }

    fn deactivate(&mut self) {
        let lifecycle = mem::replace(&mut self.state.lifecycle, Lifecycle::Inactive);
        if let Lifecycle::Active { subscription } = lifecycle {
            info!("{TAG} Deactivating.");
            self.host.disconnect(subscription);
        }

        self.timers.cancel_all(&mut self.host);
        self.state.pending_evaluation = None;
        self.state.last_item = None;
        self.state.consecutive_skips = 0;
        self.reporter.report(false);
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Restart the settle timer.
    fn schedule_evaluation(&mut self) {
        if let Some(token) = self.state.pending_evaluation.take() {
            self.timers.cancel(&mut self.host, token);
        }
        let delay = self.config.settle_delay();
        self.state.pending_evaluation = self.timers.schedule(&mut self.host, delay, Task::Evaluate);
    }

    fn on_timer(&mut self, token: TimerToken) -> Option<Evaluation> {
        let Some(task) = self.timers.take(&mut self.host, token) else {
            debug!("{TAG} Ignoring stale timer {}", token);
            return None;
        };

        match task {
            Task::Discover { attempt } => {
                self.discover(attempt);
                None
            }
            Task::Evaluate => {
                if self.state.pending_evaluation == Some(token) {
                    self.state.pending_evaluation = None;
                }
                self.evaluate_current()
            }
            Task::Poll(attempt) => self.poll(attempt),
        }
    }

    fn evaluate_current(&mut self) -> Option<Evaluation> {
        let item = route::current_item(&self.host.pathname())?;
        if self.state.last_item.as_ref() == Some(&item) {
            return None;
        }

        info!("{TAG} --- Processing short: {}", item);
        self.state.last_item = Some(item.clone());
        self.poll(EvaluationAttempt::new(item))
    }

    fn poll(&mut self, attempt: EvaluationAttempt) -> Option<Evaluation> {
        // A newer evaluation owns the counters now
        if self.state.last_item.as_ref() != Some(&attempt.item) {
            debug!("{TAG} Poll for {} superseded, aborting", attempt.item);
            return None;
        }

        match self.poller.tick(&self.host, &self.extractor, &attempt) {
            PollStep::Resolved(signal) => {
                let count = signal.value()?;
                Some(self.conclude(attempt.item, count, Resolution::Extracted))
            }
            PollStep::TimedOut => Some(self.conclude(attempt.item, 0, Resolution::TimedOut)),
            PollStep::Retry(next) => {
                let delay = self.poller.interval();
                let item = next.item.clone();
                if self.timers.schedule(&mut self.host, delay, Task::Poll(next)).is_none() {
                    // Let the next content change evaluate this item again
                    debug!("{TAG} Poll for {} dropped", item);
                    self.state.last_item = None;
                }
                None
            }
            PollStep::Abandoned => None,
        }
    }

    fn conclude(&mut self, item: ItemId, count: u64, resolution: Resolution) -> Evaluation {
        let verdict = self
            .policy
            .decide(&item, count, self.threshold, self.state.consecutive_skips);
        self.state.consecutive_skips = verdict.consecutive_skips;
        self.policy.enact(&verdict, self.navigator.as_mut());

        Evaluation {
            item,
            count,
            threshold: self.threshold,
            resolution,
            verdict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONTAINER_SELECTORS;
    use crate::sim::{SimItem, Simulation};
    use crate::types::Decision;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn counted(ids_and_counts: &[(&str, u64)]) -> Vec<SimItem> {
        ids_and_counts
            .iter()
            .map(|(id, count)| SimItem::with_count(*id, *count))
            .collect()
    }

    #[test]
    fn test_off_feed_start_reports_inactive() {
        let mut sim = Simulation::new(MonitorConfig::default(), counted(&[("a", 5)]));
        sim.navigate("/");
        assert_eq!(sim.monitor().phase(), Phase::Inactive);
        assert_eq!(sim.reports(), vec![false]);
        assert_eq!(sim.query_count(CONTAINER_SELECTORS[0]), 0);
    }

    #[test]
    fn test_activation_is_idempotent() {
        let mut sim = Simulation::new(MonitorConfig::default(), counted(&[("a", 5000)]));
        sim.start();
        sim.route_changed();
        sim.route_changed();

        assert_eq!(sim.monitor().phase(), Phase::Active);
        assert_eq!(sim.observe_count(), 1);
        assert_eq!(sim.query_count(CONTAINER_SELECTORS[0]), 1);
        assert_eq!(sim.reports(), vec![true]);
    }

    #[test]
    fn test_activation_while_discovering_is_idempotent() {
        let mut sim = Simulation::new(MonitorConfig::default(), counted(&[("a", 5000)]))
            .with_container_delay(ms(1200));
        sim.start();
        sim.route_changed();
        assert_eq!(sim.monitor().phase(), Phase::Discovering);
        assert_eq!(sim.monitor().pending_timers(), 1);

        sim.advance(ms(1500));
        assert_eq!(sim.monitor().phase(), Phase::Active);
        assert_eq!(sim.observe_count(), 1);
        // Attempts at 0, 500, 1000 and 1500ms
        assert_eq!(sim.query_count(CONTAINER_SELECTORS[0]), 4);
    }

    #[test]
    fn test_discovery_gives_up() {
        let mut sim = Simulation::new(MonitorConfig::default(), counted(&[("a", 5)])).without_container();
        sim.start();
        sim.advance(ms(10_000));

        assert_eq!(sim.monitor().phase(), Phase::Inactive);
        assert_eq!(sim.query_count(CONTAINER_SELECTORS[0]), 11);
        assert_eq!(sim.monitor().pending_timers(), 0);
        assert!(sim.reports().is_empty());
        assert_eq!(sim.observe_count(), 0);

        // Re-entering the feed starts a fresh discovery
        sim.route_changed();
        assert_eq!(sim.query_count(CONTAINER_SELECTORS[0]), 12);
    }

    #[test]
    fn test_observe_failure_retries() {
        let mut sim = Simulation::new(MonitorConfig::default(), counted(&[("a", 5000)]));
        sim.fail_observations(1);
        sim.start();
        assert_eq!(sim.monitor().phase(), Phase::Discovering);
        sim.advance(ms(500));
        assert_eq!(sim.monitor().phase(), Phase::Active);
        assert_eq!(sim.observe_count(), 1);
    }

    #[test]
    fn test_debounce_collapses_bursts() {
        let mut sim = Simulation::new(MonitorConfig::default(), counted(&[("a", 5000)]));
        sim.start();
        for _ in 0..5 {
            sim.advance(ms(100));
            sim.content_changed();
        }
        assert_eq!(sim.monitor().pending_timers(), 1);

        // Last change at 500ms: evaluation at 1300ms, not before
        sim.advance(ms(799));
        assert!(sim.evaluations().is_empty());
        sim.advance(ms(1));
        assert_eq!(sim.evaluations().len(), 1);
        assert_eq!(sim.evaluation_times(), vec![ms(1300)]);
    }

    #[test]
    fn test_duplicate_item_not_reevaluated() {
        let mut sim = Simulation::new(MonitorConfig::default(), counted(&[("a", 5000)]));
        sim.start();
        sim.advance(ms(800));
        assert_eq!(sim.evaluations().len(), 1);

        sim.content_changed();
        sim.advance(ms(800));
        assert_eq!(sim.evaluations().len(), 1);
        assert_eq!(sim.monitor().pending_timers(), 0);
        assert_eq!(sim.monitor().last_item(), Some(&ItemId::new("a")));
    }

    #[test]
    fn test_sequence_of_decisions() {
        let mut sim = Simulation::new(
            MonitorConfig::default(),
            counted(&[("a", 500), ("b", 2000), ("c", 999), ("d", 1000)]),
        );
        sim.start();
        sim.run_until_idle();
        // b is kept; the user scrolls on to c manually
        sim.user_advance();
        sim.run_until_idle();

        let evaluations = sim.evaluations();
        let decisions: Vec<_> = evaluations.iter().map(|e| e.verdict.decision).collect();
        let trace: Vec<_> = evaluations.iter().map(|e| e.verdict.consecutive_skips).collect();
        assert_eq!(decisions, vec![Decision::Skip, Decision::Keep, Decision::Skip, Decision::Keep]);
        assert_eq!(trace, vec![1, 0, 1, 0]);
        assert_eq!(sim.skips(), vec![ItemId::new("a"), ItemId::new("c")]);
    }

    #[test]
    fn test_skip_cap() {
        let items: Vec<SimItem> = (1..=25).map(|i| SimItem::with_count(format!("v{i}"), 0)).collect();
        let mut sim = Simulation::new(MonitorConfig::default(), items);
        sim.start();
        sim.run_until_idle();

        let evaluations = sim.evaluations();
        assert_eq!(evaluations.len(), 21);
        assert!(evaluations[..20].iter().all(|e| e.verdict.decision == Decision::Skip));
        assert_eq!(evaluations[19].verdict.consecutive_skips, 20);
        assert_eq!(evaluations[20].item, ItemId::new("v21"));
        assert_eq!(evaluations[20].verdict.decision, Decision::Keep);
        assert!(evaluations[20].verdict.cap_tripped);
        assert_eq!(sim.monitor().consecutive_skips(), 0);

        sim.user_advance();
        sim.run_until_idle();
        let evaluations = sim.evaluations();
        assert_eq!(evaluations[21].item, ItemId::new("v22"));
        assert_eq!(evaluations[21].verdict.decision, Decision::Skip);
        assert_eq!(evaluations[21].verdict.consecutive_skips, 1);
    }

    #[test]
    fn test_poll_timeout_resolves_zero() {
        let mut sim = Simulation::new(MonitorConfig::default(), vec![SimItem::unreadable("a")]);
        sim.start();
        sim.run_until_idle();

        let evaluations = sim.evaluations();
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].count, 0);
        assert_eq!(evaluations[0].resolution, Resolution::TimedOut);
        // 800ms settle + 4000ms of polling
        assert_eq!(sim.evaluation_times(), vec![ms(4800)]);
    }

    #[test]
    fn test_failed_poll_timer_allows_reevaluation() {
        let mut sim = Simulation::new(MonitorConfig::default(), vec![SimItem::unreadable("a")]);
        sim.start();
        sim.advance(ms(799));
        sim.fail_timers(1);
        sim.advance(ms(1));

        assert!(sim.evaluations().is_empty());
        assert_eq!(sim.monitor().last_item(), None);
        assert_eq!(sim.monitor().pending_timers(), 0);

        sim.content_changed();
        sim.run_until_idle();
        let evaluations = sim.evaluations();
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].item, ItemId::new("a"));
        assert_eq!(evaluations[0].resolution, Resolution::TimedOut);
        assert_eq!(sim.evaluation_times(), vec![ms(5600)]);
    }

    #[test]
    fn test_late_render_resolves() {
        let item = SimItem::with_count("a", 5000).render_delay(ms(2000));
        let mut sim = Simulation::new(MonitorConfig::default(), vec![item]);
        sim.start();
        sim.run_until_idle();

        let evaluations = sim.evaluations();
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].count, 5000);
        assert_eq!(evaluations[0].resolution, Resolution::Extracted);
    }

    #[test]
    fn test_stale_poll_abandoned() {
        let items = vec![
            SimItem::with_count("a", 10).render_delay(ms(60_000)),
            SimItem::with_count("b", 5000),
        ];
        let mut sim = Simulation::new(MonitorConfig::default(), items);
        sim.start();
        sim.advance(ms(1000));
        assert_eq!(sim.monitor().last_item(), Some(&ItemId::new("a")));

        sim.user_advance();
        sim.run_until_idle();

        let evaluations = sim.evaluations();
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].item, ItemId::new("b"));
        assert_eq!(evaluations[0].verdict.decision, Decision::Keep);
    }

    #[test]
    fn test_deactivate_resets_state() {
        let items = counted(&[("a", 1), ("b", 2), ("c", 3), ("d", 5000)]);
        let mut sim = Simulation::new(MonitorConfig::default(), items);
        sim.start();
        sim.advance(ms(1700));
        assert!(sim.monitor().consecutive_skips() > 0);

        sim.navigate("/feed/subscriptions");
        assert_eq!(sim.monitor().phase(), Phase::Inactive);
        assert_eq!(sim.monitor().consecutive_skips(), 0);
        assert_eq!(sim.monitor().last_item(), None);
        assert_eq!(sim.monitor().pending_timers(), 0);
        assert!(!sim.observing());
        assert_eq!(sim.reports(), vec![true, false]);

        // Leaving again changes nothing
        sim.route_changed();
        assert_eq!(sim.reports(), vec![true, false]);

        let before = sim.evaluations().len();
        sim.advance(ms(10_000));
        assert_eq!(sim.evaluations().len(), before);
    }

    #[test]
    fn test_content_change_ignored_when_inactive() {
        let mut sim = Simulation::new(MonitorConfig::default(), counted(&[("a", 1)]));
        sim.navigate("/");
        sim.content_changed();
        assert_eq!(sim.monitor().pending_timers(), 0);
    }

    #[test]
    fn test_threshold_change() {
        let mut sim = Simulation::new(MonitorConfig::default(), counted(&[("a", 50)]));
        sim.set_threshold(10);
        assert_eq!(sim.monitor().threshold(), 10);
        sim.start();
        sim.run_until_idle();

        let evaluations = sim.evaluations();
        assert_eq!(evaluations[0].threshold, 10);
        assert_eq!(evaluations[0].verdict.decision, Decision::Keep);
    }
}
