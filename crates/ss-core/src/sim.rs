//! Deterministic in-memory host
//!
//! [`SimElement`] and [`SimPage`] are a tiny stand-in for the DOM: instead of
//! evaluating CSS, every element lists which children answer which selector,
//! and a query returns all registered matches in the subtree.
//!
//! [`Simulation`] runs a real [`Monitor`] against a scripted feed on a virtual
//! clock. Skips advance the feed, the feed change is reported as a burst of
//! content changes, and the like count of each item appears after its render
//! delay, just like the live page.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::diagnostics::{LIKE_BUTTON_SELECTOR, LIKE_RELATED_SELECTOR};
use crate::dom::{Element, Host, Navigator, Page, Rect};
use crate::error::HostError;
use crate::extract::{ACTIVE_RENDERER_SELECTOR, LIKE_BUTTON_LABEL_SELECTOR, LIKE_TEXT_SELECTORS, RENDERER_SELECTOR};
use crate::monitor::{Event, Monitor};
use crate::report::{ActivityMessage, ActivitySink};
use crate::route::FEED_PREFIX;
use crate::types::{Evaluation, ItemId, TimerToken};

// =============================================================================
// Elements and Pages
// =============================================================================

#[derive(Debug, Clone, Default)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    rect: Rect,
    children: Vec<(String, SimElement)>,
}

/// A scripted element.
#[derive(Debug, Clone)]
pub struct SimElement {
    inner: Rc<ElementData>,
}

impl SimElement {
    pub fn new(tag: &str) -> Self {
        Self {
            inner: Rc::new(ElementData {
                tag: tag.to_string(),
                ..ElementData::default()
            }),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        Rc::make_mut(&mut self.inner)
            .attrs
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        Rc::make_mut(&mut self.inner).text = text.to_string();
        self
    }

    pub fn rect(mut self, top: f64, height: f64) -> Self {
        Rc::make_mut(&mut self.inner).rect = Rect { top, height };
        self
    }

    /// Register `child` as a descendant matching `selector`.
    pub fn child(mut self, selector: &str, child: SimElement) -> Self {
        Rc::make_mut(&mut self.inner)
            .children
            .push((selector.to_string(), child));
        self
    }

    fn collect(&self, selector: &str, out: &mut Vec<SimElement>) {
        for (key, child) in &self.inner.children {
            let matches = selector == "*" || key == selector;
            if matches && !out.iter().any(|seen| seen.same(child)) {
                out.push(child.clone());
            }
            child.collect(selector, out);
        }
    }

    fn same(&self, other: &SimElement) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Element for SimElement {
    fn query_all(&self, selector: &str) -> Vec<Self> {
        let mut out = Vec::new();
        self.collect(selector, &mut out);
        out
    }

    fn tag_name(&self) -> String {
        self.inner.tag.to_ascii_lowercase()
    }

    fn id(&self) -> String {
        self.attribute("id").unwrap_or_default()
    }

    fn text_content(&self) -> String {
        self.inner.text.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.inner
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    fn rect(&self) -> Rect {
        self.inner.rect
    }

    fn child_count(&self) -> usize {
        let mut unique: Vec<&SimElement> = Vec::new();
        for (_, child) in &self.inner.children {
            if !unique.iter().any(|seen| seen.same(child)) {
                unique.push(child);
            }
        }
        unique.len()
    }

    fn outer_html(&self) -> String {
        let attrs: String = self
            .inner
            .attrs
            .iter()
            .map(|(name, value)| format!(" {}=\"{}\"", name, value))
            .collect();
        format!("<{tag}{attrs}>{text}</{tag}>", tag = self.tag_name(), attrs = attrs, text = self.inner.text)
    }
}

/// A scripted document.
#[derive(Debug, Clone)]
pub struct SimPage {
    path: String,
    viewport_height: f64,
    document: SimElement,
}

impl SimPage {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            viewport_height: 800.0,
            document: SimElement::new("#document"),
        }
    }

    pub fn with_viewport(mut self, height: f64) -> Self {
        self.viewport_height = height;
        self
    }

    /// Register a top-level element matching `selector`.
    pub fn with(mut self, selector: &str, element: SimElement) -> Self {
        self.document = self.document.child(selector, element);
        self
    }
}

impl Page for SimPage {
    type Element = SimElement;

    fn pathname(&self) -> String {
        self.path.clone()
    }

    fn query_all(&self, selector: &str) -> Vec<SimElement> {
        self.document.query_all(selector)
    }

    fn viewport_height(&self) -> f64 {
        self.viewport_height
    }
}

// =============================================================================
// Scripted Feed
// =============================================================================

fn default_selector() -> String {
    LIKE_TEXT_SELECTORS[0].to_string()
}

/// One item of a scripted feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimItem {
    pub id: String,
    /// Text of the like-count element; no element when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_text: Option<String>,
    /// Accessible label of the like button; no button when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    /// Selector the like-count element answers to
    #[serde(default = "default_selector")]
    pub selector: String,
    /// Time from arrival until the like markup appears
    #[serde(default)]
    pub render_delay_ms: u64,
}

impl SimItem {
    pub fn with_text(id: impl Into<String>, text: &str) -> Self {
        Self {
            id: id.into(),
            like_text: Some(text.to_string()),
            aria_label: None,
            selector: default_selector(),
            render_delay_ms: 0,
        }
    }

    pub fn with_count(id: impl Into<String>, count: u64) -> Self {
        Self::with_text(id, &count.to_string())
    }

    pub fn with_label(id: impl Into<String>, label: &str) -> Self {
        Self {
            like_text: None,
            aria_label: Some(label.to_string()),
            ..Self::with_text(id, "")
        }
    }

    /// An item whose like count never shows up.
    pub fn unreadable(id: impl Into<String>) -> Self {
        Self {
            like_text: None,
            ..Self::with_text(id, "")
        }
    }

    pub fn render_delay(mut self, delay: Duration) -> Self {
        self.render_delay_ms = delay.as_millis() as u64;
        self
    }

    fn renderer(&self, rendered: bool, viewport_height: f64) -> SimElement {
        let mut renderer = SimElement::new(RENDERER_SELECTOR)
            .attr("is-active", "")
            .rect(0.0, viewport_height);
        if !rendered {
            return renderer;
        }

        if let Some(text) = &self.like_text {
            let count = SimElement::new("yt-formatted-string").text(text);
            let button = SimElement::new("ytd-toggle-button-renderer")
                .attr("id", "like-button")
                .text(text)
                .child(&self.selector, count.clone());
            renderer = renderer
                .child(&self.selector, count)
                .child(LIKE_RELATED_SELECTOR, button.clone())
                .child(LIKE_BUTTON_SELECTOR, button);
        }
        if let Some(label) = &self.aria_label {
            let button = SimElement::new("button").attr("aria-label", label);
            renderer = renderer
                .child(LIKE_BUTTON_LABEL_SELECTOR, button.clone())
                .child(LIKE_RELATED_SELECTOR, button);
        }
        renderer
    }
}

/// Content changes reported for each feed change.
const DEFAULT_BURST: u32 = 3;

struct World {
    clock: Duration,
    seq: u64,
    timers: BTreeMap<(Duration, u64), TimerToken>,
    armed: HashMap<TimerToken, (Duration, u64)>,
    feed: Vec<SimItem>,
    position: usize,
    location: Option<String>,
    container_at: Option<Duration>,
    rendered: bool,
    render_at: Option<Duration>,
    viewport_height: f64,
    page: SimPage,
    observing: Option<u64>,
    observations: u32,
    refused_observations: u32,
    refused_timers: u32,
    queries: HashMap<String, u32>,
    burst: u32,
    pending: VecDeque<Event>,
    skips: Vec<ItemId>,
    reports: Vec<bool>,
}

impl World {
    fn new(feed: Vec<SimItem>) -> Self {
        let mut world = Self {
            clock: Duration::ZERO,
            seq: 0,
            timers: BTreeMap::new(),
            armed: HashMap::new(),
            feed,
            position: 0,
            location: None,
            container_at: Some(Duration::ZERO),
            rendered: false,
            render_at: None,
            viewport_height: 800.0,
            page: SimPage::new("/"),
            observing: None,
            observations: 0,
            refused_observations: 0,
            refused_timers: 0,
            queries: HashMap::new(),
            burst: DEFAULT_BURST,
            pending: VecDeque::new(),
            skips: Vec::new(),
            reports: Vec::new(),
        };
        world.arrive();
        world
    }

    fn current(&self) -> Option<&SimItem> {
        self.feed.get(self.position)
    }

    fn path(&self) -> String {
        if let Some(location) = &self.location {
            return location.clone();
        }
        match self.current() {
            Some(item) => format!("{}{}", FEED_PREFIX, item.id),
            None => FEED_PREFIX.to_string(),
        }
    }

    fn container_present(&self) -> bool {
        self.container_at.map_or(false, |at| self.clock >= at)
    }

    fn rebuild(&mut self) {
        let mut page = SimPage::new(&self.path()).with_viewport(self.viewport_height);
        if self.container_present() {
            let mut container = SimElement::new("ytd-shorts").attr("id", "shorts-container");
            if let Some(item) = self.current() {
                let renderer = item.renderer(self.rendered, self.viewport_height);
                container = container
                    .child(ACTIVE_RENDERER_SELECTOR, renderer.clone())
                    .child(RENDERER_SELECTOR, renderer);
            }
            page = page
                .with("ytd-shorts", container.clone())
                .with("#shorts-container", container);
        }
        self.page = page;
    }

    /// A new item became current.
    fn arrive(&mut self) {
        let delay = self
            .current()
            .map_or(Duration::ZERO, |item| Duration::from_millis(item.render_delay_ms));
        self.rendered = delay.is_zero();
        self.render_at = if self.rendered { None } else { Some(self.clock + delay) };
        self.rebuild();
    }

    fn content_changed(&mut self) {
        if self.observing.is_some() {
            for _ in 0..self.burst {
                self.pending.push_back(Event::ContentChanged);
            }
        }
    }

    /// Scroll to the next item, if there is one.
    fn advance_feed(&mut self) {
        if self.position + 1 >= self.feed.len() {
            return;
        }
        self.position += 1;
        self.arrive();
        self.pending.push_back(Event::RouteChanged);
        self.content_changed();
    }

    fn next_event_time(&self) -> Option<Duration> {
        let timer = self.timers.keys().next().map(|(at, _)| *at);
        let container = self.container_at.filter(|_| !self.container_present());
        [timer, self.render_at, container].into_iter().flatten().min()
    }

    /// Move the clock to `at` and apply one due event. Returns the token of a
    /// fired timer; page changes are queued as events instead.
    fn step(&mut self, at: Duration) -> Option<TimerToken> {
        self.clock = self.clock.max(at);

        if let Some(container_at) = self.container_at {
            if container_at <= self.clock && self.page.query("ytd-shorts").is_none() {
                self.rebuild();
                return None;
            }
        }

        if let Some(render_at) = self.render_at {
            if render_at <= self.clock {
                self.rendered = true;
                self.render_at = None;
                self.rebuild();
                self.content_changed();
                return None;
            }
        }

        let key = *self.timers.keys().next()?;
        if key.0 > self.clock {
            return None;
        }
        let token = self.timers.remove(&key)?;
        self.armed.remove(&token);
        Some(token)
    }
}

// =============================================================================
// Host
// =============================================================================

/// Observation handle of the simulated host.
#[derive(Debug)]
pub struct SimSubscription(u64);

/// [`Host`] backed by the simulated world.
pub struct SimHost {
    world: Rc<RefCell<World>>,
}

impl Page for SimHost {
    type Element = SimElement;

    fn pathname(&self) -> String {
        self.world.borrow().path()
    }

    fn query_all(&self, selector: &str) -> Vec<SimElement> {
        let mut world = self.world.borrow_mut();
        *world.queries.entry(selector.to_string()).or_default() += 1;
        world.page.query_all(selector)
    }

    fn viewport_height(&self) -> f64 {
        self.world.borrow().viewport_height
    }
}

impl Host for SimHost {
    type Subscription = SimSubscription;

    fn observe(&mut self, _target: &SimElement) -> Result<SimSubscription, HostError> {
        let mut world = self.world.borrow_mut();
        if world.refused_observations > 0 {
            world.refused_observations -= 1;
            return Err(HostError::Observe("observation refused".to_string()));
        }
        world.observations += 1;
        let id = u64::from(world.observations);
        world.observing = Some(id);
        Ok(SimSubscription(id))
    }

    fn disconnect(&mut self, subscription: SimSubscription) {
        let mut world = self.world.borrow_mut();
        if world.observing == Some(subscription.0) {
            world.observing = None;
        }
    }

    fn set_timer(&mut self, token: TimerToken, delay: Duration) -> Result<(), HostError> {
        let mut world = self.world.borrow_mut();
        if world.refused_timers > 0 {
            world.refused_timers -= 1;
            return Err(HostError::Timer("timer refused".to_string()));
        }
        let key = (world.clock + delay, world.seq);
        world.seq += 1;
        world.timers.insert(key, token);
        world.armed.insert(token, key);
        Ok(())
    }

    fn clear_timer(&mut self, token: TimerToken) {
        let mut world = self.world.borrow_mut();
        if let Some(key) = world.armed.remove(&token) {
            world.timers.remove(&key);
        }
    }
}

struct SimNavigator {
    world: Rc<RefCell<World>>,
}

impl Navigator for SimNavigator {
    fn advance(&mut self) -> Result<(), HostError> {
        let mut world = self.world.borrow_mut();
        if let Some(item) = world.current() {
            let id = ItemId::new(item.id.clone());
            world.skips.push(id);
        }
        world.advance_feed();
        Ok(())
    }
}

struct SimSink {
    world: Rc<RefCell<World>>,
}

impl ActivitySink for SimSink {
    fn send(&mut self, message: &ActivityMessage) -> Result<(), HostError> {
        self.world.borrow_mut().reports.push(message.active);
        Ok(())
    }
}

// =============================================================================
// Simulation
// =============================================================================

/// A monitor running against a scripted feed on a virtual clock.
pub struct Simulation {
    monitor: Monitor<SimHost>,
    world: Rc<RefCell<World>>,
    evaluations: Vec<(Duration, Evaluation)>,
}

impl Simulation {
    /// A feed positioned on its first item, with the container already
    /// rendered. Nothing runs until [`Simulation::start`].
    pub fn new(config: MonitorConfig, feed: Vec<SimItem>) -> Self {
        let world = Rc::new(RefCell::new(World::new(feed)));
        let monitor = Monitor::new(
            SimHost { world: world.clone() },
            config,
            Box::new(SimNavigator { world: world.clone() }),
            Box::new(SimSink { world: world.clone() }),
        );
        Self {
            monitor,
            world,
            evaluations: Vec::new(),
        }
    }

    /// Delay the feed container's appearance.
    pub fn with_container_delay(self, delay: Duration) -> Self {
        {
            let mut world = self.world.borrow_mut();
            world.container_at = Some(delay);
            world.rebuild();
        }
        self
    }

    /// The feed container never appears.
    pub fn without_container(self) -> Self {
        {
            let mut world = self.world.borrow_mut();
            world.container_at = None;
            world.rebuild();
        }
        self
    }

    /// Number of content changes reported per feed change.
    pub fn with_burst(self, burst: u32) -> Self {
        self.world.borrow_mut().burst = burst;
        self
    }

    /// Refuse the next `count` observation requests.
    pub fn fail_observations(&mut self, count: u32) {
        self.world.borrow_mut().refused_observations = count;
    }

    /// Refuse the next `count` timer requests.
    pub fn fail_timers(&mut self, count: u32) {
        self.world.borrow_mut().refused_timers = count;
    }

    /// Deliver the initial route check, as the content script does on load.
    pub fn start(&mut self) {
        self.dispatch(Event::RouteChanged);
    }

    pub fn route_changed(&mut self) {
        self.dispatch(Event::RouteChanged);
    }

    /// Navigate to an arbitrary path and report the route change.
    pub fn navigate(&mut self, path: &str) {
        {
            let mut world = self.world.borrow_mut();
            world.location = Some(path.to_string());
            world.rebuild();
        }
        self.dispatch(Event::RouteChanged);
    }

    /// Navigate back to the feed's current item.
    pub fn return_to_feed(&mut self) {
        {
            let mut world = self.world.borrow_mut();
            world.location = None;
            world.rebuild();
        }
        self.dispatch(Event::RouteChanged);
    }

    pub fn content_changed(&mut self) {
        self.dispatch(Event::ContentChanged);
    }

    pub fn set_threshold(&mut self, threshold: u64) {
        self.dispatch(Event::ThresholdChanged(threshold));
    }

    /// The user scrolls to the next item.
    pub fn user_advance(&mut self) {
        self.world.borrow_mut().advance_feed();
        self.drain();
    }

    /// Run the clock forward by `by`.
    pub fn advance(&mut self, by: Duration) {
        let target = self.now() + by;
        loop {
            let next = self.world.borrow().next_event_time();
            match next {
                Some(at) if at <= target => {
                    let fired = self.world.borrow_mut().step(at);
                    match fired {
                        Some(token) => self.dispatch(Event::Timer(token)),
                        None => self.drain(),
                    }
                }
                _ => break,
            }
        }
        let mut world = self.world.borrow_mut();
        world.clock = world.clock.max(target);
    }

    /// Run until no timer or page change is scheduled.
    pub fn run_until_idle(&mut self) {
        loop {
            let next = self.world.borrow().next_event_time();
            match next {
                Some(at) => {
                    let by = at.saturating_sub(self.now());
                    self.advance(by);
                }
                None => break,
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        self.world.borrow_mut().pending.push_back(event);
        self.drain();
    }

    fn drain(&mut self) {
        loop {
            let next = self.world.borrow_mut().pending.pop_front();
            let Some(event) = next else { break };
            if let Some(evaluation) = self.monitor.handle(event) {
                let now = self.now();
                self.evaluations.push((now, evaluation));
            }
        }
    }

    pub fn now(&self) -> Duration {
        self.world.borrow().clock
    }

    pub fn monitor(&self) -> &Monitor<SimHost> {
        &self.monitor
    }

    pub fn evaluations(&self) -> Vec<Evaluation> {
        self.evaluations.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Virtual time of each completed evaluation.
    pub fn evaluation_times(&self) -> Vec<Duration> {
        self.evaluations.iter().map(|(at, _)| *at).collect()
    }

    /// Items the monitor skipped, in order.
    pub fn skips(&self) -> Vec<ItemId> {
        self.world.borrow().skips.clone()
    }

    /// Activity states reported to the badge, in order.
    pub fn reports(&self) -> Vec<bool> {
        self.world.borrow().reports.clone()
    }

    /// How often the page was queried with `selector`.
    pub fn query_count(&self, selector: &str) -> u32 {
        self.world.borrow().queries.get(selector).copied().unwrap_or(0)
    }

    /// Number of successful observations.
    pub fn observe_count(&self) -> u32 {
        self.world.borrow().observations
    }

    pub fn observing(&self) -> bool {
        self.world.borrow().observing.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_deduplicates() {
        let shared = SimElement::new("span").text("1");
        let root = SimElement::new("div")
            .child("a", shared.clone())
            .child("b", shared.clone())
            .child("a", SimElement::new("span").child("a", SimElement::new("i")));
        assert_eq!(root.query_all("a").len(), 3);
        assert_eq!(root.query_all("b").len(), 1);
        assert_eq!(root.query_all("*").len(), 3);
        assert_eq!(root.child_count(), 2);
    }

    #[test]
    fn test_outer_html() {
        let element = SimElement::new("div").attr("id", "like-button").text("12");
        assert_eq!(element.outer_html(), "<div id=\"like-button\">12</div>");
    }

    #[test]
    fn test_scenario_item_json() {
        let item: SimItem = serde_json::from_str(r#"{"id": "abc", "like_text": "1.2K"}"#).unwrap();
        assert_eq!(item, SimItem::with_text("abc", "1.2K"));
        assert_eq!(item.selector, LIKE_TEXT_SELECTORS[0]);
    }

    #[test]
    fn test_render_delay_emits_changes() {
        let item = SimItem::with_count("a", 10).render_delay(Duration::from_millis(300));
        let mut sim = Simulation::new(MonitorConfig::default(), vec![item]).with_burst(2);
        sim.start();
        assert!(sim.monitor().is_active());

        // The render at 300ms restarts the settle timer
        sim.advance(Duration::from_millis(1099));
        assert!(sim.evaluations().is_empty());
        sim.advance(Duration::from_millis(1));
        assert_eq!(sim.evaluations().len(), 1);
        assert_eq!(sim.evaluations()[0].count, 10);
    }

    #[test]
    fn test_label_item() {
        let item = SimItem::with_label("a", "like this video along with 2,500 other people");
        let mut sim = Simulation::new(MonitorConfig::default(), vec![item]);
        sim.start();
        sim.run_until_idle();
        assert_eq!(sim.evaluations()[0].count, 2500);
    }

    #[test]
    fn test_return_to_feed_reactivates() {
        let mut sim = Simulation::new(MonitorConfig::default(), vec![SimItem::with_count("a", 5000)]);
        sim.start();
        sim.navigate("/");
        sim.return_to_feed();
        assert!(sim.monitor().is_active());
        assert_eq!(sim.observe_count(), 2);
        assert_eq!(sim.reports(), vec![true, false, true]);
    }
}
