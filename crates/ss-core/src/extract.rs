//! Like-count extraction
//!
//! The like button has shipped in many markup shapes and several can coexist
//! in one page. Extraction therefore walks an ordered list of strategies,
//! first inside the active item's renderer and then across the whole
//! document, and takes the first reading that resolves.
//!
//! Strategies come in two tiers:
//!
//! - **Structural**: the text of a known like-count element. Empty text or the
//!   bare word "Like" means zero likes. Text that does not parse moves on to
//!   the next element, but remembers that a like element exists; if nothing
//!   else parses the result is [`Signal::Ambiguous`] (zero).
//! - **Labelled**: only when no structural element exists at all, the first
//!   number in an accessible label.

use log::debug;

use crate::count::{first_numeric_token, parse_abbreviated};
use crate::dom::{Element, Page, Scope};
use crate::types::{Signal, Source, Tier};
use crate::TAG;

// =============================================================================
// Selectors
// =============================================================================

/// Renderer of a single feed item.
pub const RENDERER_SELECTOR: &str = "ytd-reel-video-renderer";

/// Renderer explicitly marked as the visible item.
pub const ACTIVE_RENDERER_SELECTOR: &str = "ytd-reel-video-renderer[is-active]";

/// Known shapes of the like-count text, oldest layouts last.
pub const LIKE_TEXT_SELECTORS: [&str; 10] = [
    "#like-button yt-formatted-string",
    "#like-button .yt-core-attributed-string",
    "#like-button > yt-button-shape > label > .yt-spec-button-shape-next__button-text-content",
    "#like-button span[role=\"text\"]",
    "like-button-view-model .yt-core-attributed-string",
    "#like-button yt-attributed-string span",
    "[id=\"like-button\"] yt-formatted-string",
    "ytd-reel-player-overlay-renderer #like-button yt-formatted-string",
    "#shorts-action-bar #like-button yt-formatted-string",
    "shorts-action-bar-renderer #like-button span",
];

/// Like buttons identified by their accessible label.
pub const LIKE_BUTTON_LABEL_SELECTOR: &str = "button[aria-label*=\"like\" i]";

/// Any labelled element inside the like button container.
pub const LIKE_CONTAINER_LABEL_SELECTOR: &str = "#like-button [aria-label]";

// =============================================================================
// Strategies
// =============================================================================

/// What a strategy read from one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    /// A count was parsed from `text`
    Count { value: u64, text: String },
    /// A like element that shows no number yet
    Uninitialized { text: String },
    /// A like element whose text did not parse
    Unparsable,
    /// Nothing usable on this element
    Skip,
}

/// One way of reading a like count out of the page.
pub trait Strategy<E: Element> {
    /// CSS selector of the candidate elements.
    fn selector(&self) -> &str;

    /// Read one candidate.
    fn read(&self, element: &E) -> Reading;
}

/// Reads the text content of a like-count element.
#[derive(Debug, Clone)]
pub struct TextStrategy {
    selector: String,
}

impl TextStrategy {
    pub fn new(selector: impl Into<String>) -> Self {
        Self { selector: selector.into() }
    }
}

impl<E: Element> Strategy<E> for TextStrategy {
    fn selector(&self) -> &str {
        &self.selector
    }

    fn read(&self, element: &E) -> Reading {
        let text = element.text_content().trim().to_string();
        if text.is_empty() || text.eq_ignore_ascii_case("like") {
            return Reading::Uninitialized { text };
        }
        match parse_abbreviated(&text) {
            Ok(value) => Reading::Count { value, text },
            Err(_) => Reading::Unparsable,
        }
    }
}

/// Reads the first number in an element's accessible label.
#[derive(Debug, Clone)]
pub struct LabelStrategy {
    selector: String,
    attribute: String,
}

impl LabelStrategy {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attribute: "aria-label".to_string(),
        }
    }
}

impl<E: Element> Strategy<E> for LabelStrategy {
    fn selector(&self) -> &str {
        &self.selector
    }

    fn read(&self, element: &E) -> Reading {
        let label = element.attribute(&self.attribute).unwrap_or_default();
        let Some(token) = first_numeric_token(&label) else {
            return Reading::Skip;
        };
        match parse_abbreviated(&token) {
            Ok(value) => Reading::Count { value, text: label },
            Err(_) => Reading::Skip,
        }
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// Ordered strategy list with scoped-then-document fallback.
pub struct Extractor<E> {
    structural: Vec<Box<dyn Strategy<E>>>,
    labelled: Vec<Box<dyn Strategy<E>>>,
}

impl<E: Element> Default for Extractor<E> {
    fn default() -> Self {
        let mut extractor = Self::empty();
        for selector in LIKE_TEXT_SELECTORS {
            extractor = extractor.with_structural(TextStrategy::new(selector));
        }
        extractor
            .with_labelled(LabelStrategy::new(LIKE_BUTTON_LABEL_SELECTOR))
            .with_labelled(LabelStrategy::new(LIKE_CONTAINER_LABEL_SELECTOR))
    }
}

impl<E: Element> Extractor<E> {
    /// An extractor with no strategies.
    pub fn empty() -> Self {
        Self {
            structural: Vec::new(),
            labelled: Vec::new(),
        }
    }

    /// Append a structural strategy (tried after the existing ones).
    pub fn with_structural(mut self, strategy: impl Strategy<E> + 'static) -> Self {
        self.structural.push(Box::new(strategy));
        self
    }

    /// Append a labelled strategy (tried after the existing ones).
    pub fn with_labelled(mut self, strategy: impl Strategy<E> + 'static) -> Self {
        self.labelled.push(Box::new(strategy));
        self
    }

    pub fn strategy_count(&self) -> usize {
        self.structural.len() + self.labelled.len()
    }

    /// Extract the like count of the visible item.
    pub fn extract<P>(&self, page: &P) -> Signal
    where
        P: Page<Element = E>,
    {
        if let Some(renderer) = active_renderer(page) {
            let signal = self.extract_in(page, Scope::Within(&renderer));
            if signal.value().is_some() {
                return signal;
            }
        }
        self.extract_in(page, Scope::Document)
    }

    /// Extract within a single scope.
    pub fn extract_in<P>(&self, page: &P, scope: Scope<'_, E>) -> Signal
    where
        P: Page<Element = E>,
    {
        let mut like_element_found = false;

        for strategy in &self.structural {
            for element in scope.query_all(page, strategy.selector()) {
                like_element_found = true;
                match strategy.read(&element) {
                    Reading::Count { value, text } => {
                        debug!("{TAG} Found via: {} | text: {:?} | = {}", strategy.selector(), text, value);
                        return Signal::Counted {
                            value,
                            source: source(Tier::Structural, strategy.selector(), text),
                        };
                    }
                    Reading::Uninitialized { text } => {
                        debug!("{TAG} Like button found but no count (text: {:?}) - 0 likes", text);
                        return Signal::Uninitialized {
                            source: source(Tier::Structural, strategy.selector(), text),
                        };
                    }
                    Reading::Unparsable | Reading::Skip => {}
                }
            }
        }

        if like_element_found {
            debug!("{TAG} Like button found in {} but no count parsed - 0 likes", scope.describe());
            return Signal::Ambiguous;
        }

        for strategy in &self.labelled {
            for element in scope.query_all(page, strategy.selector()) {
                if let Reading::Count { value, text } = strategy.read(&element) {
                    debug!("{TAG} Found via label: {:?} | = {}", text, value);
                    return Signal::Counted {
                        value,
                        source: source(Tier::Labelled, strategy.selector(), text),
                    };
                }
            }
        }

        Signal::Absent
    }
}

fn source(tier: Tier, selector: &str, text: String) -> Source {
    Source {
        tier,
        selector: selector.to_string(),
        text,
    }
}

/// Locate the renderer of the visible item.
///
/// Prefers the `is-active` marker, then the first renderer whose top edge sits
/// in the upper half of the viewport, then simply the first renderer.
pub fn active_renderer<P: Page>(page: &P) -> Option<P::Element> {
    if let Some(active) = page.query(ACTIVE_RENDERER_SELECTOR) {
        return Some(active);
    }

    let mut renderers = page.query_all(RENDERER_SELECTOR);
    let half_viewport = page.viewport_height() / 2.0;
    let visible = renderers.iter().position(|renderer| {
        let rect = renderer.rect();
        rect.top > -100.0 && rect.top < half_viewport && rect.height > 0.0
    });

    match visible {
        Some(index) => Some(renderers.swap_remove(index)),
        None => renderers.into_iter().next(),
    }
}
