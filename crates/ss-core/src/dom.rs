//! Host capabilities
//!
//! The decision engine never touches a browser directly. The content script
//! implements these traits over `web-sys`; tests and replays use
//! [`crate::sim`].

use std::time::Duration;

use crate::error::HostError;
use crate::types::TimerToken;

/// Position of an element relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f64,
    pub height: f64,
}

/// A read-only view of one element in the page.
pub trait Element: Sized {
    /// All descendants matching a CSS selector, in document order.
    fn query_all(&self, selector: &str) -> Vec<Self>;

    /// Lowercase tag name.
    fn tag_name(&self) -> String;

    fn id(&self) -> String;

    fn text_content(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    fn rect(&self) -> Rect;

    /// Number of element children.
    fn child_count(&self) -> usize;

    fn outer_html(&self) -> String;
}

/// The document and location of the host page.
pub trait Page {
    type Element: Element;

    /// Current location path, e.g. `/shorts/abc123`.
    fn pathname(&self) -> String;

    /// All elements in the document matching a CSS selector.
    fn query_all(&self, selector: &str) -> Vec<Self::Element>;

    /// First element in the document matching a CSS selector.
    fn query(&self, selector: &str) -> Option<Self::Element> {
        self.query_all(selector).into_iter().next()
    }

    fn viewport_height(&self) -> f64;
}

/// A page that can also be observed and can arm timers.
pub trait Host: Page {
    /// Handle that keeps a change observation alive.
    type Subscription;

    /// Start observing deep child-list changes under `target`.
    ///
    /// The host reports each batch of changes as
    /// [`crate::Event::ContentChanged`].
    fn observe(&mut self, target: &Self::Element) -> Result<Self::Subscription, HostError>;

    /// Stop an observation started by [`Host::observe`].
    fn disconnect(&mut self, subscription: Self::Subscription);

    /// Arm a one-shot timer. When it elapses the host delivers
    /// [`crate::Event::Timer`] with the same token.
    fn set_timer(&mut self, token: TimerToken, delay: Duration) -> Result<(), HostError>;

    /// Disarm a timer. Called on cancellation and once a timer has fired,
    /// so hosts can release any bookkeeping; unknown tokens are ignored.
    fn clear_timer(&mut self, token: TimerToken);
}

/// Capability to advance the feed to the next item.
pub trait Navigator {
    fn advance(&mut self) -> Result<(), HostError>;
}

// =============================================================================
// Query Scope
// =============================================================================

/// Where a query runs: the whole document or one subtree.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a, E> {
    Document,
    Within(&'a E),
}

impl<'a, E: Element> Scope<'a, E> {
    pub fn query_all<P>(&self, page: &P, selector: &str) -> Vec<E>
    where
        P: Page<Element = E>,
    {
        match self {
            Scope::Document => page.query_all(selector),
            Scope::Within(element) => element.query_all(selector),
        }
    }

    /// Short name for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Scope::Document => "document".to_string(),
            Scope::Within(element) => format!("renderer:{}", element.tag_name()),
        }
    }
}
