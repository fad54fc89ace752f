//! Browser host
//!
//! Implements the core host traits over `web-sys`. Timer and observer
//! callbacks feed back into [`crate::dispatch`].

use std::collections::HashMap;
use std::time::Duration;

use js_sys::Function;
use log::debug;
use wasm_bindgen::prelude::*;
use web_sys::{Document, KeyboardEvent, KeyboardEventInit, MutationObserver, MutationObserverInit, NodeList, Window};

use ss_core::dom::{Element, Host, Navigator, Page, Rect};
use ss_core::{Event, HostError, TimerToken, TAG};

use crate::dispatch;

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn elements(list: NodeList) -> Vec<WebElement> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<web_sys::Element>().ok())
        .map(WebElement)
        .collect()
}

// =============================================================================
// Elements
// =============================================================================

/// A live DOM element.
#[derive(Debug, Clone)]
pub struct WebElement(web_sys::Element);

impl WebElement {
    pub fn inner(&self) -> &web_sys::Element {
        &self.0
    }
}

impl Element for WebElement {
    fn query_all(&self, selector: &str) -> Vec<Self> {
        match self.0.query_selector_all(selector) {
            Ok(list) => elements(list),
            Err(e) => {
                debug!("{TAG} Bad selector {:?}: {}", selector, describe(&e));
                Vec::new()
            }
        }
    }

    fn tag_name(&self) -> String {
        self.0.tag_name().to_ascii_lowercase()
    }

    fn id(&self) -> String {
        self.0.id()
    }

    fn text_content(&self) -> String {
        self.0.text_content().unwrap_or_default()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.0.has_attribute(name)
    }

    fn rect(&self) -> Rect {
        let rect = self.0.get_bounding_client_rect();
        Rect {
            top: rect.top(),
            height: rect.height(),
        }
    }

    fn child_count(&self) -> usize {
        self.0.child_element_count() as usize
    }

    fn outer_html(&self) -> String {
        self.0.outer_html()
    }
}

// =============================================================================
// Host
// =============================================================================

/// A live `MutationObserver` and the callback it invokes.
pub struct WebSubscription {
    observer: MutationObserver,
    _callback: Closure<dyn FnMut(JsValue, JsValue)>,
}

/// The page the content script runs in.
pub struct WebHost {
    window: Window,
    document: Document,
    /// Shared `setTimeout` callback; receives the timer token as its argument
    fire: Function,
    handles: HashMap<TimerToken, i32>,
}

impl WebHost {
    pub fn new() -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;

        let fire = Closure::<dyn FnMut(JsValue)>::new(|token: JsValue| {
            if let Some(token) = token.as_f64() {
                dispatch(Event::Timer(TimerToken(token as u64)));
            }
        });
        let function: Function = fire.as_ref().unchecked_ref::<Function>().clone();
        fire.forget();

        Ok(Self {
            window,
            document,
            fire: function,
            handles: HashMap::new(),
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

impl Page for WebHost {
    type Element = WebElement;

    fn pathname(&self) -> String {
        self.window.location().pathname().unwrap_or_default()
    }

    fn query_all(&self, selector: &str) -> Vec<WebElement> {
        match self.document.query_selector_all(selector) {
            Ok(list) => elements(list),
            Err(e) => {
                debug!("{TAG} Bad selector {:?}: {}", selector, describe(&e));
                Vec::new()
            }
        }
    }

    fn viewport_height(&self) -> f64 {
        self.window
            .inner_height()
            .ok()
            .and_then(|height| height.as_f64())
            .unwrap_or(0.0)
    }
}

impl Host for WebHost {
    type Subscription = WebSubscription;

    fn observe(&mut self, target: &WebElement) -> Result<WebSubscription, HostError> {
        let callback = Closure::<dyn FnMut(JsValue, JsValue)>::new(|_records: JsValue, _observer: JsValue| {
            dispatch(Event::ContentChanged);
        });
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())
            .map_err(|e| HostError::Observe(describe(&e)))?;

        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer
            .observe_with_options(target.inner(), &init)
            .map_err(|e| HostError::Observe(describe(&e)))?;

        Ok(WebSubscription {
            observer,
            _callback: callback,
        })
    }

    fn disconnect(&mut self, subscription: WebSubscription) {
        subscription.observer.disconnect();
    }

    fn set_timer(&mut self, token: TimerToken, delay: Duration) -> Result<(), HostError> {
        let ms = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        let handle = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_1(&self.fire, ms, &JsValue::from_f64(token.0 as f64))
            .map_err(|e| HostError::Timer(describe(&e)))?;
        self.handles.insert(token, handle);
        Ok(())
    }

    fn clear_timer(&mut self, token: TimerToken) {
        if let Some(handle) = self.handles.remove(&token) {
            self.window.clear_timeout_with_handle(handle);
        }
    }
}

// =============================================================================
// Navigation
// =============================================================================

/// Advances the feed the way a user would: an `ArrowDown` keypress.
pub struct KeyboardNavigator {
    document: Document,
}

impl KeyboardNavigator {
    pub fn new(document: Document) -> Self {
        Self { document }
    }
}

impl Navigator for KeyboardNavigator {
    fn advance(&mut self) -> Result<(), HostError> {
        let init = KeyboardEventInit::new();
        init.set_key("ArrowDown");
        init.set_code("ArrowDown");
        init.set_key_code(40);
        init.set_bubbles(true);

        let event = KeyboardEvent::new_with_keyboard_event_init_dict("keydown", &init)
            .map_err(|e| HostError::Navigate(describe(&e)))?;
        self.document
            .dispatch_event(&event)
            .map_err(|e| HostError::Navigate(describe(&e)))?;
        Ok(())
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use ss_core::extract::Extractor;
    use ss_core::Signal;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_extracts_from_live_dom() {
        let host = WebHost::new().unwrap();
        let body = host.document().body().unwrap();
        body.set_inner_html(
            r#"<ytd-reel-video-renderer is-active>
                 <div id="like-button"><yt-formatted-string>1.2K</yt-formatted-string></div>
               </ytd-reel-video-renderer>"#,
        );

        let signal = Extractor::default().extract(&host);
        assert_eq!(signal.value(), Some(1200));
        assert!(matches!(signal, Signal::Counted { .. }));
        body.set_inner_html("");
    }

    #[wasm_bindgen_test]
    fn test_bad_selector_is_empty() {
        let host = WebHost::new().unwrap();
        assert!(host.query_all("[[").is_empty());
    }

    #[wasm_bindgen_test]
    fn test_keypress_dispatches() {
        let host = WebHost::new().unwrap();
        let mut navigator = KeyboardNavigator::new(host.document().clone());
        assert!(navigator.advance().is_ok());
    }
}
