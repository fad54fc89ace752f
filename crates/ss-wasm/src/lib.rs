//! WebAssembly content script for Shorts Skipper
//!
//! The monitor lives in a thread-local. Every browser callback (navigation,
//! mutations, timers, storage) turns into an [`Event`] and goes through
//! [`dispatch`]. A skip dispatches a keypress while the monitor is borrowed,
//! and the page may react synchronously, so events are queued and drained by
//! the outermost call.

mod chrome;
mod host;

use std::cell::RefCell;
use std::collections::VecDeque;

use log::{debug, info};
use wasm_bindgen::prelude::*;

use ss_core::{diagnostics, parse_abbreviated, Event, Monitor, MonitorConfig, TAG};

use crate::chrome::RuntimeSink;
use crate::host::{KeyboardNavigator, WebHost};

/// Fired by the page after each in-app navigation.
const NAVIGATE_EVENT: &str = "yt-navigate-finish";

thread_local! {
    static MONITOR: RefCell<Option<Monitor<WebHost>>> = const { RefCell::new(None) };
    static QUEUE: RefCell<VecDeque<Event>> = const { RefCell::new(VecDeque::new()) };
}

/// Queue `event` and, unless a dispatch is already running, drain the queue.
pub(crate) fn dispatch(event: Event) {
    QUEUE.with(|queue| queue.borrow_mut().push_back(event));
    drain();
}

fn drain() {
    MONITOR.with(|cell| {
        let Ok(mut slot) = cell.try_borrow_mut() else { return };
        let Some(monitor) = slot.as_mut() else { return };

        while let Some(event) = QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
            if let Some(evaluation) = monitor.handle(event) {
                debug!(
                    "{TAG} {} {}: {} / {}",
                    evaluation.verdict.decision, evaluation.item, evaluation.count, evaluation.threshold
                );
            }
        }
    });
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());

    let host = WebHost::new()?;
    let document = host.document().clone();
    let monitor = Monitor::new(
        host,
        MonitorConfig::default(),
        Box::new(KeyboardNavigator::new(document.clone())),
        Box::new(RuntimeSink::new()),
    );
    MONITOR.with(|cell| *cell.borrow_mut() = Some(monitor));

    chrome::load_settings();
    chrome::watch_settings();

    let on_navigate = Closure::<dyn FnMut(JsValue)>::new(|_: JsValue| dispatch(Event::RouteChanged));
    document.add_event_listener_with_callback(NAVIGATE_EVENT, on_navigate.as_ref().unchecked_ref())?;
    on_navigate.forget();

    info!("{TAG} Content script loaded");
    dispatch(Event::RouteChanged);
    Ok(())
}

/// Whether the monitor is watching the feed.
#[wasm_bindgen]
pub fn is_active() -> bool {
    MONITOR.with(|cell| {
        cell.try_borrow()
            .ok()
            .and_then(|slot| slot.as_ref().map(|monitor| monitor.is_active()))
            .unwrap_or(false)
    })
}

/// The threshold in effect, or `undefined` before start.
#[wasm_bindgen]
pub fn current_threshold() -> Option<f64> {
    MONITOR.with(|cell| {
        cell.try_borrow()
            .ok()
            .and_then(|slot| slot.as_ref().map(|monitor| monitor.threshold() as f64))
    })
}

/// Parse an abbreviated like count; `undefined` if it is not a number.
#[wasm_bindgen]
pub fn parse_like_count(text: &str) -> Option<f64> {
    parse_abbreviated(text).ok().map(|count| count as f64)
}

/// Log page and like-button diagnostics to the console.
#[wasm_bindgen]
pub fn dump_diagnostics() {
    MONITOR.with(|cell| {
        if let Ok(slot) = cell.try_borrow() {
            if let Some(monitor) = slot.as_ref() {
                diagnostics::dump_page(monitor.host());
                diagnostics::dump_like_button(monitor.host());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_like_count() {
        assert_eq!(parse_like_count("1.2K"), Some(1200.0));
        assert_eq!(parse_like_count("12,345"), Some(12345.0));
        assert_eq!(parse_like_count("Like"), None);
    }

    #[test]
    fn test_accessors_before_start() {
        assert!(!is_active());
        assert_eq!(current_threshold(), None);
    }
}
