//! Extension APIs
//!
//! `chrome.runtime` and `chrome.storage` are reached through `js_sys::Reflect`
//! since `web-sys` has no bindings for them. Outside an extension context they
//! are simply missing and every call here degrades to a no-op.

use js_sys::{Function, Reflect};
use log::{debug, info, warn};
use wasm_bindgen::prelude::*;

use ss_core::{ActivityMessage, ActivitySink, Event, HostError, Settings, TAG};

use crate::dispatch;

/// Walk `chrome.<path...>` from the global object.
fn chrome(path: &[&str]) -> Option<JsValue> {
    let mut value = Reflect::get(&js_sys::global(), &"chrome".into()).ok()?;
    for key in path {
        if value.is_undefined() || value.is_null() {
            return None;
        }
        value = Reflect::get(&value, &(*key).into()).ok()?;
    }
    if value.is_undefined() || value.is_null() {
        None
    } else {
        Some(value)
    }
}

fn method(target: &JsValue, name: &str) -> Option<Function> {
    Reflect::get(target, &name.into()).ok()?.dyn_into::<Function>().ok()
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, String> {
    let json = serde_json::to_string(value).map_err(|e| e.to_string())?;
    js_sys::JSON::parse(&json).map_err(|e| format!("{:?}", e))
}

// =============================================================================
// Activity Messages
// =============================================================================

/// Sends activity messages through `chrome.runtime.sendMessage`.
pub struct RuntimeSink {
    runtime: Option<JsValue>,
    /// Rejection handler; a missing receiver rejects the returned promise
    ignore: Closure<dyn FnMut(JsValue)>,
}

impl RuntimeSink {
    pub fn new() -> Self {
        Self {
            runtime: chrome(&["runtime"]),
            ignore: Closure::<dyn FnMut(JsValue)>::new(|_: JsValue| {}),
        }
    }
}

impl Default for RuntimeSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivitySink for RuntimeSink {
    fn send(&mut self, message: &ActivityMessage) -> Result<(), HostError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| HostError::Report("chrome.runtime unavailable".to_string()))?;
        let send_message = method(runtime, "sendMessage")
            .ok_or_else(|| HostError::Report("chrome.runtime.sendMessage unavailable".to_string()))?;

        let payload = to_js(message).map_err(HostError::Report)?;
        let result = send_message
            .call1(runtime, &payload)
            .map_err(|e| HostError::Report(format!("{:?}", e)))?;
        if let Ok(promise) = result.dyn_into::<js_sys::Promise>() {
            let _ = promise.catch(&self.ignore);
        }
        Ok(())
    }
}

// =============================================================================
// Settings
// =============================================================================

fn stored_threshold(value: &JsValue) -> Option<u64> {
    let threshold = value.as_f64().and_then(Settings::threshold_from_stored);
    if threshold.is_none() {
        warn!("{TAG} Ignoring stored threshold {:?}", value);
    }
    threshold
}

/// Read the stored threshold once, falling back to the default.
pub fn load_settings() {
    let Some(sync) = chrome(&["storage", "sync"]) else {
        debug!("{TAG} chrome.storage unavailable, using default threshold");
        return;
    };
    let Some(get) = method(&sync, "get") else { return };
    let defaults = match to_js(&Settings::default()) {
        Ok(defaults) => defaults,
        Err(e) => {
            warn!("{TAG} {}", e);
            return;
        }
    };

    let callback = Closure::once_into_js(move |items: JsValue| {
        let value = Reflect::get(&items, &"threshold".into()).unwrap_or(JsValue::UNDEFINED);
        if let Some(threshold) = stored_threshold(&value) {
            info!("{TAG} Threshold loaded: {}", threshold);
            dispatch(Event::ThresholdChanged(threshold));
        }
    });
    if let Err(e) = get.call2(&sync, &defaults, &callback) {
        warn!("{TAG} storage.sync.get failed: {:?}", e);
    }
}

/// Follow threshold changes made on the options page.
pub fn watch_settings() {
    let Some(on_changed) = chrome(&["storage", "onChanged"]) else { return };
    let Some(add_listener) = method(&on_changed, "addListener") else { return };

    let listener = Closure::<dyn FnMut(JsValue, JsValue)>::new(|changes: JsValue, _area: JsValue| {
        let Ok(change) = Reflect::get(&changes, &"threshold".into()) else { return };
        if change.is_undefined() {
            return;
        }
        let value = Reflect::get(&change, &"newValue".into()).unwrap_or(JsValue::UNDEFINED);
        if let Some(threshold) = stored_threshold(&value) {
            dispatch(Event::ThresholdChanged(threshold));
        }
    });
    if let Err(e) = add_listener.call1(&on_changed, listener.as_ref()) {
        warn!("{TAG} storage.onChanged.addListener failed: {:?}", e);
    }
    listener.forget();
}
