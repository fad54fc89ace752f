//! Activity reporting
//!
//! The extension badge shows whether the monitor is running in a tab. The
//! core only emits the on/off state; delivery is best effort.

use log::debug;
use serde::Serialize;

use crate::error::HostError;
use crate::TAG;

/// Message sent to the extension's background context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "shortsStatus")]
pub struct ActivityMessage {
    pub active: bool,
}

/// Delivery channel for activity messages.
pub trait ActivitySink {
    fn send(&mut self, message: &ActivityMessage) -> Result<(), HostError>;
}

/// Forwards monitor state changes to an [`ActivitySink`].
///
/// Repeats of the last reported state are dropped; the first report always
/// goes out, so an off-feed start still clears the badge.
pub struct ActivityReporter {
    sink: Box<dyn ActivitySink>,
    last: Option<bool>,
}

impl ActivityReporter {
    pub fn new(sink: Box<dyn ActivitySink>) -> Self {
        Self { sink, last: None }
    }

    /// Report the current state. Returns whether a message was sent.
    pub fn report(&mut self, active: bool) -> bool {
        if self.last == Some(active) {
            return false;
        }
        self.last = Some(active);

        if let Err(e) = self.sink.send(&ActivityMessage { active }) {
            debug!("{TAG} {}", e);
        }
        true
    }

    pub fn last_reported(&self) -> Option<bool> {
        self.last
    }
}
