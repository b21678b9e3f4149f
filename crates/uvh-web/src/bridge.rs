#![forbid(unsafe_code)]

//! Target-independent glue between browser events and the core.
//!
//! Everything here is plain Rust so it compiles and tests natively; the
//! `wasm32` bindings in `web_dom` and `wasm` only move values across the JS
//! boundary and call into these helpers.

use core::time::Duration;

use serde_json::{Map, Value};
use uvh_core::{KeyChord, Listen, Modifiers, Settings};

/// Media events that can change what a child frame reports to the top frame.
pub const MEDIA_EVENT_NAMES: [&str; 8] = [
    "loadedmetadata",
    "pause",
    "play",
    "ratechange",
    "seeked",
    "volumechange",
    "ended",
    "error",
];

/// Inline style for the transient notice overlay.
pub const NOTICE_STYLE: &str = "position: fixed; top: 50%; left: 50%; \
    transform: translate(-50%, -50%); background: rgba(0, 0, 0, 0.8); color: white; \
    padding: 8px 16px; border-radius: 4px; font-family: Arial, sans-serif; \
    font-size: 18px; font-weight: bold; z-index: 2147483647; pointer-events: none; \
    user-select: none;";

/// How long the notice overlay stays on screen.
pub const NOTICE_DURATION: Duration = Duration::from_millis(1000);

/// DOM event names registered for one [`Listen`] kind.
#[must_use]
pub fn event_names(kind: Listen) -> &'static [&'static str] {
    match kind {
        Listen::Keyboard => &["keydown", "keyup"],
        Listen::Mutations => &[],
        Listen::PointerDown => &["pointerdown"],
        Listen::Scroll => &["scroll"],
        Listen::DoubleClick => &["dblclick"],
        Listen::IframeLoad => &["load"],
        Listen::MediaEvents => &MEDIA_EVENT_NAMES,
        Listen::ShadowAttachSignal => &[uvh_core::interceptor::SHADOW_ATTACHED_EVENT],
        Listen::Messages => &["message"],
    }
}

/// Kinds registered in the capture phase, ahead of page handlers.
#[must_use]
pub const fn captures(kind: Listen) -> bool {
    matches!(kind, Listen::Keyboard | Listen::PointerDown)
}

/// Kinds whose listener belongs on the document's window.
#[must_use]
pub const fn on_window(kind: Listen) -> bool {
    matches!(kind, Listen::Scroll | Listen::Messages)
}

/// Kinds that may call `preventDefault()`; everything else stays passive.
#[must_use]
pub const fn may_prevent_default(kind: Listen) -> bool {
    matches!(kind, Listen::Keyboard | Listen::DoubleClick)
}

/// Build a chord from the `KeyboardEvent` fields the core cares about.
#[must_use]
pub fn key_chord(code: &str, shift: bool, alt: bool, ctrl: bool, meta: bool) -> KeyChord {
    KeyChord::dom(code).with_modifiers(Modifiers::from_dom(shift, alt, ctrl, meta))
}

/// `performance.now()` milliseconds as a monotonic duration.
#[must_use]
pub fn duration_from_millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms / 1000.0)
    } else {
        Duration::ZERO
    }
}

/// Milliseconds to wait before `deadline`, for `setTimeout`.
#[must_use]
pub fn timeout_millis(deadline: Duration, now: Duration) -> u32 {
    u32::try_from(deadline.saturating_sub(now).as_millis()).unwrap_or(u32::MAX)
}

/// Settings from the JSON text of a `storage.get` result.
///
/// Anything unparseable yields the fail-open defaults.
#[must_use]
pub fn settings_from_json(json: &str) -> Settings {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(snapshot)) => Settings::from_snapshot(&snapshot),
        _ => Settings::default(),
    }
}

/// Change map from the JSON text of a `storage.onChanged` payload.
#[must_use]
pub fn changes_from_json(json: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(changes)) => Some(changes),
        _ => None,
    }
}
