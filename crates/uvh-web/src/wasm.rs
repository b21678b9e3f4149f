#![forbid(unsafe_code)]

//! `wasm-bindgen` entry point and the per-frame runtime.
//!
//! One [`Runtime`] exists per realm. It owns the [`WebDom`] host and the
//! [`Session`], and serializes every browser callback through a queue:
//! listeners push a [`HostEvent`], and whichever call currently holds the
//! session drains the queue. A callback that fires while the session is
//! borrowed (a page script reacting synchronously to something the session
//! did) is therefore handled right after the current event instead of
//! re-entering it.

use core::time::Duration;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use gloo::timers::callback::Timeout;
use serde_json::Value;
use uvh_core::{KeyInput, Session, SessionConfig, Settings};
use wasm_bindgen::prelude::*;
use web_sys::{Document, Event, KeyboardEvent, Window};

use crate::bridge::{key_chord, timeout_millis};
use crate::console::{console_error, init_tracing};
use crate::storage::{self, ChangeListener};
use crate::web_dom::{HostEvent, Sink, WebDom};

thread_local! {
    static STARTED: Cell<bool> = const { Cell::new(false) };
    static RUNTIME: RefCell<Option<Rc<Runtime>>> = const { RefCell::new(None) };
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = if let Some(loc) = info.location() {
                format!(
                    "uvh panic at {}:{}:{}: {info}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                )
            } else {
                format!("uvh panic: {info}")
            };
            console_error(&msg);
        }));
    });
}

/// Start the content script in this frame.
///
/// `config_json` optionally overrides [`SessionConfig`] fields; an invalid
/// override is reported on the console and the defaults are used. Calling
/// `start` again in the same realm is a no-op.
#[wasm_bindgen]
pub fn start(config_json: Option<String>) -> Result<(), JsValue> {
    install_panic_hook();
    init_tracing();
    if STARTED.with(|started| started.replace(true)) {
        return Ok(());
    }

    let config = match config_json.as_deref() {
        Some(json) => SessionConfig::from_json_str(json).unwrap_or_else(|err| {
            console_error(&format!("uvh: ignoring config override: {err}"));
            SessionConfig::default()
        }),
        None => SessionConfig::default(),
    };
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("uvh: no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("uvh: no document"))?;

    wasm_bindgen_futures::spawn_local(async move {
        let settings = storage::read_settings().await;
        let runtime = Runtime::new(window, document, config, settings);
        RUNTIME.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&runtime)));
        runtime.start();
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

struct Runtime {
    dom: WebDom,
    session: RefCell<Session<WebDom>>,
    queue: RefCell<VecDeque<HostEvent>>,
    /// Armed debounce timer and the deadline it was armed for.
    timer: RefCell<Option<(Duration, Timeout)>>,
    microtask_scheduled: Cell<bool>,
    storage: RefCell<Option<ChangeListener>>,
}

impl Runtime {
    fn new(window: Window, document: Document, config: SessionConfig, settings: Settings) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let sink: Sink = Rc::new(move |event: HostEvent| {
                if let Some(runtime) = weak.upgrade() {
                    runtime.push(event);
                }
            });
            Self {
                dom: WebDom::new(window, document, sink),
                session: RefCell::new(Session::new(config, settings)),
                queue: RefCell::new(VecDeque::new()),
                timer: RefCell::new(None),
                microtask_scheduled: Cell::new(false),
                storage: RefCell::new(None),
            }
        })
    }

    fn start(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let listener = storage::on_changed(move |changes| {
            if let Some(runtime) = weak.upgrade() {
                runtime.push(HostEvent::SettingsChanged(changes));
            }
        });
        *self.storage.borrow_mut() = listener;

        if let Ok(mut session) = self.session.try_borrow_mut() {
            session.start(&self.dom);
        }
        self.drain();
    }

    fn push(self: &Rc<Self>, event: HostEvent) {
        self.queue.borrow_mut().push_back(event);
        self.drain();
    }

    fn drain(self: &Rc<Self>) {
        let Ok(mut session) = self.session.try_borrow_mut() else {
            return;
        };
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.handle(&mut session, event);
        }
        let microtasks = session.has_microtasks();
        let deadline = session.next_deadline();
        drop(session);

        if microtasks {
            self.schedule_microtasks();
        }
        self.arm_timer(deadline);
    }

    fn schedule_microtasks(self: &Rc<Self>) {
        if self.microtask_scheduled.replace(true) {
            return;
        }
        let weak = Rc::downgrade(self);
        wasm_bindgen_futures::spawn_local(async move {
            if let Some(runtime) = weak.upgrade() {
                runtime.microtask_scheduled.set(false);
                runtime.push(HostEvent::Microtasks);
            }
        });
    }

    fn arm_timer(self: &Rc<Self>, deadline: Option<Duration>) {
        let mut timer = self.timer.borrow_mut();
        let Some(deadline) = deadline else {
            *timer = None;
            return;
        };
        if matches!(&*timer, Some((armed, _)) if *armed == deadline) {
            return;
        }
        let weak = Rc::downgrade(self);
        let delay = timeout_millis(deadline, self.dom.now());
        let timeout = Timeout::new(delay, move || {
            if let Some(runtime) = weak.upgrade() {
                runtime.push(HostEvent::Tick);
            }
        });
        *timer = Some((deadline, timeout));
    }

    fn handle(&self, session: &mut Session<WebDom>, event: HostEvent) {
        let dom = &self.dom;
        match event {
            HostEvent::KeyDown(key, target) => {
                let input = KeyInput::new(chord_of(&key), target);
                if session.on_key_down(dom, &input).is_handled() {
                    consume(&key);
                }
            }
            HostEvent::KeyUp(key, target) => {
                let input = KeyInput::new(chord_of(&key), target);
                if session.on_key_up(&input).is_handled() {
                    consume(&key);
                }
            }
            HostEvent::PointerDown(target) => {
                session.on_pointer_down(&target);
            }
            HostEvent::Mutation { root, added } => {
                session.on_mutation(dom, &root, &added, dom.now());
            }
            HostEvent::Scroll => session.on_scroll(dom.now()),
            HostEvent::DoubleClick { video, event } => {
                if session.on_video_double_click(dom, &video).is_handled() {
                    consume(&event);
                }
            }
            HostEvent::IframeLoad(frame) => session.on_iframe_load(dom, &frame),
            HostEvent::Media(video) => session.on_media_event(dom, &video),
            HostEvent::ShadowAttached(host) => session.on_shadow_attached(dom, &host),
            HostEvent::Message { data, source } => {
                if let Some(value) = json_of(&data) {
                    session.on_message(dom, &value, &source);
                }
            }
            HostEvent::Defined(tag) => session.on_custom_element_defined(dom, &tag),
            HostEvent::PlayRejected { video, reason } => {
                session.on_play_rejected(dom, &video, &reason);
            }
            HostEvent::SettingsChanged(changes) => session.on_settings_changed(&changes),
            HostEvent::Microtasks => session.run_microtasks(dom),
            HostEvent::Tick => {
                self.timer.borrow_mut().take();
                session.tick(dom, dom.now());
            }
        }
    }
}

fn chord_of(event: &KeyboardEvent) -> uvh_core::KeyChord {
    key_chord(
        &event.code(),
        event.shift_key(),
        event.alt_key(),
        event.ctrl_key(),
        event.meta_key(),
    )
}

fn consume(event: &Event) {
    event.prevent_default();
    event.stop_propagation();
}

/// Structured-clone message data as JSON; non-JSON payloads are dropped.
fn json_of(data: &JsValue) -> Option<Value> {
    let text = js_sys::JSON::stringify(data).ok()?.as_string()?;
    serde_json::from_str(&text).ok()
}
