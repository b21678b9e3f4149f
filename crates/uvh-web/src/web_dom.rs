#![forbid(unsafe_code)]

//! [`Dom`] over `web-sys`.
//!
//! Node handles may belong to a same-origin iframe's realm, where
//! `instanceof` checks against this realm's constructors fail. Nodes are
//! therefore classified by `nodeType` and cast with `unchecked_ref`, and
//! optional properties (`activeElement`, `isContentEditable`, `host`, the
//! privileged closed-root accessors) are read through `Reflect`.
//!
//! Listener callbacks never touch the session directly: they package the
//! event as a [`HostEvent`] and hand it to the [`Sink`], which queues it for
//! the runtime.

use core::time::Duration;
use std::cell::RefCell;
use std::rc::Rc;

use gloo::events::{EventListener, EventListenerOptions, EventListenerPhase};
use gloo::timers::callback::Timeout;
use js_sys::{Array, Function, Reflect};
use serde_json::Value;
use tracing::debug;
use uvh_core::{Dom, LOG_TARGET, Listen, MediaCommand, MediaSnapshot, Rect, Viewport};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Document, DocumentFragment, Element, Event, HtmlMediaElement, KeyboardEvent, MessageEvent,
    MutationObserver, MutationObserverInit, MutationRecord, Node, NodeList, Window,
};

use crate::bridge::{
    NOTICE_DURATION, NOTICE_STYLE, captures, event_names, may_prevent_default, on_window,
};

const ELEMENT_NODE: u16 = 1;
const DOCUMENT_NODE: u16 = 9;
const DOCUMENT_FRAGMENT_NODE: u16 = 11;

/// A browser event, detached from the listener that saw it.
pub(crate) enum HostEvent {
    KeyDown(KeyboardEvent, Option<Node>),
    KeyUp(KeyboardEvent, Option<Node>),
    PointerDown(Node),
    Mutation { root: Node, added: Vec<Node> },
    Scroll,
    DoubleClick { video: Node, event: Event },
    IframeLoad(Node),
    Media(Node),
    ShadowAttached(Node),
    Message { data: JsValue, source: JsValue },
    Defined(String),
    PlayRejected { video: Node, reason: String },
    SettingsChanged(serde_json::Map<String, Value>),
    Microtasks,
    Tick,
}

pub(crate) type Sink = Rc<dyn Fn(HostEvent)>;

/// A live registration; dropping it removes the listeners or disconnects
/// the observer.
pub(crate) enum WebSubscription {
    Listeners(Vec<EventListener>),
    Observer {
        observer: MutationObserver,
        _callback: Closure<dyn FnMut(Array, MutationObserver)>,
    },
}

impl Drop for WebSubscription {
    fn drop(&mut self) {
        if let Self::Observer { observer, .. } = self {
            observer.disconnect();
        }
    }
}

// ---------------------------------------------------------------------------
// JS helpers
// ---------------------------------------------------------------------------

fn prop(target: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

/// Anything with a numeric `nodeType`, from any realm.
fn as_node(value: &JsValue) -> Option<Node> {
    if !value.is_object() {
        return None;
    }
    prop(value, "nodeType")?.as_f64()?;
    Some(value.clone().unchecked_into())
}

fn as_element(node: &Node) -> Option<&Element> {
    (node.node_type() == ELEMENT_NODE).then(|| node.unchecked_ref::<Element>())
}

fn as_media(node: &Node) -> &HtmlMediaElement {
    node.unchecked_ref::<HtmlMediaElement>()
}

fn to_js(payload: &Value) -> Option<JsValue> {
    js_sys::JSON::parse(&payload.to_string()).ok()
}

/// Call the first of `names` that `target` implements, so prefixed WebKit
/// APIs work where the standard name is missing.
fn call_method(target: &JsValue, names: &[&str]) -> Result<JsValue, JsValue> {
    let method = names
        .iter()
        .find_map(|name| prop(target, name).and_then(|f| f.dyn_into::<Function>().ok()))
        .ok_or_else(|| JsValue::from_str("unsupported"))?;
    method.call0(target)
}

fn error_name(err: &JsValue) -> String {
    prop(err, "name")
        .and_then(|name| name.as_string())
        .unwrap_or_else(|| format!("{err:?}"))
}

/// Innermost target, looking through open shadow boundaries.
fn origin_target(event: &Event) -> Option<Node> {
    as_node(&event.composed_path().get(0)).or_else(|| event.target().and_then(|t| as_node(&t)))
}

fn collect(list: &NodeList) -> Vec<Node> {
    (0..list.length()).filter_map(|i| list.get(i)).collect()
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// WebDom
// ---------------------------------------------------------------------------

pub(crate) struct WebDom {
    window: Window,
    document: Document,
    sink: Sink,
    notice: RefCell<Option<Element>>,
}

impl WebDom {
    pub(crate) fn new(window: Window, document: Document, sink: Sink) -> Self {
        Self {
            window,
            document,
            sink,
            notice: RefCell::new(None),
        }
    }

    /// `performance.now()` as a monotonic duration.
    pub(crate) fn now(&self) -> Duration {
        let ms = self.window.performance().map_or(0.0, |p| p.now());
        crate::bridge::duration_from_millis(ms)
    }

    fn window_of(&self, document: &Node) -> Option<Window> {
        if document.node_type() != DOCUMENT_NODE {
            return None;
        }
        document.unchecked_ref::<Document>().default_view()
    }

    fn listen(&self, target: &web_sys::EventTarget, node: &Node, kind: Listen) -> Vec<EventListener> {
        let options = EventListenerOptions {
            phase: if captures(kind) {
                EventListenerPhase::Capture
            } else {
                EventListenerPhase::Bubble
            },
            passive: !may_prevent_default(kind),
        };
        event_names(kind)
            .iter()
            .map(|&name| {
                let sink = Rc::clone(&self.sink);
                let node = node.clone();
                EventListener::new_with_options(target, name, options, move |event: &Event| {
                    if let Some(host_event) = host_event(kind, name, &node, event) {
                        sink(host_event);
                    }
                })
            })
            .collect()
    }

    fn observe_mutations(&self, root: &Node) -> Option<WebSubscription> {
        let sink = Rc::clone(&self.sink);
        let observed = root.clone();
        let callback = Closure::<dyn FnMut(Array, MutationObserver)>::new(
            move |records: Array, _observer: MutationObserver| {
                let added: Vec<Node> = records
                    .iter()
                    .flat_map(|record| collect(&record.unchecked_into::<MutationRecord>().added_nodes()))
                    .filter(|node| node.node_type() == ELEMENT_NODE)
                    .collect();
                if !added.is_empty() {
                    sink(HostEvent::Mutation {
                        root: observed.clone(),
                        added,
                    });
                }
            },
        );
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).ok()?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer.observe_with_options(root, &init).ok()?;
        Some(WebSubscription::Observer {
            observer,
            _callback: callback,
        })
    }

    fn query_all(&self, root: &Node) -> Option<NodeList> {
        match root.node_type() {
            DOCUMENT_NODE => root.unchecked_ref::<Document>().query_selector_all("*").ok(),
            DOCUMENT_FRAGMENT_NODE => root
                .unchecked_ref::<DocumentFragment>()
                .query_selector_all("*")
                .ok(),
            ELEMENT_NODE => root.unchecked_ref::<Element>().query_selector_all("*").ok(),
            _ => None,
        }
    }

    /// `chrome.dom.openOrClosedShadowRoot(el)` (Chromium) or the
    /// `el.openOrClosedShadowRoot` property (Firefox).
    fn open_or_closed_shadow_root(&self, element: &Node) -> Option<Node> {
        let global = js_sys::global();
        let chromium = prop(&global, "chrome")
            .and_then(|chrome| prop(&chrome, "dom"))
            .and_then(|dom| prop(&dom, "openOrClosedShadowRoot"))
            .and_then(|f| f.dyn_into::<Function>().ok());
        if let Some(accessor) = chromium {
            return accessor
                .call1(&JsValue::UNDEFINED, element)
                .ok()
                .and_then(|root| as_node(&root));
        }
        prop(element, "openOrClosedShadowRoot").and_then(|root| as_node(&root))
    }

    fn play(&self, video: &Node) {
        let rejected = |reason: String| HostEvent::PlayRejected {
            video: video.clone(),
            reason,
        };
        match as_media(video).play() {
            Ok(promise) => {
                let sink = Rc::clone(&self.sink);
                let video = video.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    if let Err(err) = JsFuture::from(promise).await {
                        sink(HostEvent::PlayRejected {
                            video,
                            reason: error_name(&err),
                        });
                    }
                });
            }
            Err(err) => (self.sink)(rejected(error_name(&err))),
        }
    }
}

fn host_event(kind: Listen, name: &str, node: &Node, event: &Event) -> Option<HostEvent> {
    let event = match kind {
        Listen::Keyboard => {
            let key: KeyboardEvent = event.clone().unchecked_into();
            let target = origin_target(event);
            if name == "keyup" {
                HostEvent::KeyUp(key, target)
            } else {
                HostEvent::KeyDown(key, target)
            }
        }
        Listen::PointerDown => HostEvent::PointerDown(origin_target(event)?),
        Listen::Scroll => HostEvent::Scroll,
        Listen::DoubleClick => HostEvent::DoubleClick {
            video: node.clone(),
            event: event.clone(),
        },
        Listen::IframeLoad => HostEvent::IframeLoad(node.clone()),
        Listen::MediaEvents => HostEvent::Media(node.clone()),
        Listen::ShadowAttachSignal => {
            HostEvent::ShadowAttached(event.target().and_then(|t| as_node(&t))?)
        }
        Listen::Messages => {
            let message = event.unchecked_ref::<MessageEvent>();
            HostEvent::Message {
                data: message.data(),
                source: message.source().map_or(JsValue::NULL, JsValue::from),
            }
        }
        Listen::Mutations => return None,
    };
    Some(event)
}

impl Dom for WebDom {
    type Node = Node;
    type Window = JsValue;
    type Subscription = WebSubscription;

    // --- structure -------------------------------------------------------

    fn document(&self) -> Node {
        self.document.clone().into()
    }

    fn descendants(&self, root: &Node) -> Vec<Node> {
        self.query_all(root).map(|list| collect(&list)).unwrap_or_default()
    }

    fn tag_name(&self, node: &Node) -> String {
        as_element(node)
            .map(|element| element.tag_name().to_ascii_uppercase())
            .unwrap_or_default()
    }

    fn is_connected(&self, node: &Node) -> bool {
        node.is_connected()
    }

    fn shadow_root(&self, element: &Node) -> Option<Node> {
        as_element(element)?.shadow_root().map(Into::into)
    }

    fn privileged_shadow_root(&self, element: &Node) -> Option<Node> {
        as_element(element)?;
        self.open_or_closed_shadow_root(element)
    }

    fn shadow_host(&self, root: &Node) -> Option<Node> {
        if root.node_type() != DOCUMENT_FRAGMENT_NODE {
            return None;
        }
        prop(root, "host").and_then(|host| as_node(&host))
    }

    fn root_node(&self, node: &Node) -> Node {
        node.get_root_node()
    }

    fn is_custom_element_defined(&self, tag: &str) -> bool {
        let registry = self.window.custom_elements();
        !registry.get(&tag.to_ascii_lowercase()).is_undefined()
    }

    fn content_document(&self, frame: &Node) -> Option<Node> {
        prop(frame, "contentDocument").and_then(|doc| as_node(&doc))
    }

    fn content_window(&self, frame: &Node) -> Option<JsValue> {
        prop(frame, "contentWindow")
    }

    fn contains(&self, ancestor: &Node, node: &Node) -> bool {
        ancestor.contains(Some(node))
    }

    fn is_content_editable(&self, element: &Node) -> bool {
        prop(element, "isContentEditable").and_then(|v| v.as_bool()) == Some(true)
    }

    fn active_element(&self, root: &Node) -> Option<Node> {
        prop(root, "activeElement").and_then(|el| as_node(&el))
    }

    fn fullscreen_element(&self) -> Option<Node> {
        self.document
            .fullscreen_element()
            .map(Into::into)
            .or_else(|| prop(&self.document, "webkitFullscreenElement").and_then(|el| as_node(&el)))
    }

    fn bounding_rect(&self, element: &Node) -> Rect {
        let Some(element) = as_element(element) else {
            return Rect::default();
        };
        let r = element.get_bounding_client_rect();
        Rect::new(r.left(), r.top(), r.width(), r.height())
    }

    fn viewport(&self) -> Viewport {
        let dimension = |value: Result<JsValue, JsValue>| {
            value.ok().and_then(|v| v.as_f64()).unwrap_or(0.0)
        };
        Viewport::new(
            dimension(self.window.inner_width()),
            dimension(self.window.inner_height()),
        )
    }

    // --- frame -----------------------------------------------------------

    fn is_top_frame(&self) -> bool {
        matches!(self.window.top(), Ok(Some(top)) if top == self.window)
    }

    fn can_access_top_document(&self) -> bool {
        let Some(top) = prop(&self.window, "top") else {
            return false;
        };
        // Cross-origin access throws a SecurityError, surfaced here as Err.
        matches!(Reflect::get(&top, &"document".into()), Ok(doc) if doc.is_object())
    }

    fn is_top_window(&self, window: &JsValue) -> bool {
        prop(&self.window, "top").is_some_and(|top| top == *window)
    }

    fn hostname(&self) -> String {
        self.window.location().hostname().unwrap_or_default()
    }

    fn location_href(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn random_token(&self) -> String {
        let word = || (js_sys::Math::random() * f64::from(u32::MAX)) as u32;
        format!("{:08x}{:08x}", word(), word())
    }

    // --- media -----------------------------------------------------------

    fn media_snapshot(&self, video: &Node) -> MediaSnapshot {
        let media = as_media(video);
        MediaSnapshot {
            paused: media.paused(),
            ended: media.ended(),
            current_time: media.current_time(),
            duration: media.duration(),
            playback_rate: media.playback_rate(),
            volume: media.volume(),
            muted: media.muted(),
        }
    }

    fn apply_media(&self, video: &Node, command: MediaCommand) {
        let media = as_media(video);
        match command {
            MediaCommand::SetCurrentTime(t) => media.set_current_time(t),
            MediaCommand::SetVolume(v) => media.set_volume(v),
            MediaCommand::SetMuted(m) => media.set_muted(m),
            MediaCommand::SetPlaybackRate(r) => media.set_playback_rate(r),
            MediaCommand::Play => self.play(video),
            MediaCommand::Pause => {
                if let Err(err) = media.pause() {
                    debug!(target: LOG_TARGET, error = %error_name(&err), "pause failed");
                }
            }
            MediaCommand::EnterFullscreen => {
                if let Err(err) =
                    call_method(media, &["requestFullscreen", "webkitRequestFullscreen"])
                {
                    debug!(target: LOG_TARGET, error = %error_name(&err), "fullscreen request failed");
                }
            }
            MediaCommand::ExitFullscreen => {
                if let Err(err) =
                    call_method(&self.document, &["exitFullscreen", "webkitExitFullscreen"])
                {
                    debug!(target: LOG_TARGET, error = %error_name(&err), "fullscreen exit failed");
                }
            }
        }
    }

    fn reveal_controls(&self, video: &Node, duration: Duration) {
        let Some(element) = as_element(video) else {
            return;
        };
        if element.has_attribute("controls") {
            return;
        }
        if element.set_attribute("controls", "").is_err() {
            return;
        }
        let element = element.clone();
        Timeout::new(millis(duration), move || {
            let _ = element.remove_attribute("controls");
        })
        .forget();
    }

    fn show_notice(&self, text: &str) {
        if let Some(previous) = self.notice.borrow_mut().take() {
            previous.remove();
        }
        let Ok(notice) = self.document.create_element("div") else {
            return;
        };
        notice.set_text_content(Some(text));
        let _ = notice.set_attribute("style", NOTICE_STYLE);
        let parent: Option<Node> = self
            .document
            .body()
            .map(Into::into)
            .or_else(|| self.document.document_element().map(Into::into));
        let Some(parent) = parent else {
            return;
        };
        if parent.append_child(&notice).is_err() {
            return;
        }
        let shown = notice.clone();
        Timeout::new(millis(NOTICE_DURATION), move || shown.remove()).forget();
        *self.notice.borrow_mut() = Some(notice);
    }

    // --- messaging -------------------------------------------------------

    fn post_to_top(&self, payload: &Value) {
        if let Some(top) = prop(&self.window, "top") {
            self.post_to_window(&top, payload);
        }
    }

    fn post_to_window(&self, window: &JsValue, payload: &Value) {
        let Some(message) = to_js(payload) else {
            return;
        };
        let Some(post) = prop(window, "postMessage").and_then(|f| f.dyn_into::<Function>().ok())
        else {
            return;
        };
        if let Err(err) = post.call2(window, &message, &JsValue::from_str("*")) {
            debug!(target: LOG_TARGET, error = %error_name(&err), "postMessage failed");
        }
    }

    // --- scheduling ------------------------------------------------------

    fn subscribe(&self, target: &Node, kind: Listen) -> Option<WebSubscription> {
        if kind == Listen::Mutations {
            return self.observe_mutations(target);
        }
        let listeners = if on_window(kind) {
            let window = self.window_of(target)?;
            self.listen(&window, target, kind)
        } else {
            self.listen(target, target, kind)
        };
        Some(WebSubscription::Listeners(listeners))
    }

    fn when_defined(&self, tag: &str) {
        let Ok(promise) = self
            .window
            .custom_elements()
            .when_defined(&tag.to_ascii_lowercase())
        else {
            return;
        };
        let sink = Rc::clone(&self.sink);
        let tag = tag.to_string();
        wasm_bindgen_futures::spawn_local(async move {
            if JsFuture::from(promise).await.is_ok() {
                sink(HostEvent::Defined(tag));
            }
        });
    }

    fn inject_page_script(&self, realm: &Node, id: &str, source: &str) -> bool {
        if realm.node_type() != DOCUMENT_NODE {
            return false;
        }
        let document = realm.unchecked_ref::<Document>();
        if document.get_element_by_id(id).is_some() {
            return false;
        }
        let Ok(script) = document.create_element("script") else {
            return false;
        };
        script.set_id(id);
        script.set_text_content(Some(source));
        let parent: Option<Node> = document
            .head()
            .map(Into::into)
            .or_else(|| document.document_element().map(Into::into));
        parent.is_some_and(|parent| parent.append_child(&script).is_ok())
    }
}
