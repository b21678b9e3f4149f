#![forbid(unsafe_code)]

//! Host abstraction over the page DOM.
//!
//! The core never touches a browser API directly. A host (the `web-sys`
//! content script, or [`FakeDom`](crate::fake_dom::FakeDom) in tests)
//! implements [`Dom`] and forwards DOM events into the
//! [`Session`](crate::session::Session) entry points.
//!
//! # Cross-realm handles
//!
//! `Node` values may come from a different JavaScript realm than the one the
//! extension runs in (page context vs. isolated world, or a same-origin
//! iframe). The core therefore never asks "is this an `HTMLVideoElement`";
//! it classifies nodes structurally through [`Dom::tag_name`] and the
//! predicates in [`crate::predicates`].
//!
//! # Subscriptions
//!
//! [`Dom::subscribe`] returns an owned registration. Dropping it must remove
//! the underlying listener or observer, which is how the session disposes of
//! listeners for pruned videos and roots.

use core::fmt::Debug;

use serde_json::Value;

use crate::geometry::{Rect, Viewport};

/// Shadow root mode requested by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowMode {
    Open,
    Closed,
}

/// Event families the core can ask the host to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listen {
    /// Capturing `keydown` + `keyup` on a document or shadow root.
    Keyboard,
    /// Subtree `childList` mutations on a document or shadow root.
    Mutations,
    /// Capturing `pointerdown` on a document or shadow root.
    PointerDown,
    /// `scroll` on the window owning a document.
    Scroll,
    /// `dblclick` on a video.
    DoubleClick,
    /// `load` on an iframe.
    IframeLoad,
    /// Playback-affecting media events on a video (`loadedmetadata`, `pause`,
    /// `play`, `ratechange`, `seeked`, `volumechange`, `ended`, `error`).
    MediaEvents,
    /// The bubbling shadow-attached signal re-dispatched by the page hook.
    ShadowAttachSignal,
    /// `message` on the window owning a document.
    Messages,
}

/// Live playback attributes of a media element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaSnapshot {
    pub paused: bool,
    pub ended: bool,
    pub current_time: f64,
    /// `NaN` before metadata is known, `+inf` for live streams.
    pub duration: f64,
    pub playback_rate: f64,
    pub volume: f64,
    pub muted: bool,
}

impl Default for MediaSnapshot {
    fn default() -> Self {
        Self {
            paused: true,
            ended: false,
            current_time: 0.0,
            duration: f64::NAN,
            playback_rate: 1.0,
            volume: 1.0,
            muted: false,
        }
    }
}

impl MediaSnapshot {
    /// Not paused and not ended.
    #[must_use]
    pub const fn is_playing(&self) -> bool {
        !self.paused && !self.ended
    }
}

/// A single mutation of a media element's playback state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaCommand {
    SetCurrentTime(f64),
    SetVolume(f64),
    SetMuted(bool),
    SetPlaybackRate(f64),
    /// Native `play()`. A rejection is reported back through
    /// [`Session::on_play_rejected`](crate::session::Session::on_play_rejected).
    Play,
    Pause,
    EnterFullscreen,
    ExitFullscreen,
}

/// Everything the core needs from the page.
pub trait Dom {
    /// An element, a document, or a shadow root.
    type Node: Clone + PartialEq + Debug;
    /// A window reference, compared by identity.
    type Window: Clone + PartialEq + Debug;
    /// A live listener registration; dropping it disposes the listener.
    type Subscription;

    // --- structure -------------------------------------------------------

    /// The document this frame's session runs in.
    fn document(&self) -> Self::Node;

    /// Every element below `root` in tree order (`querySelectorAll('*')`),
    /// excluding `root` itself. Does not descend into shadow roots or frames.
    fn descendants(&self, root: &Self::Node) -> Vec<Self::Node>;

    /// Upper-case tag name for elements, empty for documents and shadow roots.
    fn tag_name(&self, node: &Self::Node) -> String;

    fn is_connected(&self, node: &Self::Node) -> bool;

    /// The ordinary `shadowRoot` accessor: open roots only.
    fn shadow_root(&self, element: &Self::Node) -> Option<Self::Node>;

    /// Extension-privileged accessor that also returns closed roots. Hosts
    /// without such an API return `None`.
    fn privileged_shadow_root(&self, element: &Self::Node) -> Option<Self::Node>;

    /// Host element of a shadow root.
    fn shadow_host(&self, root: &Self::Node) -> Option<Self::Node>;

    /// `getRootNode()`: the document or shadow root containing `node`.
    fn root_node(&self, node: &Self::Node) -> Self::Node;

    /// Whether `customElements.get(tag)` is defined in the element's realm.
    fn is_custom_element_defined(&self, tag: &str) -> bool;

    /// Same-origin document of an iframe. `None` when access is denied or the
    /// frame has no document yet; must never throw.
    fn content_document(&self, frame: &Self::Node) -> Option<Self::Node>;

    fn content_window(&self, frame: &Self::Node) -> Option<Self::Window>;

    /// Light-tree `Node.contains` (inclusive).
    fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool;

    fn is_content_editable(&self, element: &Self::Node) -> bool;

    /// `activeElement` of a document or shadow root.
    fn active_element(&self, root: &Self::Node) -> Option<Self::Node>;

    fn fullscreen_element(&self) -> Option<Self::Node>;

    fn bounding_rect(&self, element: &Self::Node) -> Rect;

    fn viewport(&self) -> Viewport;

    // --- frame -----------------------------------------------------------

    fn is_top_frame(&self) -> bool;

    /// Whether `window.top.document` is reachable from this frame.
    fn can_access_top_document(&self) -> bool;

    fn is_top_window(&self, window: &Self::Window) -> bool;

    fn hostname(&self) -> String;

    fn location_href(&self) -> String;

    /// A fresh random token; only needs to be unlikely to collide.
    fn random_token(&self) -> String;

    // --- media -----------------------------------------------------------

    fn media_snapshot(&self, video: &Self::Node) -> MediaSnapshot;

    fn apply_media(&self, video: &Self::Node, command: MediaCommand);

    /// Force native controls visible for `duration`.
    fn reveal_controls(&self, video: &Self::Node, duration: core::time::Duration);

    /// Transient user-facing notice (speed indicator, blocked playback).
    fn show_notice(&self, text: &str);

    // --- messaging -------------------------------------------------------

    fn post_to_top(&self, payload: &Value);

    fn post_to_window(&self, window: &Self::Window, payload: &Value);

    // --- scheduling ------------------------------------------------------

    /// Register a listener. For [`Listen::Scroll`] and [`Listen::Messages`]
    /// the target is a document and the listener goes on its window.
    fn subscribe(&self, target: &Self::Node, kind: Listen) -> Option<Self::Subscription>;

    /// Resolve once `customElements.whenDefined(tag)` does, then call
    /// [`Session::on_custom_element_defined`](crate::session::Session::on_custom_element_defined).
    fn when_defined(&self, tag: &str);

    /// Insert a page-context script element with `id` into `realm` unless one
    /// with that id is already present. Returns whether it was inserted.
    fn inject_page_script(&self, realm: &Self::Node, id: &str, source: &str) -> bool;
}
