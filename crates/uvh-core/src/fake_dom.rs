//! In-memory [`Dom`] host for tests.
//!
//! `FakeDom` models just enough of a page for the session's state machines:
//! a node tree with shadow roots (open and closed) and iframes (same-origin or
//! cross-origin), focus and fullscreen pointers, per-video media state, and
//! recorders for everything the core asks the host to do (posted messages,
//! listener registrations, injected scripts, notices).
//!
//! Events are not dispatched automatically: a test mutates the tree and then
//! calls the matching [`Session`](crate::session::Session) entry point, the
//! same way the browser host forwards real events.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;

use crate::dom::{Dom, Listen, MediaCommand, MediaSnapshot, ShadowMode};
use crate::geometry::{Rect, Viewport};

/// Handle to a fake node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Handle to a fake window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub usize);

/// Window id reported for `window.top`.
pub const TOP_WINDOW: WindowId = WindowId(0);

#[derive(Debug, Clone)]
enum Kind {
    Document { frame: Option<NodeId> },
    Shadow { host: NodeId, mode: ShadowMode },
    Element { tag: String },
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: Kind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow: Option<NodeId>,
    rect: Rect,
    editable: bool,
    frame_doc: Option<NodeId>,
    frame_window: Option<WindowId>,
    cross_origin: bool,
    media: Option<MediaSnapshot>,
}

impl NodeData {
    fn new(kind: Kind, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            shadow: None,
            rect: Rect::default(),
            editable: false,
            frame_doc: None,
            frame_window: None,
            cross_origin: false,
            media: None,
        }
    }
}

type SubscriptionLog = Rc<RefCell<Vec<(u64, NodeId, Listen)>>>;

#[derive(Debug)]
struct State {
    nodes: Vec<NodeData>,
    next_window: usize,
    focused: Option<NodeId>,
    fullscreen: Option<NodeId>,
    viewport: Viewport,
    top_frame: bool,
    top_accessible: bool,
    hostname: String,
    href: String,
    tokens: u64,
    defined: HashSet<String>,
    privileged: bool,
    block_play: bool,
    next_subscription: u64,
    when_defined: Vec<String>,
    scripts: Vec<(NodeId, String, String)>,
    posted_top: Vec<Value>,
    posted: Vec<(WindowId, Value)>,
    notices: Vec<String>,
    revealed: Vec<NodeId>,
    commands: Vec<(NodeId, MediaCommand)>,
    rejected_plays: Vec<NodeId>,
}

/// Registration handed out by [`FakeDom::subscribe`]; dropping it removes the
/// entry from the live listener log.
#[derive(Debug)]
pub struct FakeSubscription {
    id: u64,
    log: SubscriptionLog,
}

impl Drop for FakeSubscription {
    fn drop(&mut self) {
        self.log.borrow_mut().retain(|(id, _, _)| *id != self.id);
    }
}

/// In-memory page.
#[derive(Debug)]
pub struct FakeDom {
    state: RefCell<State>,
    subscriptions: SubscriptionLog,
}

impl Default for FakeDom {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDom {
    /// A top-frame page at `https://example.com/watch` with a 1280x720
    /// viewport and an empty document.
    #[must_use]
    pub fn new() -> Self {
        let state = State {
            nodes: vec![NodeData::new(Kind::Document { frame: None }, None)],
            next_window: 1,
            focused: None,
            fullscreen: None,
            viewport: Viewport::new(1280.0, 720.0),
            top_frame: true,
            top_accessible: true,
            hostname: "example.com".to_string(),
            href: "https://example.com/watch".to_string(),
            tokens: 0,
            defined: HashSet::new(),
            privileged: true,
            block_play: false,
            next_subscription: 0,
            when_defined: Vec::new(),
            scripts: Vec::new(),
            posted_top: Vec::new(),
            posted: Vec::new(),
            notices: Vec::new(),
            revealed: Vec::new(),
            commands: Vec::new(),
            rejected_plays: Vec::new(),
        };
        Self {
            state: RefCell::new(state),
            subscriptions: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A page running inside a child frame. `top_accessible` decides whether
    /// it is same-origin with the top frame.
    #[must_use]
    pub fn child_frame(href: &str, top_accessible: bool) -> Self {
        let dom = Self::new();
        {
            let mut state = dom.state.borrow_mut();
            state.top_frame = false;
            state.top_accessible = top_accessible;
            state.href = href.to_string();
            state.hostname = href
                .split("://")
                .nth(1)
                .and_then(|rest| rest.split('/').next())
                .unwrap_or_default()
                .to_string();
        }
        dom
    }

    fn push(&self, data: NodeData) -> NodeId {
        let mut state = self.state.borrow_mut();
        state.nodes.push(data);
        NodeId(state.nodes.len() - 1)
    }

    // --- tree building ---------------------------------------------------

    /// Create a detached element.
    pub fn create(&self, tag: &str) -> NodeId {
        self.push(NodeData::new(
            Kind::Element {
                tag: tag.to_string(),
            },
            None,
        ))
    }

    /// Insert a (possibly detached, possibly populated) element under `parent`.
    pub fn append_child(&self, parent: &NodeId, child: &NodeId) {
        let mut state = self.state.borrow_mut();
        if let Some(old) = state.nodes[child.0].parent {
            state.nodes[old.0].children.retain(|c| c != child);
        }
        state.nodes[child.0].parent = Some(*parent);
        state.nodes[parent.0].children.push(*child);
    }

    /// Create an element and append it to `parent`.
    pub fn append(&self, parent: &NodeId, tag: &str) -> NodeId {
        let child = self.create(tag);
        self.append_child(parent, &child);
        child
    }

    /// Append a `<video>` with the given rect and default (paused) media state.
    pub fn append_video(&self, parent: &NodeId, rect: Rect) -> NodeId {
        let video = self.append(parent, "video");
        let mut state = self.state.borrow_mut();
        state.nodes[video.0].rect = rect;
        state.nodes[video.0].media = Some(MediaSnapshot::default());
        video
    }

    pub fn remove(&self, node: &NodeId) {
        let mut state = self.state.borrow_mut();
        if let Some(parent) = state.nodes[node.0].parent.take() {
            state.nodes[parent.0].children.retain(|c| c != node);
        }
    }

    pub fn attach_shadow(&self, host: &NodeId, mode: ShadowMode) -> NodeId {
        let root = self.push(NodeData::new(Kind::Shadow { host: *host, mode }, None));
        self.state.borrow_mut().nodes[host.0].shadow = Some(root);
        root
    }

    /// Give an iframe a fresh document and window. Returns both.
    pub fn load_frame(&self, frame: &NodeId, cross_origin: bool) -> (NodeId, WindowId) {
        let doc = self.push(NodeData::new(
            Kind::Document {
                frame: Some(*frame),
            },
            None,
        ));
        let mut state = self.state.borrow_mut();
        let window = match state.nodes[frame.0].frame_window {
            Some(window) => window,
            None => {
                let window = WindowId(state.next_window);
                state.next_window += 1;
                window
            }
        };
        let data = &mut state.nodes[frame.0];
        data.frame_doc = Some(doc);
        data.frame_window = Some(window);
        data.cross_origin = cross_origin;
        (doc, window)
    }

    // --- state -----------------------------------------------------------

    pub fn set_rect(&self, node: &NodeId, rect: Rect) {
        self.state.borrow_mut().nodes[node.0].rect = rect;
    }

    pub fn set_media(&self, video: &NodeId, media: MediaSnapshot) {
        self.state.borrow_mut().nodes[video.0].media = Some(media);
    }

    /// Mark a video as playing (or paused).
    pub fn set_playing(&self, video: &NodeId, playing: bool) {
        let mut media = self.media(video);
        media.paused = !playing;
        media.ended = false;
        self.set_media(video, media);
    }

    #[must_use]
    pub fn media(&self, video: &NodeId) -> MediaSnapshot {
        self.state.borrow().nodes[video.0].media.unwrap_or_default()
    }

    pub fn set_content_editable(&self, node: &NodeId, editable: bool) {
        self.state.borrow_mut().nodes[node.0].editable = editable;
    }

    pub fn focus(&self, node: &NodeId) {
        self.state.borrow_mut().focused = Some(*node);
    }

    pub fn blur(&self) {
        self.state.borrow_mut().focused = None;
    }

    pub fn set_fullscreen(&self, node: Option<NodeId>) {
        self.state.borrow_mut().fullscreen = node;
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.state.borrow_mut().viewport = viewport;
    }

    pub fn define(&self, tag: &str) {
        self.state.borrow_mut().defined.insert(tag.to_ascii_lowercase());
    }

    /// Toggle the extension-privileged open-or-closed shadow accessor.
    pub fn set_privileged_access(&self, enabled: bool) {
        self.state.borrow_mut().privileged = enabled;
    }

    /// Make subsequent `Play` commands "reject" and leave the video paused.
    pub fn block_play(&self, blocked: bool) {
        self.state.borrow_mut().block_play = blocked;
    }

    // --- recorders -------------------------------------------------------

    #[must_use]
    pub fn posted_to_top(&self) -> Vec<Value> {
        self.state.borrow().posted_top.clone()
    }

    #[must_use]
    pub fn posted_to(&self, window: WindowId) -> Vec<Value> {
        self.state
            .borrow()
            .posted
            .iter()
            .filter(|(w, _)| *w == window)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Live listener kinds registered on `node`.
    #[must_use]
    pub fn listeners(&self, node: &NodeId) -> Vec<Listen> {
        self.subscriptions
            .borrow()
            .iter()
            .filter(|(_, n, _)| n == node)
            .map(|(_, _, kind)| *kind)
            .collect()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    #[must_use]
    pub fn when_defined_requests(&self) -> Vec<String> {
        self.state.borrow().when_defined.clone()
    }

    /// `(realm, id)` of every injected page script.
    #[must_use]
    pub fn injected_scripts(&self) -> Vec<(NodeId, String)> {
        self.state
            .borrow()
            .scripts
            .iter()
            .map(|(realm, id, _)| (*realm, id.clone()))
            .collect()
    }

    #[must_use]
    pub fn injected_source(&self, realm: &NodeId) -> Option<String> {
        self.state
            .borrow()
            .scripts
            .iter()
            .find(|(r, _, _)| r == realm)
            .map(|(_, _, src)| src.clone())
    }

    #[must_use]
    pub fn notices(&self) -> Vec<String> {
        self.state.borrow().notices.clone()
    }

    #[must_use]
    pub fn revealed(&self) -> Vec<NodeId> {
        self.state.borrow().revealed.clone()
    }

    #[must_use]
    pub fn commands(&self, video: &NodeId) -> Vec<MediaCommand> {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|(v, _)| v == video)
            .map(|(_, c)| *c)
            .collect()
    }

    #[must_use]
    pub fn rejected_plays(&self) -> Vec<NodeId> {
        self.state.borrow().rejected_plays.clone()
    }

    // --- tree queries ----------------------------------------------------

    fn collect_descendants(state: &State, node: NodeId, out: &mut Vec<NodeId>) {
        for child in &state.nodes[node.0].children {
            out.push(*child);
            Self::collect_descendants(state, *child, out);
        }
    }

    fn connected(state: &State, node: NodeId) -> bool {
        let mut current = node;
        loop {
            let data = &state.nodes[current.0];
            match &data.kind {
                Kind::Document { frame: None } => return current == NodeId(0),
                Kind::Document { frame: Some(frame) } => {
                    return state.nodes[frame.0].frame_doc == Some(current)
                        && Self::connected(state, *frame);
                }
                Kind::Shadow { host, .. } => current = *host,
                Kind::Element { .. } => match data.parent {
                    Some(parent) => current = parent,
                    None => return false,
                },
            }
        }
    }

    fn tree_root(state: &State, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(parent) = state.nodes[current.0].parent {
            current = parent;
        }
        current
    }
}

impl Dom for FakeDom {
    type Node = NodeId;
    type Window = WindowId;
    type Subscription = FakeSubscription;

    fn document(&self) -> NodeId {
        NodeId(0)
    }

    fn descendants(&self, root: &NodeId) -> Vec<NodeId> {
        let state = self.state.borrow();
        let mut out = Vec::new();
        Self::collect_descendants(&state, *root, &mut out);
        out
    }

    fn tag_name(&self, node: &NodeId) -> String {
        match &self.state.borrow().nodes[node.0].kind {
            Kind::Element { tag } => tag.to_ascii_uppercase(),
            _ => String::new(),
        }
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        Self::connected(&self.state.borrow(), *node)
    }

    fn shadow_root(&self, element: &NodeId) -> Option<NodeId> {
        let state = self.state.borrow();
        let shadow = state.nodes[element.0].shadow?;
        match state.nodes[shadow.0].kind {
            Kind::Shadow {
                mode: ShadowMode::Open,
                ..
            } => Some(shadow),
            _ => None,
        }
    }

    fn privileged_shadow_root(&self, element: &NodeId) -> Option<NodeId> {
        let state = self.state.borrow();
        if !state.privileged {
            return None;
        }
        state.nodes[element.0].shadow
    }

    fn shadow_host(&self, root: &NodeId) -> Option<NodeId> {
        match self.state.borrow().nodes[root.0].kind {
            Kind::Shadow { host, .. } => Some(host),
            _ => None,
        }
    }

    fn root_node(&self, node: &NodeId) -> NodeId {
        Self::tree_root(&self.state.borrow(), *node)
    }

    fn is_custom_element_defined(&self, tag: &str) -> bool {
        self.state
            .borrow()
            .defined
            .contains(&tag.to_ascii_lowercase())
    }

    fn content_document(&self, frame: &NodeId) -> Option<NodeId> {
        let state = self.state.borrow();
        let data = &state.nodes[frame.0];
        if data.cross_origin {
            return None;
        }
        data.frame_doc
    }

    fn content_window(&self, frame: &NodeId) -> Option<WindowId> {
        self.state.borrow().nodes[frame.0].frame_window
    }

    fn contains(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        let state = self.state.borrow();
        let mut current = Some(*node);
        while let Some(id) = current {
            if id == *ancestor {
                return true;
            }
            current = state.nodes[id.0].parent;
        }
        false
    }

    fn is_content_editable(&self, element: &NodeId) -> bool {
        self.state.borrow().nodes[element.0].editable
    }

    fn active_element(&self, root: &NodeId) -> Option<NodeId> {
        let state = self.state.borrow();
        let mut current = state.focused?;
        loop {
            let tree_root = Self::tree_root(&state, current);
            if tree_root == *root {
                return Some(current);
            }
            match state.nodes[tree_root.0].kind {
                Kind::Shadow { host, .. } => current = host,
                _ => return None,
            }
        }
    }

    fn fullscreen_element(&self) -> Option<NodeId> {
        self.state.borrow().fullscreen
    }

    fn bounding_rect(&self, element: &NodeId) -> Rect {
        self.state.borrow().nodes[element.0].rect
    }

    fn viewport(&self) -> Viewport {
        self.state.borrow().viewport
    }

    fn is_top_frame(&self) -> bool {
        self.state.borrow().top_frame
    }

    fn can_access_top_document(&self) -> bool {
        self.state.borrow().top_accessible
    }

    fn is_top_window(&self, window: &WindowId) -> bool {
        *window == TOP_WINDOW
    }

    fn hostname(&self) -> String {
        self.state.borrow().hostname.clone()
    }

    fn location_href(&self) -> String {
        self.state.borrow().href.clone()
    }

    fn random_token(&self) -> String {
        let mut state = self.state.borrow_mut();
        state.tokens += 1;
        format!("tok{}", state.tokens)
    }

    fn media_snapshot(&self, video: &NodeId) -> MediaSnapshot {
        self.media(video)
    }

    fn apply_media(&self, video: &NodeId, command: MediaCommand) {
        let mut state = self.state.borrow_mut();
        state.commands.push((*video, command));
        if command == MediaCommand::Play && state.block_play {
            state.rejected_plays.push(*video);
            return;
        }
        match command {
            MediaCommand::EnterFullscreen => state.fullscreen = Some(*video),
            MediaCommand::ExitFullscreen => state.fullscreen = None,
            _ => {}
        }
        let media = state.nodes[video.0]
            .media
            .get_or_insert_with(MediaSnapshot::default);
        match command {
            MediaCommand::SetCurrentTime(t) => {
                media.current_time = t;
                media.ended = false;
            }
            MediaCommand::SetVolume(v) => media.volume = v,
            MediaCommand::SetMuted(m) => media.muted = m,
            MediaCommand::SetPlaybackRate(r) => media.playback_rate = r,
            MediaCommand::Play => {
                media.paused = false;
                media.ended = false;
            }
            MediaCommand::Pause => media.paused = true,
            MediaCommand::EnterFullscreen | MediaCommand::ExitFullscreen => {}
        }
    }

    fn reveal_controls(&self, video: &NodeId, _duration: core::time::Duration) {
        self.state.borrow_mut().revealed.push(*video);
    }

    fn show_notice(&self, text: &str) {
        self.state.borrow_mut().notices.push(text.to_string());
    }

    fn post_to_top(&self, payload: &Value) {
        self.state.borrow_mut().posted_top.push(payload.clone());
    }

    fn post_to_window(&self, window: &WindowId, payload: &Value) {
        self.state
            .borrow_mut()
            .posted
            .push((*window, payload.clone()));
    }

    fn subscribe(&self, target: &NodeId, kind: Listen) -> Option<FakeSubscription> {
        let id = {
            let mut state = self.state.borrow_mut();
            state.next_subscription += 1;
            state.next_subscription
        };
        self.subscriptions.borrow_mut().push((id, *target, kind));
        Some(FakeSubscription {
            id,
            log: Rc::clone(&self.subscriptions),
        })
    }

    fn when_defined(&self, tag: &str) {
        self.state.borrow_mut().when_defined.push(tag.to_string());
    }

    fn inject_page_script(&self, realm: &NodeId, id: &str, source: &str) -> bool {
        let mut state = self.state.borrow_mut();
        if state.scripts.iter().any(|(r, i, _)| r == realm && i == id) {
            return false;
        }
        state
            .scripts
            .push((*realm, id.to_string(), source.to_string()));
        true
    }
}
