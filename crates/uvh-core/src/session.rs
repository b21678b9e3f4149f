#![forbid(unsafe_code)]

//! Per-frame session.
//!
//! A [`Session`] owns every registry, pointer, and timer for one browsing
//! context. The host constructs one per frame, calls [`Session::start`], and
//! then forwards DOM events into the `on_*` entry points. Keyboard-like entry
//! points answer with a [`Disposition`]; on [`Disposition::Handled`] the host
//! must call `preventDefault()` and `stopPropagation()`.
//!
//! # Time
//!
//! The session never reads a clock. Entry points that may start the
//! retarget debounce take `now` (monotonic, host epoch); the host arms a
//! timer for [`Session::next_deadline`] and calls [`Session::tick`] when it
//! fires.
//!
//! # Microtasks
//!
//! Work the browser would run at microtask granularity (the interceptor's
//! install-time sweep) is queued and drained by [`Session::run_microtasks`].
//! The host calls it from a resolved promise right after `start` and after
//! any entry point for which [`Session::has_microtasks`] reports pending work.

use core::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::LOG_TARGET;
use crate::action::ActionDescriptor;
use crate::config::SessionConfig;
use crate::coordinator::{ChildCoordinator, FrameRole, TopCoordinator, generate_frame_id};
use crate::debounce::Debouncer;
use crate::dom::{Dom, Listen, MediaCommand};
use crate::executor::Executor;
use crate::interceptor::ShadowAttachInterceptor;
use crate::observer::{Discovery, RootObserver};
use crate::predicates::{composed_contains, deep_active_element, is_input_target};
use crate::protocol::{Inbound, parse_inbound};
use crate::registry::{ClosedShadowMap, RootKind};
use crate::remote::RemoteRegistry;
use crate::selector::{ActiveTarget, Candidate, Side, choose, select_best_local};
use crate::settings::Settings;
use crate::shortcut::{Interpreter, KeyChord, KeyCode, ShortcutContext};

/// Notice shown when the browser refuses programmatic playback.
pub const PLAY_BLOCKED_NOTICE: &str = "Playback blocked by the browser";

/// Whether the session consumed an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The host must `preventDefault()` and `stopPropagation()`.
    Handled,
    /// Leave the event to the page.
    Ignored,
}

impl Disposition {
    #[must_use]
    pub const fn is_handled(self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// A `keydown`/`keyup` as the session sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInput<N> {
    pub chord: KeyChord,
    /// `event.target`, if it is a node.
    pub target: Option<N>,
}

impl<N> KeyInput<N> {
    #[must_use]
    pub const fn new(chord: KeyChord, target: Option<N>) -> Self {
        Self { chord, target }
    }
}

pub struct Session<D: Dom> {
    config: SessionConfig,
    settings: Settings,
    role: Option<FrameRole>,
    hostname: String,
    observer: RootObserver<D>,
    interceptor: ShadowAttachInterceptor<D::Node>,
    child: Option<ChildCoordinator<D::Node>>,
    top: TopCoordinator<D::Node, D::Window>,
    interpreter: Interpreter,
    executor: Executor,
    current: Option<ActiveTarget<D::Node>>,
    debounce: Debouncer,
    last_pointer: Option<D::Node>,
    suppressed_keyups: Vec<KeyCode>,
    window_subscriptions: Vec<D::Subscription>,
}

impl<D: Dom> Session<D> {
    #[must_use]
    pub fn new(config: SessionConfig, settings: Settings) -> Self {
        let config = config.validated();
        Self {
            settings,
            role: None,
            hostname: String::new(),
            observer: RootObserver::new(),
            interceptor: ShadowAttachInterceptor::new(config.closed_shadow_policy),
            child: None,
            top: TopCoordinator::new(config.max_pending_messages),
            interpreter: Interpreter::new(&config),
            executor: Executor::new(&config),
            current: None,
            debounce: Debouncer::new(config.retarget_debounce())
                .with_max_wait(config.retarget_max_wait()),
            last_pointer: None,
            suppressed_keyups: Vec::new(),
            window_subscriptions: Vec::new(),
            config,
        }
    }

    // --- lifecycle -------------------------------------------------------

    /// Detect the frame role and, unless this is a same-origin child, hook
    /// shadow attachment, observe the document, and pick an initial target.
    pub fn start(&mut self, dom: &D) -> FrameRole {
        if let Some(role) = self.role {
            return role;
        }
        let role = FrameRole::detect(dom);
        self.role = Some(role);
        self.hostname = dom.hostname();
        debug!(target: LOG_TARGET, role = role.as_str(), host = %self.hostname, "session start");
        if role == FrameRole::SameOriginChild {
            return role;
        }

        let document = dom.document();
        self.interceptor.install(dom, &document);
        if role == FrameRole::CrossOriginChild {
            self.observer.set_track_media(true);
            let frame_id = generate_frame_id(&dom.random_token(), &dom.location_href());
            self.child = Some(ChildCoordinator::new(frame_id));
        }
        self.window_subscriptions.extend(
            [Listen::Messages, Listen::Scroll]
                .into_iter()
                .filter_map(|listen| dom.subscribe(&document, listen)),
        );

        let found = self.observer.observe(
            dom,
            &document,
            RootKind::Document,
            "root document",
            self.interceptor.closed(),
        );
        self.process(dom, found);
        self.refresh(dom);
        role
    }

    #[must_use]
    pub fn has_microtasks(&self) -> bool {
        self.interceptor.has_pending_sweeps()
    }

    /// Drain microtask-granularity work: the interceptor's sweep over
    /// elements that had shadow roots before the hook was installed.
    pub fn run_microtasks(&mut self, dom: &D) {
        for host in self.interceptor.run_sweeps(dom) {
            let found = self
                .observer
                .on_shadow_attached(dom, &host, self.interceptor.closed());
            self.process(dom, found);
        }
    }

    /// Fire the debounced retarget if due.
    pub fn tick(&mut self, dom: &D, now: Duration) {
        if self.debounce.fire(now) {
            self.prune(dom);
            self.refresh(dom);
        }
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.debounce.next_deadline()
    }

    /// Drop state for nodes that left the page.
    pub fn prune(&mut self, dom: &D) {
        self.observer.prune(dom);
        self.interceptor.prune(dom);
        if let Some(child) = &mut self.child {
            child.prune(dom);
        }
        let remotes = self.top.prune(dom);
        if remotes > 0 {
            debug!(target: LOG_TARGET, remotes, "pruned remote videos");
        }
        if self
            .last_pointer
            .as_ref()
            .is_some_and(|node| !dom.is_connected(node))
        {
            self.last_pointer = None;
        }
        let stale = match &self.current {
            Some(ActiveTarget::Local(video)) => !self.observer.videos().contains(video),
            Some(ActiveTarget::Remote(key)) => self.top.remotes().get(key).is_none(),
            None => false,
        };
        if stale {
            self.current = None;
        }
    }

    fn process(&mut self, dom: &D, found: Discovery<D::Node>) {
        for document in &found.documents {
            self.interceptor.install(dom, document);
        }
        if let Some(child) = &mut self.child {
            for video in &found.videos {
                child.register(dom, video);
            }
        }
        if self.role == Some(FrameRole::Top) && (!found.roots.is_empty() || found.frames > 0) {
            let resolved = self.top.retry_pending(dom, self.observer.roots().nodes());
            if resolved > 0 {
                debug!(target: LOG_TARGET, resolved, "resolved queued remote reports");
            }
        }
    }

    fn is_active(&self) -> bool {
        matches!(
            self.role,
            Some(FrameRole::Top | FrameRole::CrossOriginChild)
        ) && self.settings.is_active_for(&self.hostname)
    }

    // --- DOM events ------------------------------------------------------

    pub fn on_key_down(&mut self, dom: &D, input: &KeyInput<D::Node>) -> Disposition {
        if !self.is_active() {
            return Disposition::Ignored;
        }
        if input
            .target
            .as_ref()
            .is_some_and(|target| is_input_target(dom, target))
        {
            return Disposition::Ignored;
        }
        let Some(target) = self.resolve_active_target(dom) else {
            return Disposition::Ignored;
        };
        let ctx = ShortcutContext {
            playback_rate: self.playback_rate_of(dom, &target),
            can_volume: self.can_volume(dom, &target),
        };
        let Some(action) = self.interpreter.interpret(&input.chord, &ctx) else {
            return Disposition::Ignored;
        };
        self.dispatch(dom, &target, action);
        if !self.suppressed_keyups.contains(&input.chord.code) {
            self.suppressed_keyups.push(input.chord.code.clone());
        }
        Disposition::Handled
    }

    /// Swallow the `keyup` of a handled `keydown`.
    pub fn on_key_up(&mut self, input: &KeyInput<D::Node>) -> Disposition {
        match self
            .suppressed_keyups
            .iter()
            .position(|code| *code == input.chord.code)
        {
            Some(index) => {
                self.suppressed_keyups.swap_remove(index);
                Disposition::Handled
            }
            None => Disposition::Ignored,
        }
    }

    /// A mutation batch on an observed root added `added`.
    pub fn on_mutation(&mut self, dom: &D, root: &D::Node, added: &[D::Node], now: Duration) {
        if !self.observer.roots().contains(root) {
            trace!(target: LOG_TARGET, "mutation on unobserved root");
            return;
        }
        let found = self.observer.on_added(dom, added, self.interceptor.closed());
        self.process(dom, found);
        self.debounce.poke(now);
    }

    pub fn on_scroll(&mut self, now: Duration) {
        self.debounce.poke(now);
    }

    /// Remember the last pointer-down target for volume eligibility.
    pub fn on_pointer_down(&mut self, target: &D::Node) -> Disposition {
        self.last_pointer = Some(target.clone());
        Disposition::Ignored
    }

    /// The page hook signalled a new shadow root on `host`.
    pub fn on_shadow_attached(&mut self, dom: &D, host: &D::Node) {
        self.interceptor.record_attachment(dom, host);
        let found = self
            .observer
            .on_shadow_attached(dom, host, self.interceptor.closed());
        self.process(dom, found);
    }

    pub fn on_custom_element_defined(&mut self, dom: &D, tag: &str) {
        let found = self
            .observer
            .on_custom_element_defined(dom, tag, self.interceptor.closed());
        self.process(dom, found);
    }

    pub fn on_iframe_load(&mut self, dom: &D, frame: &D::Node) {
        let found = self
            .observer
            .on_frame_load(dom, frame, self.interceptor.closed());
        self.process(dom, found);
    }

    /// Double-click on a known video toggles fullscreen.
    pub fn on_video_double_click(&mut self, dom: &D, video: &D::Node) -> Disposition {
        if !self.is_active() || !self.observer.videos().contains(video) {
            return Disposition::Ignored;
        }
        self.executor
            .execute(dom, video, &ActionDescriptor::ToggleFullscreen);
        Disposition::Handled
    }

    /// A playback-affecting media event fired on `video`.
    pub fn on_media_event(&mut self, dom: &D, video: &D::Node) {
        if let Some(child) = &self.child {
            child.report_state(dom, video);
        }
    }

    /// An inbound `postMessage` from `source`.
    pub fn on_message(&mut self, dom: &D, data: &Value, source: &D::Window) {
        let inbound = match parse_inbound(data) {
            Ok(inbound) => inbound,
            Err(err) => {
                trace!(target: LOG_TARGET, error = %err, "dropped inbound message");
                return;
            }
        };
        match (self.role, inbound) {
            (Some(FrameRole::Top), Inbound::Report { kind, report }) => {
                self.top
                    .on_report(dom, self.observer.roots().nodes(), kind, report, source);
            }
            (Some(FrameRole::CrossOriginChild), Inbound::Action(command)) => {
                if let Some(child) = &self.child {
                    child.handle_action(dom, &self.executor, &command, source);
                }
            }
            (role, _) => {
                trace!(target: LOG_TARGET, role = ?role, "dropped message not meant for this frame");
            }
        }
    }

    /// Native `play()` on `video` rejected with `reason`. Not retried.
    pub fn on_play_rejected(&mut self, dom: &D, video: &D::Node, reason: &str) {
        warn!(target: LOG_TARGET, video = ?video, reason, "playback rejected");
        dom.show_notice(PLAY_BLOCKED_NOTICE);
    }

    /// A `storage.onChanged` map.
    pub fn on_settings_changed(&mut self, changes: &Map<String, Value>) {
        if self.settings.apply_changes(changes) {
            debug!(
                target: LOG_TARGET,
                enabled = self.settings.is_active_for(&self.hostname),
                always_enable_sound = self.settings.always_enable_sound,
                "settings changed"
            );
        }
    }

    /// Replace settings wholesale, e.g. once the initial storage read lands.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    // --- target resolution ----------------------------------------------

    /// Recompute the active target, updating the current pointer when it
    /// changes. Non-top frames only ever pick local videos.
    pub fn resolve_active_target(&mut self, dom: &D) -> Option<ActiveTarget<D::Node>> {
        let margin = self.config.visibility_margin_px;
        let viewport = dom.viewport();
        let local = select_best_local(dom, self.observer.videos().iter(), margin);

        let remote = if self.role == Some(FrameRole::Top) {
            self.top
                .remotes()
                .best(viewport, margin, |frame| {
                    dom.is_connected(frame).then(|| dom.bounding_rect(frame))
                })
                .map(|record| {
                    let visible = record
                        .absolute_rect(&dom.bounding_rect(&record.frame))
                        .is_visible_in(viewport, margin);
                    (
                        record.key.clone(),
                        Candidate {
                            playing: record.playing,
                            visible,
                        },
                    )
                })
        } else {
            None
        };

        let local_candidate = local.as_ref().map(|video| Candidate {
            playing: dom.media_snapshot(video).is_playing(),
            visible: dom.bounding_rect(video).is_visible_in(viewport, margin),
        });
        let target = match choose(local_candidate, remote.as_ref().map(|(_, c)| *c))? {
            Side::Local => ActiveTarget::Local(local?),
            Side::Remote => ActiveTarget::Remote(remote?.0),
        };
        self.set_current(dom, &target);
        Some(target)
    }

    fn refresh(&mut self, dom: &D) {
        if self.is_active() {
            let _ = self.resolve_active_target(dom);
        }
    }

    fn set_current(&mut self, dom: &D, target: &ActiveTarget<D::Node>) {
        if self.current.as_ref() == Some(target) {
            return;
        }
        match target {
            ActiveTarget::Local(video) => {
                debug!(target: LOG_TARGET, source = target.source(), video = ?video, "active video changed");
            }
            ActiveTarget::Remote(key) => {
                debug!(target: LOG_TARGET, source = target.source(), key = %key, "active video changed");
            }
        }
        self.current = Some(target.clone());
        if self.settings.always_enable_sound {
            self.force_sound(dom, target);
        }
    }

    fn force_sound(&self, dom: &D, target: &ActiveTarget<D::Node>) {
        match target {
            ActiveTarget::Local(video) => {
                dom.apply_media(video, MediaCommand::SetMuted(false));
                dom.apply_media(video, MediaCommand::SetVolume(1.0));
            }
            ActiveTarget::Remote(key) => {
                self.top
                    .send_action(dom, key, ActionDescriptor::Volume { delta: 100.0 });
            }
        }
        debug!(target: LOG_TARGET, "forced sound on: unmuted, volume 100%");
    }

    fn dispatch(&self, dom: &D, target: &ActiveTarget<D::Node>, action: ActionDescriptor) {
        match target {
            ActiveTarget::Local(video) => {
                self.executor.execute(dom, video, &action);
            }
            ActiveTarget::Remote(key) => {
                self.top.send_action(dom, key, action);
            }
        }
    }

    fn playback_rate_of(&self, dom: &D, target: &ActiveTarget<D::Node>) -> f64 {
        match target {
            ActiveTarget::Local(video) => dom.media_snapshot(video).playback_rate,
            ActiveTarget::Remote(key) => self
                .top
                .remotes()
                .get(key)
                .map_or(1.0, |record| record.playback_rate),
        }
    }

    /// Whether arrow keys may adjust volume: the focused element, the
    /// fullscreen element, or the last clicked non-input element must sit
    /// inside the video's box or contain the video. BODY and HTML never
    /// qualify.
    fn can_volume(&self, dom: &D, target: &ActiveTarget<D::Node>) -> bool {
        let (anchor, video_rect) = match target {
            ActiveTarget::Local(video) => (video.clone(), dom.bounding_rect(video)),
            ActiveTarget::Remote(key) => {
                let Some(record) = self.top.remotes().get(key) else {
                    return false;
                };
                (
                    record.frame.clone(),
                    record.absolute_rect(&dom.bounding_rect(&record.frame)),
                )
            }
        };
        let tolerance = self.config.volume_tolerance_px;
        let engaged = |element: &D::Node| {
            // The page body contains everything; focus or a click there says
            // nothing about the video.
            if matches!(dom.tag_name(element).as_str(), "" | "BODY" | "HTML") {
                return false;
            }
            if *element == anchor || composed_contains(dom, element, &anchor) {
                return true;
            }
            let rect = dom.bounding_rect(element);
            !rect.is_empty() && video_rect.encloses(&rect, tolerance)
        };

        if deep_active_element(dom, &dom.document())
            .as_ref()
            .is_some_and(|el| engaged(el))
        {
            return true;
        }
        if dom.fullscreen_element().as_ref().is_some_and(|el| engaged(el)) {
            return true;
        }
        self.last_pointer
            .as_ref()
            .filter(|el| !is_input_target(dom, el))
            .is_some_and(|el| engaged(el))
    }

    // --- inspection ------------------------------------------------------

    #[must_use]
    pub fn role(&self) -> Option<FrameRole> {
        self.role
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The target most recently resolved.
    #[must_use]
    pub fn current_target(&self) -> Option<&ActiveTarget<D::Node>> {
        self.current.as_ref()
    }

    /// Known local videos in discovery order.
    #[must_use]
    pub fn videos(&self) -> Vec<D::Node> {
        self.observer.videos().iter().cloned().collect()
    }

    #[must_use]
    pub fn observed_root_count(&self) -> usize {
        self.observer.roots().len()
    }

    #[must_use]
    pub fn is_observed(&self, root: &D::Node) -> bool {
        self.observer.roots().contains(root)
    }

    #[must_use]
    pub fn remote_videos(&self) -> &RemoteRegistry<D::Node> {
        self.top.remotes()
    }

    #[must_use]
    pub fn pending_message_count(&self) -> usize {
        self.top.pending_len()
    }

    #[must_use]
    pub fn closed_shadow_roots(&self) -> &ClosedShadowMap<D::Node> {
        self.interceptor.closed()
    }

    /// This frame's `frame_id`, in a cross-origin child.
    #[must_use]
    pub fn frame_id(&self) -> Option<&str> {
        self.child.as_ref().map(ChildCoordinator::frame_id)
    }
}
