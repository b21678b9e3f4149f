#![forbid(unsafe_code)]

//! Root observation and element classification.
//!
//! A [`RootObserver`] owns every observed root (the frame's document, shadow
//! roots, same-origin iframe documents) and the registry of videos found in
//! them. Observing a root is idempotent. The first time a root is seen the
//! observer:
//!
//! 1. asks the host for capturing keyboard and pointer listeners, a subtree
//!    mutation watch, and the shadow-attached signal on that root,
//! 2. classifies every existing element below it.
//!
//! Later mutations feed added nodes (and their subtrees, which may have been
//! batch-inserted) through the same classification.
//!
//! # Classification
//!
//! | Element | Reaction |
//! |---------|----------|
//! | `<video>` | register, arm double-click (and media events in child frames) |
//! | has reachable shadow root | observe that root |
//! | hyphenated tag, not yet defined | wait for `customElements.whenDefined` |
//! | `<iframe>` / `<frame>` | observe `contentDocument` if same-origin; arm `load` |
//!
//! Cross-origin frames simply yield no document; that is the signal to rely
//! on the cross-frame message protocol instead.

use tracing::debug;

use crate::LOG_TARGET;
use crate::dom::{Dom, Listen};
use crate::predicates::{is_custom_element_tag, is_frame_tag, is_video_tag};
use crate::registry::{ClosedShadowMap, ObservedRoot, ObservedRoots, RootKind, VideoRegistry};

/// Why an element is being classified; only used for log labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Mutation,
    ShadowSignal,
    Upgrade,
    FrameLoad,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Mutation => "mutation",
            Self::ShadowSignal => "shadow signal",
            Self::Upgrade => "custom element defined",
            Self::FrameLoad => "iframe load",
        }
    }
}

/// What one observation step found.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery<N> {
    /// Newly registered videos, in discovery order.
    pub videos: Vec<N>,
    /// Newly observed roots.
    pub roots: Vec<N>,
    /// Newly observed documents (frame documents); each is a fresh script realm.
    pub documents: Vec<N>,
    /// Frame elements seen (new or reloaded).
    pub frames: usize,
}

impl<N> Default for Discovery<N> {
    fn default() -> Self {
        Self {
            videos: Vec::new(),
            roots: Vec::new(),
            documents: Vec::new(),
            frames: 0,
        }
    }
}

impl<N> Discovery<N> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty() && self.roots.is_empty() && self.frames == 0
    }
}

#[derive(Debug)]
struct PendingUpgrade<N> {
    tag: String,
    element: N,
}

/// Shadow root of `element` visible to the extension: open accessor, then the
/// closed-shadow map, then the privileged accessor.
pub fn shadow_of<D: Dom>(
    dom: &D,
    element: &D::Node,
    closed: &ClosedShadowMap<D::Node>,
) -> Option<D::Node> {
    dom.shadow_root(element)
        .or_else(|| closed.get(element))
        .or_else(|| dom.privileged_shadow_root(element))
}

pub struct RootObserver<D: Dom> {
    roots: ObservedRoots<D::Node, D::Subscription>,
    videos: VideoRegistry<D::Node, D::Subscription>,
    upgrades: Vec<PendingUpgrade<D::Node>>,
    requested_tags: Vec<String>,
    frames: Vec<(D::Node, Option<D::Subscription>)>,
    track_media: bool,
}

impl<D: Dom> Default for RootObserver<D> {
    fn default() -> Self {
        Self {
            roots: ObservedRoots::default(),
            videos: VideoRegistry::default(),
            upgrades: Vec::new(),
            requested_tags: Vec::new(),
            frames: Vec::new(),
            track_media: false,
        }
    }
}

impl<D: Dom> RootObserver<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also subscribe every new video to its playback events (child frames
    /// report state upward on each one).
    pub fn set_track_media(&mut self, track: bool) {
        self.track_media = track;
    }

    #[must_use]
    pub fn roots(&self) -> &ObservedRoots<D::Node, D::Subscription> {
        &self.roots
    }

    #[must_use]
    pub fn videos(&self) -> &VideoRegistry<D::Node, D::Subscription> {
        &self.videos
    }

    #[must_use]
    pub fn pending_upgrades(&self) -> usize {
        self.upgrades.len()
    }

    /// Observe `root` if it is not already observed.
    pub fn observe(
        &mut self,
        dom: &D,
        root: &D::Node,
        kind: RootKind<D::Node>,
        origin: &str,
        closed: &ClosedShadowMap<D::Node>,
    ) -> Discovery<D::Node> {
        let mut out = Discovery::default();
        self.observe_into(dom, root, kind, origin, closed, &mut out);
        out
    }

    fn observe_into(
        &mut self,
        dom: &D,
        root: &D::Node,
        kind: RootKind<D::Node>,
        origin: &str,
        closed: &ClosedShadowMap<D::Node>,
        out: &mut Discovery<D::Node>,
    ) {
        if self.roots.contains(root) {
            return;
        }
        let title = match &kind {
            RootKind::Document => "#document".to_string(),
            RootKind::Shadow { host } => format!("shadow:{}", dom.tag_name(host)),
            RootKind::FrameDocument { frame } => format!("#document in {}", dom.tag_name(frame)),
        };
        let is_document = !matches!(kind, RootKind::Shadow { .. });

        let subscriptions = [
            Listen::Keyboard,
            Listen::PointerDown,
            Listen::Mutations,
            Listen::ShadowAttachSignal,
        ]
        .into_iter()
        .filter_map(|listen| dom.subscribe(root, listen))
        .collect();
        self.roots.insert(ObservedRoot::new(
            root.clone(),
            kind,
            origin.to_string(),
            subscriptions,
        ));
        debug!(
            target: LOG_TARGET,
            root = %title,
            origin,
            total = self.roots.len(),
            "observing new root"
        );
        out.roots.push(root.clone());
        if is_document {
            out.documents.push(root.clone());
        }

        for element in dom.descendants(root) {
            self.classify(dom, &element, Phase::Scan, closed, out);
        }
    }

    fn classify(
        &mut self,
        dom: &D,
        element: &D::Node,
        phase: Phase,
        closed: &ClosedShadowMap<D::Node>,
        out: &mut Discovery<D::Node>,
    ) {
        let tag = dom.tag_name(element);
        if tag.is_empty() {
            return;
        }

        if is_video_tag(&tag) {
            if self.videos.contains(element) {
                return;
            }
            let mut subscriptions: Vec<_> = dom
                .subscribe(element, Listen::DoubleClick)
                .into_iter()
                .collect();
            if self.track_media {
                subscriptions.extend(dom.subscribe(element, Listen::MediaEvents));
            }
            self.videos.insert(element.clone(), subscriptions);
            debug!(
                target: LOG_TARGET,
                phase = phase.as_str(),
                total = self.videos.len(),
                "new video"
            );
            out.videos.push(element.clone());
            return;
        }

        if let Some(shadow) = shadow_of(dom, element, closed) {
            let origin = format!("{} shadow", phase.as_str());
            self.observe_into(
                dom,
                &shadow,
                RootKind::Shadow {
                    host: element.clone(),
                },
                &origin,
                closed,
                out,
            );
        } else if is_custom_element_tag(&tag) {
            let lower = tag.to_ascii_lowercase();
            if !dom.is_custom_element_defined(&lower) {
                self.defer_upgrade(dom, element, lower, phase);
            }
        }

        if is_frame_tag(&tag) {
            out.frames += 1;
            if let Some(doc) = dom.content_document(element) {
                let origin = format!("{} iframe", phase.as_str());
                self.observe_into(
                    dom,
                    &doc,
                    RootKind::FrameDocument {
                        frame: element.clone(),
                    },
                    &origin,
                    closed,
                    out,
                );
            }
            if !self.frames.iter().any(|(f, _)| f == element) {
                let load = dom.subscribe(element, Listen::IframeLoad);
                self.frames.push((element.clone(), load));
            }
        }
    }

    fn defer_upgrade(&mut self, dom: &D, element: &D::Node, tag: String, phase: Phase) {
        if self.upgrades.iter().any(|u| u.element == *element) {
            return;
        }
        debug!(
            target: LOG_TARGET,
            phase = phase.as_str(),
            tag = %tag,
            "waiting for custom element definition"
        );
        if !self.requested_tags.contains(&tag) {
            dom.when_defined(&tag);
            self.requested_tags.push(tag.clone());
        }
        self.upgrades.push(PendingUpgrade {
            tag,
            element: element.clone(),
        });
    }

    /// Classify nodes reported by a mutation batch, including their subtrees.
    pub fn on_added(
        &mut self,
        dom: &D,
        added: &[D::Node],
        closed: &ClosedShadowMap<D::Node>,
    ) -> Discovery<D::Node> {
        let mut out = Discovery::default();
        for node in added {
            self.classify(dom, node, Phase::Mutation, closed, &mut out);
            for element in dom.descendants(node) {
                self.classify(dom, &element, Phase::Mutation, closed, &mut out);
            }
        }
        out
    }

    /// A shadow root was attached to `host` (open, or captured as closed).
    pub fn on_shadow_attached(
        &mut self,
        dom: &D,
        host: &D::Node,
        closed: &ClosedShadowMap<D::Node>,
    ) -> Discovery<D::Node> {
        let mut out = Discovery::default();
        if let Some(shadow) = shadow_of(dom, host, closed) {
            self.observe_into(
                dom,
                &shadow,
                RootKind::Shadow { host: host.clone() },
                Phase::ShadowSignal.as_str(),
                closed,
                &mut out,
            );
        }
        out
    }

    /// `customElements.whenDefined(tag)` resolved.
    pub fn on_custom_element_defined(
        &mut self,
        dom: &D,
        tag: &str,
        closed: &ClosedShadowMap<D::Node>,
    ) -> Discovery<D::Node> {
        let tag = tag.to_ascii_lowercase();
        self.requested_tags.retain(|t| *t != tag);
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.upgrades)
            .into_iter()
            .partition(|u| u.tag == tag);
        self.upgrades = waiting;

        let mut out = Discovery::default();
        for upgrade in ready {
            if !dom.is_connected(&upgrade.element) {
                continue;
            }
            if let Some(shadow) = shadow_of(dom, &upgrade.element, closed) {
                self.observe_into(
                    dom,
                    &shadow,
                    RootKind::Shadow {
                        host: upgrade.element.clone(),
                    },
                    Phase::Upgrade.as_str(),
                    closed,
                    &mut out,
                );
            }
        }
        out
    }

    /// An iframe fired `load` (first load or navigation).
    pub fn on_frame_load(
        &mut self,
        dom: &D,
        frame: &D::Node,
        closed: &ClosedShadowMap<D::Node>,
    ) -> Discovery<D::Node> {
        let mut out = Discovery {
            frames: 1,
            ..Discovery::default()
        };
        if let Some(doc) = dom.content_document(frame) {
            self.observe_into(
                dom,
                &doc,
                RootKind::FrameDocument {
                    frame: frame.clone(),
                },
                Phase::FrameLoad.as_str(),
                closed,
                &mut out,
            );
        }
        out
    }

    /// Drop everything no longer attached to the page. Dropped entries take
    /// their listener subscriptions with them. Returns the number of videos
    /// and roots removed.
    pub fn prune(&mut self, dom: &D) -> (usize, usize) {
        let videos = self.videos.retain(|v| dom.is_connected(v));
        let roots = self.roots.retain(|root| match &root.kind {
            RootKind::Document => true,
            RootKind::Shadow { host } => dom.is_connected(host),
            RootKind::FrameDocument { frame } => {
                dom.is_connected(frame) && dom.content_document(frame).as_ref() == Some(&root.node)
            }
        });
        self.upgrades.retain(|u| dom.is_connected(&u.element));
        self.frames.retain(|(f, _)| dom.is_connected(f));
        if videos > 0 || roots > 0 {
            debug!(target: LOG_TARGET, videos, roots, "pruned detached nodes");
        }
        (videos, roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ShadowMode;
    use crate::fake_dom::{FakeDom, NodeId};
    use crate::geometry::Rect;

    fn rect() -> Rect {
        Rect::new(0.0, 0.0, 640.0, 360.0)
    }

    fn start(dom: &FakeDom) -> (RootObserver<FakeDom>, ClosedShadowMap<NodeId>, Discovery<NodeId>) {
        let mut observer = RootObserver::new();
        let closed = ClosedShadowMap::default();
        let found = observer.observe(dom, &dom.document(), RootKind::Document, "root document", &closed);
        (observer, closed, found)
    }

    #[test]
    fn initial_scan_finds_videos_in_order() {
        let dom = FakeDom::new();
        let doc = dom.document();
        let a = dom.append_video(&doc, rect());
        let wrapper = dom.append(&doc, "div");
        let b = dom.append_video(&wrapper, rect());

        let (observer, _, found) = start(&dom);
        assert_eq!(found.videos, vec![a, b]);
        assert_eq!(observer.videos().iter().copied().collect::<Vec<_>>(), vec![a, b]);
        assert!(dom.listeners(&a).contains(&Listen::DoubleClick));
        assert!(!dom.listeners(&a).contains(&Listen::MediaEvents));
    }

    #[test]
    fn observing_twice_is_noop() {
        let dom = FakeDom::new();
        let (mut observer, closed, _) = start(&dom);
        let listeners = dom.listener_count();
        let again = observer.observe(&dom, &dom.document(), RootKind::Document, "again", &closed);
        assert!(again.is_empty());
        assert_eq!(dom.listener_count(), listeners);
        assert_eq!(observer.roots().len(), 1);
    }

    #[test]
    fn root_gets_keyboard_and_mutation_listeners() {
        let dom = FakeDom::new();
        let _observer = start(&dom);
        let kinds = dom.listeners(&dom.document());
        for kind in [
            Listen::Keyboard,
            Listen::PointerDown,
            Listen::Mutations,
            Listen::ShadowAttachSignal,
        ] {
            assert!(kinds.contains(&kind), "missing {kind:?}");
        }
    }

    #[test]
    fn scan_recurses_into_open_and_closed_shadow_roots() {
        let dom = FakeDom::new();
        let doc = dom.document();
        let open_host = dom.append(&doc, "div");
        let open = dom.attach_shadow(&open_host, ShadowMode::Open);
        let v1 = dom.append_video(&open, rect());
        let closed_host = dom.append(&doc, "x-player");
        let closed_root = dom.attach_shadow(&closed_host, ShadowMode::Closed);
        let v2 = dom.append_video(&closed_root, rect());

        let (observer, _, found) = start(&dom);
        assert_eq!(found.videos, vec![v1, v2]);
        assert_eq!(observer.roots().len(), 3);
    }

    #[test]
    fn batch_inserted_subtree_is_classified() {
        let dom = FakeDom::new();
        let (mut observer, closed, _) = start(&dom);

        let card = dom.create("div");
        let inner = dom.append(&card, "section");
        let video = dom.append_video(&inner, rect());
        dom.append_child(&dom.document(), &card);

        let found = observer.on_added(&dom, &[card], &closed);
        assert_eq!(found.videos, vec![video]);
    }

    #[test]
    fn undefined_custom_element_waits_for_definition() {
        let dom = FakeDom::new();
        let doc = dom.document();
        let a = dom.append(&doc, "lazy-player");
        let b = dom.append(&doc, "lazy-player");
        let (mut observer, closed, _) = start(&dom);

        assert_eq!(dom.when_defined_requests(), vec!["lazy-player".to_string()]);
        assert_eq!(observer.pending_upgrades(), 2);

        let root = dom.attach_shadow(&a, ShadowMode::Open);
        let video = dom.append_video(&root, rect());
        dom.remove(&b);
        dom.define("lazy-player");

        let found = observer.on_custom_element_defined(&dom, "LAZY-PLAYER", &closed);
        assert_eq!(found.videos, vec![video]);
        assert_eq!(observer.pending_upgrades(), 0);
    }

    #[test]
    fn defined_custom_element_without_shadow_is_not_deferred() {
        let dom = FakeDom::new();
        dom.define("plain-widget");
        dom.append(&dom.document(), "plain-widget");
        let (observer, _, _) = start(&dom);
        assert_eq!(observer.pending_upgrades(), 0);
        assert!(dom.when_defined_requests().is_empty());
    }

    #[test]
    fn same_origin_frame_document_is_observed() {
        let dom = FakeDom::new();
        let frame = dom.append(&dom.document(), "iframe");
        let (child_doc, _) = dom.load_frame(&frame, false);
        let video = dom.append_video(&child_doc, rect());

        let (observer, _, found) = start(&dom);
        assert_eq!(found.videos, vec![video]);
        assert_eq!(found.documents, vec![dom.document(), child_doc]);
        assert_eq!(found.frames, 1);
        assert!(dom.listeners(&frame).contains(&Listen::IframeLoad));
        assert!(observer.roots().contains(&child_doc));
    }

    #[test]
    fn cross_origin_frame_is_not_entered() {
        let dom = FakeDom::new();
        let frame = dom.append(&dom.document(), "iframe");
        let (child_doc, _) = dom.load_frame(&frame, true);
        dom.append_video(&child_doc, rect());

        let (observer, _, found) = start(&dom);
        assert!(found.videos.is_empty());
        assert_eq!(found.frames, 1);
        assert_eq!(observer.roots().len(), 1);
        assert!(dom.listeners(&frame).contains(&Listen::IframeLoad));
    }

    #[test]
    fn frame_navigation_swaps_documents_on_prune() {
        let dom = FakeDom::new();
        let frame = dom.append(&dom.document(), "iframe");
        let (first, _) = dom.load_frame(&frame, false);
        let old_video = dom.append_video(&first, rect());
        let (mut observer, closed, _) = start(&dom);

        let (second, _) = dom.load_frame(&frame, false);
        let new_video = dom.append_video(&second, rect());
        let found = observer.on_frame_load(&dom, &frame, &closed);
        assert_eq!(found.videos, vec![new_video]);

        assert_eq!(observer.prune(&dom), (1, 1));
        assert!(!observer.videos().contains(&old_video));
        assert!(!observer.roots().contains(&first));
        assert!(dom.listeners(&first).is_empty());
    }

    #[test]
    fn prune_drops_removed_videos_and_listeners() {
        let dom = FakeDom::new();
        let host = dom.append(&dom.document(), "div");
        let shadow = dom.attach_shadow(&host, ShadowMode::Open);
        let video = dom.append_video(&shadow, rect());
        let (mut observer, _, _) = start(&dom);
        assert!(!dom.listeners(&video).is_empty());

        dom.remove(&host);
        assert_eq!(observer.prune(&dom), (1, 1));
        assert!(dom.listeners(&video).is_empty());
        assert!(dom.listeners(&shadow).is_empty());
        assert!(observer.videos().is_empty());
    }

    #[test]
    fn media_tracking_adds_media_listeners() {
        let dom = FakeDom::new();
        let video = dom.append_video(&dom.document(), rect());
        let mut observer = RootObserver::new();
        observer.set_track_media(true);
        let closed = ClosedShadowMap::default();
        observer.observe(&dom, &dom.document(), RootKind::Document, "root", &closed);
        assert!(dom.listeners(&video).contains(&Listen::MediaEvents));
    }
}
