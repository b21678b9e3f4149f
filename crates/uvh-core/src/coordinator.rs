//! Cross-frame coordination.
//!
//! Frames cooperate over `postMessage` only:
//!
//! - A **cross-origin child** numbers its videos `1, 2, ...`, announces each
//!   with `video_added`, pushes a `state` report after every playback event,
//!   and runs `action` commands addressed to its `frame_id`.
//! - The **top frame** maps each report's source window to one of its iframe
//!   elements and keeps the result in a [`RemoteRegistry`]. Reports whose
//!   iframe is not observed yet wait in a bounded queue and are retried when
//!   new roots or frames appear.
//! - A **same-origin child** does nothing; the top frame walks into its
//!   document directly.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::LOG_TARGET;
use crate::action::ActionDescriptor;
use crate::dom::Dom;
use crate::executor::Executor;
use crate::predicates::is_frame;
use crate::protocol::{ActionCommand, ReportKind, StateReport, encode_action, encode_report};
use crate::remote::{RemoteKey, RemoteRegistry, Upsert};

/// Characters of the page URL kept in a generated `frame_id`.
const FRAME_ID_URL_CHARS: usize = 48;

/// Where this session's document sits in the frame tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameRole {
    Top,
    CrossOriginChild,
    SameOriginChild,
}

impl FrameRole {
    #[must_use]
    pub fn detect<D: Dom>(dom: &D) -> Self {
        if dom.is_top_frame() {
            Self::Top
        } else if dom.can_access_top_document() {
            Self::SameOriginChild
        } else {
            Self::CrossOriginChild
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::CrossOriginChild => "cross-origin child",
            Self::SameOriginChild => "same-origin child",
        }
    }
}

/// A `frame_id`: the random `token`, a dash, then the start of `href` with
/// its scheme stripped.
#[must_use]
pub fn generate_frame_id(token: &str, href: &str) -> String {
    let rest = href.split_once("://").map_or(href, |(_, rest)| rest);
    let fragment: String = rest.chars().take(FRAME_ID_URL_CHARS).collect();
    format!("{token}-{fragment}")
}

// ---------------------------------------------------------------------------
// Child side
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ChildCoordinator<N> {
    frame_id: String,
    next_video_id: u32,
    videos: Vec<(u32, N)>,
}

impl<N: Clone + PartialEq> ChildCoordinator<N> {
    #[must_use]
    pub fn new(frame_id: String) -> Self {
        Self {
            frame_id,
            next_video_id: 1,
            videos: Vec::new(),
        }
    }

    #[must_use]
    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    #[must_use]
    pub fn id_of(&self, video: &N) -> Option<u32> {
        self.videos.iter().find(|(_, v)| v == video).map(|(id, _)| *id)
    }

    fn video(&self, id: u32) -> Option<&N> {
        self.videos.iter().find(|(i, _)| *i == id).map(|(_, v)| v)
    }

    /// Assign an id to `video` and announce it. No-op for known videos.
    pub fn register<D: Dom<Node = N>>(&mut self, dom: &D, video: &N) -> Option<u32> {
        if self.id_of(video).is_some() {
            return None;
        }
        let id = self.next_video_id;
        self.next_video_id = self.next_video_id.saturating_add(1);
        self.videos.push((id, video.clone()));
        self.post(dom, ReportKind::VideoAdded, id, video);
        debug!(target: LOG_TARGET, frame_id = %self.frame_id, video_id = id, "announced video");
        Some(id)
    }

    /// Push a `state` report for a known video.
    pub fn report_state<D: Dom<Node = N>>(&self, dom: &D, video: &N) -> bool {
        match self.id_of(video) {
            Some(id) => {
                self.post(dom, ReportKind::State, id, video);
                true
            }
            None => false,
        }
    }

    fn post<D: Dom<Node = N>>(&self, dom: &D, kind: ReportKind, id: u32, video: &N) {
        let report = StateReport::from_snapshot(
            &self.frame_id,
            id,
            dom.bounding_rect(video),
            &dom.media_snapshot(video),
        );
        dom.post_to_top(&encode_report(kind, &report));
    }

    /// Run an `action` command. Only commands from the top window, addressed
    /// to this frame and to a live known video, are honored; the resulting
    /// state is reported back immediately.
    pub fn handle_action<D: Dom<Node = N>>(
        &self,
        dom: &D,
        executor: &Executor,
        command: &ActionCommand,
        source: &D::Window,
    ) -> bool {
        if !dom.is_top_window(source) {
            trace!(target: LOG_TARGET, "ignored action from a non-top window");
            return false;
        }
        if command.frame_id != self.frame_id {
            trace!(target: LOG_TARGET, frame_id = %command.frame_id, "ignored action for another frame");
            return false;
        }
        let Some(video) = self.video(command.video_id) else {
            trace!(target: LOG_TARGET, video_id = command.video_id, "ignored action for unknown video");
            return false;
        };
        if !dom.is_connected(video) {
            return false;
        }
        executor.execute(dom, video, &command.action);
        self.post(dom, ReportKind::State, command.video_id, video);
        true
    }

    /// Forget disconnected videos. Ids are never reused.
    pub fn prune<D: Dom<Node = N>>(&mut self, dom: &D) -> usize {
        let before = self.videos.len();
        self.videos.retain(|(_, v)| dom.is_connected(v));
        before - self.videos.len()
    }
}

// ---------------------------------------------------------------------------
// Top side
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PendingReport<W> {
    source: W,
    kind: ReportKind,
    report: StateReport,
}

#[derive(Debug)]
pub struct TopCoordinator<N, W> {
    remotes: RemoteRegistry<N>,
    pending: VecDeque<PendingReport<W>>,
    max_pending: usize,
}

impl<N: Clone + PartialEq, W: Clone + PartialEq> TopCoordinator<N, W> {
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            remotes: RemoteRegistry::default(),
            pending: VecDeque::new(),
            max_pending,
        }
    }

    #[must_use]
    pub fn remotes(&self) -> &RemoteRegistry<N> {
        &self.remotes
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Record a report from `source`, or queue it until its iframe shows up.
    pub fn on_report<'a, D>(
        &mut self,
        dom: &D,
        roots: impl IntoIterator<Item = &'a N>,
        kind: ReportKind,
        report: StateReport,
        source: &W,
    ) -> bool
    where
        D: Dom<Node = N, Window = W>,
        N: 'a,
    {
        match find_frame_for_window(dom, roots, source) {
            Some(frame) => {
                self.apply(&frame, kind, &report);
                true
            }
            None => {
                if self.max_pending == 0 {
                    return false;
                }
                if self.pending.len() >= self.max_pending {
                    self.pending.pop_front();
                }
                trace!(
                    target: LOG_TARGET,
                    kind = kind.as_str(),
                    frame_id = %report.frame_id,
                    "queued report from unresolved window"
                );
                self.pending.push_back(PendingReport {
                    source: source.clone(),
                    kind,
                    report,
                });
                false
            }
        }
    }

    /// Retry queued reports in arrival order. Returns how many resolved.
    pub fn retry_pending<'a, D>(&mut self, dom: &D, roots: impl IntoIterator<Item = &'a N>) -> usize
    where
        D: Dom<Node = N, Window = W>,
        N: 'a,
    {
        if self.pending.is_empty() {
            return 0;
        }
        let roots: Vec<&N> = roots.into_iter().collect();
        let mut resolved = 0;
        for pending in std::mem::take(&mut self.pending) {
            match find_frame_for_window(dom, roots.iter().copied(), &pending.source) {
                Some(frame) => {
                    self.apply(&frame, pending.kind, &pending.report);
                    resolved += 1;
                }
                None => self.pending.push_back(pending),
            }
        }
        resolved
    }

    fn apply(&mut self, frame: &N, kind: ReportKind, report: &StateReport) {
        match self.remotes.upsert(frame, kind, report) {
            Upsert::Inserted => debug!(
                target: LOG_TARGET,
                key = %RemoteKey::new(report.frame_id.clone(), report.video_id),
                kind = kind.as_str(),
                total = self.remotes.len(),
                "new remote video"
            ),
            Upsert::Rejected => trace!(
                target: LOG_TARGET,
                frame_id = %report.frame_id,
                kind = kind.as_str(),
                "rejected remote report"
            ),
            Upsert::Updated => {}
        }
    }

    /// Send `action` to the frame owning `key`.
    pub fn send_action<D>(&self, dom: &D, key: &RemoteKey, action: ActionDescriptor) -> bool
    where
        D: Dom<Node = N, Window = W>,
    {
        let Some(record) = self.remotes.get(key) else {
            return false;
        };
        let Some(window) = dom.content_window(&record.frame) else {
            return false;
        };
        let command = ActionCommand {
            frame_id: key.frame_id.clone(),
            video_id: key.video_id,
            action,
        };
        dom.post_to_window(&window, &encode_action(&command));
        debug!(target: LOG_TARGET, key = %key, action = action.name(), "sent remote action");
        true
    }

    /// Drop records whose iframe left the page.
    pub fn prune<D>(&mut self, dom: &D) -> usize
    where
        D: Dom<Node = N, Window = W>,
    {
        self.remotes.retain(|r| dom.is_connected(&r.frame))
    }
}

/// The frame element, below any of `roots`, whose content window is `source`.
pub fn find_frame_for_window<'a, D: Dom>(
    dom: &D,
    roots: impl IntoIterator<Item = &'a D::Node>,
    source: &D::Window,
) -> Option<D::Node>
where
    D::Node: 'a,
{
    roots.into_iter().find_map(|root| {
        dom.descendants(root).into_iter().find(|element| {
            is_frame(dom, element) && dom.content_window(element).as_ref() == Some(source)
        })
    })
}
