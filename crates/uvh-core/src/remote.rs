//! Top-frame registry of videos living in cross-origin child frames.

use core::fmt;

use crate::geometry::{Rect, Viewport};
use crate::protocol::{ReportKind, StateReport};

/// Cross-frame video identity: `(frame_id, video_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteKey {
    pub frame_id: String,
    pub video_id: u32,
}

impl RemoteKey {
    #[must_use]
    pub fn new(frame_id: impl Into<String>, video_id: u32) -> Self {
        Self {
            frame_id: frame_id.into(),
            video_id,
        }
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.frame_id, self.video_id)
    }
}

/// Last reported state of one remote video, plus the iframe that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVideoRecord<N> {
    pub key: RemoteKey,
    pub frame: N,
    /// Relative to the child document.
    pub rect: Rect,
    pub playing: bool,
    pub paused: bool,
    pub duration: f64,
    pub playback_rate: f64,
    pub volume: f64,
    pub muted: bool,
}

impl<N> RemoteVideoRecord<N> {
    fn from_report(frame: N, report: &StateReport) -> Self {
        Self {
            key: RemoteKey::new(report.frame_id.clone(), report.video_id),
            frame,
            rect: report.rect,
            playing: report.playing,
            paused: report.paused,
            duration: report.duration,
            playback_rate: report.playback_rate,
            volume: report.volume,
            muted: report.muted,
        }
    }

    fn update(&mut self, report: &StateReport) {
        self.rect = report.rect;
        self.playing = report.playing;
        self.paused = report.paused;
        self.duration = report.duration;
        self.playback_rate = report.playback_rate;
        self.volume = report.volume;
        self.muted = report.muted;
    }

    /// Rect in top-document coordinates, given the owning iframe's rect.
    #[must_use]
    pub fn absolute_rect(&self, frame_rect: &Rect) -> Rect {
        self.rect.translate(frame_rect.left, frame_rect.top)
    }
}

/// What [`RemoteRegistry::upsert`] did with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    /// The `frame_id` belongs to another iframe, or a `state` report arrived
    /// for a video that was never announced.
    Rejected,
}

/// Remote records in first-report order.
#[derive(Debug)]
pub struct RemoteRegistry<N> {
    records: Vec<RemoteVideoRecord<N>>,
}

impl<N> Default for RemoteRegistry<N> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<N: Clone + PartialEq> RemoteRegistry<N> {
    /// Insert or update the record for `report`, received from `frame`.
    ///
    /// A `frame_id` stays bound to the iframe that first reported it; reports
    /// for it from any other iframe are rejected. Records are created only by
    /// `video_added`. Records from an older `frame_id` on the same iframe
    /// (the frame navigated) are evicted.
    pub fn upsert(&mut self, frame: &N, kind: ReportKind, report: &StateReport) -> Upsert {
        if self
            .records
            .iter()
            .any(|r| r.key.frame_id == report.frame_id && r.frame != *frame)
        {
            return Upsert::Rejected;
        }
        if let Some(record) = self.records.iter_mut().find(|r| {
            r.key.frame_id == report.frame_id && r.key.video_id == report.video_id
        }) {
            record.update(report);
            return Upsert::Updated;
        }
        if kind != ReportKind::VideoAdded {
            return Upsert::Rejected;
        }
        self.records
            .retain(|r| r.frame != *frame || r.key.frame_id == report.frame_id);
        self.records
            .push(RemoteVideoRecord::from_report(frame.clone(), report));
        Upsert::Inserted
    }

    #[must_use]
    pub fn get(&self, key: &RemoteKey) -> Option<&RemoteVideoRecord<N>> {
        self.records.iter().find(|r| r.key == *key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteVideoRecord<N>> {
        self.records.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Best remote candidate: first playing, else first whose absolute rect is
    /// visible in `viewport` with `margin`, else first known. `frame_rect`
    /// gives each owning iframe's rect in the top document, or `None` once
    /// the iframe has left the page; such records are never chosen.
    pub fn best(
        &self,
        viewport: Viewport,
        margin: f64,
        mut frame_rect: impl FnMut(&N) -> Option<Rect>,
    ) -> Option<&RemoteVideoRecord<N>> {
        let live: Vec<(&RemoteVideoRecord<N>, Rect)> = self
            .records
            .iter()
            .filter_map(|r| frame_rect(&r.frame).map(|rect| (r, rect)))
            .collect();
        live.iter()
            .find(|(r, _)| r.playing)
            .or_else(|| {
                live.iter()
                    .find(|(r, rect)| r.absolute_rect(rect).is_visible_in(viewport, margin))
            })
            .or_else(|| live.first())
            .map(|(r, _)| *r)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&RemoteVideoRecord<N>) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|r| keep(r));
        before - self.records.len()
    }
}
