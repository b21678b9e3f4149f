//! Video selection policy.
//!
//! Two layers:
//! - [`select_best_local`] picks one video among the frame's own.
//! - [`choose`] arbitrates between the best local and the best remote
//!   candidate in the top frame.
//!
//! Both are recomputed before every shortcut dispatch; nothing is cached.

use crate::dom::Dom;
use crate::remote::RemoteKey;

/// The video shortcuts act on.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveTarget<N> {
    Local(N),
    Remote(RemoteKey),
}

impl<N> ActiveTarget<N> {
    #[must_use]
    pub const fn source(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "remote",
        }
    }
}

/// First playing video, else first visible one, else the first known.
///
/// `videos` must be in discovery order. `margin` grows the viewport on every
/// side for the visibility test. Videos that left the document are skipped
/// even if the registry has not been pruned yet.
pub fn select_best_local<'a, D: Dom>(
    dom: &D,
    videos: impl IntoIterator<Item = &'a D::Node>,
    margin: f64,
) -> Option<D::Node>
where
    D::Node: 'a,
{
    let videos: Vec<&D::Node> = videos.into_iter().filter(|v| dom.is_connected(v)).collect();
    let viewport = dom.viewport();
    videos
        .iter()
        .find(|v| dom.media_snapshot(v).is_playing())
        .or_else(|| {
            videos
                .iter()
                .find(|v| dom.bounding_rect(v).is_visible_in(viewport, margin))
        })
        .or_else(|| videos.first())
        .map(|v| (*v).clone())
}

/// What the arbitration needs to know about one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub playing: bool,
    pub visible: bool,
}

/// Which side wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

/// Local/remote arbitration.
///
/// | local | remote | choice |
/// |---|---|---|
/// | none | some | remote |
/// | some | none | local |
/// | not playing | playing | remote |
/// | same playing state, invisible | visible | remote |
/// | otherwise | | local |
#[must_use]
pub fn choose(local: Option<Candidate>, remote: Option<Candidate>) -> Option<Side> {
    match (local, remote) {
        (None, None) => None,
        (None, Some(_)) => Some(Side::Remote),
        (Some(_), None) => Some(Side::Local),
        (Some(local), Some(remote)) => {
            if remote.playing && !local.playing {
                Some(Side::Remote)
            } else if remote.playing == local.playing && !local.visible && remote.visible {
                Some(Side::Remote)
            } else {
                Some(Side::Local)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_dom::{FakeDom, NodeId};
    use crate::geometry::Rect;
    use proptest::prelude::*;

    fn visible() -> Rect {
        Rect::new(0.0, 0.0, 640.0, 360.0)
    }

    fn below_fold() -> Rect {
        Rect::new(0.0, 5000.0, 640.0, 360.0)
    }

    fn pick(dom: &FakeDom, videos: &[NodeId]) -> Option<NodeId> {
        select_best_local(dom, videos.iter(), 50.0)
    }

    #[test]
    fn empty_registry_selects_nothing() {
        let dom = FakeDom::new();
        assert_eq!(pick(&dom, &[]), None);
    }

    #[test]
    fn playing_video_wins_even_off_screen() {
        let dom = FakeDom::new();
        let doc = dom.document();
        let a = dom.append_video(&doc, visible());
        let b = dom.append_video(&doc, below_fold());
        dom.set_playing(&b, true);
        assert_eq!(pick(&dom, &[a, b]), Some(b));
    }

    #[test]
    fn ended_video_is_not_playing() {
        let dom = FakeDom::new();
        let doc = dom.document();
        let a = dom.append_video(&doc, visible());
        let b = dom.append_video(&doc, below_fold());
        let mut media = dom.media(&b);
        media.paused = false;
        media.ended = true;
        dom.set_media(&b, media);
        assert_eq!(pick(&dom, &[a, b]), Some(a));
    }

    #[test]
    fn first_visible_wins_when_none_playing() {
        let dom = FakeDom::new();
        let doc = dom.document();
        let a = dom.append_video(&doc, below_fold());
        let b = dom.append_video(&doc, visible());
        let c = dom.append_video(&doc, visible());
        assert_eq!(pick(&dom, &[a, b, c]), Some(b));
    }

    #[test]
    fn margin_counts_as_visible() {
        let dom = FakeDom::new();
        let doc = dom.document();
        // Starts 40px below a 720px viewport.
        let near = dom.append_video(&doc, Rect::new(0.0, 760.0, 640.0, 360.0));
        let far = dom.append_video(&doc, Rect::new(0.0, 780.0, 640.0, 360.0));
        assert_eq!(pick(&dom, &[far, near]), Some(near));
    }

    #[test]
    fn falls_back_to_first_known() {
        let dom = FakeDom::new();
        let doc = dom.document();
        let a = dom.append_video(&doc, below_fold());
        let b = dom.append_video(&doc, below_fold());
        assert_eq!(pick(&dom, &[a, b]), Some(a));
    }

    #[test]
    fn detached_video_is_never_selected() {
        let dom = FakeDom::new();
        let doc = dom.document();
        let gone = dom.append_video(&doc, visible());
        let kept = dom.append_video(&doc, below_fold());
        dom.set_playing(&gone, true);
        dom.remove(&gone);
        assert_eq!(pick(&dom, &[gone, kept]), Some(kept));
        assert_eq!(pick(&dom, &[gone]), None);
    }

    #[test]
    fn decision_table() {
        let c = |playing, visible| Some(Candidate { playing, visible });
        assert_eq!(choose(None, None), None);
        assert_eq!(choose(None, c(false, false)), Some(Side::Remote));
        assert_eq!(choose(c(false, false), None), Some(Side::Local));
        assert_eq!(choose(c(false, true), c(true, false)), Some(Side::Remote));
        assert_eq!(choose(c(true, false), c(true, true)), Some(Side::Remote));
        assert_eq!(choose(c(false, false), c(false, true)), Some(Side::Remote));
        assert_eq!(choose(c(true, false), c(false, true)), Some(Side::Local));
        assert_eq!(choose(c(false, true), c(false, true)), Some(Side::Local));
        assert_eq!(choose(c(false, false), c(false, false)), Some(Side::Local));
    }

    proptest! {
        #[test]
        fn single_playing_video_is_always_selected(
            tops in proptest::collection::vec(-4000.0f64..4000.0, 1..8),
            pick_index in any::<prop::sample::Index>(),
        ) {
            let dom = FakeDom::new();
            let doc = dom.document();
            let videos: Vec<NodeId> = tops
                .iter()
                .map(|top| dom.append_video(&doc, Rect::new(0.0, *top, 320.0, 180.0)))
                .collect();
            let playing = videos[pick_index.index(videos.len())];
            dom.set_playing(&playing, true);
            prop_assert_eq!(pick(&dom, &videos), Some(playing));
        }
    }
}
