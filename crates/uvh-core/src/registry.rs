//! Ordered registries of observed roots, known videos, and closed shadow roots.
//!
//! All three keep discovery order, because selection policy is "first match
//! wins". Node handles are only `PartialEq`, so lookups are linear; pages
//! carry a handful of videos and a few dozen roots.

/// Where an observed root came from.
#[derive(Debug, Clone, PartialEq)]
pub enum RootKind<N> {
    /// The frame's own document.
    Document,
    /// A shadow root attached to `host`.
    Shadow { host: N },
    /// The same-origin document loaded into `frame`.
    FrameDocument { frame: N },
}

/// A document or shadow root under observation, with its live listeners.
#[derive(Debug)]
pub struct ObservedRoot<N, S> {
    pub node: N,
    pub kind: RootKind<N>,
    pub label: String,
    subscriptions: Vec<S>,
}

impl<N, S> ObservedRoot<N, S> {
    #[must_use]
    pub fn new(node: N, kind: RootKind<N>, label: String, subscriptions: Vec<S>) -> Self {
        Self {
            node,
            kind,
            label,
            subscriptions,
        }
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[derive(Debug)]
pub struct ObservedRoots<N, S> {
    roots: Vec<ObservedRoot<N, S>>,
}

impl<N, S> Default for ObservedRoots<N, S> {
    fn default() -> Self {
        Self { roots: Vec::new() }
    }
}

impl<N: PartialEq, S> ObservedRoots<N, S> {
    #[must_use]
    pub fn contains(&self, node: &N) -> bool {
        self.roots.iter().any(|r| r.node == *node)
    }

    pub fn insert(&mut self, root: ObservedRoot<N, S>) -> bool {
        if self.contains(&root.node) {
            return false;
        }
        self.roots.push(root);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservedRoot<N, S>> {
        self.roots.iter()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.roots.iter().map(|r| &r.node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Drop roots failing `keep`; their subscriptions are dropped with them.
    /// Returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&ObservedRoot<N, S>) -> bool) -> usize {
        let before = self.roots.len();
        self.roots.retain(|r| keep(r));
        before - self.roots.len()
    }
}

/// A video discovered in this frame.
#[derive(Debug)]
pub struct KnownVideo<N, S> {
    pub node: N,
    subscriptions: Vec<S>,
}

#[derive(Debug)]
pub struct VideoRegistry<N, S> {
    videos: Vec<KnownVideo<N, S>>,
}

impl<N, S> Default for VideoRegistry<N, S> {
    fn default() -> Self {
        Self { videos: Vec::new() }
    }
}

impl<N: PartialEq, S> VideoRegistry<N, S> {
    #[must_use]
    pub fn contains(&self, node: &N) -> bool {
        self.videos.iter().any(|v| v.node == *node)
    }

    /// Append `node` unless already known. Returns whether it was new.
    pub fn insert(&mut self, node: N, subscriptions: Vec<S>) -> bool {
        if self.contains(&node) {
            return false;
        }
        self.videos.push(KnownVideo {
            node,
            subscriptions,
        });
        true
    }

    /// Attach more listeners to an already-known video.
    pub fn add_subscriptions(&mut self, node: &N, subscriptions: impl IntoIterator<Item = S>) {
        if let Some(video) = self.videos.iter_mut().find(|v| v.node == *node) {
            video.subscriptions.extend(subscriptions);
        }
    }

    /// Known videos in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &N> {
        self.videos.iter().map(|v| &v.node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.videos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&N) -> bool) -> usize {
        let before = self.videos.len();
        self.videos.retain(|v| keep(&v.node));
        before - self.videos.len()
    }
}

/// Host element -> closed shadow root, captured when the root is created.
#[derive(Debug)]
pub struct ClosedShadowMap<N> {
    entries: Vec<(N, N)>,
}

impl<N> Default for ClosedShadowMap<N> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<N: Clone + PartialEq> ClosedShadowMap<N> {
    /// Record (or replace) the closed root of `host`.
    pub fn record(&mut self, host: N, shadow: N) {
        match self.entries.iter_mut().find(|(h, _)| *h == host) {
            Some(entry) => entry.1 = shadow,
            None => self.entries.push((host, shadow)),
        }
    }

    #[must_use]
    pub fn get(&self, host: &N) -> Option<N> {
        self.entries
            .iter()
            .find(|(h, _)| h == host)
            .map(|(_, s)| s.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn retain_hosts(&mut self, mut keep: impl FnMut(&N) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(h, _)| keep(h));
        before - self.entries.len()
    }
}
