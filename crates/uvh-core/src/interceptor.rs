//! Shadow-attach interception.
//!
//! Browsers fire no event when a shadow root is created, and mutation
//! observers do not see it either. The interceptor therefore injects a small
//! page-context script (once per script realm, i.e. per document) that wraps
//! `Element.prototype.attachShadow` and, after every attachment, dispatches a
//! bubbling [`SHADOW_ATTACHED_EVENT`] from the host element. The extension's
//! isolated world cannot share object references with the page, so the event
//! carries no payload; listeners re-derive the root from the host.
//!
//! Closed roots are not reachable through `host.shadowRoot`. Under
//! [`ClosedShadowPolicy::Record`] the interceptor captures them into the
//! [`ClosedShadowMap`] through the host's privileged accessor when the signal
//! arrives. Under [`ClosedShadowPolicy::ForceOpen`] the page script rewrites
//! the requested mode to `open` instead.
//!
//! Roots created before installation are picked up by a one-time sweep that
//! runs at microtask granularity after install.

use tracing::debug;

use crate::LOG_TARGET;
use crate::config::ClosedShadowPolicy;
use crate::dom::Dom;
use crate::registry::ClosedShadowMap;

/// Name of the bubbling DOM event re-dispatched from a new shadow host.
pub const SHADOW_ATTACHED_EVENT: &str = "video_hotkeys_shadow_root_attached";

/// Element id of the injected page script; doubles as an install marker.
pub const HOOK_SCRIPT_ID: &str = "__video_hotkeys_shadow_attach_hook";

/// Page-realm flag guarding double installation of the wrapper.
const HOOK_WINDOW_FLAG: &str = "__video_hotkeys_shadow_attach_hooked";

/// Page-context source of the `attachShadow` wrapper for `policy`.
#[must_use]
pub fn page_hook_source(policy: ClosedShadowPolicy) -> String {
    let force_open = match policy {
        ClosedShadowPolicy::Record => "",
        ClosedShadowPolicy::ForceOpen => {
            "    if (init && init.mode === 'closed') init = Object.assign({}, init, { mode: 'open' });\n"
        }
    };
    format!(
        r#"(() => {{
  if (window.{flag}) return;
  window.{flag} = true;
  const original = Element.prototype.attachShadow;
  const signal = host => host.dispatchEvent(new Event('{event}', {{ bubbles: true }}));
  Element.prototype.attachShadow = function (init) {{
{force_open}    const shadow = original.call(this, init);
    signal(this);
    return shadow;
  }};
  queueMicrotask(() => {{
    for (const el of document.querySelectorAll('*'))
      if (el.shadowRoot) signal(el);
  }});
}})();"#,
        flag = HOOK_WINDOW_FLAG,
        event = SHADOW_ATTACHED_EVENT,
        force_open = force_open,
    )
}

/// Per-session interceptor state.
#[derive(Debug)]
pub struct ShadowAttachInterceptor<N> {
    policy: ClosedShadowPolicy,
    source: String,
    realms: Vec<N>,
    pending_sweeps: Vec<N>,
    closed: ClosedShadowMap<N>,
}

impl<N: Clone + PartialEq> ShadowAttachInterceptor<N> {
    #[must_use]
    pub fn new(policy: ClosedShadowPolicy) -> Self {
        Self {
            policy,
            source: page_hook_source(policy),
            realms: Vec::new(),
            pending_sweeps: Vec::new(),
            closed: ClosedShadowMap::default(),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> ClosedShadowPolicy {
        self.policy
    }

    #[must_use]
    pub fn closed(&self) -> &ClosedShadowMap<N> {
        &self.closed
    }

    pub fn closed_mut(&mut self) -> &mut ClosedShadowMap<N> {
        &mut self.closed
    }

    #[must_use]
    pub fn is_installed(&self, realm: &N) -> bool {
        self.realms.contains(realm)
    }

    #[must_use]
    pub fn has_pending_sweeps(&self) -> bool {
        !self.pending_sweeps.is_empty()
    }

    /// Install the page hook into `realm` (a document) unless already done,
    /// and queue the retroactive sweep. Returns whether this call installed.
    pub fn install<D: Dom<Node = N>>(&mut self, dom: &D, realm: &N) -> bool {
        if self.is_installed(realm) {
            return false;
        }
        self.realms.push(realm.clone());
        let injected = dom.inject_page_script(realm, HOOK_SCRIPT_ID, &self.source);
        debug!(
            target: LOG_TARGET,
            injected,
            policy = ?self.policy,
            "installed shadow attach hook"
        );
        self.pending_sweeps.push(realm.clone());
        true
    }

    /// The page signalled an attachment on `host`. Captures the root into the
    /// closed map when it is not reachable through the open accessor.
    /// Returns the root, if the extension can see one.
    pub fn record_attachment<D: Dom<Node = N>>(&mut self, dom: &D, host: &N) -> Option<N> {
        if let Some(open) = dom.shadow_root(host) {
            return Some(open);
        }
        if let Some(shadow) = dom.privileged_shadow_root(host) {
            self.closed.record(host.clone(), shadow.clone());
            return Some(shadow);
        }
        self.closed.get(host)
    }

    /// Run queued sweeps: every element in each freshly hooked realm that
    /// already owns a shadow root is recorded and returned as if it had
    /// signalled.
    pub fn run_sweeps<D: Dom<Node = N>>(&mut self, dom: &D) -> Vec<N> {
        let mut hosts = Vec::new();
        for realm in std::mem::take(&mut self.pending_sweeps) {
            if !dom.is_connected(&realm) {
                continue;
            }
            self.sweep_into(dom, &realm, &mut hosts);
        }
        hosts
    }

    fn sweep_into<D: Dom<Node = N>>(&mut self, dom: &D, root: &N, hosts: &mut Vec<N>) {
        for element in dom.descendants(root) {
            if let Some(shadow) = self.record_attachment(dom, &element) {
                hosts.push(element);
                self.sweep_into(dom, &shadow, hosts);
            }
        }
    }

    /// Forget realms and closed entries that left the page.
    pub fn prune<D: Dom<Node = N>>(&mut self, dom: &D) {
        self.realms.retain(|r| dom.is_connected(r));
        self.closed.retain_hosts(|h| dom.is_connected(h));
    }
}
