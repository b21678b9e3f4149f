//! Cross-realm safe node predicates.
//!
//! These only look at tag names and accessors exposed by [`Dom`], never at
//! prototype chains, so they hold for nodes created in the page realm, the
//! extension realm, or a same-origin iframe.

use crate::dom::Dom;

/// Bound on shadow-root descent when looking for a nested focused element.
const MAX_SHADOW_FOCUS_DEPTH: usize = 32;

#[must_use]
pub fn is_video_tag(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("video")
}

#[must_use]
pub fn is_frame_tag(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("iframe") || tag.eq_ignore_ascii_case("frame")
}

/// Valid custom element names always contain a hyphen.
#[must_use]
pub fn is_custom_element_tag(tag: &str) -> bool {
    tag.contains('-')
}

#[must_use]
pub fn is_text_input_tag(tag: &str) -> bool {
    ["input", "textarea", "select"]
        .iter()
        .any(|t| tag.eq_ignore_ascii_case(t))
}

pub fn is_video<D: Dom>(dom: &D, node: &D::Node) -> bool {
    is_video_tag(&dom.tag_name(node))
}

pub fn is_frame<D: Dom>(dom: &D, node: &D::Node) -> bool {
    is_frame_tag(&dom.tag_name(node))
}

/// Any shadow root of `element` the extension can see.
pub fn reachable_shadow_root<D: Dom>(dom: &D, element: &D::Node) -> Option<D::Node> {
    dom.shadow_root(element)
        .or_else(|| dom.privileged_shadow_root(element))
}

/// Whether keyboard input aimed at `target` belongs to a text-entry control.
///
/// Checks the target itself, then follows focus into its shadow root's
/// `activeElement`, repeatedly, because the real input may sit several
/// custom elements deep.
pub fn is_input_target<D: Dom>(dom: &D, target: &D::Node) -> bool {
    let mut current = target.clone();
    for _ in 0..MAX_SHADOW_FOCUS_DEPTH {
        let tag = dom.tag_name(&current);
        if tag.is_empty() {
            return false;
        }
        if is_text_input_tag(&tag) || dom.is_content_editable(&current) {
            return true;
        }
        let Some(shadow) = reachable_shadow_root(dom, &current) else {
            return false;
        };
        let Some(inner) = dom.active_element(&shadow) else {
            return false;
        };
        if inner == current {
            return false;
        }
        current = inner;
    }
    false
}

/// The focused element, following focus through nested shadow roots.
pub fn deep_active_element<D: Dom>(dom: &D, root: &D::Node) -> Option<D::Node> {
    let mut current = dom.active_element(root)?;
    for _ in 0..MAX_SHADOW_FOCUS_DEPTH {
        let Some(shadow) = reachable_shadow_root(dom, &current) else {
            break;
        };
        match dom.active_element(&shadow) {
            Some(inner) if inner != current => current = inner,
            _ => break,
        }
    }
    Some(current)
}

/// `Node.contains` across shadow boundaries: walks from `node` out through
/// shadow hosts until `ancestor` contains one of them.
pub fn composed_contains<D: Dom>(dom: &D, ancestor: &D::Node, node: &D::Node) -> bool {
    let mut current = node.clone();
    for _ in 0..MAX_SHADOW_FOCUS_DEPTH {
        if dom.contains(ancestor, &current) {
            return true;
        }
        let root = dom.root_node(&current);
        match dom.shadow_host(&root) {
            Some(host) => current = host,
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ShadowMode;
    use crate::fake_dom::FakeDom;

    #[test]
    fn tag_predicates_ignore_case() {
        assert!(is_video_tag("VIDEO"));
        assert!(is_video_tag("video"));
        assert!(is_frame_tag("IFRAME"));
        assert!(is_frame_tag("FRAME"));
        assert!(is_custom_element_tag("YT-PLAYER"));
        assert!(!is_custom_element_tag("DIV"));
        assert!(is_text_input_tag("TEXTAREA"));
        assert!(!is_text_input_tag("BUTTON"));
    }

    #[test]
    fn plain_input_is_input_target() {
        let dom = FakeDom::new();
        let input = dom.append(&dom.document(), "input");
        assert!(is_input_target(&dom, &input));
    }

    #[test]
    fn content_editable_is_input_target() {
        let dom = FakeDom::new();
        let div = dom.append(&dom.document(), "div");
        dom.set_content_editable(&div, true);
        assert!(is_input_target(&dom, &div));
    }

    #[test]
    fn input_nested_in_shadow_roots_is_found() {
        let dom = FakeDom::new();
        let outer = dom.append(&dom.document(), "search-box");
        let outer_root = dom.attach_shadow(&outer, ShadowMode::Open);
        let inner = dom.append(&outer_root, "text-field");
        let inner_root = dom.attach_shadow(&inner, ShadowMode::Closed);
        let input = dom.append(&inner_root, "input");
        dom.focus(&input);

        assert!(is_input_target(&dom, &outer));
        assert_eq!(deep_active_element(&dom, &dom.document()), Some(input));
    }

    #[test]
    fn host_without_focused_input_is_not_input_target() {
        let dom = FakeDom::new();
        let host = dom.append(&dom.document(), "video-player");
        let root = dom.attach_shadow(&host, ShadowMode::Open);
        let button = dom.append(&root, "button");
        dom.focus(&button);
        assert!(!is_input_target(&dom, &host));
    }

    #[test]
    fn composed_contains_crosses_shadow_boundary() {
        let dom = FakeDom::new();
        let wrapper = dom.append(&dom.document(), "div");
        let host = dom.append(&wrapper, "x-player");
        let root = dom.attach_shadow(&host, ShadowMode::Closed);
        let video = dom.append(&root, "video");
        let sibling = dom.append(&dom.document(), "div");

        assert!(composed_contains(&dom, &wrapper, &video));
        assert!(!composed_contains(&dom, &sibling, &video));
    }
}
