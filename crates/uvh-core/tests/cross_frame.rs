//! Cross-frame coordination, end to end.
//!
//! Two sessions run against two independent `FakeDom` pages: a top frame
//! embedding a cross-origin iframe, and the page inside that iframe. The
//! tests play the role of the browser's `postMessage` plumbing, moving
//! payloads between the two recorders by hand.

#![forbid(unsafe_code)]

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{Value, json};

use uvh_core::fake_dom::{FakeDom, NodeId, TOP_WINDOW, WindowId};
use uvh_core::remote::RemoteKey;
use uvh_core::selector::ActiveTarget;
use uvh_core::{Disposition, Dom, KeyChord, KeyInput, Rect, Session, SessionConfig, Settings};

fn session(dom: &FakeDom) -> Session<FakeDom> {
    let mut session = Session::new(SessionConfig::default(), Settings::default());
    session.start(dom);
    session.run_microtasks(dom);
    session
}

fn key(code: &str) -> KeyInput<NodeId> {
    KeyInput::new(KeyChord::dom(code), None)
}

fn video_added(frame_id: &str, video_id: u32, playing: bool) -> Value {
    json!({
        "uvh": true,
        "type": "video_added",
        "frame_id": frame_id,
        "video_id": video_id,
        "rect": {"top": 0.0, "left": 0.0, "width": 640.0, "height": 360.0},
        "playing": playing,
        "paused": !playing,
        "duration": 120.0,
        "playback_rate": 1.0,
        "volume": 1.0,
        "muted": false
    })
}

/// Deliver everything `from` posted to its top window, starting at `skip`.
fn forward_to_top(
    from: &FakeDom,
    skip: usize,
    top_dom: &FakeDom,
    top: &mut Session<FakeDom>,
    source: WindowId,
) -> usize {
    let posted = from.posted_to_top();
    for message in &posted[skip..] {
        top.on_message(top_dom, message, &source);
    }
    posted.len()
}

// ============================================================================
// Queued resolution
// ============================================================================

#[test]
fn report_before_iframe_is_observed_resolves_later() {
    let dom = FakeDom::new();
    let doc = dom.document();
    let mut top = session(&dom);

    let frame = dom.create("iframe");
    dom.set_rect(&frame, Rect::new(0.0, 0.0, 640.0, 360.0));
    let (_, window) = dom.load_frame(&frame, true);

    top.on_message(&dom, &video_added("abc", 1, true), &window);
    assert!(top.remote_videos().is_empty());
    assert_eq!(top.pending_message_count(), 1);

    dom.append_child(&doc, &frame);
    top.on_mutation(&dom, &doc, &[frame], std::time::Duration::ZERO);

    assert_eq!(top.pending_message_count(), 0);
    let keys: Vec<String> = top
        .remote_videos()
        .iter()
        .map(|record| record.key.to_string())
        .collect();
    assert_eq!(keys, vec!["abc:1".to_string()]);
    assert_eq!(
        top.resolve_active_target(&dom),
        Some(ActiveTarget::Remote(RemoteKey::new("abc", 1)))
    );
}

#[test]
fn iframe_in_late_shadow_root_resolves_queued_report() {
    let dom = FakeDom::new();
    let mut top = session(&dom);

    let host = dom.append(&dom.document(), "div");
    let shadow = dom.attach_shadow(&host, uvh_core::ShadowMode::Open);
    let frame = dom.append(&shadow, "iframe");
    let (_, window) = dom.load_frame(&frame, true);

    top.on_message(&dom, &video_added("deep", 4, false), &window);
    assert_eq!(top.pending_message_count(), 1);

    top.on_shadow_attached(&dom, &host);
    assert_eq!(top.pending_message_count(), 0);
    assert!(top.remote_videos().get(&RemoteKey::new("deep", 4)).is_some());
}

// ============================================================================
// Selection between local and remote
// ============================================================================

#[test]
fn playing_remote_beats_paused_local() {
    let dom = FakeDom::new();
    dom.append_video(&dom.document(), Rect::new(0.0, 400.0, 320.0, 180.0));
    let frame = dom.append(&dom.document(), "iframe");
    dom.set_rect(&frame, Rect::new(0.0, 0.0, 640.0, 360.0));
    let (_, window) = dom.load_frame(&frame, true);
    let mut top = session(&dom);

    top.on_message(&dom, &video_added("abc", 1, false), &window);
    assert!(matches!(
        top.resolve_active_target(&dom),
        Some(ActiveTarget::Local(_))
    ));

    let mut playing = video_added("abc", 1, true);
    playing["type"] = json!("state");
    top.on_message(&dom, &playing, &window);
    assert_eq!(
        top.resolve_active_target(&dom),
        Some(ActiveTarget::Remote(RemoteKey::new("abc", 1)))
    );
}

#[test]
fn visible_remote_beats_scrolled_away_local() {
    let dom = FakeDom::new();
    dom.append_video(&dom.document(), Rect::new(0.0, 4000.0, 320.0, 180.0));
    let frame = dom.append(&dom.document(), "iframe");
    dom.set_rect(&frame, Rect::new(0.0, 100.0, 640.0, 360.0));
    let (_, window) = dom.load_frame(&frame, true);
    let mut top = session(&dom);

    top.on_message(&dom, &video_added("abc", 1, false), &window);
    assert_eq!(
        top.resolve_active_target(&dom),
        Some(ActiveTarget::Remote(RemoteKey::new("abc", 1)))
    );
}

// ============================================================================
// Full round trip
// ============================================================================

#[test]
fn shortcut_in_top_frame_drives_child_video() {
    let top_dom = FakeDom::new();
    let frame = top_dom.append(&top_dom.document(), "iframe");
    top_dom.set_rect(&frame, Rect::new(0.0, 0.0, 640.0, 360.0));
    let (_, window) = top_dom.load_frame(&frame, true);
    let mut top = session(&top_dom);

    let child_dom = FakeDom::child_frame("https://player.test/embed/7", false);
    let video = child_dom.append_video(&child_dom.document(), Rect::new(0.0, 0.0, 640.0, 360.0));
    let mut child = session(&child_dom);
    let frame_id = child.frame_id().map(str::to_string).unwrap();

    let mut seen = forward_to_top(&child_dom, 0, &top_dom, &mut top, window);
    let remote = RemoteKey::new(frame_id, 1);
    assert!(top.remote_videos().get(&remote).is_some());

    // Space in the top frame travels to the child as an action command.
    assert_eq!(top.on_key_down(&top_dom, &key("Space")), Disposition::Handled);
    let commands = top_dom.posted_to(window);
    assert_eq!(commands.len(), 1);
    child.on_message(&child_dom, &commands[0], &TOP_WINDOW);
    assert!(child_dom.media(&video).is_playing());

    // The child reports back and the top frame's record follows.
    seen = forward_to_top(&child_dom, seen, &top_dom, &mut top, window);
    assert!(top.remote_videos().get(&remote).unwrap().playing);

    // A media event (the page paused the video itself) is mirrored too.
    child_dom.set_playing(&video, false);
    child.on_media_event(&child_dom, &video);
    forward_to_top(&child_dom, seen, &top_dom, &mut top, window);
    assert!(!top.remote_videos().get(&remote).unwrap().playing);
}

#[test]
fn child_ignores_actions_not_from_top() {
    let child_dom = FakeDom::child_frame("https://player.test/embed/7", false);
    let video = child_dom.append_video(&child_dom.document(), Rect::new(0.0, 0.0, 640.0, 360.0));
    let mut child = session(&child_dom);
    let action = json!({
        "uvh": true,
        "type": "action",
        "frame_id": child.frame_id().unwrap(),
        "video_id": 1,
        "action": {"kind": "toggle_play_pause"}
    });
    child.on_message(&child_dom, &action, &WindowId(77));
    assert!(child_dom.commands(&video).is_empty());

    child.on_message(&child_dom, &action, &TOP_WINDOW);
    assert!(child_dom.media(&video).is_playing());
}

#[test]
fn navigated_iframe_replaces_its_remote_records() {
    let dom = FakeDom::new();
    let frame = dom.append(&dom.document(), "iframe");
    let (_, window) = dom.load_frame(&frame, true);
    let mut top = session(&dom);

    top.on_message(&dom, &video_added("first", 1, false), &window);
    top.on_message(&dom, &video_added("first", 2, false), &window);
    top.on_message(&dom, &video_added("second", 1, false), &window);

    let keys: Vec<String> = top
        .remote_videos()
        .iter()
        .map(|record| record.key.to_string())
        .collect();
    assert_eq!(keys, vec!["second:1".to_string()]);
}

#[test]
fn removed_iframe_drops_remote_target() {
    let dom = FakeDom::new();
    let frame = dom.append(&dom.document(), "iframe");
    let (_, window) = dom.load_frame(&frame, true);
    let mut top = session(&dom);
    top.on_message(&dom, &video_added("abc", 1, true), &window);
    assert!(top.resolve_active_target(&dom).is_some());

    dom.remove(&frame);
    top.prune(&dom);
    assert!(top.remote_videos().is_empty());
    assert_eq!(top.on_key_down(&dom, &key("Space")), Disposition::Ignored);
}

// ============================================================================
// Message validation
// ============================================================================

#[test]
fn forged_messages_never_touch_the_registry() {
    let dom = FakeDom::new();
    let frame = dom.append(&dom.document(), "iframe");
    let (_, window) = dom.load_frame(&frame, true);
    let mut top = session(&dom);

    let mut no_marker = video_added("abc", 1, true);
    no_marker.as_object_mut().unwrap().remove("uvh");
    let mut evil = video_added("abc", 1, true);
    evil["type"] = json!("evil");
    let mut string_marker = video_added("abc", 1, true);
    string_marker["uvh"] = json!("yes");

    for message in [no_marker, evil, string_marker, json!(null), json!("uvh")] {
        top.on_message(&dom, &message, &window);
    }
    assert!(top.remote_videos().is_empty());
    assert_eq!(top.pending_message_count(), 0);
}

#[test]
fn other_iframe_cannot_take_over_a_frame_id() {
    let dom = FakeDom::new();
    let doc = dom.document();
    let owner = dom.append(&doc, "iframe");
    let intruder = dom.append(&doc, "iframe");
    dom.set_rect(&owner, Rect::new(0.0, 0.0, 640.0, 360.0));
    dom.set_rect(&intruder, Rect::new(0.0, 360.0, 640.0, 360.0));
    let (_, owner_window) = dom.load_frame(&owner, true);
    let (_, intruder_window) = dom.load_frame(&intruder, true);
    let mut top = session(&dom);

    top.on_message(&dom, &video_added("abc", 1, false), &owner_window);
    top.on_message(&dom, &video_added("abc", 1, true), &intruder_window);
    let mut state = video_added("abc", 1, true);
    state["type"] = json!("state");
    top.on_message(&dom, &state, &intruder_window);

    let record = top.remote_videos().get(&RemoteKey::new("abc", 1)).unwrap();
    assert_eq!(record.frame, owner);
    assert!(!record.playing);

    assert_eq!(top.on_key_down(&dom, &key("Space")), Disposition::Handled);
    assert_eq!(dom.posted_to(owner_window).len(), 1);
    assert!(dom.posted_to(intruder_window).is_empty());
}

#[test]
fn state_without_announcement_is_ignored() {
    let dom = FakeDom::new();
    let frame = dom.append(&dom.document(), "iframe");
    let (_, window) = dom.load_frame(&frame, true);
    let mut top = session(&dom);

    let mut state = video_added("abc", 1, true);
    state["type"] = json!("state");
    top.on_message(&dom, &state, &window);
    assert!(top.remote_videos().is_empty());

    top.on_message(&dom, &video_added("abc", 1, false), &window);
    top.on_message(&dom, &state, &window);
    assert!(top.remote_videos().get(&RemoteKey::new("abc", 1)).unwrap().playing);
}

proptest! {
    #[test]
    fn unknown_types_never_register(kind in "[a-z_]{0,12}") {
        prop_assume!(kind != "video_added" && kind != "state");
        let dom = FakeDom::new();
        let frame = dom.append(&dom.document(), "iframe");
        let (_, window) = dom.load_frame(&frame, true);
        let mut top = session(&dom);

        let mut message = video_added("abc", 1, true);
        message["type"] = json!(kind);
        top.on_message(&dom, &message, &window);
        prop_assert!(top.remote_videos().is_empty());
        prop_assert_eq!(top.pending_message_count(), 0);
    }
}
