//! Cross-frame wire protocol.
//!
//! Two message shapes travel over `postMessage`, both JSON objects carrying
//! the `uvh: true` marker:
//!
//! | `type` | direction | body |
//! |--------|-----------|------|
//! | `video_added`, `state` | child -> top | [`StateReport`] |
//! | `action` | top -> child | [`ActionCommand`] |
//!
//! Any script holding a window reference can post to us, so
//! [`parse_inbound`] checks, in order: object shape, marker, `type`
//! enumeration, field types, then value ranges. Nothing is trusted until all
//! five pass.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::ActionDescriptor;
use crate::dom::MediaSnapshot;
use crate::error::MessageError;
use crate::geometry::Rect;

/// Marker key every message carries with value `true`.
pub const MARKER_KEY: &str = "uvh";

/// Upper bound on `frame_id` length accepted from the wire.
pub const MAX_FRAME_ID_LEN: usize = 256;

/// Kind of child -> top report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    VideoAdded,
    State,
}

impl ReportKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VideoAdded => "video_added",
            Self::State => "state",
        }
    }
}

/// Last-known state of one child-frame video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateReport {
    pub frame_id: String,
    pub video_id: u32,
    /// Relative to the child document's viewport.
    pub rect: Rect,
    pub playing: bool,
    pub paused: bool,
    /// `null` on the wire while unknown or infinite.
    #[serde(with = "nullable_f64")]
    pub duration: f64,
    pub playback_rate: f64,
    pub volume: f64,
    pub muted: bool,
}

impl StateReport {
    #[must_use]
    pub fn from_snapshot(frame_id: &str, video_id: u32, rect: Rect, media: &MediaSnapshot) -> Self {
        Self {
            frame_id: frame_id.to_string(),
            video_id,
            rect,
            playing: media.is_playing(),
            paused: media.paused,
            duration: media.duration,
            playback_rate: media.playback_rate,
            volume: media.volume,
            muted: media.muted,
        }
    }

    fn check_ranges(&self) -> Result<(), MessageError> {
        check_frame_id(&self.frame_id)?;
        if !self.rect.is_finite() {
            return Err(MessageError::OutOfRange { field: "rect" });
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(MessageError::OutOfRange { field: "volume" });
        }
        if !(self.playback_rate.is_finite() && self.playback_rate > 0.0) {
            return Err(MessageError::OutOfRange {
                field: "playback_rate",
            });
        }
        if self.duration < 0.0 {
            return Err(MessageError::OutOfRange { field: "duration" });
        }
        Ok(())
    }
}

/// Top -> child instruction to run `action` on one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCommand {
    pub frame_id: String,
    pub video_id: u32,
    pub action: ActionDescriptor,
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Report { kind: ReportKind, report: StateReport },
    Action(ActionCommand),
}

fn check_frame_id(frame_id: &str) -> Result<(), MessageError> {
    if frame_id.is_empty() || frame_id.len() > MAX_FRAME_ID_LEN {
        return Err(MessageError::OutOfRange { field: "frame_id" });
    }
    Ok(())
}

fn with_header(kind: &str, body: Value) -> Value {
    let mut object = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    object.insert(MARKER_KEY.to_string(), Value::Bool(true));
    object.insert("type".to_string(), Value::String(kind.to_string()));
    Value::Object(object)
}

/// Encode a child -> top report.
#[must_use]
pub fn encode_report(kind: ReportKind, report: &StateReport) -> Value {
    with_header(
        kind.as_str(),
        serde_json::to_value(report).unwrap_or(Value::Null),
    )
}

/// Encode a top -> child action command.
#[must_use]
pub fn encode_action(command: &ActionCommand) -> Value {
    with_header("action", serde_json::to_value(command).unwrap_or(Value::Null))
}

/// Validate and decode an inbound `postMessage` payload.
pub fn parse_inbound(value: &Value) -> Result<Inbound, MessageError> {
    let object = value.as_object().ok_or(MessageError::NotAnObject)?;
    if object.get(MARKER_KEY) != Some(&Value::Bool(true)) {
        return Err(MessageError::MissingMarker);
    }
    let kind = match object.get("type") {
        Some(Value::String(kind)) => kind.as_str(),
        Some(other) => return Err(MessageError::UnknownType(other.to_string())),
        None => return Err(MessageError::UnknownType(String::new())),
    };
    let malformed = |err: serde_json::Error| MessageError::Malformed(err.to_string());

    match kind {
        "video_added" | "state" => {
            let report: StateReport = serde_json::from_value(value.clone()).map_err(malformed)?;
            report.check_ranges()?;
            let kind = if kind == "state" {
                ReportKind::State
            } else {
                ReportKind::VideoAdded
            };
            Ok(Inbound::Report { kind, report })
        }
        "action" => {
            let command: ActionCommand =
                serde_json::from_value(value.clone()).map_err(malformed)?;
            check_frame_id(&command.frame_id)?;
            if !command.action.is_well_formed() {
                return Err(MessageError::OutOfRange { field: "action" });
            }
            Ok(Inbound::Action(command))
        }
        other => Err(MessageError::UnknownType(other.to_string())),
    }
}

/// `f64` that travels as `null` when not finite.
mod nullable_f64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SpeedDirection;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn report_json() -> Value {
        json!({
            "uvh": true,
            "type": "video_added",
            "frame_id": "abc",
            "video_id": 1,
            "rect": {"top": 10.0, "left": 20.0, "width": 640.0, "height": 360.0},
            "playing": true,
            "paused": false,
            "duration": 120.0,
            "playback_rate": 1.0,
            "volume": 0.5,
            "muted": false
        })
    }

    #[test]
    fn parses_video_added() {
        let Inbound::Report { kind, report } = parse_inbound(&report_json()).unwrap() else {
            panic!("expected a report");
        };
        assert_eq!(kind, ReportKind::VideoAdded);
        assert_eq!(report.frame_id, "abc");
        assert_eq!(report.video_id, 1);
        assert_eq!(report.rect, Rect::new(20.0, 10.0, 640.0, 360.0));
        assert!(report.playing);
    }

    #[test]
    fn report_encoding_is_accepted_back() {
        let media = MediaSnapshot {
            paused: false,
            duration: f64::INFINITY,
            ..MediaSnapshot::default()
        };
        let report = StateReport::from_snapshot("f1", 3, Rect::new(0.0, 0.0, 1.0, 1.0), &media);
        let wire = encode_report(ReportKind::State, &report);
        assert_eq!(wire["uvh"], json!(true));
        assert_eq!(wire["type"], json!("state"));
        assert_eq!(wire["duration"], Value::Null);
        let Inbound::Report { kind, report } = parse_inbound(&wire).unwrap() else {
            panic!("expected a report");
        };
        assert_eq!(kind, ReportKind::State);
        assert!(report.duration.is_nan());
    }

    #[test]
    fn action_command_wire_shape() {
        let command = ActionCommand {
            frame_id: "abc".into(),
            video_id: 2,
            action: ActionDescriptor::ChangeSpeed {
                direction: SpeedDirection::Down,
            },
        };
        let wire = encode_action(&command);
        assert_eq!(
            wire,
            json!({
                "uvh": true,
                "type": "action",
                "frame_id": "abc",
                "video_id": 2,
                "action": {"kind": "change_speed", "direction": "down"}
            })
        );
        assert_eq!(parse_inbound(&wire), Ok(Inbound::Action(command)));
    }

    #[test]
    fn missing_or_false_marker_is_rejected() {
        let mut msg = report_json();
        msg["uvh"] = json!(false);
        assert_eq!(parse_inbound(&msg), Err(MessageError::MissingMarker));
        msg["uvh"] = json!("true");
        assert_eq!(parse_inbound(&msg), Err(MessageError::MissingMarker));
        msg.as_object_mut().unwrap().remove("uvh");
        assert_eq!(parse_inbound(&msg), Err(MessageError::MissingMarker));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut msg = report_json();
        msg["type"] = json!("evil");
        assert_eq!(
            parse_inbound(&msg),
            Err(MessageError::UnknownType("evil".into()))
        );
        msg["type"] = json!(7);
        assert!(matches!(parse_inbound(&msg), Err(MessageError::UnknownType(_))));
    }

    #[test]
    fn non_objects_are_rejected() {
        assert_eq!(parse_inbound(&json!("hi")), Err(MessageError::NotAnObject));
        assert_eq!(parse_inbound(&json!([1, 2])), Err(MessageError::NotAnObject));
        assert_eq!(parse_inbound(&Value::Null), Err(MessageError::NotAnObject));
    }

    #[test]
    fn wrongly_typed_fields_are_malformed() {
        let mut msg = report_json();
        msg["video_id"] = json!("1");
        assert!(matches!(parse_inbound(&msg), Err(MessageError::Malformed(_))));

        let mut msg = report_json();
        msg["video_id"] = json!(-1);
        assert!(matches!(parse_inbound(&msg), Err(MessageError::Malformed(_))));

        let mut msg = report_json();
        msg.as_object_mut().unwrap().remove("rect");
        assert!(matches!(parse_inbound(&msg), Err(MessageError::Malformed(_))));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut msg = report_json();
        msg["volume"] = json!(1.5);
        assert_eq!(
            parse_inbound(&msg),
            Err(MessageError::OutOfRange { field: "volume" })
        );

        let mut msg = report_json();
        msg["playback_rate"] = json!(0.0);
        assert_eq!(
            parse_inbound(&msg),
            Err(MessageError::OutOfRange {
                field: "playback_rate"
            })
        );

        let mut msg = report_json();
        msg["frame_id"] = json!("");
        assert_eq!(
            parse_inbound(&msg),
            Err(MessageError::OutOfRange { field: "frame_id" })
        );
    }

    #[test]
    fn unknown_action_kind_is_malformed() {
        let msg = json!({
            "uvh": true,
            "type": "action",
            "frame_id": "abc",
            "video_id": 1,
            "action": {"kind": "format_disk"}
        });
        assert!(matches!(parse_inbound(&msg), Err(MessageError::Malformed(_))));
    }
}
