//! Abstract action descriptors.
//!
//! An [`ActionDescriptor`] carries no element reference, so the top frame can
//! serialize one into an `action` message and a cross-origin child can apply
//! it to its own video.

use serde::{Deserialize, Serialize};

/// Direction of a playback-rate step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedDirection {
    Up,
    Down,
}

impl SpeedDirection {
    /// `+1.0` for [`Up`](Self::Up), `-1.0` for [`Down`](Self::Down).
    #[must_use]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
        }
    }
}

/// One self-contained playback action.
///
/// Encoded on the wire as an internally tagged object, e.g.
/// `{"kind":"seek","seconds":-5.0}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionDescriptor {
    TogglePlayPause,
    /// Relative seek in seconds of media time.
    Seek { seconds: f64 },
    /// Volume change in percentage points (`+5` raises volume by 0.05).
    Volume { delta: f64 },
    /// Jump to `pct` percent of the duration.
    JumpPercentage { pct: f64 },
    ChangeSpeed { direction: SpeedDirection },
    ToggleFullscreen,
    ToggleMute,
}

impl ActionDescriptor {
    /// Short stable name, used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TogglePlayPause => "toggle_play_pause",
            Self::Seek { .. } => "seek",
            Self::Volume { .. } => "volume",
            Self::JumpPercentage { .. } => "jump_percentage",
            Self::ChangeSpeed { .. } => "change_speed",
            Self::ToggleFullscreen => "toggle_fullscreen",
            Self::ToggleMute => "toggle_mute",
        }
    }

    /// All numeric payloads are finite.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match *self {
            Self::Seek { seconds } => seconds.is_finite(),
            Self::Volume { delta } => delta.is_finite(),
            Self::JumpPercentage { pct } => pct.is_finite(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_is_internally_tagged() {
        let value = serde_json::to_value(ActionDescriptor::Seek { seconds: -5.0 }).unwrap();
        assert_eq!(value, json!({"kind": "seek", "seconds": -5.0}));

        let value = serde_json::to_value(ActionDescriptor::ChangeSpeed {
            direction: SpeedDirection::Down,
        })
        .unwrap();
        assert_eq!(value, json!({"kind": "change_speed", "direction": "down"}));

        let value = serde_json::to_value(ActionDescriptor::ToggleMute).unwrap();
        assert_eq!(value, json!({"kind": "toggle_mute"}));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let parsed = serde_json::from_value::<ActionDescriptor>(json!({"kind": "format_disk"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn non_finite_payload_is_not_well_formed() {
        assert!(!ActionDescriptor::Seek { seconds: f64::NAN }.is_well_formed());
        assert!(ActionDescriptor::JumpPercentage { pct: 50.0 }.is_well_formed());
    }
}
