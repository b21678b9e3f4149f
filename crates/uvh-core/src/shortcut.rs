#![forbid(unsafe_code)]

//! Keyboard shortcut interpretation.
//!
//! [`Interpreter::interpret`] is a pure mapping from a normalized key chord
//! plus a small context to an [`ActionDescriptor`]. It reads nothing from the
//! page; the caller computes the context (current playback rate, whether
//! volume keys may be taken) before asking.
//!
//! # Key map
//!
//! | Key | Action |
//! |-----|--------|
//! | Space | toggle play/pause |
//! | ArrowLeft / ArrowRight | seek -/+ `seek_step` x playback rate |
//! | ArrowUp / ArrowDown | volume +/- `volume_step` (only when `can_volume`) |
//! | Home / End | jump to 0% / 100% |
//! | Digit0..Digit9 | jump to 0%..90% |
//! | KeyF | toggle fullscreen |
//! | KeyM | toggle mute |
//! | Shift+Period / Shift+Comma | speed up / down |
//!
//! Chords holding Alt, Ctrl or Meta are never interpreted. With Shift held
//! only the two speed chords are recognized.

use bitflags::bitflags;

use crate::action::{ActionDescriptor, SpeedDirection};
use crate::config::SessionConfig;

bitflags! {
    /// Modifier keys held during a key event.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
        const META  = 0b1000;
    }
}

impl Modifiers {
    /// Build from the four DOM `KeyboardEvent` modifier flags.
    #[must_use]
    pub fn from_dom(shift: bool, alt: bool, ctrl: bool, meta: bool) -> Self {
        let mut mods = Self::empty();
        mods.set(Self::SHIFT, shift);
        mods.set(Self::ALT, alt);
        mods.set(Self::CTRL, ctrl);
        mods.set(Self::META, meta);
        mods
    }
}

/// Layout-independent key identity, normalized from DOM `KeyboardEvent.code`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Space,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    Period,
    Comma,
    /// `KeyA`..`KeyZ`, stored lower-case.
    Letter(char),
    /// `Digit0`..`Digit9` (top row, not numpad).
    Digit(u8),
    Other(Box<str>),
}

impl KeyCode {
    #[must_use]
    pub fn from_dom_code(code: &str) -> Self {
        match code {
            "Space" => Self::Space,
            "ArrowLeft" => Self::Left,
            "ArrowRight" => Self::Right,
            "ArrowUp" => Self::Up,
            "ArrowDown" => Self::Down,
            "Home" => Self::Home,
            "End" => Self::End,
            "Period" => Self::Period,
            "Comma" => Self::Comma,
            _ => {
                if let Some(rest) = code.strip_prefix("Key")
                    && let [b] = rest.as_bytes()
                    && b.is_ascii_uppercase()
                {
                    return Self::Letter(b.to_ascii_lowercase() as char);
                }
                if let Some(rest) = code.strip_prefix("Digit")
                    && let [b] = rest.as_bytes()
                    && b.is_ascii_digit()
                {
                    return Self::Digit(b - b'0');
                }
                Self::Other(code.into())
            }
        }
    }

    #[must_use]
    pub fn to_dom_code(&self) -> String {
        match self {
            Self::Space => "Space".to_string(),
            Self::Left => "ArrowLeft".to_string(),
            Self::Right => "ArrowRight".to_string(),
            Self::Up => "ArrowUp".to_string(),
            Self::Down => "ArrowDown".to_string(),
            Self::Home => "Home".to_string(),
            Self::End => "End".to_string(),
            Self::Period => "Period".to_string(),
            Self::Comma => "Comma".to_string(),
            Self::Letter(c) => format!("Key{}", c.to_ascii_uppercase()),
            Self::Digit(d) => format!("Digit{d}"),
            Self::Other(code) => code.to_string(),
        }
    }
}

/// A key plus the modifiers held with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub code: KeyCode,
    pub mods: Modifiers,
}

impl KeyChord {
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            mods: Modifiers::empty(),
        }
    }

    #[must_use]
    pub fn with_modifiers(mut self, mods: Modifiers) -> Self {
        self.mods = mods;
        self
    }

    /// Shorthand for `KeyChord::new(KeyCode::from_dom_code(code))`.
    #[must_use]
    pub fn dom(code: &str) -> Self {
        Self::new(KeyCode::from_dom_code(code))
    }
}

/// Caller-computed context for one interpretation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShortcutContext {
    /// Current playback rate of the target; scales seek distance.
    pub playback_rate: f64,
    /// Whether ArrowUp/ArrowDown may be claimed for volume.
    pub can_volume: bool,
}

impl Default for ShortcutContext {
    fn default() -> Self {
        Self {
            playback_rate: 1.0,
            can_volume: false,
        }
    }
}

/// Maps key chords to actions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpreter {
    seek_step_secs: f64,
    volume_step_pct: f64,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

impl Interpreter {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            seek_step_secs: config.seek_step_secs,
            volume_step_pct: config.volume_step_pct,
        }
    }

    /// Interpret one chord. `None` means "leave the event to the page".
    #[must_use]
    pub fn interpret(&self, chord: &KeyChord, ctx: &ShortcutContext) -> Option<ActionDescriptor> {
        if chord
            .mods
            .intersects(Modifiers::ALT | Modifiers::CTRL | Modifiers::META)
        {
            return None;
        }

        if chord.mods.contains(Modifiers::SHIFT) {
            return match chord.code {
                KeyCode::Period => Some(ActionDescriptor::ChangeSpeed {
                    direction: SpeedDirection::Up,
                }),
                KeyCode::Comma => Some(ActionDescriptor::ChangeSpeed {
                    direction: SpeedDirection::Down,
                }),
                _ => None,
            };
        }

        let rate = if ctx.playback_rate.is_finite() && ctx.playback_rate > 0.0 {
            ctx.playback_rate
        } else {
            1.0
        };

        match chord.code {
            KeyCode::Space => Some(ActionDescriptor::TogglePlayPause),
            KeyCode::Left => Some(ActionDescriptor::Seek {
                seconds: -self.seek_step_secs * rate,
            }),
            KeyCode::Right => Some(ActionDescriptor::Seek {
                seconds: self.seek_step_secs * rate,
            }),
            KeyCode::Up if ctx.can_volume => Some(ActionDescriptor::Volume {
                delta: self.volume_step_pct,
            }),
            KeyCode::Down if ctx.can_volume => Some(ActionDescriptor::Volume {
                delta: -self.volume_step_pct,
            }),
            KeyCode::Home => Some(ActionDescriptor::JumpPercentage { pct: 0.0 }),
            KeyCode::End => Some(ActionDescriptor::JumpPercentage { pct: 100.0 }),
            KeyCode::Letter('f') => Some(ActionDescriptor::ToggleFullscreen),
            KeyCode::Letter('m') => Some(ActionDescriptor::ToggleMute),
            KeyCode::Digit(d) => Some(ActionDescriptor::JumpPercentage {
                pct: f64::from(d) * 10.0,
            }),
            _ => None,
        }
    }
}

/// [`Interpreter::interpret`] with default steps.
#[must_use]
pub fn interpret(chord: &KeyChord, ctx: &ShortcutContext) -> Option<ActionDescriptor> {
    Interpreter::default().interpret(chord, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx(rate: f64, can_volume: bool) -> ShortcutContext {
        ShortcutContext {
            playback_rate: rate,
            can_volume,
        }
    }

    #[test]
    fn dom_codes_normalize() {
        assert_eq!(KeyCode::from_dom_code("KeyF"), KeyCode::Letter('f'));
        assert_eq!(KeyCode::from_dom_code("Digit7"), KeyCode::Digit(7));
        assert_eq!(KeyCode::from_dom_code("ArrowUp"), KeyCode::Up);
        assert_eq!(
            KeyCode::from_dom_code("Numpad7"),
            KeyCode::Other("Numpad7".into())
        );
        assert_eq!(
            KeyCode::from_dom_code("Keyf"),
            KeyCode::Other("Keyf".into())
        );
        for code in ["Space", "ArrowLeft", "KeyM", "Digit0", "Comma", "F5"] {
            assert_eq!(KeyCode::from_dom_code(code).to_dom_code(), code);
        }
    }

    #[test]
    fn basic_map() {
        let c = ctx(1.0, true);
        assert_eq!(
            interpret(&KeyChord::dom("Space"), &c),
            Some(ActionDescriptor::TogglePlayPause)
        );
        assert_eq!(
            interpret(&KeyChord::dom("Home"), &c),
            Some(ActionDescriptor::JumpPercentage { pct: 0.0 })
        );
        assert_eq!(
            interpret(&KeyChord::dom("End"), &c),
            Some(ActionDescriptor::JumpPercentage { pct: 100.0 })
        );
        assert_eq!(
            interpret(&KeyChord::dom("KeyF"), &c),
            Some(ActionDescriptor::ToggleFullscreen)
        );
        assert_eq!(
            interpret(&KeyChord::dom("KeyM"), &c),
            Some(ActionDescriptor::ToggleMute)
        );
        assert_eq!(
            interpret(&KeyChord::dom("Digit3"), &c),
            Some(ActionDescriptor::JumpPercentage { pct: 30.0 })
        );
        assert_eq!(interpret(&KeyChord::dom("KeyQ"), &c), None);
        assert_eq!(interpret(&KeyChord::dom("Tab"), &c), None);
    }

    #[test]
    fn seek_scales_with_playback_rate() {
        assert_eq!(
            interpret(&KeyChord::dom("ArrowRight"), &ctx(2.0, false)),
            Some(ActionDescriptor::Seek { seconds: 10.0 })
        );
        assert_eq!(
            interpret(&KeyChord::dom("ArrowLeft"), &ctx(0.5, false)),
            Some(ActionDescriptor::Seek { seconds: -2.5 })
        );
    }

    #[test]
    fn nonsense_rate_falls_back_to_unit() {
        assert_eq!(
            interpret(&KeyChord::dom("ArrowRight"), &ctx(f64::NAN, false)),
            Some(ActionDescriptor::Seek { seconds: 5.0 })
        );
    }

    #[test]
    fn volume_keys_are_gated() {
        assert_eq!(interpret(&KeyChord::dom("ArrowUp"), &ctx(1.0, false)), None);
        assert_eq!(
            interpret(&KeyChord::dom("ArrowDown"), &ctx(1.0, false)),
            None
        );
        assert_eq!(
            interpret(&KeyChord::dom("ArrowUp"), &ctx(1.0, true)),
            Some(ActionDescriptor::Volume { delta: 5.0 })
        );
        assert_eq!(
            interpret(&KeyChord::dom("ArrowDown"), &ctx(1.0, true)),
            Some(ActionDescriptor::Volume { delta: -5.0 })
        );
    }

    #[test]
    fn shift_only_speed_chords() {
        let c = ctx(1.0, true);
        let shift = |code| KeyChord::dom(code).with_modifiers(Modifiers::SHIFT);
        assert_eq!(
            interpret(&shift("Period"), &c),
            Some(ActionDescriptor::ChangeSpeed {
                direction: SpeedDirection::Up
            })
        );
        assert_eq!(
            interpret(&shift("Comma"), &c),
            Some(ActionDescriptor::ChangeSpeed {
                direction: SpeedDirection::Down
            })
        );
        assert_eq!(interpret(&shift("Space"), &c), None);
        assert_eq!(interpret(&shift("ArrowLeft"), &c), None);
        assert_eq!(interpret(&KeyChord::dom("Period"), &c), None);
    }

    #[test]
    fn alt_ctrl_meta_are_ignored() {
        let c = ctx(1.0, true);
        for mods in [
            Modifiers::ALT,
            Modifiers::CTRL,
            Modifiers::META,
            Modifiers::SHIFT | Modifiers::CTRL,
        ] {
            assert_eq!(
                interpret(&KeyChord::dom("Space").with_modifiers(mods), &c),
                None
            );
            assert_eq!(
                interpret(&KeyChord::dom("Period").with_modifiers(mods), &c),
                None
            );
        }
    }

    #[test]
    fn custom_steps_from_config() {
        let config = SessionConfig {
            seek_step_secs: 10.0,
            volume_step_pct: 10.0,
            ..SessionConfig::default()
        };
        let interpreter = Interpreter::new(&config);
        assert_eq!(
            interpreter.interpret(&KeyChord::dom("ArrowLeft"), &ctx(1.0, true)),
            Some(ActionDescriptor::Seek { seconds: -10.0 })
        );
        assert_eq!(
            interpreter.interpret(&KeyChord::dom("ArrowUp"), &ctx(1.0, true)),
            Some(ActionDescriptor::Volume { delta: 10.0 })
        );
    }

    fn arb_code() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Space".to_string()),
            Just("ArrowLeft".to_string()),
            Just("ArrowRight".to_string()),
            Just("ArrowUp".to_string()),
            Just("ArrowDown".to_string()),
            Just("Home".to_string()),
            Just("End".to_string()),
            Just("Period".to_string()),
            Just("Comma".to_string()),
            "Key[A-Z]",
            "Digit[0-9]",
            "[A-Za-z0-9]{1,8}",
        ]
    }

    proptest! {
        #[test]
        fn interpretation_is_pure(
            code in arb_code(),
            bits in 0u8..16,
            rate in 0.25f64..3.0,
            can_volume in any::<bool>(),
        ) {
            let chord = KeyChord::dom(&code).with_modifiers(Modifiers::from_bits_truncate(bits));
            let c = ctx(rate, can_volume);
            prop_assert_eq!(interpret(&chord, &c), interpret(&chord.clone(), &c));
        }

        #[test]
        fn volume_never_without_eligibility(code in arb_code(), bits in 0u8..16, rate in 0.25f64..3.0) {
            let chord = KeyChord::dom(&code).with_modifiers(Modifiers::from_bits_truncate(bits));
            let action = interpret(&chord, &ctx(rate, false));
            let is_volume = matches!(action, Some(ActionDescriptor::Volume { .. }));
            prop_assert!(!is_volume);
        }
    }
}
