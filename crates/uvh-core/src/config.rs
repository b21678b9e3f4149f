//! Session policy knobs.
//!
//! # Defaults
//!
//! | Setting | Default | Range | Description |
//! |---------|---------|-------|-------------|
//! | `retarget_debounce_ms` | 250 | 0-2000 | Quiet period before re-selecting after mutations/scroll |
//! | `retarget_max_wait_ms` | 1000 | debounce-10000 | Longest a continuous burst may defer re-selection |
//! | `visibility_margin_px` | 50 | 0-500 | Viewport grow margin for "visible" videos |
//! | `volume_tolerance_px` | 5 | 0-50 | Slack when matching focus/click against the video box |
//! | `seek_step_secs` | 5 | 1-60 | Arrow-key seek distance at 1x |
//! | `volume_step_pct` | 5 | 1-50 | Arrow-key volume step |
//! | `speed_step` | 0.25 | 0.05-1.0 | Playback-rate grid |
//! | `min_rate` / `max_rate` | 0.25 / 3.0 | 0.0625-16 | Playback-rate bounds |
//! | `max_pending_messages` | 256 | 1-4096 | Unresolved child reports kept for retry |
//! | `controls_reveal_ms` | 2000 | 0-10000 | How long native controls stay forced on |
//!
//! Overrides can be shipped as JSON through [`SessionConfig::from_json_str`];
//! missing fields keep their defaults and every value goes through
//! [`SessionConfig::validated`].

use core::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_RETARGET_DEBOUNCE_MS: u64 = 250;
pub const MAX_RETARGET_DEBOUNCE_MS: u64 = 2000;
pub const DEFAULT_RETARGET_MAX_WAIT_MS: u64 = 1000;
pub const MAX_RETARGET_MAX_WAIT_MS: u64 = 10_000;
pub const DEFAULT_VISIBILITY_MARGIN_PX: f64 = 50.0;
pub const DEFAULT_VOLUME_TOLERANCE_PX: f64 = 5.0;
pub const DEFAULT_SEEK_STEP_SECS: f64 = 5.0;
pub const DEFAULT_VOLUME_STEP_PCT: f64 = 5.0;
pub const DEFAULT_SPEED_STEP: f64 = 0.25;
pub const DEFAULT_MIN_RATE: f64 = 0.25;
pub const DEFAULT_MAX_RATE: f64 = 3.0;
pub const DEFAULT_MAX_PENDING_MESSAGES: usize = 256;
pub const DEFAULT_CONTROLS_REVEAL_MS: u64 = 2000;

/// What the page-context hook does when a page asks for a closed shadow root.
///
/// `Record` keeps the page's requested mode and captures the root in the
/// closed-shadow map through the extension's privileged accessor.
/// `ForceOpen` rewrites the request to `open`; it makes every root observable
/// but changes what the page itself can see and is therefore opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosedShadowPolicy {
    #[default]
    Record,
    ForceOpen,
}

/// Policy constants for one [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub retarget_debounce_ms: u64,
    pub retarget_max_wait_ms: u64,
    pub visibility_margin_px: f64,
    pub volume_tolerance_px: f64,
    pub seek_step_secs: f64,
    pub volume_step_pct: f64,
    pub speed_step: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub max_pending_messages: usize,
    pub controls_reveal_ms: u64,
    pub closed_shadow_policy: ClosedShadowPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retarget_debounce_ms: DEFAULT_RETARGET_DEBOUNCE_MS,
            retarget_max_wait_ms: DEFAULT_RETARGET_MAX_WAIT_MS,
            visibility_margin_px: DEFAULT_VISIBILITY_MARGIN_PX,
            volume_tolerance_px: DEFAULT_VOLUME_TOLERANCE_PX,
            seek_step_secs: DEFAULT_SEEK_STEP_SECS,
            volume_step_pct: DEFAULT_VOLUME_STEP_PCT,
            speed_step: DEFAULT_SPEED_STEP,
            min_rate: DEFAULT_MIN_RATE,
            max_rate: DEFAULT_MAX_RATE,
            max_pending_messages: DEFAULT_MAX_PENDING_MESSAGES,
            controls_reveal_ms: DEFAULT_CONTROLS_REVEAL_MS,
            closed_shadow_policy: ClosedShadowPolicy::Record,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.retarget_debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_closed_shadow_policy(mut self, policy: ClosedShadowPolicy) -> Self {
        self.closed_shadow_policy = policy;
        self
    }

    #[must_use]
    pub fn with_max_pending_messages(mut self, cap: usize) -> Self {
        self.max_pending_messages = cap;
        self
    }

    /// Parse a JSON override and clamp it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    #[must_use]
    pub fn retarget_debounce(&self) -> Duration {
        Duration::from_millis(self.retarget_debounce_ms)
    }

    #[must_use]
    pub fn retarget_max_wait(&self) -> Duration {
        Duration::from_millis(self.retarget_max_wait_ms)
    }

    #[must_use]
    pub fn controls_reveal(&self) -> Duration {
        Duration::from_millis(self.controls_reveal_ms)
    }

    /// Clamp every field into its valid range.
    ///
    /// Non-finite floats fall back to the default. `min_rate` never exceeds
    /// `max_rate`.
    #[must_use]
    pub fn validated(mut self) -> Self {
        fn clamp_or(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
            if value.is_finite() {
                value.clamp(lo, hi)
            } else {
                fallback
            }
        }

        self.retarget_debounce_ms = self.retarget_debounce_ms.min(MAX_RETARGET_DEBOUNCE_MS);
        self.retarget_max_wait_ms = self
            .retarget_max_wait_ms
            .clamp(self.retarget_debounce_ms, MAX_RETARGET_MAX_WAIT_MS);
        self.visibility_margin_px = clamp_or(
            self.visibility_margin_px,
            0.0,
            500.0,
            DEFAULT_VISIBILITY_MARGIN_PX,
        );
        self.volume_tolerance_px = clamp_or(
            self.volume_tolerance_px,
            0.0,
            50.0,
            DEFAULT_VOLUME_TOLERANCE_PX,
        );
        self.seek_step_secs = clamp_or(self.seek_step_secs, 1.0, 60.0, DEFAULT_SEEK_STEP_SECS);
        self.volume_step_pct = clamp_or(self.volume_step_pct, 1.0, 50.0, DEFAULT_VOLUME_STEP_PCT);
        self.speed_step = clamp_or(self.speed_step, 0.05, 1.0, DEFAULT_SPEED_STEP);
        self.min_rate = clamp_or(self.min_rate, 0.0625, 16.0, DEFAULT_MIN_RATE);
        self.max_rate = clamp_or(self.max_rate, 0.0625, 16.0, DEFAULT_MAX_RATE);
        if self.min_rate > self.max_rate {
            core::mem::swap(&mut self.min_rate, &mut self.max_rate);
        }
        self.max_pending_messages = self.max_pending_messages.clamp(1, 4096);
        self.controls_reveal_ms = self.controls_reveal_ms.min(10_000);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let config = SessionConfig::default();
        assert_eq!(config.retarget_debounce(), Duration::from_millis(250));
        assert_eq!(config.visibility_margin_px, 50.0);
        assert_eq!(config.volume_tolerance_px, 5.0);
        assert_eq!(config.min_rate, 0.25);
        assert_eq!(config.max_rate, 3.0);
        assert_eq!(config.closed_shadow_policy, ClosedShadowPolicy::Record);
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn json_override_keeps_missing_defaults() {
        let config =
            SessionConfig::from_json_str(r#"{"seek_step_secs": 10, "closed_shadow_policy": "force_open"}"#)
                .unwrap();
        assert_eq!(config.seek_step_secs, 10.0);
        assert_eq!(config.closed_shadow_policy, ClosedShadowPolicy::ForceOpen);
        assert_eq!(config.volume_step_pct, DEFAULT_VOLUME_STEP_PCT);
    }

    #[test]
    fn json_override_is_clamped() {
        let config =
            SessionConfig::from_json_str(r#"{"retarget_debounce_ms": 90000, "max_pending_messages": 0}"#)
                .unwrap();
        assert_eq!(config.retarget_debounce_ms, MAX_RETARGET_DEBOUNCE_MS);
        assert_eq!(config.max_pending_messages, 1);
    }

    #[test]
    fn inverted_rate_bounds_are_swapped() {
        let config = SessionConfig {
            min_rate: 4.0,
            max_rate: 0.5,
            ..SessionConfig::default()
        }
        .validated();
        assert_eq!((config.min_rate, config.max_rate), (0.5, 4.0));
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(matches!(
            SessionConfig::from_json_str("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn builders_chain() {
        let config = SessionConfig::default()
            .with_debounce(Duration::from_millis(100))
            .with_closed_shadow_policy(ClosedShadowPolicy::ForceOpen)
            .with_max_pending_messages(8);
        assert_eq!(config.retarget_debounce_ms, 100);
        assert_eq!(config.closed_shadow_policy, ClosedShadowPolicy::ForceOpen);
        assert_eq!(config.max_pending_messages, 8);
    }

    #[test]
    fn huge_debounce_saturates_instead_of_wrapping() {
        let config = SessionConfig::default().with_debounce(Duration::MAX);
        assert_eq!(config.retarget_debounce_ms, u64::MAX);
        assert_eq!(config.validated().retarget_debounce_ms, MAX_RETARGET_DEBOUNCE_MS);
    }

    #[test]
    fn max_wait_never_undercuts_the_debounce() {
        let config =
            SessionConfig::from_json_str(r#"{"retarget_debounce_ms": 800, "retarget_max_wait_ms": 100}"#)
                .unwrap();
        assert_eq!(config.retarget_max_wait_ms, 800);
        let config = SessionConfig::from_json_str(r#"{"retarget_max_wait_ms": 99999}"#).unwrap();
        assert_eq!(config.retarget_max_wait(), Duration::from_millis(MAX_RETARGET_MAX_WAIT_MS));
    }
}
