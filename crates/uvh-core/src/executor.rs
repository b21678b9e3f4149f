//! Applies an [`ActionDescriptor`] to a concrete video.
//!
//! Execution is split into [`Executor::plan`], which turns a media snapshot
//! and an action into [`MediaCommand`]s, and [`Executor::execute`], which
//! reads the snapshot from the host and applies the plan.

use tracing::debug;

use crate::LOG_TARGET;
use crate::action::ActionDescriptor;
use crate::config::SessionConfig;
use crate::dom::{Dom, MediaCommand, MediaSnapshot};

/// Commands derived from one action, plus an optional on-screen notice.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    pub commands: Vec<MediaCommand>,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Executor {
    speed_step: f64,
    min_rate: f64,
    max_rate: f64,
    controls_reveal: core::time::Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

impl Executor {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            speed_step: config.speed_step,
            min_rate: config.min_rate,
            max_rate: config.max_rate,
            controls_reveal: config.controls_reveal(),
        }
    }

    /// Next playback rate one grid step away from `rate`.
    ///
    /// Off-grid rates snap to the nearest grid point first, so 1.1 steps up
    /// to 1.25 rather than 1.35.
    #[must_use]
    pub fn step_rate(&self, rate: f64, sign: f64) -> f64 {
        let rate = if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            1.0
        };
        let steps = (rate / self.speed_step).round() + sign;
        (steps * self.speed_step).clamp(self.min_rate, self.max_rate)
    }

    /// Commands for `action` against a video currently in state `media`.
    #[must_use]
    pub fn plan(
        &self,
        media: &MediaSnapshot,
        action: &ActionDescriptor,
        fullscreen_active: bool,
    ) -> Plan {
        let mut plan = Plan::default();
        match *action {
            ActionDescriptor::TogglePlayPause => {
                plan.commands.push(if media.paused {
                    MediaCommand::Play
                } else {
                    MediaCommand::Pause
                });
            }
            ActionDescriptor::Seek { seconds } => {
                // Unknown duration clamps to 0; live streams keep +inf.
                let upper = if media.duration.is_nan() {
                    0.0
                } else {
                    media.duration
                };
                let target = (media.current_time + seconds).min(upper).max(0.0);
                plan.commands.push(MediaCommand::SetCurrentTime(target));
            }
            ActionDescriptor::Volume { delta } => {
                let volume = (media.volume + delta / 100.0).clamp(0.0, 1.0);
                plan.commands.push(MediaCommand::SetVolume(volume));
                plan.commands.push(MediaCommand::SetMuted(false));
            }
            ActionDescriptor::JumpPercentage { pct } => {
                if media.duration.is_finite() && media.duration > 0.0 {
                    let pct = pct.clamp(0.0, 100.0);
                    plan.commands
                        .push(MediaCommand::SetCurrentTime(pct / 100.0 * media.duration));
                }
            }
            ActionDescriptor::ChangeSpeed { direction } => {
                let rate = self.step_rate(media.playback_rate, direction.sign());
                plan.commands.push(MediaCommand::SetPlaybackRate(rate));
                plan.notice = Some(format!("{rate:.2}x"));
            }
            ActionDescriptor::ToggleFullscreen => {
                plan.commands.push(if fullscreen_active {
                    MediaCommand::ExitFullscreen
                } else {
                    MediaCommand::EnterFullscreen
                });
            }
            ActionDescriptor::ToggleMute => {
                plan.commands.push(MediaCommand::SetMuted(!media.muted));
            }
        }
        plan
    }

    /// Apply `action` to `video` and briefly force native controls visible.
    pub fn execute<D: Dom>(&self, dom: &D, video: &D::Node, action: &ActionDescriptor) -> Plan {
        let media = dom.media_snapshot(video);
        let plan = self.plan(&media, action, dom.fullscreen_element().is_some());
        for command in &plan.commands {
            dom.apply_media(video, *command);
        }
        if let Some(notice) = &plan.notice {
            dom.show_notice(notice);
        }
        dom.reveal_controls(video, self.controls_reveal);
        debug!(
            target: LOG_TARGET,
            action = action.name(),
            commands = ?plan.commands,
            "executed action"
        );
        plan
    }
}
