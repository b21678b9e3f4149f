//! Trailing-edge debouncer driven by host time.

use core::time::Duration;

/// Fires once, `delay` after the most recent [`poke`](Self::poke), but no
/// later than `max_wait` after the first poke of a burst.
///
/// Time is a monotonic [`Duration`] since an arbitrary host epoch
/// (`performance.now()` in the browser).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    delay: Duration,
    max_wait: Option<Duration>,
    burst_start: Option<Duration>,
    deadline: Option<Duration>,
}

impl Debouncer {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_wait: None,
            burst_start: None,
            deadline: None,
        }
    }

    /// Cap how long a continuous burst may postpone firing.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait.max(self.delay));
        self
    }

    /// Record activity at `now`, pushing the deadline out up to the cap.
    pub fn poke(&mut self, now: Duration) {
        let start = *self.burst_start.get_or_insert(now);
        let trailing = now.saturating_add(self.delay);
        self.deadline = Some(match self.max_wait {
            Some(max_wait) => trailing.min(start.saturating_add(max_wait)),
            None => trailing,
        });
    }

    /// Consume the pending deadline if it has passed.
    pub fn fire(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.burst_start = None;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub const fn next_deadline(&self) -> Option<Duration> {
        self.deadline
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}
