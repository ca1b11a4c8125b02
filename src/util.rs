use std::time::{Duration, Instant};

#[macro_export]
macro_rules! ok_or_continue {
    ( $e:expr ) => {
        match $e {
            Ok(value) => value,
            Err(_e) => {
                continue;
            }
        }
    };
}

/// Tracks when a reconnect was last attempted so that attempts against absent hardware don't
/// degenerate into a busy loop of USB/MIDI enumeration.
///
/// `check()` answers "are we allowed to try again right now?" and, if yes, records the attempt.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last_attempt: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: None,
        }
    }

    /// Returns `true` (and records the attempt) if at least `interval` has passed since the
    /// previous permitted attempt. The first call is always permitted.
    pub fn check(&mut self, now: Instant) -> bool {
        match self.last_attempt {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_attempt = Some(now);
                true
            }
        }
    }

    /// Forget the previous attempt so the next `check()` passes immediately. Used after a
    /// successful connection, so that a disconnect right afterwards may retry without waiting.
    pub fn reset(&mut self) {
        self.last_attempt = None;
    }
}
