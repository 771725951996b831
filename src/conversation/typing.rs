//! Sender-side typing debounce.
//!
//! The first keystroke of a burst starts typing; the burst ends once no
//! keystroke has arrived for the quiet period. Callers own the clock and
//! pass `now` in, which keeps this deterministic under test.

use std::time::{Duration, Instant};

/// Quiet period after the last keystroke before `stop_typing` is sent.
pub const TYPING_QUIET_PERIOD: Duration = Duration::from_millis(1000);

/// What the caller should emit after feeding the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// One pending timer per input session.
#[derive(Debug)]
pub struct TypingDebouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(TYPING_QUIET_PERIOD)
    }
}

impl TypingDebouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Record a keystroke. Returns `Start` when this opens a new burst.
    ///
    /// Call [`poll`](Self::poll) first so an expired burst is closed before
    /// the next one opens.
    pub fn keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        let starts_burst = self.deadline.is_none();
        self.deadline = Some(now + self.quiet);
        starts_burst.then_some(TypingSignal::Start)
    }

    /// Fire the stop timer if it has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// Clear the timer on teardown. Returns `Stop` if a burst was in progress.
    pub fn cancel(&mut self) -> Option<TypingSignal> {
        self.deadline.take().map(|_| TypingSignal::Stop)
    }

    /// When the pending stop fires, if a burst is in progress.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
