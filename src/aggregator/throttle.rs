//! Per-operation progress notification throttle.
//!
//! Progress callbacks for one operation are coalesced to at most one per
//! interval, except at phase boundaries: the first update after a phase
//! transition, and the final update before a terminal phase, always flush.

use std::time::{Duration, Instant};

/// A pending, not-yet-delivered progress update.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingProgress {
    pub percent: u8,
    pub message: Option<String>,
}

#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<PendingProgress>,
    /// Set after a phase transition; the next offer flushes unconditionally
    boundary: bool,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
            boundary: true,
        }
    }

    /// Force the next offer through regardless of the interval.
    pub fn mark_boundary(&mut self) {
        self.boundary = true;
    }

    /// Offer a progress update. Returns the update to deliver now, or `None`
    /// if it was coalesced into the pending slot.
    pub fn offer(&mut self, percent: u8, message: Option<String>, now: Instant) -> Option<PendingProgress> {
        let update = PendingProgress { percent, message };

        let due = self.boundary
            || self
                .last_emit
                .is_none_or(|last| now.duration_since(last) >= self.interval);

        if due {
            self.boundary = false;
            self.last_emit = Some(now);
            self.pending = None;
            Some(update)
        } else {
            self.pending = Some(update);
            None
        }
    }

    /// Take the coalesced update, if any. Called before a terminal
    /// notification so the last progress value is never lost.
    pub fn take_pending(&mut self) -> Option<PendingProgress> {
        self.pending.take()
    }

    /// Reset for a new attempt.
    pub fn reset(&mut self) {
        self.last_emit = None;
        self.pending = None;
        self.boundary = true;
    }
}
