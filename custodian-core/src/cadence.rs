//! Message-count driven update cadence.
//!
//! A countdown starts at the check frequency and drops by one per chat
//! message. The message that takes it to zero requests a stat check and
//! resets the countdown, so with frequency `n` every `n`th message checks.

/// Advance the countdown for one message.
///
/// Returns the new counter and whether a check is due. Frequencies below 1
/// behave as 1. The returned counter is always at least 1.
pub fn on_message_arrived(counter: i64, frequency: i64) -> (i64, bool) {
    let frequency = frequency.max(1);
    let next = counter.saturating_sub(1);
    if next <= 0 {
        (frequency, true)
    } else {
        (next, false)
    }
}

/// Countdown state owned by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateCadence {
    remaining: i64,
    frequency: i64,
}

impl UpdateCadence {
    pub fn new(frequency: u32) -> Self {
        let frequency = i64::from(frequency.max(1));
        Self {
            remaining: frequency,
            frequency,
        }
    }

    /// Record one message. Returns true when a check is due.
    pub fn message_arrived(&mut self) -> bool {
        let (remaining, due) = on_message_arrived(self.remaining, self.frequency);
        self.remaining = remaining;
        due
    }

    /// Change the frequency and restart the countdown.
    pub fn set_frequency(&mut self, frequency: u32) {
        *self = Self::new(frequency);
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn frequency(&self) -> i64 {
        self.frequency
    }
}
