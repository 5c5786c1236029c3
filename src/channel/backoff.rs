//! Reconnect backoff schedule

use std::time::Duration;

/// Doubling delay schedule between reconnect attempts
///
/// Starts at the floor, doubles after every attempt, saturates at the
/// ceiling. A successful connection resets it to the floor.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            next: floor,
        }
    }

    /// Delay to wait before the next attempt; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.floor;
    }
}
