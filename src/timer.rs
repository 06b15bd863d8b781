use std::time::{Duration, Instant};

/// Cancellable deadline, checked by the owner on every UI tick.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    deadline: Option<Instant>,
    period: Option<Duration>,
}

impl Timer {
    pub fn once(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
        self.period = None;
    }

    pub fn every(&mut self, now: Instant, period: Duration) {
        self.deadline = Some(now + period);
        self.period = Some(period);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.period = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    // Missed periods are not replayed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                match self.period {
                    Some(period) => self.deadline = Some(now + period),
                    None => self.deadline = None,
                }
                true
            }
            _ => false,
        }
    }
}
