use std::time::Duration;

use tokio::time::Instant;

/// Trailing-edge debounce with consecutive-duplicate suppression.
#[derive(Debug)]
pub(crate) struct Debouncer {
    delay: Duration,
    pending: Option<(String, Instant)>,
    last_fired: Option<String>,
}

impl Debouncer {
    pub(crate) fn new(delay: Duration) -> Self {
        Self { delay, pending: None, last_fired: None }
    }

    /// Replaces any pending value and restarts the quiet period.
    pub(crate) fn push(&mut self, value: String, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    /// Lets the next settled value fire even if it repeats the previous one.
    pub(crate) fn forget_last(&mut self) {
        self.last_fired = None;
    }

    /// Takes the settled value, unless it repeats the previous one.
    pub(crate) fn fire(&mut self) -> Option<String> {
        let (value, _) = self.pending.take()?;
        if self.last_fired.as_ref() == Some(&value) {
            return None;
        }
        self.last_fired = Some(value.clone());
        Some(value)
    }
}
