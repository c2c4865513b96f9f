use std::time::{Duration, Instant};

/// Cancelable fixed-rate task, driven by the owner's clock.
///
/// The task does not run anything itself: the owner asks `next_due` when to
/// wake up and calls `poll` with the current instant. A poll that arrives
/// several periods late fires once and realigns to the original phase.
#[derive(Clone, Debug)]
pub struct PeriodicTask {
    period: Duration,
    next_due: Option<Instant>,
}

impl PeriodicTask {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    /// Start with the first tick due at `now`. No-op if already running.
    pub fn start_immediate(&mut self, now: Instant) -> bool {
        self.start_at(now)
    }

    /// Start with the first tick due one period after `now`. No-op if already running.
    pub fn start_delayed(&mut self, now: Instant) -> bool {
        self.start_at(now + self.period)
    }

    fn start_at(&mut self, first_due: Instant) -> bool {
        if self.next_due.is_some() {
            return false;
        }
        self.next_due = Some(first_due);
        true
    }

    /// Stop the task. Returns whether it was running; canceling twice is harmless.
    pub fn cancel(&mut self) -> bool {
        self.next_due.take().is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Returns `true` when a tick is due at `now`, and schedules the next one.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if due > now {
            return false;
        }
        let mut next = due + self.period;
        while next <= now {
            next += self.period;
        }
        self.next_due = Some(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn immediate_start_fires_at_start_then_every_period() {
        let t0 = Instant::now();
        let mut task = PeriodicTask::new(SEC);
        assert!(task.start_immediate(t0));
        assert!(task.poll(t0));
        assert!(!task.poll(t0 + SEC / 2));
        assert!(task.poll(t0 + SEC));
        assert_eq!(task.next_due(), Some(t0 + 2 * SEC));
    }

    #[test]
    fn delayed_start_waits_one_period() {
        let t0 = Instant::now();
        let mut task = PeriodicTask::new(SEC);
        task.start_delayed(t0);
        assert!(!task.poll(t0));
        assert!(task.poll(t0 + SEC));
    }

    #[test]
    fn restart_while_running_keeps_phase() {
        let t0 = Instant::now();
        let mut task = PeriodicTask::new(SEC);
        task.start_delayed(t0);
        assert!(!task.start_delayed(t0 + SEC / 2));
        assert_eq!(task.next_due(), Some(t0 + SEC));
    }

    #[test]
    fn cancel_is_idempotent_and_stops_ticks() {
        let t0 = Instant::now();
        let mut task = PeriodicTask::new(SEC);
        task.start_immediate(t0);
        assert!(task.cancel());
        assert!(!task.cancel());
        assert!(!task.poll(t0 + 10 * SEC));
        assert!(task.next_due().is_none());
    }

    #[test]
    fn late_poll_fires_once_and_realigns() {
        let t0 = Instant::now();
        let mut task = PeriodicTask::new(SEC);
        task.start_delayed(t0);
        assert!(task.poll(t0 + SEC * 7 / 2));
        assert_eq!(task.next_due(), Some(t0 + 4 * SEC));
        assert!(!task.poll(t0 + SEC * 7 / 2));
    }
}
