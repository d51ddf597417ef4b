//! Retransmission timer.
//!
//! Reliable delivery requires that unacknowledged segments are re-sent if no
//! ACK arrives within a bounded time.  [`RetransmitTimer`] is a virtual-time
//! timer: it never reads a clock, it is advanced explicitly by
//! [`RetransmitTimer::tick`] with the time elapsed since the previous tick.
//!
//! The timer is either *disarmed* or *armed* with an elapsed counter.  It
//! fires once the elapsed time reaches the current retransmission timeout
//! (RTO).  The RTO starts at a configured initial value, doubles on
//! [`back_off`](RetransmitTimer::back_off) (exponential back-off, RFC 6298
//! §5.5) and returns to the initial value on
//! [`reset_rto`](RetransmitTimer::reset_rto).

use std::time::Duration;

/// Virtual-time retransmission timer with exponential back-off.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    initial_rto: Duration,
    /// Current RTO, doubled on each back-off.
    rto: Duration,
    /// Time since the timer was (re)started; `None` while disarmed.
    elapsed: Option<Duration>,
}

impl RetransmitTimer {
    /// Construct a disarmed timer.
    pub fn new(initial_rto: Duration) -> Self {
        Self {
            initial_rto,
            rto: initial_rto,
            elapsed: None,
        }
    }

    /// Start the timer if it is not already running.
    pub fn arm(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = Some(Duration::ZERO);
        }
    }

    /// Start counting again from zero.
    pub fn restart(&mut self) {
        self.elapsed = Some(Duration::ZERO);
    }

    pub fn disarm(&mut self) {
        self.elapsed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.elapsed.is_some()
    }

    /// Advance the timer by `dt`.
    ///
    /// Returns `true` when the timer expired; it is then restarted from zero
    /// at the same RTO.  A disarmed timer never fires.
    pub fn tick(&mut self, dt: Duration) -> bool {
        let Some(elapsed) = self.elapsed.as_mut() else {
            return false;
        };
        *elapsed = elapsed.saturating_add(dt);
        if *elapsed >= self.rto {
            *elapsed = Duration::ZERO;
            true
        } else {
            false
        }
    }

    /// Double the RTO.
    pub fn back_off(&mut self) {
        self.rto = self.rto.saturating_mul(2);
    }

    /// Restore the RTO to its initial value.
    pub fn reset_rto(&mut self) {
        self.rto = self.initial_rto;
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn initial_rto(&self) -> Duration {
        self.initial_rto
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RTO: Duration = Duration::from_millis(1000);

    #[test]
    fn starts_disarmed() {
        let mut t = RetransmitTimer::new(RTO);
        assert!(!t.is_armed());
        assert!(!t.tick(RTO * 10));
        assert_eq!(t.rto(), RTO);
    }

    #[test]
    fn fires_at_rto_and_restarts() {
        let mut t = RetransmitTimer::new(RTO);
        t.arm();
        assert!(!t.tick(Duration::from_millis(999)));
        assert!(t.tick(Duration::from_millis(1)));
        assert!(t.is_armed());
        assert!(!t.tick(Duration::from_millis(999)));
        assert!(t.tick(Duration::from_millis(1)));
    }

    #[test]
    fn arm_does_not_restart_running_timer() {
        let mut t = RetransmitTimer::new(RTO);
        t.arm();
        t.tick(Duration::from_millis(600));
        t.arm();
        assert!(t.tick(Duration::from_millis(400)));
    }

    #[test]
    fn restart_resets_elapsed() {
        let mut t = RetransmitTimer::new(RTO);
        t.arm();
        t.tick(Duration::from_millis(600));
        t.restart();
        assert!(!t.tick(Duration::from_millis(600)));
    }

    #[test]
    fn back_off_doubles_and_reset_restores() {
        let mut t = RetransmitTimer::new(RTO);
        t.back_off();
        t.back_off();
        assert_eq!(t.rto(), RTO * 4);
        t.arm();
        assert!(!t.tick(RTO * 3));
        assert!(t.tick(RTO));
        t.reset_rto();
        assert_eq!(t.rto(), t.initial_rto());
    }

    #[test]
    fn disarm_stops_firing() {
        let mut t = RetransmitTimer::new(RTO);
        t.arm();
        t.disarm();
        assert!(!t.tick(RTO * 2));
    }
}
