use chrono::{DateTime, Duration, Utc};

/// A single-flight repeating timer.
///
/// A timer never fires while its previous request is still outstanding; the
/// next deadline is measured from when that request completes.
#[derive(Debug, Clone)]
pub struct PollTimer {
    period: Duration,
    next_due: Option<DateTime<Utc>>,
    in_flight: bool,
    rerun: bool,
}

impl PollTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
            in_flight: false,
            rerun: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Disarms the timer and forgets any outstanding request.
    pub fn cancel(&mut self) {
        self.next_due = None;
        self.in_flight = false;
        self.rerun = false;
    }

    /// Fires right away, abandoning whatever was outstanding. The caller is
    /// responsible for discarding the abandoned response.
    pub fn restart(&mut self, now: DateTime<Utc>) {
        self.cancel();
        self.next_due = Some(now);
        self.in_flight = true;
    }

    /// Returns true and marks a request outstanding if the timer is due.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.next_due {
            Some(due) if !self.in_flight && now >= due => {
                self.in_flight = true;
                true
            }
            _ => false,
        }
    }

    /// Records completion of the outstanding request and schedules the next one.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.in_flight = false;
        if self.next_due.is_none() {
            return;
        }
        self.next_due = if self.rerun {
            Some(now)
        } else {
            Some(now + self.period)
        };
        self.rerun = false;
    }

    /// Makes an armed timer due now, or as soon as the outstanding request completes.
    pub fn expedite(&mut self, now: DateTime<Utc>) {
        if self.next_due.is_none() {
            return;
        }
        if self.in_flight {
            self.rerun = true;
        } else {
            self.next_due = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn armed(now: DateTime<Utc>) -> PollTimer {
        let mut timer = PollTimer::new(Duration::milliseconds(1500));
        timer.restart(now);
        timer.complete(now);
        timer
    }

    #[test]
    fn disarmed_timer_never_fires() {
        let mut timer = PollTimer::new(Duration::seconds(5));
        assert!(!timer.poll(t(0)));
        assert!(!timer.poll(t(60_000)));
    }

    #[test]
    fn fires_once_per_period_and_never_overlaps() {
        let mut timer = armed(t(0));
        assert!(!timer.poll(t(1499)));
        assert!(timer.poll(t(1500)));
        assert!(timer.is_in_flight());

        // slow server: still outstanding well past the next deadline
        assert!(!timer.poll(t(3000)));
        assert!(!timer.poll(t(9000)));

        timer.complete(t(9000));
        assert!(!timer.is_in_flight());
        assert!(!timer.poll(t(10_000)));
        assert!(timer.poll(t(10_500)));
    }

    #[test]
    fn cancelled_timer_stays_quiet_after_late_completion() {
        let mut timer = armed(t(0));
        assert!(timer.poll(t(1500)));
        timer.cancel();
        assert!(!timer.is_in_flight());
        timer.complete(t(1600));
        assert!(!timer.is_armed());
        assert!(!timer.poll(t(10_000)));
    }

    #[test]
    fn expedite_waits_for_outstanding_request() {
        let mut timer = armed(t(0));
        timer.expedite(t(100));
        assert!(timer.poll(t(100)));

        timer.expedite(t(200));
        assert!(!timer.poll(t(200)));
        timer.complete(t(300));
        assert!(timer.poll(t(300)));
    }
}
