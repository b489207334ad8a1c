use std::{collections::HashMap, time::Duration};

/// When to poll a job next.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NextPoll {
    After(Duration),
    /// Too many consecutive failures; stop polling in the background.
    GiveUp,
}

/// Per-job consecutive failure tracking with capped exponential delays.
#[derive(Clone, Debug)]
pub struct PollBackoff {
    interval: Duration,
    give_up_after: u32,
    base_delay: Duration,
    max_delay: Duration,
    failures: HashMap<String, u32>,
}

impl PollBackoff {
    pub fn new(
        interval: Duration,
        give_up_after: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            interval,
            give_up_after: give_up_after.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            failures: HashMap::new(),
        }
    }

    /// A successful step resets the job's failure count.
    pub fn on_success(&mut self, job_id: &str) -> NextPoll {
        self.failures.remove(job_id);
        NextPoll::After(self.interval)
    }

    pub fn on_failure(&mut self, job_id: &str) -> NextPoll {
        let failures = {
            let count = self.failures.entry(job_id.to_string()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };

        if failures >= self.give_up_after {
            self.failures.remove(job_id);
            NextPoll::GiveUp
        } else {
            NextPoll::After(self.delay_for(failures))
        }
    }

    pub fn forget(&mut self, job_id: &str) {
        self.failures.remove(job_id);
    }

    pub fn failures(&self, job_id: &str) -> u32 {
        self.failures.get(job_id).copied().unwrap_or(0)
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(6);
        let delay = self.base_delay.saturating_mul(1 << exponent);
        delay.min(self.max_delay).max(self.interval)
    }
}
