use std::time::{Duration, Instant};

/// Stop condition consulted by the poll loop after every tick.
pub trait AcquisitionLimits {
    fn record_samples_read(&mut self, count: u64);

    /// `now` comes from the same clock that drives the poll cycle.
    fn limit_reached(&self, now: Instant) -> bool;

    /// Called once, with the time of the first tick, when the acquisition starts.
    fn acquisition_started(&mut self, _now: Instant) {}
}

/// Sample-count and wall-clock limits, both optional.
#[derive(Debug, Clone, Default)]
pub struct SoftwareLimits {
    limit_samples: Option<u64>,
    limit_time: Option<Duration>,
    samples_read: u64,
    started_at: Option<Instant>,
}

impl SoftwareLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(mut self, limit: u64) -> Self {
        self.limit_samples = Some(limit);
        self
    }

    pub fn time(mut self, limit: Duration) -> Self {
        self.limit_time = Some(limit);
        self
    }

    pub fn samples_read(&self) -> u64 {
        self.samples_read
    }

    pub fn limit_samples(&self) -> Option<u64> {
        self.limit_samples
    }

    pub fn limit_time(&self) -> Option<Duration> {
        self.limit_time
    }
}

impl AcquisitionLimits for SoftwareLimits {
    fn record_samples_read(&mut self, count: u64) {
        self.samples_read = self.samples_read.saturating_add(count);
        if self.limit_samples.is_some_and(|limit| self.samples_read >= limit) {
            log::debug!("Requested number of samples reached");
        }
    }

    fn limit_reached(&self, now: Instant) -> bool {
        if self.limit_samples.is_some_and(|limit| self.samples_read >= limit) {
            return true;
        }

        match (self.limit_time, self.started_at) {
            (Some(limit), Some(started)) => now.saturating_duration_since(started) >= limit,
            _ => false,
        }
    }

    fn acquisition_started(&mut self, now: Instant) {
        self.samples_read = 0;
        self.started_at = Some(now);
    }
}
