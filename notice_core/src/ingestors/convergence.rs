//! # Convergence Wait
//!
//! Before resolving a freshly claimed batch, the job gives the performance
//! subsystem a chance to publish an image that reflects the fabric change.
//! The wait is bounded by one sweep interval stretched by a factor, polled at
//! a fixed interval:
//!
//! ```text
//! max_polls = ceil(sweep_ms * factor_percent / 100 / poll_ms)
//! ```
//!
//! With a 2 s sweep, a 110 % factor and 200 ms polls that is 11 polls. A
//! failed poll is logged and the wait goes on. Only a subsystem that cannot
//! give a sweep interval or a baseline image ends the wait early. Either way
//! the outcome is only a diagnostic and processing goes on.

use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::connections::perf_monitor::{PerfError, PerformanceMonitor};

/// Knobs of the convergence wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceSettings {
    /// Performance group whose image number is watched.
    pub group: String,
    /// Time between polls.
    pub poll_interval: Duration,
    /// Wait budget as a percentage of one sweep interval.
    pub factor_percent: u32,
}

impl Default for ConvergenceSettings {
    fn default() -> Self {
        Self {
            group: "All".to_string(),
            poll_interval: Duration::from_millis(200),
            factor_percent: 110,
        }
    }
}

impl ConvergenceSettings {
    /// Poll budget for a sweep of `sweep_secs`.
    pub fn max_polls(&self, sweep_secs: u32) -> u64 {
        let budget_ms = u64::from(sweep_secs) * 1000 * u64::from(self.factor_percent) / 100;
        let poll_ms = (self.poll_interval.as_millis() as u64).max(1);
        budget_ms.div_ceil(poll_ms)
    }
}

/// How the wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceOutcome {
    /// The image number moved after `polls` polls.
    Converged { polls: u64 },
    /// The budget ran out with the image unchanged.
    TimedOut { polls: u64 },
    /// The subsystem could not be read.
    Unavailable(PerfError),
}

/// Waits until the image number of `settings.group` changes or the poll
/// budget is spent.
pub async fn wait_for_convergence(
    monitor: &dyn PerformanceMonitor,
    settings: &ConvergenceSettings,
) -> ConvergenceOutcome {
    let sweep_secs = match monitor.sweep_interval_secs() {
        Ok(secs) => secs,
        Err(e) => return ConvergenceOutcome::Unavailable(e),
    };
    let baseline = match monitor.image_number(&settings.group) {
        Ok(image) => image,
        Err(e) => return ConvergenceOutcome::Unavailable(e),
    };

    let max_polls = settings.max_polls(sweep_secs);
    for poll in 1..=max_polls {
        sleep(settings.poll_interval).await;
        match monitor.image_number(&settings.group) {
            Ok(image) if image != baseline => return ConvergenceOutcome::Converged { polls: poll },
            Ok(_) => {}
            Err(e) => warn!(group = %settings.group, poll, max_polls, error = %e, "performance image poll failed"),
        }
    }
    ConvergenceOutcome::TimedOut { polls: max_polls }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::memory::MemoryPerformanceMonitor;

    #[test]
    fn test_poll_budget() {
        let settings = ConvergenceSettings::default();
        assert_eq!(settings.max_polls(2), 11);
        assert_eq!(settings.max_polls(0), 0);
        let slow = ConvergenceSettings { poll_interval: Duration::from_millis(300), ..settings };
        assert_eq!(slow.max_polls(2), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_image_times_out_after_eleven_polls() {
        let monitor = MemoryPerformanceMonitor::new(2);
        let started = tokio::time::Instant::now();
        let outcome = wait_for_convergence(&monitor, &ConvergenceSettings::default()).await;
        assert_eq!(outcome, ConvergenceOutcome::TimedOut { polls: 11 });
        // baseline read plus eleven polls
        assert_eq!(monitor.polls(), 12);
        assert!(started.elapsed() >= Duration::from_millis(2200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_image_stops_early() {
        let monitor = MemoryPerformanceMonitor::new(2);
        monitor.advance_after(4);
        let outcome = wait_for_convergence(&monitor, &ConvergenceSettings::default()).await;
        assert_eq!(outcome, ConvergenceOutcome::Converged { polls: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_does_not_end_the_wait() {
        let monitor = MemoryPerformanceMonitor::new(2);
        monitor.fail_poll(3);
        monitor.advance_after(5);
        let outcome = wait_for_convergence(&monitor, &ConvergenceSettings::default()).await;
        assert_eq!(outcome, ConvergenceOutcome::Converged { polls: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_monitor_returns_immediately() {
        let monitor = MemoryPerformanceMonitor::new(2);
        monitor.set_unavailable(true);
        let outcome = wait_for_convergence(&monitor, &ConvergenceSettings::default()).await;
        assert!(matches!(outcome, ConvergenceOutcome::Unavailable(PerfError::Unavailable(_))));
    }
}
