use crate::config::ProcessSpec;
use std::time::{Duration, SystemTime};

/// Seconds over which restarts are counted against `max_restarts`
const RESTART_WINDOW_SECS: u64 = 60;

/// Upper bound for the exponential backoff
const MAX_BACKOFF_SECS: u64 = 60;

/// Restart policy configuration
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Whether automatic restart is enabled
    pub enabled: bool,
    /// Maximum number of restarts within the time window
    pub max_restarts: usize,
    /// Time window for counting restarts (in seconds)
    pub time_window_secs: u64,
    /// Initial delay before first restart (in seconds)
    pub initial_delay_secs: u64,
    /// Backoff strategy to use
    pub backoff_strategy: BackoffStrategy,
}

impl RestartPolicy {
    pub fn new(enabled: bool, max_restarts: usize, restart_delay_secs: u64) -> Self {
        Self {
            enabled,
            max_restarts,
            time_window_secs: RESTART_WINDOW_SECS,
            initial_delay_secs: restart_delay_secs,
            backoff_strategy: BackoffStrategy {
                max_delay_secs: MAX_BACKOFF_SECS,
            },
        }
    }

    /// Policy for a manifest record
    pub fn from_spec(spec: &ProcessSpec) -> Self {
        Self::new(spec.autorestart, spec.max_restarts, spec.restart_delay_secs)
    }

    /// Check if restart should be attempted based on restart history
    pub fn should_restart(&self, tracker: &RestartTracker) -> bool {
        if !self.enabled {
            return false;
        }

        let recent_restarts = tracker.count_recent_restarts(self.time_window_secs);
        recent_restarts < self.max_restarts
    }

    /// Calculate the delay before the next restart attempt
    pub fn calculate_delay(&self, tracker: &RestartTracker) -> Duration {
        let recent = tracker.count_recent_restarts(self.time_window_secs);
        self.backoff_strategy
            .calculate_delay(self.initial_delay_secs, recent)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new(true, 10, 1)
    }
}

/// Exponential backoff between restarts, capped at `max_delay_secs`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffStrategy {
    pub max_delay_secs: u64,
}

impl BackoffStrategy {
    /// Calculate the delay for a given restart attempt
    pub fn calculate_delay(&self, initial_delay_secs: u64, restart_count: usize) -> Duration {
        // delay = initial * 2^restart_count
        let exponent = u32::try_from(restart_count).unwrap_or(u32::MAX);
        let delay_secs = initial_delay_secs
            .saturating_mul(2_u64.saturating_pow(exponent))
            .min(self.max_delay_secs);
        Duration::from_secs(delay_secs)
    }
}

/// Tracks restart history for a process
#[derive(Debug, Clone, Default)]
pub struct RestartTracker {
    restart_times: Vec<SystemTime>,
}

impl RestartTracker {
    /// Create a new restart tracker
    pub fn new() -> Self {
        Self {
            restart_times: Vec::new(),
        }
    }

    /// Record a restart attempt
    pub fn record_restart(&mut self) {
        self.restart_times.push(SystemTime::now());
        self.prune_old_restarts(RESTART_WINDOW_SECS);
    }

    /// Number of restarts within the restart window
    pub fn restart_count(&self) -> usize {
        self.restart_times.len()
    }

    /// Count restarts within the specified time window (in seconds)
    pub fn count_recent_restarts(&self, window_secs: u64) -> usize {
        let now = SystemTime::now();
        let window = Duration::from_secs(window_secs);

        self.restart_times
            .iter()
            .filter(|&&time| {
                now.duration_since(time)
                    .map(|d| d < window)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Get the time of the last restart, if any
    pub fn last_restart_time(&self) -> Option<SystemTime> {
        self.restart_times.last().copied()
    }

    /// Clear restart history
    pub fn clear(&mut self) {
        self.restart_times.clear();
    }

    /// Remove restart records older than the specified window
    pub fn prune_old_restarts(&mut self, window_secs: u64) {
        let now = SystemTime::now();
        let window = Duration::from_secs(window_secs);

        self.restart_times.retain(|&time| {
            now.duration_since(time)
                .map(|d| d < window)
                .unwrap_or(false)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_policy_from_spec() {
        let mut spec = ProcessSpec::new("api", "/bin/true");
        spec.max_restarts = 5;
        spec.restart_delay_secs = 2;

        let policy = RestartPolicy::from_spec(&spec);
        assert!(policy.enabled);
        assert_eq!(policy.max_restarts, 5);
        assert_eq!(policy.initial_delay_secs, 2);
        assert_eq!(policy.time_window_secs, 60);
    }

    #[test]
    fn test_restart_policy_disabled() {
        let mut spec = ProcessSpec::new("api", "/bin/true");
        spec.autorestart = false;

        let policy = RestartPolicy::from_spec(&spec);
        assert!(!policy.should_restart(&RestartTracker::new()));
    }

    #[test]
    fn test_restart_policy_should_restart() {
        let policy = RestartPolicy::new(true, 3, 1);
        let mut tracker = RestartTracker::new();

        assert!(policy.should_restart(&tracker));

        tracker.record_restart();
        assert!(policy.should_restart(&tracker));

        tracker.record_restart();
        assert!(policy.should_restart(&tracker));

        tracker.record_restart();
        assert!(!policy.should_restart(&tracker));
    }

    #[test]
    fn test_backoff_exponential() {
        let strategy = BackoffStrategy { max_delay_secs: 60 };

        assert_eq!(strategy.calculate_delay(1, 0), Duration::from_secs(1));
        assert_eq!(strategy.calculate_delay(1, 1), Duration::from_secs(2));
        assert_eq!(strategy.calculate_delay(1, 3), Duration::from_secs(8));
        assert_eq!(strategy.calculate_delay(1, 6), Duration::from_secs(60));
        assert_eq!(strategy.calculate_delay(1, 200), Duration::from_secs(60));
        assert_eq!(strategy.calculate_delay(0, 5), Duration::from_secs(0));
    }

    #[test]
    fn test_delay_grows_with_recent_restarts() {
        let policy = RestartPolicy::new(true, 10, 1);
        let mut tracker = RestartTracker::new();

        assert_eq!(policy.calculate_delay(&tracker), Duration::from_secs(1));
        tracker.record_restart();
        tracker.record_restart();
        assert_eq!(policy.calculate_delay(&tracker), Duration::from_secs(4));
    }

    #[test]
    fn test_restart_tracker_history() {
        let mut tracker = RestartTracker::new();
        assert_eq!(tracker.restart_count(), 0);
        assert!(tracker.last_restart_time().is_none());

        tracker.record_restart();
        tracker.record_restart();
        assert_eq!(tracker.restart_count(), 2);
        assert_eq!(tracker.count_recent_restarts(60), 2);
        assert!(tracker.last_restart_time().is_some());

        tracker.clear();
        assert_eq!(tracker.restart_count(), 0);
    }
}
