use std::collections::BTreeSet;
use tracing::warn;

/// Queue ceiling used when no limit is configured.
pub const DEFAULT_QUEUE_CEILING: usize = 5000;

/// Percentages of the effective limit that trigger a warning.
pub const WARNING_LEVELS: [usize; 4] = [20, 40, 60, 80];

/// What to do with queued entries once the limit is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// No limit configured: discard everything, memory bound wins.
    Discard,
    /// Limit configured: save entries to their source's WAL where one exists.
    DrainToWal,
}

/// Result of one depth sample.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Observation {
    /// Warning levels newly crossed by this sample.
    pub crossed: Vec<usize>,
    pub overflow: Option<OverflowPolicy>,
}

/// Tracks intake-queue depth against the configured or default ceiling.
///
/// Warnings are edge-triggered: each level logs once while the queue rises
/// past it, and re-arms only after the queue falls back below it.
#[derive(Debug)]
pub struct BackpressureMonitor {
    limit: usize,
    policy: OverflowPolicy,
    warned: BTreeSet<usize>,
}

impl BackpressureMonitor {
    pub fn new(queue_size_limit: Option<usize>) -> Self {
        match queue_size_limit {
            Some(limit) if limit > 0 => Self {
                limit,
                policy: OverflowPolicy::DrainToWal,
                warned: BTreeSet::new(),
            },
            _ => Self {
                limit: DEFAULT_QUEUE_CEILING,
                policy: OverflowPolicy::Discard,
                warned: BTreeSet::new(),
            },
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn observe(&mut self, depth: usize) -> Observation {
        let mut observation = Observation::default();

        for level in WARNING_LEVELS {
            let threshold = (self.limit * level / 100).max(1);
            if depth >= threshold {
                if self.warned.insert(level) {
                    warn!(
                        depth = depth,
                        limit = self.limit,
                        level = level,
                        "Intake queue passed {}% of its limit",
                        level
                    );
                    observation.crossed.push(level);
                }
            } else {
                self.warned.remove(&level);
            }
        }

        if depth >= self.limit {
            observation.overflow = Some(self.policy);
        }

        observation
    }

    pub fn warned_levels(&self) -> Vec<usize> {
        self.warned.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ceiling_discards() {
        let mut monitor = BackpressureMonitor::new(None);
        assert_eq!(monitor.limit(), 5000);
        assert_eq!(monitor.policy(), OverflowPolicy::Discard);

        assert_eq!(monitor.observe(4999).overflow, None);
        assert_eq!(monitor.observe(5000).overflow, Some(OverflowPolicy::Discard));
    }

    #[test]
    fn test_configured_limit_drains_to_wal() {
        let mut monitor = BackpressureMonitor::new(Some(100));
        assert_eq!(monitor.policy(), OverflowPolicy::DrainToWal);
        assert_eq!(monitor.observe(100).overflow, Some(OverflowPolicy::DrainToWal));
        assert_eq!(monitor.observe(150).overflow, Some(OverflowPolicy::DrainToWal));
    }

    #[test]
    fn test_warnings_are_edge_triggered() {
        let mut monitor = BackpressureMonitor::new(Some(100));

        assert_eq!(monitor.observe(25).crossed, vec![20]);
        // Oscillating above the same level does not warn again
        assert!(monitor.observe(30).crossed.is_empty());
        assert!(monitor.observe(21).crossed.is_empty());

        assert_eq!(monitor.observe(65).crossed, vec![40, 60]);
        assert_eq!(monitor.warned_levels(), vec![20, 40, 60]);

        // Falling below 40 re-arms 40 and 60 but keeps 20
        assert!(monitor.observe(30).crossed.is_empty());
        assert_eq!(monitor.warned_levels(), vec![20]);

        assert_eq!(monitor.observe(45).crossed, vec![40]);
    }

    #[test]
    fn test_jump_to_limit_crosses_every_level() {
        let mut monitor = BackpressureMonitor::new(None);
        let observation = monitor.observe(5000);
        assert_eq!(observation.crossed, vec![20, 40, 60, 80]);

        assert!(monitor.observe(0).crossed.is_empty());
        assert!(monitor.warned_levels().is_empty());
    }

    #[test]
    fn test_zero_limit_falls_back_to_default() {
        let monitor = BackpressureMonitor::new(Some(0));
        assert_eq!(monitor.limit(), DEFAULT_QUEUE_CEILING);
    }
}
