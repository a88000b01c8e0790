//! Scheduler configuration (spec.md §5's worker-count default, §4.10's
//! retry policy, §5's bounded-queue default).

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub workspace_root: PathBuf,
    /// Number of jobs that may advance concurrently. Default: cores / 2,
    /// minimum 1 (spec.md §4.10).
    pub workers: usize,
    /// Pending-job queue capacity before `QueueFull` (spec.md §5, default
    /// 1024).
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("./workspace"),
            workers: default_worker_count(),
            queue_capacity: 1024,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            workers: std::env::var("RECON_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or_else(default_worker_count),
            queue_capacity: std::env::var("RECON_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024),
            retry: RetryPolicy {
                max_retries: std::env::var("RECON_RETRY_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
                base_delay: Duration::from_secs(
                    std::env::var("RECON_RETRY_BASE_DELAY_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(30),
                ),
            },
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism().map(|n| (n.get() / 2).max(1)).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_worker_count_is_at_least_one() {
        assert!(default_worker_count() >= 1);
    }

    #[test]
    fn with_workers_clamps_zero_to_one() {
        let config = SchedulerConfig::default().with_workers(0);
        assert_eq!(config.workers, 1);
    }
}
