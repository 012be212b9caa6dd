//! Pool sizing and termination-policy configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use super::parse::{env_duration, env_or, env_parse};
use super::ConfigError;

/// Worker pool configuration.
///
/// All values are pre-computed at construction time for zero-cost access.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Minimum number of workers kept alive (may be zero).
    min_workers: usize,
    /// Maximum number of concurrently alive workers (never zero).
    max_workers: NonZeroUsize,
    /// Terminate a worker that stays idle this long while the pool is above
    /// `min_workers` (None = never reclaim idle workers).
    idle_timeout: Option<Duration>,
    /// Recycle a worker after it completes this many tasks (None = unlimited).
    max_tasks_per_worker: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 0,
            max_workers: NonZeroUsize::new(num_cpus::get().max(1))
                .unwrap_or(NonZeroUsize::MIN),
            idle_timeout: None,
            max_tasks_per_worker: None,
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables.
    ///
    /// * `POOL_MIN_WORKERS` - minimum pool size (default 0)
    /// * `POOL_MAX_WORKERS` - maximum pool size (0 = CPU count)
    /// * `POOL_IDLE_TIMEOUT` - idle reclamation, e.g. "30s" ("off" disables)
    /// * `POOL_MAX_TASKS_PER_WORKER` - recycle quota (0 = unlimited)
    pub fn from_env() -> Result<Self, ConfigError> {
        let min_workers: usize = env_parse("POOL_MIN_WORKERS", 0)?;
        let max_workers = Self::parse_max_workers()?;
        let idle_timeout = env_duration("POOL_IDLE_TIMEOUT", "off")?;

        let quota: u64 = env_parse("POOL_MAX_TASKS_PER_WORKER", 0)?;
        let max_tasks_per_worker = (quota > 0).then_some(quota);

        if min_workers > max_workers.get() {
            return Err(ConfigError::Invalid {
                key: "POOL_MIN_WORKERS".into(),
                message: format!(
                    "minimum {} exceeds maximum {}",
                    min_workers,
                    max_workers.get()
                ),
            });
        }

        Ok(Self {
            min_workers,
            max_workers,
            idle_timeout,
            max_tasks_per_worker,
        })
    }

    fn parse_max_workers() -> Result<NonZeroUsize, ConfigError> {
        let raw = env_or("POOL_MAX_WORKERS", "0");
        let workers: usize = raw.parse().map_err(|e| ConfigError::Parse {
            key: "POOL_MAX_WORKERS".into(),
            value: raw,
            error: format!("{e}"),
        })?;

        // Resolve 0 to CPU count
        let count = if workers == 0 { num_cpus::get() } else { workers };

        NonZeroUsize::new(count).ok_or_else(|| ConfigError::Invalid {
            key: "POOL_MAX_WORKERS".into(),
            message: "worker count cannot be zero".into(),
        })
    }

    /// Set the minimum pool size (clamped to the maximum).
    pub fn min_workers(mut self, min: usize) -> Self {
        self.min_workers = min.min(self.max_workers.get());
        self
    }

    /// Set the maximum pool size (values below 1 are treated as 1).
    pub fn max_workers(mut self, max: usize) -> Self {
        self.max_workers = NonZeroUsize::new(max.max(1)).unwrap_or(NonZeroUsize::MIN);
        self.min_workers = self.min_workers.min(self.max_workers.get());
        self
    }

    /// Set the idle reclamation timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the per-worker task quota before recycling.
    pub fn max_tasks_per_worker(mut self, quota: u64) -> Self {
        self.max_tasks_per_worker = (quota > 0).then_some(quota);
        self
    }

    /// Minimum pool size (pre-computed, zero-cost).
    #[inline]
    pub fn min(&self) -> usize {
        self.min_workers
    }

    /// Maximum pool size (pre-computed, zero-cost).
    #[inline]
    pub fn max(&self) -> usize {
        self.max_workers.get()
    }

    /// Idle reclamation timeout, if enabled.
    #[inline]
    pub fn idle(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Per-worker task quota, if enabled.
    #[inline]
    pub fn task_quota(&self) -> Option<u64> {
        self.max_tasks_per_worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let config = PoolConfig::default();
        assert_eq!(config.min(), 0);
        assert!(config.max() >= 1);
        assert_eq!(config.idle(), None);
        assert_eq!(config.task_quota(), None);
    }

    #[test]
    fn test_builder_clamps_min_to_max() {
        let config = PoolConfig::default().max_workers(2).min_workers(5);
        assert_eq!(config.max(), 2);
        assert_eq!(config.min(), 2);
    }

    #[test]
    fn test_max_workers_floor() {
        let config = PoolConfig::default().max_workers(0);
        assert_eq!(config.max(), 1);
    }

    #[test]
    fn test_quota_zero_means_unlimited() {
        let config = PoolConfig::default().max_tasks_per_worker(0);
        assert_eq!(config.task_quota(), None);
        let config = config.max_tasks_per_worker(3);
        assert_eq!(config.task_quota(), Some(3));
    }
}
