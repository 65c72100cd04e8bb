use std::time::Duration;

use storage::ConfigError;

/// Sizing and timing of the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Sleep between polls of an empty queue.
    pub idle_interval: Duration,
    /// Period of the supervisor's queue statistics tick.
    pub stats_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            idle_interval: Duration::from_secs(2),
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Build a config from environment variables.
    ///
    /// - `WORKER_COUNT` (default: 1, must be at least 1)
    /// - `WORKER_IDLE_MS` (default: 2000)
    /// - `WORKER_STATS_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let workers = parse_u64_env("WORKER_COUNT")?
            .map(|n| n as usize)
            .unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(ConfigError::InvalidConfig(
                "WORKER_COUNT must be at least 1".to_string(),
            ));
        }

        let idle_interval = parse_u64_env("WORKER_IDLE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.idle_interval);
        let stats_interval = parse_u64_env("WORKER_STATS_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.stats_interval);

        Ok(Self {
            workers,
            idle_interval,
            stats_interval,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }
}

fn parse_u64_env(var_name: &str) -> Result<Option<u64>, ConfigError> {
    let v = match std::env::var(var_name) {
        Ok(v) => v,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(ConfigError::InvalidConfig(format!(
                "failed reading {var_name}: {e}"
            )));
        }
    };

    let trimmed = v.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse().map(Some).map_err(|_| {
        ConfigError::InvalidConfig(format!(
            "invalid number for {var_name}={v} (expected a non-negative integer)"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.idle_interval, Duration::from_millis(2000));
        assert_eq!(config.stats_interval, Duration::from_secs(30));
    }

    #[test]
    fn builders_override_fields() {
        let config = WorkerPoolConfig::default()
            .with_workers(4)
            .with_idle_interval(Duration::from_millis(50));
        assert_eq!(config.workers, 4);
        assert_eq!(config.idle_interval, Duration::from_millis(50));
    }
}
