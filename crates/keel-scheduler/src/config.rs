//! Scheduler configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum calls in flight within one level
    pub max_concurrency: usize,
    /// Per-call timeout for a single attempt
    pub timeout_ms: u64,
    /// Retries after the first failed attempt
    pub retry_attempts: u32,
    /// Backoff base; attempt n sleeps `retry_delay_ms * 2^n`
    pub retry_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            timeout_ms: 30_000,
            retry_attempts: 2,
            retry_delay_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.retry_attempts, 2);
    }
}
