//! Timeout estimator
//!
//! Sizes a timeout from the workload instead of guessing one:
//!
//! ```text
//! raw = ceil(per_unit * units / concurrency) + retries * per_unit + buffer
//! timeout = min(raw, max)
//! ```

use crate::errors::{Result, ToolError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cost parameters for one workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutEstimate {
    /// Timeout for one unit of work (one site, one host, one template)
    pub per_unit_timeout_secs: u64,

    /// Number of units to process
    #[serde(default)]
    pub units: u64,

    /// How many units the tool processes at once
    pub concurrency: u64,

    /// Retries the tool itself performs per unit
    #[serde(default)]
    pub retries: u64,

    /// Fixed allowance for startup and teardown
    #[serde(default)]
    pub buffer_secs: u64,

    /// Upper bound on the result
    pub max_secs: u64,
}

impl TimeoutEstimate {
    /// Same parameters for a different workload size
    pub fn with_units(mut self, units: u64) -> Self {
        self.units = units;
        self
    }

    /// Compute the clamped timeout in whole seconds
    pub fn estimate_secs(&self) -> Result<u64> {
        if self.concurrency == 0 {
            return Err(ToolError::config("concurrency must be positive"));
        }
        if self.max_secs == 0 {
            return Err(ToolError::config("maximum timeout must be positive"));
        }

        let work = self
            .per_unit_timeout_secs
            .saturating_mul(self.units)
            .div_ceil(self.concurrency);
        let raw = work
            .saturating_add(self.retries.saturating_mul(self.per_unit_timeout_secs))
            .saturating_add(self.buffer_secs);

        Ok(raw.min(self.max_secs))
    }

    pub fn estimate(&self) -> Result<Duration> {
        self.estimate_secs().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload() -> TimeoutEstimate {
        TimeoutEstimate {
            per_unit_timeout_secs: 30,
            units: 500,
            concurrency: 100,
            retries: 3,
            buffer_secs: 300,
            max_secs: 3600,
        }
    }

    #[test]
    fn test_below_cap() {
        // ceil(30*500/100) + 3*30 + 300 = 150 + 90 + 300
        assert_eq!(workload().estimate_secs().unwrap(), 540);
        assert_eq!(workload().estimate().unwrap(), Duration::from_secs(540));
    }

    #[test]
    fn test_clamped_to_max() {
        let est = workload().with_units(50_000);
        assert_eq!(est.estimate_secs().unwrap(), 3600);
    }

    #[test]
    fn test_rounds_up() {
        let est = TimeoutEstimate {
            per_unit_timeout_secs: 10,
            units: 3,
            concurrency: 4,
            retries: 0,
            buffer_secs: 0,
            max_secs: 100,
        };
        // 30 / 4 = 7.5 → 8
        assert_eq!(est.estimate_secs().unwrap(), 8);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut est = workload();
        est.concurrency = 0;
        let err = est.estimate_secs().unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_zero_max_rejected() {
        let mut est = workload();
        est.max_secs = 0;
        assert!(est.estimate_secs().is_err());
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        let est = TimeoutEstimate {
            per_unit_timeout_secs: u64::MAX,
            units: u64::MAX,
            concurrency: 1,
            retries: u64::MAX,
            buffer_secs: u64::MAX,
            max_secs: 7200,
        };
        assert_eq!(est.estimate_secs().unwrap(), 7200);
    }

    #[test]
    fn test_zero_units_is_overhead_only() {
        let est = workload().with_units(0);
        assert_eq!(est.estimate_secs().unwrap(), 390);
    }
}
