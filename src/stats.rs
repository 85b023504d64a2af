//! Call counters shared by client and server.
//!
//! The average response time is maintained incrementally:
//! `avg ← avg + (sample − avg) / total`. Readers may observe intermediate
//! values; counters are eventually consistent, not linearizable with call
//! completion.

use std::sync::Mutex;

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Calls (or requests) observed in total.
    pub total: u64,
    /// Completed with a SUCCESS outcome.
    pub success: u64,
    /// Completed with a non-SUCCESS outcome.
    pub error: u64,
    /// Resolved by the local deadline sweep (client only).
    pub timeout: u64,
    /// Incrementally maintained average response time in milliseconds.
    pub avg_response_ms: f64,
}

/// Mutex-guarded counters; every update is a short critical section.
#[derive(Debug, Default)]
pub struct RpcStats {
    inner: Mutex<StatsSnapshot>,
}

impl RpcStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful completion with its observed response time.
    pub fn record_success(&self, elapsed_ms: f64) {
        let mut s = self.inner.lock().expect("stats lock poisoned");
        s.total += 1;
        s.success += 1;
        s.avg_response_ms += (elapsed_ms - s.avg_response_ms) / s.total as f64;
    }

    /// Record a failed completion with its observed response time.
    pub fn record_error(&self, elapsed_ms: f64) {
        let mut s = self.inner.lock().expect("stats lock poisoned");
        s.total += 1;
        s.error += 1;
        s.avg_response_ms += (elapsed_ms - s.avg_response_ms) / s.total as f64;
    }

    /// Record a call resolved by the timeout path.
    pub fn record_timeout(&self, elapsed_ms: f64) {
        let mut s = self.inner.lock().expect("stats lock poisoned");
        s.total += 1;
        s.timeout += 1;
        s.avg_response_ms += (elapsed_ms - s.avg_response_ms) / s.total as f64;
    }

    /// Copy out the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.lock().expect("stats lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = RpcStats::new();
        stats.record_success(10.0);
        stats.record_error(20.0);
        stats.record_timeout(30.0);

        let s = stats.snapshot();
        assert_eq!(s.total, 3);
        assert_eq!(s.success, 1);
        assert_eq!(s.error, 1);
        assert_eq!(s.timeout, 1);
    }

    #[test]
    fn test_incremental_average_matches_arithmetic_mean() {
        let stats = RpcStats::new();
        let samples = [4.0, 8.0, 15.0, 16.0, 23.0, 42.0];
        for s in samples {
            stats.record_success(s);
        }

        let expected = samples.iter().sum::<f64>() / samples.len() as f64;
        let got = stats.snapshot().avg_response_ms;
        assert!((got - expected).abs() < 1e-9, "{} != {}", got, expected);
    }

    #[test]
    fn test_snapshot_of_empty_stats() {
        let stats = RpcStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
