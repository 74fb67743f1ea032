//! Round-trip latency statistics.
//!
//! Percentiles are read from a sorted copy of the sample buffer at
//! `floor(n * p)`, never approximated from the mean and jitter — see
//! SPEC_FULL.md §9, which calls the mean/jitter shortcut a bug to fix.

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Defensive cap on the number of latency samples a single trial may
/// accumulate.
pub const MAX_SAMPLES: usize = 10_000_000;

/// Summary statistics over a set of round-trip latency samples, all in
/// nanoseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub avg_ns: f64,
    pub jitter_ns: f64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
}

/// A bounded collector of latency samples plus the computation that
/// turns them into [`LatencyStats`].
#[derive(Default)]
pub struct LatencyAccumulator {
    samples: Vec<u64>,
    capacity: usize,
}

impl LatencyAccumulator {
    /// Creates an accumulator that holds at most `capacity` samples
    /// (silently dropping samples beyond it — trial statistics do not
    /// need every sample once the buffer is large enough to be
    /// representative).
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity > MAX_SAMPLES {
            return Err(BenchError::InvalidArgument(format!(
                "latency sample capacity {capacity} exceeds cap {MAX_SAMPLES}"
            )));
        }
        Ok(Self {
            samples: Vec::with_capacity(capacity.min(1024)),
            capacity,
        })
    }

    /// Appends one sample, ignoring it once `capacity` has been reached.
    pub fn record(&mut self, rtt_ns: u64) {
        if self.samples.len() < self.capacity {
            self.samples.push(rtt_ns);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Computes [`LatencyStats`] from the accumulated samples. Returns
    /// all-zero stats when no samples were recorded.
    pub fn stats(&self) -> LatencyStats {
        compute_stats(&self.samples)
    }
}

/// Computes latency statistics directly from a sample slice, without
/// needing an accumulator. Used by orchestrators that merge samples from
/// multiple sources before summarizing.
pub fn compute_stats(samples: &[u64]) -> LatencyStats {
    let n = samples.len();
    if n == 0 {
        return LatencyStats::default();
    }

    let mut min_ns = u64::MAX;
    let mut max_ns = 0u64;
    let mut sum = 0u128;
    for &s in samples {
        min_ns = min_ns.min(s);
        max_ns = max_ns.max(s);
        sum += s as u128;
    }
    let avg_ns = sum as f64 / n as f64;

    let jitter_ns = samples.iter().map(|&s| (s as f64 - avg_ns).abs()).sum::<f64>() / n as f64;

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let pct = |p: f64| -> u64 {
        let idx = ((n as f64) * p).floor() as usize;
        sorted[idx.min(n - 1)]
    };

    LatencyStats {
        count: n as u64,
        min_ns,
        max_ns,
        avg_ns,
        jitter_ns,
        p50_ns: pct(0.50),
        p95_ns: pct(0.95),
        p99_ns: pct(0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_samples_yield_all_zero() {
        let stats = compute_stats(&[]);
        assert_eq!(stats, LatencyStats::default());
    }

    #[test]
    fn ordering_invariant_holds() {
        let samples: Vec<u64> = (1..=1000).collect();
        let stats = compute_stats(&samples);
        assert!(stats.min_ns <= stats.p50_ns);
        assert!((stats.p50_ns as f64) <= stats.avg_ns + 1.0);
        assert!(stats.p50_ns <= stats.p95_ns);
        assert!(stats.p95_ns <= stats.p99_ns);
        assert!(stats.p99_ns <= stats.max_ns);
    }

    #[test]
    fn jitter_is_mean_absolute_deviation() {
        let samples = [10u64, 10, 10, 20];
        let stats = compute_stats(&samples);
        // mean = 12.5; deviations = 2.5,2.5,2.5,7.5 -> mean = 3.75
        assert!((stats.jitter_ns - 3.75).abs() < 1e-9);
    }

    #[test]
    fn percentiles_use_sorted_index_not_approximation() {
        // A skewed distribution where mean+2*jitter would NOT equal p95,
        // proving we did not fall back to the donor's approximation.
        let mut samples = vec![100u64; 95];
        samples.extend(vec![1000u64; 5]);
        let stats = compute_stats(&samples);
        assert_eq!(stats.p95_ns, 1000);
        let approx_p95 = stats.avg_ns + 2.0 * stats.jitter_ns;
        assert_ne!(stats.p95_ns as f64, approx_p95);
    }

    #[test]
    fn accumulator_drops_samples_past_capacity() {
        let mut acc = LatencyAccumulator::new(4).unwrap();
        for i in 0..10 {
            acc.record(i);
        }
        assert_eq!(acc.len(), 4);
    }

    #[test]
    fn rejects_capacity_above_cap() {
        assert!(LatencyAccumulator::new(MAX_SAMPLES + 1).is_err());
    }
}
