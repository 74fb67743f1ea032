//! Throughput binary search (SPEC_FULL.md §4.5).

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::signatures;
use crate::error::{BenchError, Result};
use crate::io_adapter::IoAdapter;
use crate::latency::LatencyStats;
use crate::pacer::calc_max_pps;
use crate::trial::{FrameAddresses, TrialEngine, TrialSpec};

/// Inputs to [`run`].
#[derive(Debug, Clone, Copy)]
pub struct ThroughputSpec {
    pub frame_size: usize,
    pub initial_rate_pct: f64,
    pub resolution_pct: f64,
    pub max_iterations: u32,
    pub acceptable_loss_pct: f64,
    pub trial_duration_sec: f64,
    pub warmup_sec: f64,
}

impl Default for ThroughputSpec {
    fn default() -> Self {
        Self {
            frame_size: 128,
            initial_rate_pct: 100.0,
            resolution_pct: 0.1,
            max_iterations: 20,
            acceptable_loss_pct: 0.0,
            trial_duration_sec: 10.0,
            warmup_sec: 2.0,
        }
    }
}

/// Outcome of a throughput binary search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub frame_size: usize,
    pub max_rate_pct: f64,
    pub max_rate_mbps: f64,
    pub max_rate_pps: f64,
    pub iterations: u32,
    pub latency_at_best: Option<LatencyStats>,
}

/// Runs the binary search of SPEC_FULL.md §4.5, starting at
/// `spec.initial_rate_pct` and narrowing until `high - low <=
/// resolution_pct`, `iterations >= max_iterations`, or cancellation.
pub fn run(
    adapter: &mut dyn IoAdapter,
    cancelled: &AtomicBool,
    line_rate_bps: u64,
    addrs: &FrameAddresses,
    spec: &ThroughputSpec,
) -> Result<ThroughputResult> {
    let mut low = 0.0f64;
    let mut high = spec.initial_rate_pct;
    let mut best = 0.0f64;
    let mut latency_at_best = None;
    let mut iterations = 0u32;

    while high - low > spec.resolution_pct && iterations < spec.max_iterations {
        if cancelled.load(Ordering::Relaxed) {
            return Err(BenchError::Cancelled);
        }
        iterations += 1;
        let mid = (low + high) / 2.0;

        let trial_spec = TrialSpec::new(
            spec.frame_size,
            mid,
            spec.trial_duration_sec,
            spec.warmup_sec,
            signatures::RFC2544,
            1,
        );
        let result = TrialEngine::run_trial(adapter, cancelled, line_rate_bps, addrs, &trial_spec)?;

        info!(iteration = iterations, rate_pct = mid, loss_pct = result.loss_pct, "throughput search step");

        if result.loss_pct <= spec.acceptable_loss_pct {
            best = mid;
            low = mid;
            latency_at_best = result.latency_stats;
        } else {
            high = mid;
        }
    }

    let max_pps = calc_max_pps(line_rate_bps, spec.frame_size) as f64 * best / 100.0;
    let max_rate_mbps = line_rate_bps as f64 * best / 100.0 * 1e-6;

    Ok(ThroughputResult {
        frame_size: spec.frame_size,
        max_rate_pct: best,
        max_rate_mbps,
        max_rate_pps: max_pps,
        iterations,
        latency_at_best,
    })
}
