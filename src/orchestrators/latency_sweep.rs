//! Latency-at-loads orchestrator (SPEC_FULL.md §4.6): one
//! measurement-enabled trial per offered load, no state carried between
//! loads.

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::signatures;
use crate::error::Result;
use crate::io_adapter::IoAdapter;
use crate::latency::LatencyStats;
use crate::trial::{FrameAddresses, TrialEngine, TrialSpec};

/// One `(offered_rate_pct, latency_stats)` observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyResult {
    pub frame_size: usize,
    pub offered_rate_pct: f64,
    pub latency_stats: LatencyStats,
}

/// Default offered loads, 10%..=100% in 10% steps.
pub fn default_loads() -> Vec<f64> {
    (1..=10).map(|i| i as f64 * 10.0).collect()
}

pub fn run(
    adapter: &mut dyn IoAdapter,
    cancelled: &AtomicBool,
    line_rate_bps: u64,
    addrs: &FrameAddresses,
    frame_size: usize,
    loads_pct: &[f64],
    trial_duration_sec: f64,
    warmup_sec: f64,
) -> Result<Vec<LatencyResult>> {
    let mut results = Vec::with_capacity(loads_pct.len());
    for &load_pct in loads_pct {
        let spec = TrialSpec::new(frame_size, load_pct, trial_duration_sec, warmup_sec, signatures::RFC2544, 1);
        let trial = TrialEngine::run_trial(adapter, cancelled, line_rate_bps, addrs, &spec)?;
        info!(load_pct, count = trial.latency_stats.map(|s| s.count).unwrap_or(0), "latency sweep point");
        results.push(LatencyResult {
            frame_size,
            offered_rate_pct: load_pct,
            latency_stats: trial.latency_stats.unwrap_or_default(),
        });
    }
    Ok(results)
}
