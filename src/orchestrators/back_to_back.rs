//! Back-to-back burst capacity probe (SPEC_FULL.md §4.8): doubles the
//! burst size until the first trial with any loss.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::signatures;
use crate::error::{BenchError, Result};
use crate::io_adapter::IoAdapter;
use crate::pacer::calc_max_pps;
use crate::trial::{FrameAddresses, TrialEngine, TrialSpec};

/// Defensive cap on burst size, per §5.
pub const MAX_BURST: u64 = 1_000_000;

#[derive(Debug, Clone, Copy)]
pub struct BackToBackSpec {
    pub frame_size: usize,
    pub initial_burst: u64,
    pub burst_trials: u32,
}

impl Default for BackToBackSpec {
    fn default() -> Self {
        Self {
            frame_size: 128,
            initial_burst: 2,
            burst_trials: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackToBackResult {
    pub frame_size: usize,
    pub max_burst: u64,
    pub burst_duration_us: f64,
    /// Count of successful doublings, not total attempted trials — see
    /// SPEC_FULL.md §9's open-question resolution.
    pub trials: u32,
}

/// Runs the doubling probe. At each burst size, `spec.burst_trials`
/// short trials are run at 100% rate for the minimum duration that
/// transmits `current_burst` frames; any loss in any of those trials
/// stops the probe.
pub fn run(
    adapter: &mut dyn IoAdapter,
    cancelled: &AtomicBool,
    line_rate_bps: u64,
    addrs: &FrameAddresses,
    spec: &BackToBackSpec,
) -> Result<BackToBackResult> {
    let max_pps = calc_max_pps(line_rate_bps, spec.frame_size).max(1);
    let mut current_burst = spec.initial_burst;
    let mut max_burst = 0u64;
    let mut doublings = 0u32;

    loop {
        if cancelled.load(Ordering::Relaxed) {
            return Err(BenchError::Cancelled);
        }
        if current_burst > MAX_BURST {
            break;
        }

        let burst_duration_sec = current_burst as f64 / max_pps as f64;
        let mut all_lossless = true;

        for _ in 0..spec.burst_trials {
            let trial_spec = TrialSpec {
                measure_latency: false,
                ..TrialSpec::new(spec.frame_size, 100.0, burst_duration_sec, 0.0, signatures::RFC2544, 1)
            };
            let trial = TrialEngine::run_trial(adapter, cancelled, line_rate_bps, addrs, &trial_spec)?;
            if trial.loss_pct > 0.0 {
                all_lossless = false;
                break;
            }
        }

        info!(burst = current_burst, lossless = all_lossless, "back-to-back probe");

        if !all_lossless {
            break;
        }

        max_burst = current_burst;
        doublings += 1;
        current_burst = current_burst.saturating_mul(2);
    }

    Ok(BackToBackResult {
        frame_size: spec.frame_size,
        max_burst,
        burst_duration_us: max_burst as f64 * 1_000_000.0 / max_pps as f64,
        trials: doublings,
    })
}
