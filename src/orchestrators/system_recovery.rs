//! System-recovery two-phase test plus reset detector (SPEC_FULL.md
//! §4.9).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::signatures;
use crate::error::{BenchError, Result};
use crate::io_adapter::IoAdapter;
use crate::trial::{FrameAddresses, TrialEngine, TrialSpec};

const PROBE_INTERVAL: Duration = Duration::from_millis(100);
const PROBE_DURATION_SEC: f64 = 1.0;
const OVERLOAD_RATE_PCT: f64 = 110.0;
const RECOVERY_PROBE_RATE_PCT: f64 = 50.0;
const RECOVERY_LOSS_THRESHOLD_PCT: f64 = 0.001;
const MAX_RECOVERY_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct SystemRecoverySpec {
    pub frame_size: usize,
    /// Throughput previously measured for this frame size (max_rate_pct
    /// from a throughput-orchestrator run), used as the 100% baseline
    /// for phase 1's 110% overload and phase 2's 50% recovery probe.
    pub measured_throughput_pct: f64,
    pub overload_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRecoveryResult {
    pub frames_lost: u64,
    /// -1 when no recovery was observed within the 60s budget.
    pub recovery_time_ms: i64,
    /// Set when a probe's `packets_recv` drops to zero and the next
    /// probe to receive anything resumes from a lower highest-observed
    /// sequence number than the probe seen before the gap, the signal
    /// for a DUT reset rather than ordinary congestion loss.
    pub reset_detected: bool,
}

/// Runs the two-phase test: an overload trial, then periodic recovery
/// probes until loss drops to (or below) the recovery threshold.
pub fn run(
    adapter: &mut dyn IoAdapter,
    cancelled: &AtomicBool,
    line_rate_bps: u64,
    addrs: &FrameAddresses,
    spec: &SystemRecoverySpec,
) -> Result<SystemRecoveryResult> {
    // Phase 1: overload.
    let overload_rate = spec.measured_throughput_pct * OVERLOAD_RATE_PCT / 100.0;
    let overload_spec = TrialSpec {
        measure_latency: false,
        ..TrialSpec::new(spec.frame_size, overload_rate.min(100.0), spec.overload_sec, 0.0, signatures::RFC2544, 1)
    };
    let overload_result = TrialEngine::run_trial(adapter, cancelled, line_rate_bps, addrs, &overload_spec)?;
    info!(loss_pct = overload_result.loss_pct, "system recovery: overload phase complete");

    // Phase 2: recovery probes every 100ms at 50% of measured throughput.
    let probe_rate = spec.measured_throughput_pct * RECOVERY_PROBE_RATE_PCT / 100.0;
    let phase2_start = Instant::now();
    let mut frames_lost = 0u64;
    let mut recovery_time_ms: i64 = -1;
    let mut reset_detected = false;
    let mut previous_last_seq: Option<u32> = None;
    let mut saw_zero_recv = false;

    loop {
        if cancelled.load(Ordering::Relaxed) {
            return Err(BenchError::Cancelled);
        }
        if phase2_start.elapsed() >= MAX_RECOVERY_WAIT {
            break;
        }

        let probe_spec = TrialSpec {
            measure_latency: false,
            ..TrialSpec::new(spec.frame_size, probe_rate.max(1.0), PROBE_DURATION_SEC, 0.0, signatures::RFC2544, 1)
        };
        let probe = TrialEngine::run_trial(adapter, cancelled, line_rate_bps, addrs, &probe_spec)?;
        frames_lost += probe.packets_sent.saturating_sub(probe.packets_recv);

        if probe.packets_recv == 0 {
            saw_zero_recv = true;
        } else {
            if saw_zero_recv && is_reset_signature(previous_last_seq, probe.last_seq) {
                reset_detected = true;
            }
            saw_zero_recv = false;
            previous_last_seq = probe.last_seq;
        }

        if probe.loss_pct <= RECOVERY_LOSS_THRESHOLD_PCT {
            recovery_time_ms = phase2_start.elapsed().as_millis() as i64;
            break;
        }

        std::thread::sleep(PROBE_INTERVAL);
    }

    info!(recovery_time_ms, frames_lost, reset_detected, "system recovery: phase 2 complete");

    Ok(SystemRecoveryResult {
        frames_lost,
        recovery_time_ms,
        reset_detected,
    })
}

/// The reset signature from SPEC_FULL.md §4.9: `packets_recv` dropped to
/// zero for at least one probe, then the next probe to receive anything
/// has a highest-observed sequence number lower than the probe seen
/// before the gap. `None` on either side (nothing ever received) never
/// signals a reset.
fn is_reset_signature(previous_last_seq: Option<u32>, current_last_seq: Option<u32>) -> bool {
    match (previous_last_seq, current_last_seq) {
        (Some(prev), Some(current)) => current < prev,
        _ => false,
    }
}
