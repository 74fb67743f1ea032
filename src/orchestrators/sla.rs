//! Service-activation SLA orchestrators (SPEC_FULL.md §4.10–§4.11): the
//! Y.1564-style step test and the long-running sustained-performance
//! test, both graded against a [`ServiceSla`] via
//! [`evaluate_sla_pass`].

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::signatures;
use crate::error::{BenchError, Result};
use crate::io_adapter::IoAdapter;
use crate::latency::LatencyStats;
use crate::orchestrators::{evaluate_sla_pass, Service};
use crate::trial::{FrameAddresses, TrialEngine, TrialSpec, SLA_LATENCY_CAPACITY};

/// Load steps as a percentage of `sla.cir_mbps`, in order.
const STEP_LOAD_PCTS: [f64; 4] = [25.0, 50.0, 75.0, 100.0];

#[derive(Debug, Clone, Copy)]
pub struct SlaStepSpec {
    pub frame_size: usize,
    pub step_duration_sec: f64,
    pub warmup_sec: f64,
}

impl Default for SlaStepSpec {
    fn default() -> Self {
        Self {
            frame_size: 512,
            step_duration_sec: 60.0,
            warmup_sec: 2.0,
        }
    }
}

/// One load step's measured performance against the service's SLA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaStepResult {
    pub load_pct: f64,
    pub offered_mbps: f64,
    pub achieved_mbps: f64,
    pub loss_pct: f64,
    pub latency_stats: LatencyStats,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaStepTestResult {
    pub service_id: u32,
    pub steps: Vec<SlaStepResult>,
    pub service_passed: bool,
}

/// Runs the four-step CIR-relative test (25/50/75/100%) for `service`.
/// Cancellation is only checked at step boundaries; on cancellation the
/// already-completed steps are returned via
/// [`BenchError::CancelledWithSteps`] rather than discarded, per
/// SPEC_FULL.md §4.10's "preserve any completed step results".
pub fn run_step_test(
    adapter: &mut dyn IoAdapter,
    cancelled: &AtomicBool,
    line_rate_bps: u64,
    addrs: &FrameAddresses,
    service: &Service,
    spec: &SlaStepSpec,
) -> Result<SlaStepTestResult> {
    let mut steps = Vec::with_capacity(STEP_LOAD_PCTS.len());

    for &step_pct in &STEP_LOAD_PCTS {
        if cancelled.load(Ordering::Relaxed) {
            return Err(BenchError::CancelledWithSteps(steps));
        }

        let offered_mbps = service.sla.cir_mbps * step_pct / 100.0;
        let offered_rate_pct = (offered_mbps / (line_rate_bps as f64 * 1e-6)) * 100.0;

        let trial_spec = TrialSpec {
            latency_capacity: SLA_LATENCY_CAPACITY,
            ..TrialSpec::new(
                spec.frame_size,
                offered_rate_pct,
                spec.step_duration_sec,
                spec.warmup_sec,
                signatures::Y1564,
                service.service_id,
            )
        };
        let trial = match TrialEngine::run_trial(adapter, cancelled, line_rate_bps, addrs, &trial_spec) {
            Ok(trial) => trial,
            Err(BenchError::Cancelled) => return Err(BenchError::CancelledWithSteps(steps)),
            Err(e) => return Err(e),
        };
        let stats = trial.latency_stats.unwrap_or_default();
        let passed = evaluate_sla_pass(
            &service.sla,
            trial.loss_pct,
            stats.avg_ns as f64 / 1_000_000.0,
            stats.min_ns as f64 / 1_000_000.0,
            stats.max_ns as f64 / 1_000_000.0,
        );

        info!(service_id = service.service_id, load_pct = step_pct, passed, "sla step complete");
        steps.push(SlaStepResult {
            load_pct: step_pct,
            offered_mbps,
            achieved_mbps: trial.achieved_mbps,
            loss_pct: trial.loss_pct,
            latency_stats: stats,
            passed,
        });
    }

    let service_passed = steps.iter().all(|s| s.passed);
    Ok(SlaStepTestResult {
        service_id: service.service_id,
        steps,
        service_passed,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct SustainedSpec {
    pub frame_size: usize,
    pub duration_sec: f64,
    pub warmup_sec: f64,
}

impl Default for SustainedSpec {
    /// 15 minutes at CIR, 5s warmup, per §4.11.
    fn default() -> Self {
        Self {
            frame_size: 512,
            duration_sec: 15.0 * 60.0,
            warmup_sec: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SustainedResult {
    pub service_id: u32,
    pub achieved_mbps: f64,
    pub loss_pct: f64,
    pub latency_stats: LatencyStats,
    pub passed: bool,
}

/// Runs one long trial at `service.sla.cir_mbps` and grades it with the
/// same pass predicate as the step test.
pub fn run_sustained(
    adapter: &mut dyn IoAdapter,
    cancelled: &AtomicBool,
    line_rate_bps: u64,
    addrs: &FrameAddresses,
    service: &Service,
    spec: &SustainedSpec,
) -> Result<SustainedResult> {
    let offered_rate_pct = (service.sla.cir_mbps / (line_rate_bps as f64 * 1e-6)) * 100.0;
    let trial_spec = TrialSpec {
        latency_capacity: SLA_LATENCY_CAPACITY,
        ..TrialSpec::new(
            spec.frame_size,
            offered_rate_pct,
            spec.duration_sec,
            spec.warmup_sec,
            signatures::Y1564,
            service.service_id,
        )
    };
    let trial = TrialEngine::run_trial(adapter, cancelled, line_rate_bps, addrs, &trial_spec)?;
    let stats = trial.latency_stats.unwrap_or_default();
    let passed = evaluate_sla_pass(
        &service.sla,
        trial.loss_pct,
        stats.avg_ns as f64 / 1_000_000.0,
        stats.min_ns as f64 / 1_000_000.0,
        stats.max_ns as f64 / 1_000_000.0,
    );

    info!(service_id = service.service_id, passed, "sustained test complete");
    Ok(SustainedResult {
        service_id: service.service_id,
        achieved_mbps: trial.achieved_mbps,
        loss_pct: trial.loss_pct,
        latency_stats: stats,
        passed,
    })
}
