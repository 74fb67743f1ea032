//! The public surface exposed to any external front-end (CLI, TUI, web
//! UI, ...): `init`/`configure`/`set_progress`/`run`/`cancel`/`cleanup`
//! plus one entrypoint per test type (SPEC_FULL.md §4.13, §6).
//!
//! This module owns no presentation concerns — it hands back plain
//! result structs and leaves formatting, CLI parsing and output
//! marshalling to the caller, per SPEC_FULL.md §1's scope boundary.

use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::codec::MacAddr;
use crate::context::{ProgressCallback, RunConfig, RunContext, RunState};
use crate::error::{BenchError, Result};
use crate::io_adapter::IoAdapter;
use crate::trial::FrameAddresses;
use crate::workers::{run_workers_blocking, WorkerJob};
use crate::orchestrators::back_to_back::{self, BackToBackResult, BackToBackSpec};
use crate::orchestrators::color_meter::{self, BurstValidationResult, ColorMeterResult};
use crate::orchestrators::frame_loss::{self, FrameLossPoint, FrameLossSpec};
use crate::orchestrators::latency_sweep::{self, LatencyResult};
use crate::orchestrators::sla::{self, SlaStepSpec, SlaStepTestResult, SustainedResult, SustainedSpec};
use crate::orchestrators::system_recovery::{self, SystemRecoveryResult, SystemRecoverySpec};
use crate::orchestrators::throughput::{self, ThroughputResult, ThroughputSpec};
use crate::orchestrators::Service;

/// Identifies which orchestrator `run` dispatches to.
#[derive(Debug, Clone)]
pub enum TestType {
    Throughput(ThroughputSpec),
    LatencySweep { frame_size: usize, loads_pct: Vec<f64>, trial_duration_sec: f64, warmup_sec: f64 },
    FrameLoss(FrameLossSpec),
    BackToBack(BackToBackSpec),
    SystemRecovery(SystemRecoverySpec),
    SlaStep { service: Service, spec: SlaStepSpec },
    Sustained { service: Service, spec: SustainedSpec },
    ColorMeter { service: Service, frame_size: usize, offered_rate_pct: f64, duration_sec: f64, warmup_sec: f64 },
    BurstValidation { service: Service, frame_size: usize },
}

/// The outcome of any single `run` dispatch — a tagged union mirroring
/// [`TestType`], since the orchestrators return structurally different
/// result shapes.
#[derive(Debug, Clone)]
pub enum TestOutcome {
    Throughput(ThroughputResult),
    LatencySweep(Vec<LatencyResult>),
    FrameLoss(Vec<FrameLossPoint>),
    BackToBack(BackToBackResult),
    SystemRecovery(SystemRecoveryResult),
    SlaStep(SlaStepTestResult),
    Sustained(SustainedResult),
    ColorMeter(ColorMeterResult),
    BurstValidation(BurstValidationResult),
}

/// Creates a context bound to `interface`, reading its link speed
/// (falling back to 10 Gb/s per §4.13).
pub fn init(interface: impl Into<String>, local_mac: MacAddr, peer_mac: MacAddr, local_ip: Ipv4Addr, peer_ip: Ipv4Addr) -> RunContext {
    RunContext::init(interface, local_mac, peer_mac, local_ip, peer_ip)
}

/// Applies a new run configuration. Rejects with `Busy` while `RUNNING`,
/// clamps out-of-range values.
pub fn configure(ctx: &mut RunContext, config: RunConfig) -> Result<()> {
    ctx.configure(config)
}

/// Registers a progress callback, replacing any previously set one.
pub fn set_progress(ctx: &mut RunContext, callback: ProgressCallback) {
    ctx.set_progress(callback);
}

/// Flips the cancellation flag, observable by the running orchestrator
/// between trials and inside the trial loop.
pub fn cancel(ctx: &RunContext) {
    ctx.cancel();
}

/// The context's current lifecycle state.
pub fn get_state(ctx: &RunContext) -> RunState {
    ctx.state
}

/// Requests cancellation and waits up to the cleanup timeout for the run
/// to reach a terminal state. Since `run` dispatches synchronously on
/// the calling thread (§5), by the time an external caller can invoke
/// `cleanup` the context has already settled into a terminal state
/// unless another thread is mid-`run` (the bidirectional/multi-port
/// case) — hence the single pre-call snapshot rather than a polling
/// loop here.
pub fn cleanup(ctx: &mut RunContext) -> Result<()> {
    let already_terminal = !matches!(ctx.state, RunState::Running);
    ctx.cleanup(move || already_terminal)
}

/// Dispatches `test` against `adapter`, transitioning `ctx` through
/// `RUNNING` to a terminal state. This is the one entrypoint every
/// per-test convenience function in this module funnels through.
pub fn run(ctx: &mut RunContext, adapter: &mut dyn IoAdapter, test: TestType) -> Result<TestOutcome> {
    if ctx.state == RunState::Running {
        return Err(BenchError::Busy);
    }
    ctx.begin_run();
    ctx.report_progress("starting test", 0.0);

    let cancelled = ctx.cancel_flag();
    let line_rate_bps = ctx.line_rate_bps;
    let addrs = ctx.addrs;

    let outcome = dispatch(&cancelled, line_rate_bps, &addrs, adapter, test);

    ctx.report_progress("test complete", 100.0);
    ctx.finish_run(outcome.as_ref().map(|_| ()).map_err(|e| clone_error_kind(e)));
    outcome
}

/// One port's worker assignment for [`run_multi_port`]: its own adapter,
/// test, and optional CPU pinning, owned exclusively for the worker's
/// lifetime (SPEC_FULL.md §5).
pub struct PortJob {
    pub core_id: Option<usize>,
    pub adapter: Box<dyn IoAdapter>,
    pub line_rate_bps: u64,
    pub addrs: FrameAddresses,
    pub test: TestType,
}

/// Runs one worker per port concurrently, each against its own adapter,
/// and joins all of them before returning. Every port shares only the
/// single cancellation flag; no other mutable state crosses workers
/// (SPEC_FULL.md §5). Results come back in the same order `ports` was
/// given.
pub fn run_multi_port(cancelled: Arc<AtomicBool>, ports: Vec<PortJob>) -> Vec<Result<TestOutcome>> {
    let jobs = ports
        .into_iter()
        .map(|port| {
            let cancelled = cancelled.clone();
            WorkerJob::new(port.core_id, move || {
                let mut adapter = port.adapter;
                dispatch(&cancelled, port.line_rate_bps, &port.addrs, adapter.as_mut(), port.test)
            })
        })
        .collect();
    run_workers_blocking(jobs)
}

/// Runs the forward-direction test on `adapter` and a reverse-direction
/// test on `reverse_adapter` concurrently, one worker each, joining both
/// before returning `(forward, reverse)` (SPEC_FULL.md §5's
/// bidirectional test).
pub fn run_bidirectional(
    cancelled: Arc<AtomicBool>,
    line_rate_bps: u64,
    addrs: FrameAddresses,
    forward_adapter: Box<dyn IoAdapter>,
    forward_test: TestType,
    reverse_adapter: Box<dyn IoAdapter>,
    reverse_test: TestType,
) -> (Result<TestOutcome>, Result<TestOutcome>) {
    let ports = vec![
        PortJob { core_id: None, adapter: forward_adapter, line_rate_bps, addrs, test: forward_test },
        PortJob { core_id: None, adapter: reverse_adapter, line_rate_bps, addrs, test: reverse_test },
    ];
    let mut results = run_multi_port(cancelled, ports);
    let reverse = results.pop().unwrap();
    let forward = results.pop().unwrap();
    (forward, reverse)
}

fn clone_error_kind(err: &BenchError) -> BenchError {
    match err {
        BenchError::InvalidArgument(s) => BenchError::InvalidArgument(s.clone()),
        BenchError::Busy => BenchError::Busy,
        BenchError::Io(e) => BenchError::Io(std::io::Error::new(e.kind(), e.to_string())),
        BenchError::OutOfMemory => BenchError::OutOfMemory,
        BenchError::Cancelled => BenchError::Cancelled,
        BenchError::CancelledWithSteps(steps) => BenchError::CancelledWithSteps(steps.clone()),
        BenchError::Unsupported(s) => BenchError::Unsupported(s.clone()),
        BenchError::Timeout => BenchError::Timeout,
    }
}

fn dispatch(
    cancelled: &std::sync::atomic::AtomicBool,
    line_rate_bps: u64,
    addrs: &crate::trial::FrameAddresses,
    adapter: &mut dyn IoAdapter,
    test: TestType,
) -> Result<TestOutcome> {
    match test {
        TestType::Throughput(spec) => {
            throughput::run(adapter, cancelled, line_rate_bps, addrs, &spec).map(TestOutcome::Throughput)
        }
        TestType::LatencySweep { frame_size, loads_pct, trial_duration_sec, warmup_sec } => {
            latency_sweep::run(adapter, cancelled, line_rate_bps, addrs, frame_size, &loads_pct, trial_duration_sec, warmup_sec)
                .map(TestOutcome::LatencySweep)
        }
        TestType::FrameLoss(spec) => {
            frame_loss::run(adapter, cancelled, line_rate_bps, addrs, &spec).map(TestOutcome::FrameLoss)
        }
        TestType::BackToBack(spec) => {
            back_to_back::run(adapter, cancelled, line_rate_bps, addrs, &spec).map(TestOutcome::BackToBack)
        }
        TestType::SystemRecovery(spec) => {
            system_recovery::run(adapter, cancelled, line_rate_bps, addrs, &spec).map(TestOutcome::SystemRecovery)
        }
        TestType::SlaStep { service, spec } => {
            sla::run_step_test(adapter, cancelled, line_rate_bps, addrs, &service, &spec).map(TestOutcome::SlaStep)
        }
        TestType::Sustained { service, spec } => {
            sla::run_sustained(adapter, cancelled, line_rate_bps, addrs, &service, &spec).map(TestOutcome::Sustained)
        }
        TestType::ColorMeter { service, frame_size, offered_rate_pct, duration_sec, warmup_sec } => {
            color_meter::run_metered_trial(adapter, cancelled, line_rate_bps, addrs, &service, frame_size, offered_rate_pct, duration_sec, warmup_sec)
                .map(TestOutcome::ColorMeter)
        }
        TestType::BurstValidation { service, frame_size } => {
            color_meter::validate_burst(&service.sla, frame_size, line_rate_bps).map(TestOutcome::BurstValidation)
        }
    }
}
