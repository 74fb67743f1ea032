//! Test orchestrators: each converts a specification into a sequence of
//! trials driven through [`crate::trial::TrialEngine`]. See
//! SPEC_FULL.md §4.5–§4.12.

pub mod back_to_back;
pub mod color_meter;
pub mod frame_loss;
pub mod latency_sweep;
pub mod sla;
pub mod system_recovery;
pub mod throughput;

use serde::{Deserialize, Serialize};

/// Service-level-agreement thresholds a step/sustained test is graded
/// against (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServiceSla {
    pub cir_mbps: f64,
    pub eir_mbps: f64,
    pub cbs_bytes: u64,
    pub ebs_bytes: u64,
    pub fd_threshold_ms: f64,
    pub fdv_threshold_ms: f64,
    pub flr_threshold_pct: f64,
}

impl Default for ServiceSla {
    /// Default thresholds from §6: CIR 100 Mb/s, CBS 12000 B, FD <= 10ms,
    /// FDV <= 5ms, FLR <= 0.01%.
    fn default() -> Self {
        Self {
            cir_mbps: 100.0,
            eir_mbps: 0.0,
            cbs_bytes: 12_000,
            ebs_bytes: 0,
            fd_threshold_ms: 10.0,
            fdv_threshold_ms: 5.0,
            flr_threshold_pct: 0.01,
        }
    }
}

/// A service under test: an identifying stream id plus its SLA.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Service {
    pub service_id: u32,
    pub sla: ServiceSla,
}

/// Evaluates the common FD/FDV/FLR pass predicate shared by the SLA step
/// and sustained orchestrators (SPEC_FULL.md §4.10).
pub fn evaluate_sla_pass(
    sla: &ServiceSla,
    flr_pct: f64,
    fd_avg_ms: f64,
    min_ms: f64,
    max_ms: f64,
) -> bool {
    let fdv_ms = max_ms - min_ms;
    flr_pct <= sla.flr_threshold_pct && fd_avg_ms <= sla.fd_threshold_ms && fdv_ms <= sla.fdv_threshold_ms
}
