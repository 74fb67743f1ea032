//! Frame-loss sweep (SPEC_FULL.md §4.7): one trial per descending rate
//! step, recording the loss curve.

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::signatures;
use crate::error::Result;
use crate::io_adapter::IoAdapter;
use crate::trial::{FrameAddresses, TrialEngine, TrialSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameLossPoint {
    pub offered_rate_pct: f64,
    pub actual_rate_mbps: f64,
    pub frames_sent: u64,
    pub frames_recv: u64,
    pub loss_pct: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct FrameLossSpec {
    pub frame_size: usize,
    pub loss_start_pct: f64,
    pub loss_end_pct: f64,
    pub loss_step_pct: f64,
    pub trial_duration_sec: f64,
    pub warmup_sec: f64,
}

impl Default for FrameLossSpec {
    fn default() -> Self {
        Self {
            frame_size: 128,
            loss_start_pct: 100.0,
            loss_end_pct: 10.0,
            loss_step_pct: 10.0,
            trial_duration_sec: 10.0,
            warmup_sec: 2.0,
        }
    }
}

pub fn run(
    adapter: &mut dyn IoAdapter,
    cancelled: &AtomicBool,
    line_rate_bps: u64,
    addrs: &FrameAddresses,
    spec: &FrameLossSpec,
) -> Result<Vec<FrameLossPoint>> {
    let mut results = Vec::new();
    let mut rate = spec.loss_start_pct;
    // Epsilon guards against float step accumulation stopping one step
    // short of loss_end_pct.
    while rate >= spec.loss_end_pct - 1e-9 {
        let trial_spec = TrialSpec::new(
            spec.frame_size,
            rate,
            spec.trial_duration_sec,
            spec.warmup_sec,
            signatures::RFC2544,
            1,
        );
        let trial_spec = TrialSpec { measure_latency: false, ..trial_spec };
        let trial = TrialEngine::run_trial(adapter, cancelled, line_rate_bps, addrs, &trial_spec)?;

        info!(offered_rate_pct = rate, loss_pct = trial.loss_pct, "frame loss step");
        results.push(FrameLossPoint {
            offered_rate_pct: rate,
            actual_rate_mbps: trial.achieved_mbps,
            frames_sent: trial.packets_sent,
            frames_recv: trial.packets_recv,
            loss_pct: trial.loss_pct,
        });

        rate -= spec.loss_step_pct;
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapter::{IoConfig, LoopbackAdapter};
    use std::net::Ipv4Addr;

    fn addrs() -> FrameAddresses {
        FrameAddresses {
            src_mac: [0x02, 0, 0, 0, 0, 1],
            dst_mac: [0x02, 0, 0, 0, 0, 2],
            src_ip: Ipv4Addr::new(10, 0, 0, 1),
            dst_ip: Ipv4Addr::new(10, 0, 0, 2),
            src_port: 12345,
            dst_port: 3842,
            dscp: 0,
        }
    }

    #[test]
    fn sweep_produces_ten_points_from_100_to_10() {
        let config = IoConfig {
            interface: "lo".into(),
            src_mac: addrs().src_mac,
            dst_mac: addrs().dst_mac,
            src_ip: addrs().src_ip,
            dst_ip: addrs().dst_ip,
            hw_timestamping: false,
        };
        let mut adapter = LoopbackAdapter::init(&config).unwrap();
        let cancelled = AtomicBool::new(false);
        let spec = FrameLossSpec {
            frame_size: 128,
            trial_duration_sec: 0.005,
            warmup_sec: 0.0,
            ..FrameLossSpec::default()
        };

        let points = run(&mut adapter, &cancelled, 1_000_000_000, &addrs(), &spec).unwrap();
        assert_eq!(points.len(), 10);
        assert_eq!(points[0].offered_rate_pct, 100.0);
        assert!((points.last().unwrap().offered_rate_pct - 10.0).abs() < 1e-6);
    }

    #[test]
    fn loss_is_non_increasing_as_offered_rate_decreases_on_lossless_link() {
        let config = IoConfig {
            interface: "lo".into(),
            src_mac: addrs().src_mac,
            dst_mac: addrs().dst_mac,
            src_ip: addrs().src_ip,
            dst_ip: addrs().dst_ip,
            hw_timestamping: false,
        };
        let mut adapter = LoopbackAdapter::init(&config).unwrap();
        let cancelled = AtomicBool::new(false);
        let spec = FrameLossSpec {
            frame_size: 128,
            trial_duration_sec: 0.005,
            warmup_sec: 0.0,
            ..FrameLossSpec::default()
        };

        let points = run(&mut adapter, &cancelled, 1_000_000_000, &addrs(), &spec).unwrap();
        for pair in points.windows(2) {
            assert!(pair[1].loss_pct <= pair[0].loss_pct + 1.0);
        }
    }
}
