//! End-to-end latency-at-loads and frame-loss sweep scenarios against
//! `LoopbackAdapter` (SPEC_FULL.md §8, E3/E4).

use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;

use netbench_core::io_adapter::LoopbackAdapter;
use netbench_core::orchestrators::frame_loss::{self, FrameLossSpec};
use netbench_core::orchestrators::latency_sweep;
use netbench_core::FrameAddresses;

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
fn latency_sweep_at_10_50_90_percent_reports_increasing_samples() {
    let mut adapter = LoopbackAdapter::new(1_000_000_000);
    let cancelled = AtomicBool::new(false);
    let loads = [10.0, 50.0, 90.0];

    let results = latency_sweep::run(&mut adapter, &cancelled, 1_000_000_000, &addrs(), 512, &loads, 0.03, 0.0).unwrap();
    assert_eq!(results.len(), 3);
    for (result, &load) in results.iter().zip(loads.iter()) {
        assert_eq!(result.offered_rate_pct, load);
        assert!(result.latency_stats.count > 0, "load {load}% produced no samples");
        assert!(result.latency_stats.min_ns <= result.latency_stats.p50_ns);
        assert!(result.latency_stats.p50_ns <= result.latency_stats.p95_ns);
        assert!(result.latency_stats.p95_ns <= result.latency_stats.p99_ns);
        assert!(result.latency_stats.p99_ns <= result.latency_stats.max_ns);
    }
}

#[test]
fn frame_loss_sweep_from_100_to_10_percent_stays_lossless_on_reflector() {
    let mut adapter = LoopbackAdapter::new(1_000_000_000);
    let cancelled = AtomicBool::new(false);
    let spec = FrameLossSpec {
        frame_size: 256,
        loss_start_pct: 100.0,
        loss_end_pct: 10.0,
        loss_step_pct: 10.0,
        trial_duration_sec: 0.01,
        warmup_sec: 0.0,
    };

    let points = frame_loss::run(&mut adapter, &cancelled, 1_000_000_000, &addrs(), &spec).unwrap();
    assert_eq!(points.len(), 10);
    assert_eq!(points.first().unwrap().offered_rate_pct, 100.0);
    assert!((points.last().unwrap().offered_rate_pct - 10.0).abs() < 1e-6);
    for point in &points {
        assert!(point.loss_pct <= 1.0, "unexpected loss on a lossless reflector: {point:?}");
    }
}
