//! End-to-end exercises of the public API's §5 parallelism (multi-port,
//! bidirectional) and the system-recovery orchestrator, all against
//! `LoopbackAdapter`.

use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use netbench_core::api::{self, PortJob, TestOutcome, TestType};
use netbench_core::io_adapter::LoopbackAdapter;
use netbench_core::orchestrators::back_to_back::BackToBackSpec;
use netbench_core::orchestrators::system_recovery::{self, SystemRecoverySpec};
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
fn multi_port_test_runs_every_port_independently() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let ports: Vec<PortJob> = (0..4)
        .map(|_| PortJob {
            core_id: None,
            adapter: Box::new(LoopbackAdapter::new(1_000_000_000)),
            line_rate_bps: 1_000_000_000,
            addrs: addrs(),
            test: TestType::BackToBack(BackToBackSpec { frame_size: 128, initial_burst: 2, burst_trials: 1 }),
        })
        .collect();

    let results = api::run_multi_port(cancelled, ports);
    assert_eq!(results.len(), 4);
    for result in results {
        assert!(matches!(result.unwrap(), TestOutcome::BackToBack(_)));
    }
}

#[test]
fn bidirectional_test_runs_forward_and_reverse_concurrently() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let spec = BackToBackSpec { frame_size: 128, initial_burst: 4, burst_trials: 1 };

    let (forward, reverse) = api::run_bidirectional(
        cancelled,
        1_000_000_000,
        addrs(),
        Box::new(LoopbackAdapter::new(1_000_000_000)),
        TestType::BackToBack(spec),
        Box::new(LoopbackAdapter::new(1_000_000_000)),
        TestType::BackToBack(spec),
    );

    let TestOutcome::BackToBack(forward) = forward.unwrap() else { panic!("expected BackToBack") };
    let TestOutcome::BackToBack(reverse) = reverse.unwrap() else { panic!("expected BackToBack") };
    assert!(forward.max_burst > 0);
    assert!(reverse.max_burst > 0);
}

#[test]
fn system_recovery_on_a_lossless_link_recovers_without_a_reset() {
    let mut adapter = LoopbackAdapter::new(1_000_000_000);
    let cancelled = AtomicBool::new(false);
    let spec = SystemRecoverySpec {
        frame_size: 256,
        measured_throughput_pct: 50.0,
        overload_sec: 0.02,
    };

    let result = system_recovery::run(&mut adapter, &cancelled, 1_000_000_000, &addrs(), &spec).unwrap();
    assert!(result.recovery_time_ms >= 0);
    assert!(!result.reset_detected);
}
