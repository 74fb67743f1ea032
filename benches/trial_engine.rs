//! Throughput benchmark for the paced send/receive trial loop
//! (`TrialEngine::run_trial`) against the in-memory loopback adapter.
//! Mirrors the donor's criterion harness shape: one group, a handful of
//! frame sizes, each iterated at a short fixed duration so the suite
//! stays fast to run in CI.

use std::hint::black_box;
use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;

use criterion::{criterion_group, criterion_main, Criterion};

use netbench_core::codec::signatures;
use netbench_core::io_adapter::LoopbackAdapter;
use netbench_core::trial::{FrameAddresses, TrialEngine, TrialSpec};

const LINE_RATE_BPS: u64 = 10_000_000_000;

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

fn bench_trial_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial_engine");

    for &frame_size in &[128usize, 512, 1518] {
        group.bench_function(format!("loopback_{frame_size}B"), |b| {
            b.iter(|| {
                let mut adapter = LoopbackAdapter::new(LINE_RATE_BPS);
                let cancelled = AtomicBool::new(false);
                let spec = TrialSpec::new(frame_size, 50.0, 0.02, 0.0, signatures::RFC2544, 1);
                let result = TrialEngine::run_trial(&mut adapter, &cancelled, LINE_RATE_BPS, &addrs(), &spec).unwrap();
                black_box(result.packets_sent)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_trial_engine);
criterion_main!(benches);
