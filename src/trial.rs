//! The single paced-TX / non-blocking-RX loop that every orchestrator
//! drives. See SPEC_FULL.md §4.2.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{MacAddr, PacketCodec, Signature};
use crate::error::{BenchError, Result};
use crate::io_adapter::{IoAdapter, Packet};
use crate::latency::{compute_stats, LatencyStats};
use crate::pacer::Pacer;
use crate::seq_tracker::SeqTracker;
use crate::timer::TrialTimer;

/// How many packets a single `recv_batch` call is allowed to return.
const RX_BATCH_SIZE: usize = 64;

/// Straggler-drain iterations after TX stops, each followed by a 10 ms
/// sleep, to collect in-flight replies.
const STRAGGLER_ITERATIONS: usize = 10;
const STRAGGLER_SLEEP: std::time::Duration = std::time::Duration::from_millis(10);

/// Default latency sample capacity for non-SLA trials.
pub const DEFAULT_LATENCY_CAPACITY: usize = 10_000;
/// Latency sample capacity for SLA trials, which run far longer.
pub const SLA_LATENCY_CAPACITY: usize = 100_000;

/// Ethernet/IP/UDP addressing the trial stamps into every frame it
/// builds.
#[derive(Debug, Clone, Copy)]
pub struct FrameAddresses {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub dscp: u8,
}

/// The outcome of one trial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialResult {
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub bytes_sent: u64,
    pub elapsed_sec: f64,
    pub achieved_pps: f64,
    pub achieved_mbps: f64,
    pub loss_pct: f64,
    pub latency_stats: Option<LatencyStats>,
    /// Highest sequence number observed among received packets during
    /// the measurement window, or `None` if nothing was received. Used
    /// by the system-recovery reset detector (SPEC_FULL.md §4.9) to
    /// distinguish a device reset from ordinary packet loss.
    pub last_seq: Option<u32>,
}

/// Parameters for one call to [`TrialEngine::run_trial`].
pub struct TrialSpec {
    pub frame_size: usize,
    pub rate_pct: f64,
    pub duration_sec: f64,
    pub warmup_sec: f64,
    pub signature: Signature,
    pub stream_id: u32,
    pub measure_latency: bool,
    pub latency_capacity: usize,
}

impl TrialSpec {
    /// A trial spec using the default (non-SLA) latency capacity.
    pub fn new(frame_size: usize, rate_pct: f64, duration_sec: f64, warmup_sec: f64, signature: Signature, stream_id: u32) -> Self {
        Self {
            frame_size,
            rate_pct,
            duration_sec,
            warmup_sec,
            signature,
            stream_id,
            measure_latency: true,
            latency_capacity: DEFAULT_LATENCY_CAPACITY,
        }
    }
}

/// Runs the one loop every test type is built from.
pub struct TrialEngine;

impl TrialEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn run_trial(
        adapter: &mut dyn IoAdapter,
        cancelled: &AtomicBool,
        line_rate_bps: u64,
        addrs: &FrameAddresses,
        spec: &TrialSpec,
    ) -> Result<TrialResult> {
        if cancelled.load(Ordering::Relaxed) {
            return Err(BenchError::Cancelled);
        }

        let mut buffer = vec![0u8; spec.frame_size];
        let handle = PacketCodec::create_template(
            &mut buffer,
            spec.frame_size,
            addrs.src_mac,
            addrs.dst_mac,
            addrs.src_ip,
            addrs.dst_ip,
            addrs.src_port,
            addrs.dst_port,
            spec.stream_id,
            addrs.dscp,
            spec.signature,
        )?;

        let mut pacer = Pacer::create(line_rate_bps, spec.frame_size, spec.rate_pct)?;
        let expected_packets = (spec.duration_sec * pacer.target_pps() as f64) as u32;
        let mut tracker = SeqTracker::new(0, expected_packets.saturating_add(1000));
        let mut latency_samples: Vec<u64> = if spec.measure_latency {
            Vec::with_capacity(spec.latency_capacity.min(1024))
        } else {
            Vec::new()
        };

        let mut timer = TrialTimer::new(spec.duration_sec, spec.warmup_sec);
        pacer.reset();

        let mut in_measurement = false;
        let mut packets_sent: u64 = 0;
        let mut bytes_sent: u64 = 0;
        let mut packets_recv: u64 = 0;
        let mut seq: u32 = 0;
        let mut measurement_started_at = Instant::now();

        let mut rx_buf: Vec<Packet> = Vec::with_capacity(RX_BATCH_SIZE);

        while !timer.expired() && !cancelled.load(Ordering::Relaxed) {
            if !timer.in_warmup() && !in_measurement {
                in_measurement = true;
                packets_sent = 0;
                bytes_sent = 0;
                packets_recv = 0;
                seq = 0;
                tracker = SeqTracker::new(0, expected_packets.saturating_add(1000));
                latency_samples.clear();
                pacer.reset();
                measurement_started_at = Instant::now();
            }

            let tx_ts = pacer.wait();
            PacketCodec::stamp(&handle, &mut buffer, seq, tx_ts);
            let packet = Packet { data: buffer.clone(), len: spec.frame_size, timestamp_ns: tx_ts };
            if let Ok(sent) = adapter.send_batch(std::slice::from_ref(&packet)) {
                if sent > 0 && in_measurement {
                    packets_sent += 1;
                    bytes_sent += spec.frame_size as u64;
                    seq = seq.wrapping_add(1);
                    pacer.record_tx(1, spec.frame_size as u64);
                }
            }

            rx_buf.clear();
            if adapter.recv_batch(&mut rx_buf, RX_BATCH_SIZE).is_ok() {
                for pkt in &rx_buf {
                    process_rx(
                        pkt,
                        &spec.signature,
                        spec.stream_id,
                        in_measurement,
                        &mut tracker,
                        &mut packets_recv,
                        &mut latency_samples,
                        spec.latency_capacity,
                    );
                }
                adapter.release_batch(&rx_buf);
            }
        }

        for _ in 0..STRAGGLER_ITERATIONS {
            std::thread::sleep(STRAGGLER_SLEEP);
            rx_buf.clear();
            if adapter.recv_batch(&mut rx_buf, RX_BATCH_SIZE).is_ok() {
                for pkt in &rx_buf {
                    process_rx(
                        pkt,
                        &spec.signature,
                        spec.stream_id,
                        in_measurement,
                        &mut tracker,
                        &mut packets_recv,
                        &mut latency_samples,
                        spec.latency_capacity,
                    );
                }
                adapter.release_batch(&rx_buf);
            }
        }

        let elapsed = measurement_started_at.elapsed().as_secs_f64().max(f64::EPSILON);
        let loss_pct = if packets_sent == 0 {
            0.0
        } else {
            (100.0 * (packets_sent.saturating_sub(packets_recv)) as f64 / packets_sent as f64).max(0.0)
        };
        let achieved_pps = packets_sent as f64 / elapsed;
        let achieved_mbps = bytes_sent as f64 * 8.0 / (elapsed * 1_000_000.0);

        let result = TrialResult {
            packets_sent,
            packets_recv,
            bytes_sent,
            elapsed_sec: elapsed,
            achieved_pps,
            achieved_mbps,
            loss_pct,
            latency_stats: if spec.measure_latency { Some(compute_stats(&latency_samples)) } else { None },
            last_seq: tracker.max_seq(),
        };

        debug!(
            sent = result.packets_sent,
            recv = result.packets_recv,
            loss_pct = result.loss_pct,
            pps = result.achieved_pps,
            mbps = result.achieved_mbps,
            "trial complete"
        );

        Ok(result)
    }
}

#[allow(clippy::too_many_arguments)]
fn process_rx(
    pkt: &Packet,
    signature: &Signature,
    stream_id: u32,
    in_measurement: bool,
    tracker: &mut SeqTracker,
    packets_recv: &mut u64,
    latency_samples: &mut Vec<u64>,
    latency_capacity: usize,
) {
    if !PacketCodec::is_valid(&pkt.data, pkt.len, signature) {
        return;
    }
    if PacketCodec::get_stream_id(&pkt.data, pkt.len) != stream_id {
        return;
    }
    if !in_measurement {
        return;
    }

    let seq = PacketCodec::get_seq(&pkt.data, pkt.len);
    tracker.record(seq);
    *packets_recv += 1;

    let tx_ts = PacketCodec::get_tx_timestamp(&pkt.data, pkt.len);
    if pkt.timestamp_ns >= tx_ts && latency_samples.len() < latency_capacity {
        latency_samples.push(pkt.timestamp_ns - tx_ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::signatures;
    use crate::io_adapter::{IoConfig, LoopbackAdapter};

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
    fn lossless_loopback_trial_has_near_zero_loss() {
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
        let spec = TrialSpec::new(256, 50.0, 0.05, 0.0, signatures::RFC2544, 1);

        let result = TrialEngine::run_trial(&mut adapter, &cancelled, 1_000_000_000, &addrs(), &spec).unwrap();
        assert!(result.packets_sent > 0);
        assert!(result.loss_pct <= 1.0, "loss_pct={}", result.loss_pct);
        assert!(result.latency_stats.unwrap().count > 0);
    }

    #[test]
    fn cancelled_context_returns_cancelled_error() {
        let config = IoConfig {
            interface: "lo".into(),
            src_mac: addrs().src_mac,
            dst_mac: addrs().dst_mac,
            src_ip: addrs().src_ip,
            dst_ip: addrs().dst_ip,
            hw_timestamping: false,
        };
        let mut adapter = LoopbackAdapter::init(&config).unwrap();
        let cancelled = AtomicBool::new(true);
        let spec = TrialSpec::new(256, 50.0, 1.0, 0.0, signatures::RFC2544, 1);

        let err = TrialEngine::run_trial(&mut adapter, &cancelled, 1_000_000_000, &addrs(), &spec).unwrap_err();
        assert!(matches!(err, BenchError::Cancelled));
    }

    #[test]
    fn zero_sent_packets_yield_zero_loss() {
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
        // Warmup consumes the whole duration, so zero packets are ever
        // counted toward the measurement window.
        let spec = TrialSpec::new(256, 10.0, 0.0, 0.0, signatures::RFC2544, 1);

        let result = TrialEngine::run_trial(&mut adapter, &cancelled, 1_000_000_000, &addrs(), &spec).unwrap();
        assert_eq!(result.loss_pct, 0.0);
    }
}
