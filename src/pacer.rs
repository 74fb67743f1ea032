//! Precise inter-packet pacing: converts a target bits-per-second rate
//! into a schedule of transmit deadlines, with a hybrid sleep+spin wait
//! and overrun recovery so offered load stays honest under scheduler
//! jitter.
//!
//! All timing here is [`Instant`]-based. Never substitute `SystemTime` —
//! pacing and duration measurement must use a monotonic clock (see
//! SPEC_FULL.md §9).

use std::hint;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{BenchError, Result};

/// Bytes of preamble + inter-frame gap added to `frame_size` when
/// computing wire-time budgets.
pub const WIRE_OVERHEAD_BYTES: u64 = 20;

/// A caller stalling longer than this many interval multiples forfeits
/// the gap entirely rather than bursting to catch up.
const OVERRUN_INTERVALS: u32 = 10;

/// Below this much remaining time, busy-spin only; above it, sleep first.
const SLEEP_THRESHOLD: Duration = Duration::from_micros(50);

/// Sleep this much less than the remaining time, then spin the rest of
/// the way — sleep granularity is coarser than the spin-precision we
/// need.
const SLEEP_UNDERSHOOT: Duration = Duration::from_micros(10);

/// Running counters exposed for diagnostics and testing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacerCounters {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub pacing_delays: u64,
    pub overruns: u64,
}

/// Converts an offered-load percentage of line rate into a stream of
/// transmit deadlines.
pub struct Pacer {
    line_rate_bps: u64,
    frame_size: usize,
    target_bps: u64,
    target_pps: u64,
    interval_ns: u64,
    start: Instant,
    next_tx_ns: u64,
    counters: PacerCounters,
}

impl Pacer {
    /// Creates a pacer targeting `rate_pct` percent of `line_rate_bps`,
    /// for frames of `frame_size` bytes. Fails with `InvalidArgument` on
    /// `rate_pct <= 0 || rate_pct > 100` or `frame_size < 64`.
    pub fn create(line_rate_bps: u64, frame_size: usize, rate_pct: f64) -> Result<Self> {
        if !(rate_pct > 0.0 && rate_pct <= 100.0) {
            return Err(BenchError::InvalidArgument(format!(
                "rate_pct {rate_pct} must be in (0, 100]"
            )));
        }
        if frame_size < 64 {
            return Err(BenchError::InvalidArgument(format!(
                "frame_size {frame_size} below minimum 64"
            )));
        }

        let (target_bps, target_pps, interval_ns) =
            compute_rate(line_rate_bps, frame_size, rate_pct);

        let now = Instant::now();
        Ok(Self {
            line_rate_bps,
            frame_size,
            target_bps,
            target_pps,
            interval_ns,
            start: now,
            next_tx_ns: 0,
            counters: PacerCounters::default(),
        })
    }

    /// Recomputes the target rate from a new percentage of the stored
    /// line rate. Deliberately leaves `next_tx_ns` untouched: a mid-trial
    /// rate change takes effect on the *next* send rather than bursting
    /// to realign with the new interval (SPEC_FULL.md §9).
    pub fn set_rate(&mut self, rate_pct: f64) -> Result<()> {
        if !(rate_pct > 0.0 && rate_pct <= 100.0) {
            return Err(BenchError::InvalidArgument(format!(
                "rate_pct {rate_pct} must be in (0, 100]"
            )));
        }
        let (target_bps, target_pps, interval_ns) =
            compute_rate(self.line_rate_bps, self.frame_size, rate_pct);
        self.target_bps = target_bps;
        self.target_pps = target_pps;
        self.interval_ns = interval_ns;
        Ok(())
    }

    /// Re-baselines the next deadline to "now" and zeroes the counters.
    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.next_tx_ns = 0;
        self.counters = PacerCounters::default();
    }

    /// Blocks (sleep then spin) until the next transmit deadline, then
    /// returns the monotonic timestamp (nanoseconds since the pacer's
    /// baseline) at which it woke.
    pub fn wait(&mut self) -> u64 {
        let next_tx_ns = self.next_tx_ns;
        let now_ns = self.elapsed_ns();

        if now_ns < next_tx_ns {
            self.wait_until(next_tx_ns);
        } else if now_ns > next_tx_ns + OVERRUN_INTERVALS as u64 * self.interval_ns {
            // Stalled past the overrun window: forfeit the gap instead of
            // bursting to catch up, which would corrupt offered-load
            // semantics.
            self.next_tx_ns = now_ns;
            self.counters.overruns += 1;
        }

        let woke_at = self.elapsed_ns().max(self.next_tx_ns);
        self.next_tx_ns += self.interval_ns;
        woke_at
    }

    /// Waits for `n` consecutive deadlines, returning the timestamp of
    /// the last one. Used by batch-oriented adapters.
    pub fn wait_batch(&mut self, n: usize) -> u64 {
        let mut ts = self.elapsed_ns();
        for _ in 0..n.max(1) {
            ts = self.wait();
        }
        ts
    }

    fn wait_until(&mut self, target_ns: u64) {
        self.counters.pacing_delays += 1;
        loop {
            let now_ns = self.elapsed_ns();
            if now_ns >= target_ns {
                return;
            }
            let remaining = Duration::from_nanos(target_ns - now_ns);
            if remaining >= SLEEP_THRESHOLD {
                thread::sleep(remaining - SLEEP_UNDERSHOOT);
            } else {
                hint::spin_loop();
            }
        }
    }

    /// Records a successful transmission against the running counters.
    pub fn record_tx(&mut self, packets: u64, bytes: u64) {
        self.counters.packets_sent += packets;
        self.counters.bytes_sent += bytes;
    }

    /// Current counter snapshot.
    pub fn counters(&self) -> PacerCounters {
        self.counters
    }

    /// Configured packets-per-second target.
    pub fn target_pps(&self) -> u64 {
        self.target_pps
    }

    /// Configured inter-packet interval, in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.interval_ns
    }

    fn elapsed_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

/// `calc_max_pps(line_rate_bps, frame_size)`: the maximum packets per
/// second sustainable at `line_rate_bps` for frames of `frame_size`
/// bytes, accounting for preamble and inter-frame gap. Integer (floor)
/// division; returns 0 when `line_rate_bps == 0`.
pub fn calc_max_pps(line_rate_bps: u64, frame_size: usize) -> u64 {
    let wire_bits = (frame_size as u64 + WIRE_OVERHEAD_BYTES) * 8;
    if wire_bits == 0 {
        return 0;
    }
    line_rate_bps / wire_bits
}

/// `calc_utilization(pps, frame_size, line_rate_bps)`: the percentage of
/// line rate that `pps` represents. Returns 0 when `line_rate_bps == 0`.
pub fn calc_utilization(pps: u64, frame_size: usize, line_rate_bps: u64) -> f64 {
    if line_rate_bps == 0 {
        return 0.0;
    }
    let wire_bits = (frame_size as u64 + WIRE_OVERHEAD_BYTES) * 8;
    (pps as f64 * wire_bits as f64 / line_rate_bps as f64) * 100.0
}

fn compute_rate(line_rate_bps: u64, frame_size: usize, rate_pct: f64) -> (u64, u64, u64) {
    let target_bps = ((line_rate_bps as f64) * (rate_pct / 100.0)) as u64;
    let target_pps = calc_max_pps(target_bps, frame_size).max(1);
    let interval_ns = 1_000_000_000u64 / target_pps;
    (target_bps, target_pps, interval_ns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pps_wire_rate_invariant() {
        assert_eq!(calc_max_pps(1_000_000_000, 64), 1_488_095);
        let pps_1518 = calc_max_pps(10_000_000_000, 1518);
        assert!((812_743..=812_744).contains(&pps_1518));
    }

    #[test]
    fn max_pps_zero_line_rate_is_zero() {
        assert_eq!(calc_max_pps(0, 512), 0);
    }

    #[test]
    fn utilization_is_idempotent_with_max_pps() {
        for &rate in &[1_000_000_000u64, 10_000_000_000, 100_000_000_000] {
            for &size in &[64usize, 128, 256, 512, 1024, 1280, 1518] {
                let pps = calc_max_pps(rate, size);
                let util = calc_utilization(pps, size, rate);
                assert!((util - 100.0).abs() <= 0.1, "rate={rate} size={size} util={util}");
            }
        }
    }

    #[test]
    fn utilization_zero_line_rate_is_zero() {
        assert_eq!(calc_utilization(1_000_000, 512, 0), 0.0);
    }

    #[test]
    fn rejects_bad_rate_pct() {
        assert!(Pacer::create(1_000_000_000, 512, 0.0).is_err());
        assert!(Pacer::create(1_000_000_000, 512, 101.0).is_err());
    }

    #[test]
    fn rejects_undersized_frame() {
        assert!(Pacer::create(1_000_000_000, 63, 100.0).is_err());
    }

    #[test]
    fn wait_converges_to_target_rate() {
        let mut pacer = Pacer::create(1_000_000_000, 512, 10.0).unwrap();
        pacer.reset();
        let n = 200u64;
        let t0 = Instant::now();
        for _ in 0..n {
            pacer.wait();
        }
        let elapsed = t0.elapsed().as_nanos() as u64;
        let expected = n * pacer.interval_ns();
        let tolerance = 2 * pacer.interval_ns() + 2_000_000; // plus OS scheduling slack
        assert!(
            elapsed.abs_diff(expected) <= tolerance,
            "elapsed={elapsed} expected={expected} tolerance={tolerance}"
        );
    }

    #[test]
    fn overrun_recovery_increments_counter_once() {
        let mut pacer = Pacer::create(1_000_000_000, 512, 100.0).unwrap();
        pacer.reset();
        thread::sleep(Duration::from_nanos(pacer.interval_ns() * (OVERRUN_INTERVALS as u64 + 2)));
        pacer.wait();
        assert_eq!(pacer.counters().overruns, 1);
    }

    #[test]
    fn set_rate_preserves_next_deadline() {
        let mut pacer = Pacer::create(1_000_000_000, 512, 50.0).unwrap();
        pacer.reset();
        pacer.next_tx_ns = 123_456;
        pacer.set_rate(10.0).unwrap();
        assert_eq!(pacer.next_tx_ns, 123_456);
    }
}
