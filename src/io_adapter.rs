//! The narrow boundary between the measurement core and packet I/O.
//!
//! Real back-ends (AF_PACKET, AF_XDP, DPDK, ...) live outside this crate
//! and implement [`IoAdapter`] against their own hardware. The only
//! implementation here, [`LoopbackAdapter`], exists purely to drive this
//! crate's own tests.

use std::net::Ipv4Addr;
use std::time::Instant;

use crate::codec::MacAddr;
use crate::error::Result;

/// Configuration handed to [`IoAdapter::init`].
#[derive(Debug, Clone)]
pub struct IoConfig {
    pub interface: String,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub hw_timestamping: bool,
}

/// One packet as handed between the core and an adapter.
#[derive(Debug, Clone)]
pub struct Packet {
    pub data: Vec<u8>,
    pub len: usize,
    /// Nanoseconds on the adapter's own clock. Hardware timestamps when
    /// `hw_timestamping` is enabled, otherwise the adapter's monotonic
    /// software clock. Never mixed across adapters within one
    /// subtraction (SPEC_FULL.md §9).
    pub timestamp_ns: u64,
}

/// The single boundary to packet I/O. Synchronous and non-blocking by
/// contract: no implementation may block the trial loop for more than a
/// best-effort instant (SPEC_FULL.md §5 — no async runtime is required
/// here).
pub trait IoAdapter: Send {
    /// Binds to the configured interface and returns a ready-to-use
    /// adapter instance. Reads the interface's MAC if not already known.
    fn init(config: &IoConfig) -> Result<Self>
    where
        Self: Sized;

    /// Attempts to send every packet in `packets`, returning how many
    /// were actually accepted. Non-blocking: short sends are permitted
    /// and are not an error.
    fn send_batch(&mut self, packets: &[Packet]) -> Result<usize>;

    /// Fills `out` with up to `max` received packets, returning how many
    /// were written. Non-blocking: zero is a valid, common result.
    fn recv_batch(&mut self, out: &mut Vec<Packet>, max: usize) -> Result<usize>;

    /// Returns any adapter-owned buffers associated with `packets` back
    /// to the adapter once the core has copied what it needs from them.
    fn release_batch(&mut self, _packets: &[Packet]) {}

    /// The MAC address this adapter bound to.
    fn local_mac(&self) -> MacAddr;

    /// Link speed in bits per second, if known.
    fn link_speed_bps(&self) -> Option<u64>;

    /// Releases any resources held by the adapter.
    fn cleanup(&mut self) {}
}

/// In-memory loopback adapter: frames handed to `send_batch` become
/// available from `recv_batch`, optionally dropped or delayed under a
/// configurable policy. Used only by this crate's own unit/integration
/// tests (see `LoopbackAdapter::with_loss`).
pub struct LoopbackAdapter {
    queue: Vec<Packet>,
    local_mac: MacAddr,
    link_speed_bps: u64,
    start: Instant,
    /// Fraction of packets (by send order, modulo `drop_every`) to drop.
    /// `0` disables dropping.
    drop_every: u64,
    sent: u64,
}

impl LoopbackAdapter {
    /// A lossless loopback at the given link speed.
    pub fn new(link_speed_bps: u64) -> Self {
        Self {
            queue: Vec::new(),
            local_mac: [0x02, 0, 0, 0, 0, 0x10],
            link_speed_bps,
            start: Instant::now(),
            drop_every: 0,
            sent: 0,
        }
    }

    /// A loopback that drops one packet out of every `drop_every` sent
    /// (0 disables dropping), for exercising loss-handling code paths.
    pub fn with_loss(link_speed_bps: u64, drop_every: u64) -> Self {
        Self {
            drop_every,
            ..Self::new(link_speed_bps)
        }
    }

    fn now_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

impl IoAdapter for LoopbackAdapter {
    fn init(config: &IoConfig) -> Result<Self> {
        let mut adapter = LoopbackAdapter::new(1_000_000_000);
        adapter.local_mac = config.src_mac;
        Ok(adapter)
    }

    fn send_batch(&mut self, packets: &[Packet]) -> Result<usize> {
        let mut accepted = 0;
        for packet in packets {
            self.sent += 1;
            if self.drop_every != 0 && self.sent % self.drop_every == 0 {
                continue;
            }
            let mut echoed = packet.clone();
            echoed.timestamp_ns = self.now_ns();
            self.queue.push(echoed);
            accepted += 1;
        }
        Ok(accepted)
    }

    fn recv_batch(&mut self, out: &mut Vec<Packet>, max: usize) -> Result<usize> {
        let n = max.min(self.queue.len());
        out.extend(self.queue.drain(..n));
        Ok(n)
    }

    fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    fn link_speed_bps(&self) -> Option<u64> {
        Some(self.link_speed_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IoConfig {
        IoConfig {
            interface: "lo".into(),
            src_mac: [0x02, 0, 0, 0, 0, 1],
            dst_mac: [0x02, 0, 0, 0, 0, 2],
            src_ip: Ipv4Addr::new(10, 0, 0, 1),
            dst_ip: Ipv4Addr::new(10, 0, 0, 2),
            hw_timestamping: false,
        }
    }

    #[test]
    fn loopback_echoes_sent_packets() {
        let mut adapter = LoopbackAdapter::init(&config()).unwrap();
        let packet = Packet { data: vec![1, 2, 3], len: 3, timestamp_ns: 0 };
        assert_eq!(adapter.send_batch(&[packet]).unwrap(), 1);
        let mut out = Vec::new();
        assert_eq!(adapter.recv_batch(&mut out, 64).unwrap(), 1);
        assert_eq!(out[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn loopback_with_loss_drops_scheduled_packets() {
        let mut adapter = LoopbackAdapter::with_loss(1_000_000_000, 2);
        let packet = Packet { data: vec![0u8; 64], len: 64, timestamp_ns: 0 };
        for _ in 0..10 {
            adapter.send_batch(&[packet.clone()]).unwrap();
        }
        let mut out = Vec::new();
        adapter.recv_batch(&mut out, 64).unwrap();
        assert_eq!(out.len(), 5);
    }
}
