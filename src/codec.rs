//! Ethernet/IPv4/UDP frame template construction and the signature-bearing
//! payload header that rides inside it.
//!
//! The codec owns exactly one responsibility: turn `(addresses, ports,
//! stream-id, signature)` into a byte-exact template once, then let the
//! trial engine restamp the two fields that change every packet (sequence
//! number, tx timestamp) without re-deriving anything else.

use std::net::Ipv4Addr;

use crate::error::{BenchError, Result};

/// Ethernet MAC address.
pub type MacAddr = [u8; 6];

/// A 7-byte ASCII signature identifying the traffic generator that is
/// exactly `frame_size` bytes away from plain padding. All signatures the
/// core emits are listed in [`signatures`].
pub type Signature = [u8; 7];

/// Recognized signature literals, all exactly 7 bytes, space-padded.
pub mod signatures {
    use super::Signature;

    pub const RFC2544: Signature = *b"RFC2544";
    pub const Y1564: Signature = *b"Y.1564 ";
    pub const Y1731: Signature = *b"Y.1731 ";
    pub const RFC2889: Signature = *b"RFC2889";
    pub const RFC6349: Signature = *b"RFC6349";
    pub const MEF48: Signature = *b"MEF48  ";
    pub const DOT1QBV: Signature = *b"802Qbv ";
}

/// Byte length of the Ethernet II + IPv4 + UDP header stack preceding the
/// payload header.
pub const L2_L3_L4_HEADER_LEN: usize = 14 + 20 + 8;

/// Byte length of the signature-bearing payload header (§6).
pub const PAYLOAD_HEADER_LEN: usize = 24;

/// The smallest frame size that can carry the full header stack plus the
/// mandatory payload header. See DESIGN.md's Open Question decision #5:
/// the contract's literal floor of 64 bytes cannot fit 42 + 24 = 66 bytes.
pub const MIN_FRAME_SIZE: usize = L2_L3_L4_HEADER_LEN + PAYLOAD_HEADER_LEN;

/// Largest frame size this codec will template (jumbo frame ceiling).
pub const MAX_FRAME_SIZE: usize = 9000;

const ETHERTYPE_IPV4: u16 = 0x0800;
const IP_PROTO_UDP: u8 = 17;
const IP_ID_CORE: u16 = 0x1234;
const IP_ID_SLA: u16 = 0x1564;
const UDP_SRC_PORT: u16 = 12345;
const UDP_DST_PORT: u16 = 3842;

/// Flag bits for the payload header's flags byte.
pub mod flags {
    pub const REQUEST_TIMESTAMP: u8 = 0b01;
    pub const IS_RESPONSE: u8 = 0b10;
}

/// A handle into a previously-templated buffer, letting [`PacketCodec::stamp`]
/// avoid re-deriving header offsets on every call.
#[derive(Debug, Clone, Copy)]
pub struct PayloadHandle {
    payload_offset: usize,
    frame_size: usize,
}

impl PayloadHandle {
    /// Absolute offset of the payload header's first byte within the
    /// templated buffer.
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Total frame size this handle was created for.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

/// Stateless frame builder and parser. Every method takes the buffer
/// explicitly; the codec itself holds no state.
pub struct PacketCodec;

impl PacketCodec {
    /// Builds a template frame into `buffer`, which must be at least
    /// `frame_size` bytes long. Returns a handle used by `stamp` to mutate
    /// the per-packet fields cheaply.
    #[allow(clippy::too_many_arguments)]
    pub fn create_template(
        buffer: &mut [u8],
        frame_size: usize,
        src_mac: MacAddr,
        dst_mac: MacAddr,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        stream_id: u32,
        dscp: u8,
        signature: Signature,
    ) -> Result<PayloadHandle> {
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&frame_size) {
            return Err(BenchError::InvalidArgument(format!(
                "frame_size {frame_size} out of range [{MIN_FRAME_SIZE}, {MAX_FRAME_SIZE}]"
            )));
        }
        if buffer.len() < frame_size {
            return Err(BenchError::InvalidArgument(format!(
                "buffer of {} bytes too small for frame_size {frame_size}",
                buffer.len()
            )));
        }

        let is_sla = signature == signatures::Y1564;
        let ip_id = if is_sla { IP_ID_SLA } else { IP_ID_CORE };

        // Ethernet II header.
        buffer[0..6].copy_from_slice(&dst_mac);
        buffer[6..12].copy_from_slice(&src_mac);
        buffer[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

        // IPv4 header (offset 14..34).
        let ip_total_len = (frame_size - 14) as u16;
        write_ipv4_header(
            &mut buffer[14..34],
            dscp,
            ip_total_len,
            ip_id,
            src_ip,
            dst_ip,
        );

        // UDP header (offset 34..42).
        let udp_len = (frame_size - 34) as u16;
        buffer[34..36].copy_from_slice(&src_port.to_be_bytes());
        buffer[36..38].copy_from_slice(&dst_port.to_be_bytes());
        buffer[38..40].copy_from_slice(&udp_len.to_be_bytes());
        buffer[40..42].copy_from_slice(&0u16.to_be_bytes()); // UDP checksum, optional under IPv4.

        // Payload header (offset 42..66).
        let payload = &mut buffer[42..66];
        payload[0..7].copy_from_slice(&signature);
        payload[7..11].copy_from_slice(&0u32.to_be_bytes()); // seq, stamped later
        payload[11..19].copy_from_slice(&0u64.to_be_bytes()); // tx timestamp, stamped later
        payload[19..23].copy_from_slice(&stream_id.to_be_bytes());
        payload[23] = 0; // flags, caller sets via stamp if needed

        // Deterministic padding.
        for (i, b) in buffer[66..frame_size].iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }

        Ok(PayloadHandle {
            payload_offset: 42,
            frame_size,
        })
    }

    /// Overwrites the sequence number and tx timestamp fields of a
    /// previously-templated buffer. Everything else in the frame is left
    /// untouched, matching §3's invariant that only seq/timestamp (and
    /// service-id, set at template time) mutate between transmissions.
    pub fn stamp(handle: &PayloadHandle, buffer: &mut [u8], seq_num: u32, tx_timestamp_ns: u64) {
        let off = handle.payload_offset;
        buffer[off + 7..off + 11].copy_from_slice(&seq_num.to_be_bytes());
        let hi = (tx_timestamp_ns >> 32) as u32;
        let lo = (tx_timestamp_ns & 0xFFFF_FFFF) as u32;
        buffer[off + 11..off + 15].copy_from_slice(&hi.to_be_bytes());
        buffer[off + 15..off + 19].copy_from_slice(&lo.to_be_bytes());
    }

    /// Sets the flags byte independently of `stamp`, since it is not
    /// touched on every transmission.
    pub fn set_flags(handle: &PayloadHandle, buffer: &mut [u8], flags: u8) {
        buffer[handle.payload_offset + 23] = flags;
    }

    /// Returns true if `data[..len]` carries `signature` at the fixed
    /// payload offset and the buffer is long enough to hold a full
    /// payload header.
    pub fn is_valid(data: &[u8], len: usize, signature: &Signature) -> bool {
        if len < 64 || data.len() < len || len < L2_L3_L4_HEADER_LEN + PAYLOAD_HEADER_LEN {
            return false;
        }
        &data[42..49] == signature
    }

    /// Extracts the sequence number. Caller must have validated the
    /// buffer with [`PacketCodec::is_valid`] first.
    pub fn get_seq(data: &[u8], _len: usize) -> u32 {
        u32::from_be_bytes(data[49..53].try_into().unwrap())
    }

    /// Extracts the 64-bit tx timestamp, reassembled from its two 32-bit
    /// big-endian halves.
    pub fn get_tx_timestamp(data: &[u8], _len: usize) -> u64 {
        let hi = u32::from_be_bytes(data[53..57].try_into().unwrap()) as u64;
        let lo = u32::from_be_bytes(data[57..61].try_into().unwrap()) as u64;
        (hi << 32) | lo
    }

    /// Extracts the stream/service id.
    pub fn get_stream_id(data: &[u8], _len: usize) -> u32 {
        u32::from_be_bytes(data[61..65].try_into().unwrap())
    }

    /// Extracts the flags byte.
    pub fn get_flags(data: &[u8], _len: usize) -> u8 {
        data[65]
    }
}

fn write_ipv4_header(
    header: &mut [u8],
    dscp: u8,
    total_len: u16,
    ip_id: u16,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
) {
    header[0] = 0x45; // version 4, IHL 5 (20 bytes, no options)
    header[1] = dscp << 2; // ToS: DSCP in top 6 bits, ECN left at 0
    header[2..4].copy_from_slice(&total_len.to_be_bytes());
    header[4..6].copy_from_slice(&ip_id.to_be_bytes());
    header[6..8].copy_from_slice(&0x4000u16.to_be_bytes()); // flags=DF, frag offset 0
    header[8] = 64; // TTL
    header[9] = IP_PROTO_UDP;
    header[10..12].copy_from_slice(&0u16.to_be_bytes()); // checksum, filled below
    header[12..16].copy_from_slice(&src_ip.octets());
    header[16..20].copy_from_slice(&dst_ip.octets());

    let checksum = ipv4_checksum(header);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
}

/// Standard one's-complement 16-bit checksum over a 20-byte IPv4 header
/// (checksum field itself must be zero when this is called).
fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in header.chunks_exact(2) {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
