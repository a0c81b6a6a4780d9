//! The 23-byte packed frame header.

use crate::{FrameFlags, MacAddr, MsgType, PROTO_VER, VIRT_PHY};

/// Encoded header length in bytes.
pub const HEADER_LEN: usize = 23;

/// Decoded frame header.
///
/// `msg_type` and `sender_role` are kept as raw bytes so that frames carrying
/// unknown values survive a decode/encode round trip; use
/// [`MsgType::from_u8`] and [`crate::Role::from_u8`] to interpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub proto_ver: u8,
    pub msg_type: u8,
    pub flags: FrameFlags,
    /// Per-sender rolling sequence; echoed by replies for ACK matching.
    pub seq: u16,
    /// Sender's topology epoch (diagnostic).
    pub topo_ver: u16,
    /// `VIRT_PHY` addresses the physical device; other values select a
    /// virtual instance hosted by an emulator role.
    pub virt_id: u8,
    /// Must be zero on compose; carried verbatim on parse.
    pub reserved: u8,
    /// Sender milliseconds since boot, 48 bits on the wire (diagnostic).
    pub ts_ms: u64,
    /// Copy of the sender MAC for fast policy checks.
    pub sender_mac: MacAddr,
    pub sender_role: u8,
}

impl Header {
    /// A header for a fresh outbound frame.
    pub fn new(msg: MsgType, flags: FrameFlags, seq: u16) -> Self {
        Header {
            proto_ver: PROTO_VER,
            msg_type: msg.as_u8(),
            flags,
            seq,
            topo_ver: 0,
            virt_id: VIRT_PHY,
            reserved: 0,
            ts_ms: 0,
            sender_mac: MacAddr::ZERO,
            sender_role: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.proto_ver;
        out[1] = self.msg_type;
        out[2..4].copy_from_slice(&self.flags.bits().to_le_bytes());
        out[4..6].copy_from_slice(&self.seq.to_le_bytes());
        out[6..8].copy_from_slice(&self.topo_ver.to_le_bytes());
        out[8] = self.virt_id;
        out[9] = self.reserved;
        // 48-bit millisecond timestamp, low byte first.
        let ts = self.ts_ms.to_le_bytes();
        out[10..16].copy_from_slice(&ts[..6]);
        out[16..22].copy_from_slice(self.sender_mac.octets());
        out[22] = self.sender_role;
        out
    }

    /// Decodes a header from `raw[..HEADER_LEN]`. The caller guarantees the
    /// length; version checking is the parser's job.
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let mut ts = [0u8; 8];
        ts[..6].copy_from_slice(&raw[10..16]);
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&raw[16..22]);
        Header {
            proto_ver: raw[0],
            msg_type: raw[1],
            flags: FrameFlags::from_bits_retain(u16::from_le_bytes([raw[2], raw[3]])),
            seq: u16::from_le_bytes([raw[4], raw[5]]),
            topo_ver: u16::from_le_bytes([raw[6], raw[7]]),
            virt_id: raw[8],
            reserved: raw[9],
            ts_ms: u64::from_le_bytes(ts),
            sender_mac: MacAddr(mac),
            sender_role: raw[22],
        }
    }
}
