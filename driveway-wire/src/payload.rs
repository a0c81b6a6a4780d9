//! Packed little-endian payload bodies from the message catalog.
//!
//! Each body decodes from a byte slice that is at least `SIZE` long (trailing
//! bytes are the next layer's business) and encodes to exactly `SIZE` bytes.

/// PAIR_ACK body: pairing outcome plus the current channel hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairAck {
    pub ok: u8,
    pub chan: u8,
    pub reserved: u16,
}

impl PairAck {
    pub const SIZE: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.ok;
        out[1] = self.chan;
        out[2..4].copy_from_slice(&self.reserved.to_le_bytes());
        out
    }

    pub fn decode(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(PairAck {
            ok: b[0],
            chan: b[1],
            reserved: u16::from_le_bytes([b[2], b[3]]),
        })
    }
}

/// PING / PING_REPLY body. Kept tiny so it fits everywhere without
/// fragmentation; `state_bits` are adapter-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingBody {
    pub state_bits: u16,
    /// Optional temperature ×10 (e.g. 253 = 25.3 °C).
    pub temp_c_x10: u16,
    /// Uptime seconds, clamped.
    pub uptime_s: u16,
    pub reserved: u16,
}

impl PingBody {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.state_bits.to_le_bytes());
        out[2..4].copy_from_slice(&self.temp_c_x10.to_le_bytes());
        out[4..6].copy_from_slice(&self.uptime_s.to_le_bytes());
        out[6..8].copy_from_slice(&self.reserved.to_le_bytes());
        out
    }

    pub fn decode(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(PingBody {
            state_bits: u16::from_le_bytes([b[0], b[1]]),
            temp_c_x10: u16::from_le_bytes([b[2], b[3]]),
            uptime_s: u16::from_le_bytes([b[4], b[5]]),
            reserved: u16::from_le_bytes([b[6], b[7]]),
        })
    }
}

/// TIME_SYNC body: epoch milliseconds split low/high plus a correction hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSync {
    pub epoch_ms_lo: u32,
    pub epoch_ms_hi: u32,
    pub drift_ms: i16,
    pub reserved: u16,
}

impl TimeSync {
    pub const SIZE: usize = 12;

    pub fn from_epoch_ms(epoch_ms: u64) -> Self {
        TimeSync {
            epoch_ms_lo: epoch_ms as u32,
            epoch_ms_hi: (epoch_ms >> 32) as u32,
            drift_ms: 0,
            reserved: 0,
        }
    }

    pub fn epoch_ms(&self) -> u64 {
        u64::from(self.epoch_ms_lo) | (u64::from(self.epoch_ms_hi) << 32)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.epoch_ms_lo.to_le_bytes());
        out[4..8].copy_from_slice(&self.epoch_ms_hi.to_le_bytes());
        out[8..10].copy_from_slice(&self.drift_ms.to_le_bytes());
        out[10..12].copy_from_slice(&self.reserved.to_le_bytes());
        out
    }

    pub fn decode(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(TimeSync {
            epoch_ms_lo: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            epoch_ms_hi: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            drift_ms: i16::from_le_bytes([b[8], b[9]]),
            reserved: u16::from_le_bytes([b[10], b[11]]),
        })
    }
}

/// NET_SET_CHAN body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetSetChan {
    /// 2.4 GHz channel, 1..=13.
    pub channel: u8,
}

impl NetSetChan {
    pub const SIZE: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.channel, 0, 0, 0]
    }

    pub fn decode(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(NetSetChan { channel: b[0] })
    }
}

/// Relay operation selector in [`CtrlRelay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelayOp {
    Off = 0,
    On = 1,
    Toggle = 2,
}

impl RelayOp {
    pub const fn from_u8(value: u8) -> Option<RelayOp> {
        match value {
            0 => Some(RelayOp::Off),
            1 => Some(RelayOp::On),
            2 => Some(RelayOp::Toggle),
            _ => None,
        }
    }
}

/// CTRL_RELAY body. `op` is raw so unknown operations can be ignored rather
/// than failing the decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlRelay {
    pub channel: u8,
    pub op: u8,
    /// When > 0 and the resulting state is ON, auto-OFF after this many ms.
    pub pulse_ms: u16,
}

impl CtrlRelay {
    pub const SIZE: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.channel;
        out[1] = self.op;
        out[2..4].copy_from_slice(&self.pulse_ms.to_le_bytes());
        out
    }

    pub fn decode(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(CtrlRelay {
            channel: b[0],
            op: b[1],
            pulse_ms: u16::from_le_bytes([b[2], b[3]]),
        })
    }
}

/// RLY_STATE body: per-channel ON bitmap plus the local topology version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RlyState {
    /// Bit i = channel i ON.
    pub mask: u32,
    pub topo_ver: u16,
    /// Number of channels mapped.
    pub count: u8,
    pub reserved: u8,
}

impl RlyState {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.mask.to_le_bytes());
        out[4..6].copy_from_slice(&self.topo_ver.to_le_bytes());
        out[6] = self.count;
        out[7] = self.reserved;
        out
    }

    pub fn decode(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(RlyState {
            mask: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            topo_ver: u16::from_le_bytes([b[4], b[5]]),
            count: b[6],
            reserved: b[7],
        })
    }
}

/// SENS_REPORT header; an adapter-defined blob of `bytes` bytes follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensReportHdr {
    pub bytes: u16,
    /// Adapter-defined format version.
    pub fmt: u16,
}

impl SensReportHdr {
    pub const SIZE: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.bytes.to_le_bytes());
        out[2..4].copy_from_slice(&self.fmt.to_le_bytes());
        out
    }

    pub fn decode(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(SensReportHdr {
            bytes: u16::from_le_bytes([b[0], b[1]]),
            fmt: u16::from_le_bytes([b[2], b[3]]),
        })
    }
}

/// PMS_STATUS body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PmsStatus {
    /// Board temperature ×10.
    pub temp_c_x10: i16,
    pub vbus_mv: u16,
    pub vsys_mv: u16,
    /// Signed for charge/regen.
    pub iout_ma: i16,
    pub faults: u16,
}

impl PmsStatus {
    pub const SIZE: usize = 10;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.temp_c_x10.to_le_bytes());
        out[2..4].copy_from_slice(&self.vbus_mv.to_le_bytes());
        out[4..6].copy_from_slice(&self.vsys_mv.to_le_bytes());
        out[6..8].copy_from_slice(&self.iout_ma.to_le_bytes());
        out[8..10].copy_from_slice(&self.faults.to_le_bytes());
        out
    }

    pub fn decode(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(PmsStatus {
            temp_c_x10: i16::from_le_bytes([b[0], b[1]]),
            vbus_mv: u16::from_le_bytes([b[2], b[3]]),
            vsys_mv: u16::from_le_bytes([b[4], b[5]]),
            iout_ma: i16::from_le_bytes([b[6], b[7]]),
            faults: u16::from_le_bytes([b[8], b[9]]),
        })
    }
}

/// CONFIG_WRITE key that routes to set-channel (data = one channel byte).
pub const CONFIG_KEY_CHANNEL: [u8; 6] = *b"CHAN__";

/// CONFIG_WRITE key namespace prefix for cooling duty (data\[0\] = percent).
pub const CONFIG_KEY_COOLING_PREFIX: [u8; 4] = *b"COOL";

/// CONFIG_WRITE body header; `len` raw value bytes follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigWrite {
    /// Namespace + id, 6 bytes.
    pub key: [u8; 6],
    pub len: u16,
}

impl ConfigWrite {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..6].copy_from_slice(&self.key);
        out[6..8].copy_from_slice(&self.len.to_le_bytes());
        out
    }

    pub fn decode(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        let mut key = [0u8; 6];
        key.copy_from_slice(&b[0..6]);
        Some(ConfigWrite {
            key,
            len: u16::from_le_bytes([b[6], b[7]]),
        })
    }

    /// The value bytes following the header inside `body`, bounded by `len`.
    pub fn data<'a>(&self, body: &'a [u8]) -> Option<&'a [u8]> {
        let tail = body.get(Self::SIZE..)?;
        tail.get(..self.len as usize)
    }
}
