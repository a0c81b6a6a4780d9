//! Wire contract for the driveway mesh, profile v3-T (token-only).
//!
//! Every frame carries a 16-byte device token for admission; topology-bound
//! operations additionally carry a 16-byte topology token and set
//! [`FrameFlags::HAS_TOPO`]. There is no HMAC or signature trailer; integrity
//! is best-effort (length checks only). All integers are little-endian and
//! all on-wire structures are packed, so multi-byte fields are copied through
//! byte operations instead of relying on host alignment.

#![cfg_attr(not(test), no_std)]

mod frame;
mod header;
mod payload;

pub use frame::{prefix_len, ComposeError, Frame, ParseError};
pub use header::{Header, HEADER_LEN};
pub use payload::*;

use core::fmt;

use bitflags::bitflags;

/// Protocol version byte (v3-T).
pub const PROTO_VER: u8 = 0x31;

/// Conservative radio MTU guard: total encoded frame size.
pub const MAX_FRAME: usize = 250;

/// Safe body size (no fragmentation).
pub const MAX_BODY: usize = 200;

/// `virt_id` value addressing the physical device instance.
pub const VIRT_PHY: u8 = 0xFF;

bitflags! {
    /// Header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u16 {
        /// Expect a reply echoing the frame's sequence number; the sender's
        /// scheduler retries until one arrives or retries are exhausted.
        const RELIABLE = 1 << 0;
        /// Route through the urgent TX queue.
        const URGENT = 1 << 1;
        /// A topology token follows the device token.
        const HAS_TOPO = 1 << 2;
    }
}

/// Device role. A device has exactly one role for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    /// Interface Control Module (admin/control plane).
    Icm = 0,
    /// Power management supply.
    Pms = 1,
    /// Physical relay node.
    Rel = 2,
    /// Relay emulator.
    Remu = 3,
    /// Sensor emulator.
    Semu = 4,
    /// Physical sensor node.
    Sens = 5,
}

impl Role {
    pub const fn from_u8(value: u8) -> Option<Role> {
        match value {
            0 => Some(Role::Icm),
            1 => Some(Role::Pms),
            2 => Some(Role::Rel),
            3 => Some(Role::Remu),
            4 => Some(Role::Semu),
            5 => Some(Role::Sens),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Message catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    PairReq = 0x01,
    PairAck = 0x02,
    Ping = 0x03,
    PingReply = 0x04,
    TimeSync = 0x05,

    TopoPush = 0x10,
    NetSetChan = 0x11,

    CtrlRelay = 0x20,
    RlyState = 0x21,

    SensReport = 0x30,
    PmsStatus = 0x31,

    ConfigWrite = 0x40,

    FwBegin = 0x50,
    FwChunk = 0x51,
    FwStatus = 0x52,
    FwCommit = 0x53,
    FwAbort = 0x54,
}

impl MsgType {
    pub const fn from_u8(value: u8) -> Option<MsgType> {
        match value {
            0x01 => Some(MsgType::PairReq),
            0x02 => Some(MsgType::PairAck),
            0x03 => Some(MsgType::Ping),
            0x04 => Some(MsgType::PingReply),
            0x05 => Some(MsgType::TimeSync),
            0x10 => Some(MsgType::TopoPush),
            0x11 => Some(MsgType::NetSetChan),
            0x20 => Some(MsgType::CtrlRelay),
            0x21 => Some(MsgType::RlyState),
            0x30 => Some(MsgType::SensReport),
            0x31 => Some(MsgType::PmsStatus),
            0x40 => Some(MsgType::ConfigWrite),
            0x50 => Some(MsgType::FwBegin),
            0x51 => Some(MsgType::FwChunk),
            0x52 => Some(MsgType::FwStatus),
            0x53 => Some(MsgType::FwCommit),
            0x54 => Some(MsgType::FwAbort),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Firmware transport range (reserved; delivery is not part of the core).
    pub const fn is_fw(value: u8) -> bool {
        value >= MsgType::FwBegin.as_u8() && value <= MsgType::FwAbort.as_u8()
    }
}

/// Opaque 6-byte radio interface identifier. The all-zero MAC is the "none"
/// sentinel and never names a peer.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const LEN: usize = 6;
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub const fn octets(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

macro_rules! token_128 {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            pub const LEN: usize = 16;

            pub const fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0; 16]
            }
        }

        impl From<[u8; 16]> for $name {
            fn from(bytes: [u8; 16]) -> Self {
                $name(bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for b in self.0.iter() {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
        }
    };
}

token_128!(
    /// Per-(device, peer) admission credential; present in every frame.
    /// Opaque to the core; equality-checked against the stored token for the
    /// sender's MAC.
    DeviceToken
);

token_128!(
    /// Device-wide credential authorizing topology-bound operations; present
    /// iff [`FrameFlags::HAS_TOPO`] is set.
    TopoToken
);
