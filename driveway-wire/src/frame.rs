//! Frame composition and parsing.
//!
//! Wire order: header (23 B), device token (16 B), topology token (16 B, iff
//! `HAS_TOPO`), body (0..=200 B). The parser is pure and side-effect free;
//! admission and policy live in the transport and router layers.

use crate::{
    DeviceToken, FrameFlags, Header, MacAddr, TopoToken, HEADER_LEN, MAX_BODY, MAX_FRAME,
    PROTO_VER,
};

/// Minimum encoded frame: header plus device token.
const PREFIX_MIN: usize = HEADER_LEN + DeviceToken::LEN;

/// Encoded prefix length (header + tokens) for the given flags.
pub const fn prefix_len(flags: FrameFlags) -> usize {
    if flags.contains(FrameFlags::HAS_TOPO) {
        PREFIX_MIN + TopoToken::LEN
    } else {
        PREFIX_MIN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Shorter than header plus device token.
    TooSmall,
    /// `proto_ver` mismatch.
    BadVersion,
    /// `HAS_TOPO` is set but the topology token does not fit.
    FlagMismatch,
    /// Total length exceeds the frame budget.
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeError {
    /// Header carries a foreign `proto_ver`.
    BadVersion,
    /// Topology token presence disagrees with the `HAS_TOPO` flag.
    FlagMismatch,
    /// Body or total frame would exceed the budget.
    Overflow,
}

/// One encoded frame in a stable backing buffer.
///
/// Accessors decode on the fly; callers that read the same field repeatedly
/// should cache the decoded [`Header`] locally.
#[derive(Clone)]
pub struct Frame {
    buf: [u8; MAX_FRAME],
    len: u16,
}

impl Frame {
    /// Lays out header, device token, optional topology token and body.
    pub fn compose(
        hdr: &Header,
        dev: &DeviceToken,
        topo: Option<&TopoToken>,
        body: &[u8],
    ) -> Result<Frame, ComposeError> {
        if hdr.proto_ver != PROTO_VER {
            return Err(ComposeError::BadVersion);
        }
        if hdr.flags.contains(FrameFlags::HAS_TOPO) != topo.is_some() {
            return Err(ComposeError::FlagMismatch);
        }
        if body.len() > MAX_BODY {
            return Err(ComposeError::Overflow);
        }
        let prefix = prefix_len(hdr.flags);
        let total = prefix + body.len();
        if total > MAX_FRAME {
            return Err(ComposeError::Overflow);
        }

        let mut buf = [0u8; MAX_FRAME];
        buf[..HEADER_LEN].copy_from_slice(&hdr.encode());
        buf[HEADER_LEN..PREFIX_MIN].copy_from_slice(dev.as_bytes());
        if let Some(topo) = topo {
            buf[PREFIX_MIN..prefix].copy_from_slice(topo.as_bytes());
        }
        buf[prefix..total].copy_from_slice(body);

        Ok(Frame {
            buf,
            len: total as u16,
        })
    }

    /// Copies raw bytes into a stable buffer and validates the layout.
    pub fn parse(raw: &[u8]) -> Result<Frame, ParseError> {
        if raw.len() < PREFIX_MIN {
            return Err(ParseError::TooSmall);
        }
        if raw.len() > MAX_FRAME {
            return Err(ParseError::Overflow);
        }
        if raw[0] != PROTO_VER {
            return Err(ParseError::BadVersion);
        }

        let flags = FrameFlags::from_bits_retain(u16::from_le_bytes([raw[2], raw[3]]));
        if flags.contains(FrameFlags::HAS_TOPO) && raw.len() < prefix_len(flags) {
            return Err(ParseError::FlagMismatch);
        }

        let mut buf = [0u8; MAX_FRAME];
        buf[..raw.len()].copy_from_slice(raw);
        Ok(Frame {
            buf,
            len: raw.len() as u16,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn header(&self) -> Header {
        let mut hdr = [0u8; HEADER_LEN];
        hdr.copy_from_slice(&self.buf[..HEADER_LEN]);
        Header::decode(&hdr)
    }

    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_bits_retain(u16::from_le_bytes([self.buf[2], self.buf[3]]))
    }

    pub fn seq(&self) -> u16 {
        u16::from_le_bytes([self.buf[4], self.buf[5]])
    }

    pub fn sender_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buf[16..22]);
        MacAddr(mac)
    }

    pub fn device_token(&self) -> DeviceToken {
        let mut tok = [0u8; 16];
        tok.copy_from_slice(&self.buf[HEADER_LEN..PREFIX_MIN]);
        DeviceToken(tok)
    }

    pub fn topo_token(&self) -> Option<TopoToken> {
        if !self.has_topo() {
            return None;
        }
        let mut tok = [0u8; 16];
        tok.copy_from_slice(&self.buf[PREFIX_MIN..PREFIX_MIN + TopoToken::LEN]);
        Some(TopoToken(tok))
    }

    pub fn body(&self) -> &[u8] {
        &self.buf[prefix_len(self.flags())..self.len as usize]
    }

    pub fn has_topo(&self) -> bool {
        self.flags().contains(FrameFlags::HAS_TOPO)
    }

    pub fn reliable(&self) -> bool {
        self.flags().contains(FrameFlags::RELIABLE)
    }

    pub fn urgent(&self) -> bool {
        self.flags().contains(FrameFlags::URGENT)
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let hdr = self.header();
        f.debug_struct("Frame")
            .field("msg_type", &hdr.msg_type)
            .field("flags", &hdr.flags)
            .field("seq", &hdr.seq)
            .field("len", &self.len)
            .finish()
    }
}
