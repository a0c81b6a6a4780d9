//! Role adapters: one per device role, dispatched by the router.

mod icm;
mod pms;
mod rel;
mod remu;
mod sens;
mod semu;

pub use icm::IcmAdapter;
pub use pms::PmsAdapter;
pub use rel::RelAdapter;
pub use remu::RemuAdapter;
pub use sens::SensAdapter;
pub use semu::SemuAdapter;

use driveway_wire::{
    ComposeError, DeviceToken, Frame, FrameFlags, Header, MacAddr, MsgType, Role, TopoToken,
};

/// Contract for role-specific handlers.
pub trait RoleAdapter {
    fn role(&self) -> Role;

    /// Handles one admitted frame, optionally producing a reply. Replies
    /// echo the caller's sequence number so its ACK matcher correlates, and
    /// never exceed the body budget.
    fn handle(&mut self, src: MacAddr, frame: &Frame, now_ms: u64) -> Option<Frame>;

    /// Periodic housekeeping (pulse sweeps, cache refresh).
    fn tick(&mut self, _now_ms: u64) {}
}

/// What a node says about itself in every frame it composes: credentials,
/// MAC, role and topology epoch.
#[derive(Debug, Clone)]
pub struct Identity {
    pub auth: DeviceToken,
    /// Replies carry the topology token (and set `HAS_TOPO`) iff present.
    pub topo: Option<TopoToken>,
    pub mac: MacAddr,
    pub role: Role,
    pub topo_ver: u16,
}

impl Identity {
    pub fn new(
        auth: DeviceToken,
        topo: Option<TopoToken>,
        mac: MacAddr,
        role: Role,
        topo_ver: u16,
    ) -> Self {
        Identity {
            auth,
            topo,
            mac,
            role,
            topo_ver,
        }
    }

    /// A fully stamped header for an outbound frame.
    pub fn header(&self, msg: MsgType, seq: u16, virt_id: u8, now_ms: u64) -> Header {
        let mut flags = FrameFlags::empty();
        if self.topo.is_some() {
            flags |= FrameFlags::HAS_TOPO;
        }
        let mut hdr = Header::new(msg, flags, seq);
        hdr.topo_ver = self.topo_ver;
        hdr.virt_id = virt_id;
        hdr.ts_ms = now_ms;
        hdr.sender_mac = self.mac;
        hdr.sender_role = self.role.as_u8();
        hdr
    }

    /// Composes a reply echoing `echo_seq`. Bodies produced by adapters are
    /// bounded, so composition only fails on contract bugs.
    pub fn reply(
        &self,
        msg: MsgType,
        echo_seq: u16,
        virt_id: u8,
        now_ms: u64,
        body: &[u8],
    ) -> Option<Frame> {
        self.compose(msg, echo_seq, virt_id, now_ms, body).ok()
    }

    pub fn compose(
        &self,
        msg: MsgType,
        seq: u16,
        virt_id: u8,
        now_ms: u64,
        body: &[u8],
    ) -> Result<Frame, ComposeError> {
        Frame::compose(
            &self.header(msg, seq, virt_id, now_ms),
            &self.auth,
            self.topo.as_ref(),
            body,
        )
    }
}

/// Uptime seconds as carried by ping replies, clamped.
pub(crate) fn uptime_s(now_ms: u64) -> u16 {
    (now_ms / 1000).min(u64::from(u16::MAX)) as u16
}
