//! Policy gates and dispatch to the local role adapter.
//!
//! The header names only the sender's role, so routing always targets the
//! adapter registered for this device's role; a node normally registers
//! exactly one.

use bitmaps::Bitmap;

use driveway_driver::{KvStore, Radio};
use driveway_util::{info, trace};
use driveway_wire::{Frame, MacAddr, MsgType, Role};

use crate::adapters::RoleAdapter;
use crate::stack::Stack;

const ROLE_SLOTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteResult {
    Ok,
    /// No adapter registered for the local role.
    NoAdapter,
    /// Privilege or topology-flag violation; silent from the peer's view.
    Policy,
    /// The adapter does not handle this opcode.
    Unimplemented,
}

/// ICM-only opcodes: topology push, channel set, time sync and the firmware
/// transport range.
fn allowed_by_role(msg_type: u8, sender: Role) -> bool {
    if MsgType::is_fw(msg_type) {
        return sender == Role::Icm;
    }
    match MsgType::from_u8(msg_type) {
        Some(MsgType::TopoPush) | Some(MsgType::NetSetChan) | Some(MsgType::TimeSync) => {
            sender == Role::Icm
        }
        Some(MsgType::SensReport) => sender == Role::Sens || sender == Role::Semu,
        Some(MsgType::PmsStatus) => sender == Role::Pms,
        _ => true,
    }
}

/// Topology-bound opcodes must arrive with the topology token.
fn requires_topo(msg_type: u8) -> bool {
    matches!(
        MsgType::from_u8(msg_type),
        Some(MsgType::CtrlRelay) | Some(MsgType::ConfigWrite) | Some(MsgType::TopoPush)
    )
}

pub struct Router<'a> {
    local_role: Role,
    adapters: [Option<&'a mut dyn RoleAdapter>; ROLE_SLOTS],
    /// One-shot diagnostics: each unimplemented opcode is logged once.
    seen_unimpl: Bitmap<256>,
}

impl<'a> Router<'a> {
    pub fn new(local_role: Role) -> Self {
        Router {
            local_role,
            adapters: [None, None, None, None, None, None],
            seen_unimpl: Bitmap::new(),
        }
    }

    pub fn local_role(&self) -> Role {
        self.local_role
    }

    /// Registers an adapter under the role it reports.
    pub fn register(&mut self, adapter: &'a mut dyn RoleAdapter) {
        let idx = adapter.role().as_u8() as usize;
        self.adapters[idx] = Some(adapter);
    }

    /// Periodic housekeeping for the local adapter (pulse sweeps, caches).
    pub fn tick(&mut self, now_ms: u64) {
        if let Some(adapter) = self.adapters[self.local_role.as_u8() as usize].as_mut() {
            adapter.tick(now_ms);
        }
    }

    /// Routes one admitted frame; a composed reply is queued via the stack.
    pub fn route<R: Radio, K: KvStore>(
        &mut self,
        src: MacAddr,
        frame: &Frame,
        stack: &mut Stack<'_, R, K>,
        now_ms: u64,
    ) -> RouteResult {
        let idx = self.local_role.as_u8() as usize;
        let Some(adapter) = self.adapters[idx].as_mut() else {
            trace!("no adapter for local role {}", self.local_role.as_u8());
            return RouteResult::NoAdapter;
        };

        let hdr = frame.header();
        let Some(sender_role) = Role::from_u8(hdr.sender_role) else {
            return RouteResult::Policy;
        };
        if !allowed_by_role(hdr.msg_type, sender_role) {
            trace!(
                "privilege reject: op {:#04x} from role {}",
                hdr.msg_type,
                hdr.sender_role
            );
            return RouteResult::Policy;
        }
        if requires_topo(hdr.msg_type) && !frame.has_topo() {
            trace!("policy reject: op {:#04x} without topology token", hdr.msg_type);
            return RouteResult::Policy;
        }

        match adapter.handle(src, frame, now_ms) {
            Some(reply) => {
                let reliable = reply.reliable();
                stack.send(src, &reply, reliable, now_ms);
                RouteResult::Ok
            }
            None => {
                if !self.seen_unimpl.set(hdr.msg_type as usize, true) {
                    info!(
                        "unimplemented op {:#04x} for role {}",
                        hdr.msg_type,
                        self.local_role.as_u8()
                    );
                }
                RouteResult::Unimplemented
            }
        }
    }
}
