//! Physical relay node adapter.

use heapless::Vec;

use driveway_driver::RelayBank;
use driveway_util::warn;
use driveway_wire::{CtrlRelay, Frame, MacAddr, MsgType, RelayOp, Role, RlyState};

use crate::adapters::{Identity, RoleAdapter};
use crate::config::MAX_PENDING_PULSES;

#[derive(Clone, Copy)]
struct Pulse {
    idx: u8,
    off_at_ms: u64,
}

/// Applies CTRL_RELAY operations to a relay bank and answers state queries.
/// Pulses are non-blocking: the auto-OFF runs from `tick()`.
pub struct RelAdapter<B: RelayBank> {
    bank: B,
    id: Identity,
    pulses: Vec<Pulse, MAX_PENDING_PULSES>,
}

impl<B: RelayBank> RelAdapter<B> {
    pub fn new(bank: B, id: Identity) -> Self {
        RelAdapter {
            bank,
            id,
            pulses: Vec::new(),
        }
    }

    pub fn set_topo_version(&mut self, version: u16) {
        self.id.topo_ver = version;
    }

    fn mask(&self) -> u32 {
        let n = self.bank.channels().min(32);
        (0..n).fold(0u32, |mask, i| {
            if self.bank.get(i) {
                mask | (1 << i)
            } else {
                mask
            }
        })
    }

    fn state_body(&self) -> RlyState {
        RlyState {
            mask: self.mask(),
            topo_ver: self.id.topo_ver,
            count: self.bank.channels(),
            reserved: 0,
        }
    }

    fn apply(&mut self, req: &CtrlRelay, now_ms: u64) -> bool {
        if req.channel >= self.bank.channels() {
            // Out-of-range channel: ignore rather than leak table size.
            return false;
        }
        match RelayOp::from_u8(req.op) {
            Some(RelayOp::Off) => self.bank.set(req.channel, false),
            Some(RelayOp::On) => self.bank.set(req.channel, true),
            Some(RelayOp::Toggle) => self.bank.toggle(req.channel),
            None => return false,
        }

        if req.pulse_ms > 0 && self.bank.get(req.channel) {
            let pulse = Pulse {
                idx: req.channel,
                off_at_ms: now_ms + u64::from(req.pulse_ms),
            };
            if self.pulses.push(pulse).is_err() {
                warn!("pulse table full, auto-OFF now for channel {}", req.channel);
                self.bank.set(req.channel, false);
            }
        }
        true
    }
}

impl<B: RelayBank> RoleAdapter for RelAdapter<B> {
    fn role(&self) -> Role {
        Role::Rel
    }

    fn handle(&mut self, _src: MacAddr, frame: &Frame, now_ms: u64) -> Option<Frame> {
        let hdr = frame.header();
        match MsgType::from_u8(hdr.msg_type)? {
            MsgType::CtrlRelay => {
                let req = CtrlRelay::decode(frame.body())?;
                if !self.apply(&req, now_ms) {
                    return None;
                }
                let state = self.state_body();
                self.id
                    .reply(MsgType::RlyState, hdr.seq, hdr.virt_id, now_ms, &state.to_bytes())
            }

            MsgType::RlyState => {
                let state = self.state_body();
                self.id
                    .reply(MsgType::RlyState, hdr.seq, hdr.virt_id, now_ms, &state.to_bytes())
            }

            _ => None,
        }
    }

    fn tick(&mut self, now_ms: u64) {
        let mut i = 0;
        while i < self.pulses.len() {
            if self.pulses[i].off_at_ms <= now_ms {
                let pulse = self.pulses.swap_remove(i);
                self.bank.set(pulse.idx, false);
            } else {
                i += 1;
            }
        }
    }
}
