//! Relay emulator: independent virtual relay banks selected by `virt_id`.

use heapless::Vec;

use driveway_util::warn;
use driveway_wire::{CtrlRelay, Frame, MacAddr, MsgType, RelayOp, Role, RlyState, VIRT_PHY};

use crate::adapters::{Identity, RoleAdapter};
use crate::config::{MAX_PENDING_PULSES, REMU_DEFAULT_CHANNELS, REMU_MAX_BANKS};

#[derive(Clone, Copy)]
struct Pulse {
    bank: u8,
    idx: u8,
    off_at_ms: u64,
}

/// Same operation set as the physical relay adapter, scoped per bank. Frames
/// addressed to the physical instance (`virt_id == 0xFF`) are ignored.
pub struct RemuAdapter {
    id: Identity,
    banks: u8,
    channels_per_bank: u8,
    state: [u32; REMU_MAX_BANKS],
    pulses: Vec<Pulse, MAX_PENDING_PULSES>,
}

impl RemuAdapter {
    /// `banks` is clamped to 1..=[`REMU_MAX_BANKS`], `channels_per_bank` to
    /// 32 (one mask word per bank).
    pub fn new(id: Identity, banks: u8, channels_per_bank: u8) -> Self {
        RemuAdapter {
            id,
            banks: banks.clamp(1, REMU_MAX_BANKS as u8),
            channels_per_bank: channels_per_bank.min(32),
            state: [0; REMU_MAX_BANKS],
            pulses: Vec::new(),
        }
    }

    /// The stock emulator shape: every bank, default channel count.
    pub fn with_defaults(id: Identity) -> Self {
        Self::new(id, REMU_MAX_BANKS as u8, REMU_DEFAULT_CHANNELS)
    }

    pub fn set_topo_version(&mut self, version: u16) {
        self.id.topo_ver = version;
    }

    pub fn banks(&self) -> u8 {
        self.banks
    }

    pub fn channels_per_bank(&self) -> u8 {
        self.channels_per_bank
    }

    fn valid_bank(&self, virt: u8) -> bool {
        virt < self.banks
    }

    fn state_body(&self, bank: u8) -> RlyState {
        RlyState {
            mask: self.state[bank as usize],
            topo_ver: self.id.topo_ver,
            count: self.channels_per_bank,
            reserved: 0,
        }
    }

    fn apply(&mut self, bank: u8, req: &CtrlRelay, now_ms: u64) -> bool {
        if req.channel >= self.channels_per_bank {
            return false;
        }
        let bit = 1u32 << req.channel;
        let mask = &mut self.state[bank as usize];
        match RelayOp::from_u8(req.op) {
            Some(RelayOp::Off) => *mask &= !bit,
            Some(RelayOp::On) => *mask |= bit,
            Some(RelayOp::Toggle) => *mask ^= bit,
            None => return false,
        }

        if req.pulse_ms > 0 && *mask & bit != 0 {
            let pulse = Pulse {
                bank,
                idx: req.channel,
                off_at_ms: now_ms + u64::from(req.pulse_ms),
            };
            if self.pulses.push(pulse).is_err() {
                warn!("pulse table full, auto-OFF now for bank {}", bank);
                self.state[bank as usize] &= !bit;
            }
        }
        true
    }
}

impl RoleAdapter for RemuAdapter {
    fn role(&self) -> Role {
        Role::Remu
    }

    fn handle(&mut self, _src: MacAddr, frame: &Frame, now_ms: u64) -> Option<Frame> {
        let hdr = frame.header();
        let bank = hdr.virt_id;
        if bank == VIRT_PHY || !self.valid_bank(bank) {
            return None;
        }

        match MsgType::from_u8(hdr.msg_type)? {
            MsgType::CtrlRelay => {
                let req = CtrlRelay::decode(frame.body())?;
                if !self.apply(bank, &req, now_ms) {
                    return None;
                }
                let state = self.state_body(bank);
                // The caller's virt_id goes back out so its router can map
                // the reply to the right virtual node.
                self.id
                    .reply(MsgType::RlyState, hdr.seq, bank, now_ms, &state.to_bytes())
            }

            MsgType::RlyState => {
                let state = self.state_body(bank);
                self.id
                    .reply(MsgType::RlyState, hdr.seq, bank, now_ms, &state.to_bytes())
            }

            _ => None,
        }
    }

    fn tick(&mut self, now_ms: u64) {
        let mut i = 0;
        while i < self.pulses.len() {
            if self.pulses[i].off_at_ms <= now_ms {
                let pulse = self.pulses.swap_remove(i);
                self.state[pulse.bank as usize] &= !(1u32 << pulse.idx);
            } else {
                i += 1;
            }
        }
    }
}
