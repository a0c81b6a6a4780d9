//! Sensor emulator: deterministic synthetic readings per virtual bank.
//!
//! No RNG anywhere. Each bank owns a phase counter advanced by `tick()`;
//! the sample values are fixed integer mixes of phase and bank index, so a
//! given (bank, phase, time) always reproduces the same report.

use driveway_wire::{Frame, MacAddr, MsgType, PingBody, Role, SensReportHdr, VIRT_PHY};

use crate::adapters::{Identity, RoleAdapter};
use crate::config::SEMU_MAX_BANKS;

/// On-wire blob format (version 1), 14 bytes.
const FMT_V1: u16 = 0x0001;
const SAMPLE_LEN: usize = 14;

/// One synthetic reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sample {
    t_ms: u32,
    temp_c_x10: i16,
    humi_x10: u16,
    lux: u16,
    dist_mm: u16,
    status: u16,
}

impl Sample {
    fn to_bytes(self) -> [u8; SAMPLE_LEN] {
        let mut out = [0u8; SAMPLE_LEN];
        out[0..4].copy_from_slice(&self.t_ms.to_le_bytes());
        out[4..6].copy_from_slice(&self.temp_c_x10.to_le_bytes());
        out[6..8].copy_from_slice(&self.humi_x10.to_le_bytes());
        out[8..10].copy_from_slice(&self.lux.to_le_bytes());
        out[10..12].copy_from_slice(&self.dist_mm.to_le_bytes());
        out[12..14].copy_from_slice(&self.status.to_le_bytes());
        out
    }
}

pub struct SemuAdapter {
    id: Identity,
    banks: u8,
    phase: [u32; SEMU_MAX_BANKS],
}

impl SemuAdapter {
    /// `banks` is clamped to 1..=[`SEMU_MAX_BANKS`].
    pub fn new(id: Identity, banks: u8) -> Self {
        SemuAdapter {
            id,
            banks: banks.clamp(1, SEMU_MAX_BANKS as u8),
            phase: [0; SEMU_MAX_BANKS],
        }
    }

    pub fn banks(&self) -> u8 {
        self.banks
    }

    fn valid_bank(&self, virt: u8) -> bool {
        virt < self.banks
    }

    fn sample(&self, virt: u8, now_ms: u64) -> Sample {
        // Knuth multiplicative mixes keep banks decorrelated without RNG.
        let seed = u32::from(virt).wrapping_mul(2_654_435_761);
        let phase = self.phase[virt as usize]
            .wrapping_mul(1_103_515_245)
            .wrapping_add(seed);

        Sample {
            t_ms: now_ms as u32,
            temp_c_x10: 220 + (phase % 61) as i16,          // 22.0..28.0 C
            humi_x10: 350 + ((phase >> 4) % 301) as u16,    // 35.0..65.0 %
            lux: 50 + ((phase >> 7) % 901) as u16,          // 50..950
            dist_mm: 200 + ((phase >> 10) % 1601) as u16,   // 200..1800 mm
            status: 0x000F,
        }
    }
}

impl RoleAdapter for SemuAdapter {
    fn role(&self) -> Role {
        Role::Semu
    }

    fn handle(&mut self, _src: MacAddr, frame: &Frame, now_ms: u64) -> Option<Frame> {
        let hdr = frame.header();
        let virt = hdr.virt_id;
        if virt == VIRT_PHY || !self.valid_bank(virt) {
            return None;
        }

        match MsgType::from_u8(hdr.msg_type)? {
            MsgType::SensReport => {
                let sample = self.sample(virt, now_ms);
                let head = SensReportHdr {
                    bytes: SAMPLE_LEN as u16,
                    fmt: FMT_V1,
                };
                let mut body = [0u8; SensReportHdr::SIZE + SAMPLE_LEN];
                body[..SensReportHdr::SIZE].copy_from_slice(&head.to_bytes());
                body[SensReportHdr::SIZE..].copy_from_slice(&sample.to_bytes());

                self.id
                    .reply(MsgType::SensReport, hdr.seq, virt, now_ms, &body)
            }

            MsgType::Ping => {
                let sample = self.sample(virt, now_ms);
                let body = PingBody {
                    state_bits: sample.status,
                    temp_c_x10: sample.temp_c_x10 as u16,
                    uptime_s: ((now_ms / 1000) & 0xFFFF) as u16,
                    reserved: 0,
                };
                self.id
                    .reply(MsgType::PingReply, hdr.seq, virt, now_ms, &body.to_bytes())
            }

            _ => None,
        }
    }

    fn tick(&mut self, _now_ms: u64) {
        for phase in self.phase.iter_mut() {
            *phase = phase.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driveway_wire::{DeviceToken, FrameFlags, Header};

    const SRC: MacAddr = MacAddr([6, 6, 6, 6, 6, 6]);

    fn adapter() -> SemuAdapter {
        SemuAdapter::new(
            Identity::new(DeviceToken([0x11; 16]), None, MacAddr([8; 6]), Role::Semu, 0),
            4,
        )
    }

    fn request(msg: MsgType, virt: u8, seq: u16) -> Frame {
        let mut hdr = Header::new(msg, FrameFlags::empty(), seq);
        hdr.virt_id = virt;
        hdr.sender_role = Role::Icm.as_u8();
        Frame::compose(&hdr, &DeviceToken([0xA0; 16]), None, &[]).unwrap()
    }

    fn sample_bytes(reply: &Frame) -> std::vec::Vec<u8> {
        reply.body()[SensReportHdr::SIZE..].to_vec()
    }

    #[test]
    fn reports_are_reproducible() {
        let mut a = adapter();
        let mut b = adapter();

        let ra = a.handle(SRC, &request(MsgType::SensReport, 1, 10), 5_000).unwrap();
        let rb = b.handle(SRC, &request(MsgType::SensReport, 1, 10), 5_000).unwrap();
        assert_eq!(ra.as_bytes(), rb.as_bytes());

        let head = SensReportHdr::decode(ra.body()).unwrap();
        assert_eq!(head.fmt, FMT_V1);
        assert_eq!(head.bytes as usize, SAMPLE_LEN);
    }

    #[test]
    fn banks_produce_distinct_streams() {
        let mut semu = adapter();
        let r0 = semu.handle(SRC, &request(MsgType::SensReport, 0, 1), 1_000).unwrap();
        let r1 = semu.handle(SRC, &request(MsgType::SensReport, 1, 1), 1_000).unwrap();
        assert_ne!(sample_bytes(&r0), sample_bytes(&r1));
    }

    #[test]
    fn phase_advances_in_tick() {
        let mut semu = adapter();
        let before = semu.handle(SRC, &request(MsgType::SensReport, 0, 1), 1_000).unwrap();
        semu.tick(1_001);
        let after = semu.handle(SRC, &request(MsgType::SensReport, 0, 2), 1_000).unwrap();
        assert_ne!(sample_bytes(&before), sample_bytes(&after));
    }

    #[test]
    fn values_stay_in_their_bands() {
        let mut semu = adapter();
        for step in 0..200 {
            let reply = semu
                .handle(SRC, &request(MsgType::SensReport, 2, step), u64::from(step))
                .unwrap();
            let blob = sample_bytes(&reply);
            let temp = i16::from_le_bytes([blob[4], blob[5]]);
            let humi = u16::from_le_bytes([blob[6], blob[7]]);
            let lux = u16::from_le_bytes([blob[8], blob[9]]);
            let dist = u16::from_le_bytes([blob[10], blob[11]]);

            assert!((220..=280).contains(&temp));
            assert!((350..=650).contains(&humi));
            assert!((50..=950).contains(&lux));
            assert!((200..=1800).contains(&dist));
            semu.tick(0);
        }
    }

    #[test]
    fn physical_virt_id_is_ignored() {
        let mut semu = adapter();
        assert!(semu.handle(SRC, &request(MsgType::SensReport, VIRT_PHY, 1), 0).is_none());
        assert!(semu.handle(SRC, &request(MsgType::Ping, 4, 1), 0).is_none());
    }

    #[test]
    fn ping_mirrors_the_synthetic_status() {
        let mut semu = adapter();
        let reply = semu.handle(SRC, &request(MsgType::Ping, 0, 3), 12_000).unwrap();
        let body = PingBody::decode(reply.body()).unwrap();
        assert_eq!(body.state_bits, 0x000F);
        assert_eq!(body.uptime_s, 12);
    }
}
