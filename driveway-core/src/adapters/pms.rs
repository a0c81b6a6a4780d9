//! Power-supply adapter.

use driveway_driver::{BoardTemp, Cooling, PmsTelemetry};
use driveway_util::info;
use driveway_wire::{
    ConfigWrite, Frame, MacAddr, MsgType, PingBody, PmsStatus, Role, CONFIG_KEY_COOLING_PREFIX,
};

use crate::adapters::{uptime_s, Identity, RoleAdapter};

/// Ping-reply state bits.
const STATE_FAULT: u16 = 1 << 0;
const STATE_FAN_RUNNING: u16 = 1 << 1;

/// Answers status queries from the electrical telemetry and board probe,
/// and applies cooling-duty config writes.
pub struct PmsAdapter<C: Cooling, B: BoardTemp, T: PmsTelemetry> {
    cooling: C,
    temp: B,
    telemetry: T,
    id: Identity,
}

impl<C: Cooling, B: BoardTemp, T: PmsTelemetry> PmsAdapter<C, B, T> {
    pub fn new(cooling: C, temp: B, telemetry: T, id: Identity) -> Self {
        PmsAdapter {
            cooling,
            temp,
            telemetry,
            id,
        }
    }

    pub fn set_topo_version(&mut self, version: u16) {
        self.id.topo_ver = version;
    }

    fn status(&mut self) -> PmsStatus {
        PmsStatus {
            temp_c_x10: self.temp.read_c_x10().unwrap_or(0),
            vbus_mv: self.telemetry.vbus_mv(),
            vsys_mv: self.telemetry.vsys_mv(),
            iout_ma: self.telemetry.iout_ma(),
            faults: self.telemetry.faults(),
        }
    }
}

impl<C: Cooling, B: BoardTemp, T: PmsTelemetry> RoleAdapter for PmsAdapter<C, B, T> {
    fn role(&self) -> Role {
        Role::Pms
    }

    fn handle(&mut self, _src: MacAddr, frame: &Frame, now_ms: u64) -> Option<Frame> {
        let hdr = frame.header();
        match MsgType::from_u8(hdr.msg_type)? {
            MsgType::PmsStatus => {
                let status = self.status();
                self.id
                    .reply(MsgType::PmsStatus, hdr.seq, hdr.virt_id, now_ms, &status.to_bytes())
            }

            MsgType::ConfigWrite => {
                let cfg = ConfigWrite::decode(frame.body())?;
                if cfg.key[..4] != CONFIG_KEY_COOLING_PREFIX {
                    return None;
                }
                let pct = *cfg.data(frame.body())?.first()?;
                self.cooling.set_duty_pct(pct);
                info!("cooling duty set to {}%", pct);

                // The ACK carries refreshed telemetry.
                let status = self.status();
                self.id
                    .reply(MsgType::PmsStatus, hdr.seq, hdr.virt_id, now_ms, &status.to_bytes())
            }

            MsgType::Ping => {
                let status = self.status();
                let mut state_bits = 0;
                if status.faults != 0 {
                    state_bits |= STATE_FAULT;
                }
                if self.cooling.duty_pct() > 0 {
                    state_bits |= STATE_FAN_RUNNING;
                }
                let body = PingBody {
                    state_bits,
                    temp_c_x10: status.temp_c_x10 as u16,
                    uptime_s: uptime_s(now_ms),
                    reserved: 0,
                };
                self.id
                    .reply(MsgType::PingReply, hdr.seq, hdr.virt_id, now_ms, &body.to_bytes())
            }

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driveway_wire::{DeviceToken, FrameFlags, Header, TopoToken};

    #[derive(Default)]
    struct FakeCooling {
        duty: u8,
    }
    impl Cooling for FakeCooling {
        fn set_duty_pct(&mut self, pct: u8) {
            self.duty = pct;
        }
        fn duty_pct(&self) -> u8 {
            self.duty
        }
    }

    struct FakeTemp(Option<i16>);
    impl BoardTemp for FakeTemp {
        fn read_c_x10(&mut self) -> Option<i16> {
            self.0
        }
    }

    struct FakeTelemetry {
        faults: u16,
    }
    impl PmsTelemetry for FakeTelemetry {
        fn vbus_mv(&mut self) -> u16 {
            12_150
        }
        fn vsys_mv(&mut self) -> u16 {
            5_020
        }
        fn iout_ma(&mut self) -> i16 {
            -230
        }
        fn faults(&mut self) -> u16 {
            self.faults
        }
    }

    const SRC: MacAddr = MacAddr([1, 1, 1, 1, 1, 2]);

    fn adapter(temp: Option<i16>, faults: u16) -> PmsAdapter<FakeCooling, FakeTemp, FakeTelemetry> {
        PmsAdapter::new(
            FakeCooling::default(),
            FakeTemp(temp),
            FakeTelemetry { faults },
            Identity::new(DeviceToken([0x11; 16]), None, MacAddr([7; 6]), Role::Pms, 0),
        )
    }

    fn request(msg: MsgType, body: &[u8], seq: u16) -> Frame {
        let flags = if msg == MsgType::ConfigWrite {
            FrameFlags::HAS_TOPO
        } else {
            FrameFlags::empty()
        };
        let mut hdr = Header::new(msg, flags, seq);
        hdr.sender_role = Role::Icm.as_u8();
        let topo = TopoToken([0x22; 16]);
        let topo = flags.contains(FrameFlags::HAS_TOPO).then_some(&topo);
        Frame::compose(&hdr, &DeviceToken([0xA0; 16]), topo, body).unwrap()
    }

    #[test]
    fn status_request_reports_telemetry() {
        let mut pms = adapter(Some(253), 0);
        let reply = pms.handle(SRC, &request(MsgType::PmsStatus, &[], 5), 0).unwrap();
        assert_eq!(reply.seq(), 5);

        let status = PmsStatus::decode(reply.body()).unwrap();
        assert_eq!(status.temp_c_x10, 253);
        assert_eq!(status.vbus_mv, 12_150);
        assert_eq!(status.vsys_mv, 5_020);
        assert_eq!(status.iout_ma, -230);
        assert_eq!(status.faults, 0);
    }

    #[test]
    fn missing_probe_reads_as_zero() {
        let mut pms = adapter(None, 0);
        let reply = pms.handle(SRC, &request(MsgType::PmsStatus, &[], 1), 0).unwrap();
        assert_eq!(PmsStatus::decode(reply.body()).unwrap().temp_c_x10, 0);
    }

    #[test]
    fn cool_config_write_sets_duty_and_acks_with_status() {
        let mut pms = adapter(Some(300), 0);
        let cfg = ConfigWrite {
            key: *b"COOL01",
            len: 1,
        };
        let mut body = std::vec::Vec::new();
        body.extend_from_slice(&cfg.to_bytes());
        body.push(70);

        let reply = pms
            .handle(SRC, &request(MsgType::ConfigWrite, &body, 9), 0)
            .unwrap();
        assert_eq!(reply.header().msg_type, MsgType::PmsStatus.as_u8());
        assert_eq!(reply.seq(), 9);
        assert_eq!(pms.cooling.duty, 70);
    }

    #[test]
    fn foreign_config_keys_are_ignored() {
        let mut pms = adapter(None, 0);
        let cfg = ConfigWrite {
            key: *b"CHAN__",
            len: 1,
        };
        let mut body = std::vec::Vec::new();
        body.extend_from_slice(&cfg.to_bytes());
        body.push(6);
        assert!(pms.handle(SRC, &request(MsgType::ConfigWrite, &body, 1), 0).is_none());
    }

    #[test]
    fn ping_reports_fault_and_fan_bits() {
        let mut pms = adapter(Some(253), 0x0004);
        pms.cooling.set_duty_pct(40);

        let reply = pms.handle(SRC, &request(MsgType::Ping, &[0; 8], 3), 90_000).unwrap();
        assert_eq!(reply.header().msg_type, MsgType::PingReply.as_u8());

        let body = PingBody::decode(reply.body()).unwrap();
        assert_eq!(body.state_bits, STATE_FAULT | STATE_FAN_RUNNING);
        assert_eq!(body.temp_c_x10, 253);
        assert_eq!(body.uptime_s, 90);
    }
}
