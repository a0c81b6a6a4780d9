//! Coordinator (control-plane) adapter.

use core::cell::RefCell;

use driveway_driver::{KvStore, Radio};
use driveway_util::{info, warn};
use driveway_wire::{
    ConfigWrite, Frame, MacAddr, MsgType, NetSetChan, PairAck, Role, CONFIG_KEY_CHANNEL,
};

use crate::adapters::{Identity, RoleAdapter};
use crate::peers::{is_valid_channel, PeerDb};

/// Handles pairing, channel management and channel-keyed config writes.
/// Inbound TIME_SYNC is ignored: the coordinator is the time authority.
pub struct IcmAdapter<'a, K: KvStore, R: Radio> {
    peers: &'a RefCell<PeerDb<K>>,
    radio: &'a RefCell<R>,
    id: Identity,
    /// Pairing admission stays open until this deadline passes.
    provisioning_until_ms: Option<u64>,
}

impl<'a, K: KvStore, R: Radio> IcmAdapter<'a, K, R> {
    pub fn new(peers: &'a RefCell<PeerDb<K>>, radio: &'a RefCell<R>, id: Identity) -> Self {
        IcmAdapter {
            peers,
            radio,
            id,
            provisioning_until_ms: None,
        }
    }

    /// Opens the provisioning window for `window_ms`. Re-opening extends it.
    pub fn open_provisioning(&mut self, now_ms: u64, window_ms: u32) {
        self.provisioning_until_ms = Some(now_ms + u64::from(window_ms));
        info!("provisioning open for {} ms", window_ms);
    }

    pub fn close_provisioning(&mut self) {
        self.provisioning_until_ms = None;
    }

    pub fn provisioning_open(&self, now_ms: u64) -> bool {
        matches!(self.provisioning_until_ms, Some(until) if now_ms < until)
    }

    pub fn set_topo_version(&mut self, version: u16) {
        self.id.topo_ver = version;
    }

    fn pair(&mut self, frame: &Frame, now_ms: u64) -> bool {
        if !self.provisioning_open(now_ms) {
            info!("pair request denied: provisioning closed");
            return false;
        }
        let token = frame.device_token();
        if token.is_zero() {
            warn!("pair request denied: zero token");
            return false;
        }
        let hdr = frame.header();
        let Some(role) = Role::from_u8(hdr.sender_role) else {
            return false;
        };
        let name = core::str::from_utf8(frame.body()).unwrap_or("");

        let mut db = self.peers.borrow_mut();
        let mut radio = self.radio.borrow_mut();
        match db.add(&mut *radio, hdr.sender_mac, role, token, name, true) {
            Ok(_) => true,
            Err(err) => {
                warn!("pair persist failed: {:?}", err);
                false
            }
        }
    }

    fn set_channel(&mut self, channel: u8) -> Option<NetSetChan> {
        if !is_valid_channel(channel) {
            return None;
        }
        let mut db = self.peers.borrow_mut();
        let mut radio = self.radio.borrow_mut();
        db.set_channel(&mut *radio, channel).ok()?;
        Some(NetSetChan { channel })
    }
}

impl<K: KvStore, R: Radio> RoleAdapter for IcmAdapter<'_, K, R> {
    fn role(&self) -> Role {
        Role::Icm
    }

    fn handle(&mut self, _src: MacAddr, frame: &Frame, now_ms: u64) -> Option<Frame> {
        let hdr = frame.header();
        match MsgType::from_u8(hdr.msg_type)? {
            MsgType::PairReq => {
                let ok = self.pair(frame, now_ms);
                let ack = PairAck {
                    ok: ok as u8,
                    chan: self.peers.borrow().channel(),
                    reserved: 0,
                };
                self.id
                    .reply(MsgType::PairAck, hdr.seq, hdr.virt_id, now_ms, &ack.to_bytes())
            }

            MsgType::NetSetChan => {
                let req = NetSetChan::decode(frame.body())?;
                let echo = self.set_channel(req.channel)?;
                self.id
                    .reply(MsgType::NetSetChan, hdr.seq, hdr.virt_id, now_ms, &echo.to_bytes())
            }

            MsgType::ConfigWrite => {
                let cfg = ConfigWrite::decode(frame.body())?;
                if cfg.key != CONFIG_KEY_CHANNEL {
                    return None;
                }
                let channel = *cfg.data(frame.body())?.first()?;
                let echo = self.set_channel(channel)?;
                self.id
                    .reply(MsgType::NetSetChan, hdr.seq, hdr.virt_id, now_ms, &echo.to_bytes())
            }

            // The coordinator is the authority; inbound sync is noise.
            MsgType::TimeSync => None,

            _ => None,
        }
    }

    fn tick(&mut self, now_ms: u64) {
        if matches!(self.provisioning_until_ms, Some(until) if now_ms >= until) {
            self.provisioning_until_ms = None;
            info!("provisioning window closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driveway_driver::{MemKv, RadioError};
    use driveway_wire::{DeviceToken, FrameFlags, Header, TopoToken, VIRT_PHY};

    struct NullRadio;
    impl Radio for NullRadio {
        fn init(&mut self, _c: u8) -> Result<(), RadioError> {
            Ok(())
        }
        fn add_peer(&mut self, _m: MacAddr, _c: u8) -> Result<(), RadioError> {
            Ok(())
        }
        fn del_peer(&mut self, _m: MacAddr) -> Result<(), RadioError> {
            Ok(())
        }
        fn set_channel(&mut self, _c: u8) -> Result<(), RadioError> {
            Ok(())
        }
        fn send(&mut self, _m: MacAddr, _f: &[u8]) -> Result<(), RadioError> {
            Ok(())
        }
    }

    const NODE_MAC: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);
    const NODE_TOKEN: DeviceToken = DeviceToken([0x11; 16]);

    fn identity() -> Identity {
        Identity::new(
            DeviceToken([0xA0; 16]),
            Some(TopoToken([0xB0; 16])),
            MacAddr([0x10, 0, 0, 0, 0, 1]),
            Role::Icm,
            1,
        )
    }

    fn pair_req(seq: u16, token: DeviceToken, name: &str) -> Frame {
        let mut hdr = Header::new(MsgType::PairReq, FrameFlags::empty(), seq);
        hdr.sender_mac = NODE_MAC;
        hdr.sender_role = Role::Rel.as_u8();
        Frame::compose(&hdr, &token, None, name.as_bytes()).unwrap()
    }

    fn config_write(key: [u8; 6], data: &[u8], seq: u16) -> Frame {
        let cfg = ConfigWrite {
            key,
            len: data.len() as u16,
        };
        let mut body = std::vec::Vec::new();
        body.extend_from_slice(&cfg.to_bytes());
        body.extend_from_slice(data);

        let mut hdr = Header::new(MsgType::ConfigWrite, FrameFlags::HAS_TOPO, seq);
        hdr.sender_mac = MacAddr([0x10, 0, 0, 0, 0, 1]);
        hdr.sender_role = Role::Icm.as_u8();
        Frame::compose(&hdr, &DeviceToken([0xA0; 16]), Some(&TopoToken([0xB0; 16])), &body).unwrap()
    }

    #[test]
    fn pair_succeeds_inside_the_window() {
        let peers = RefCell::new(PeerDb::load(MemKv::new()));
        let radio = RefCell::new(NullRadio);
        let mut icm = IcmAdapter::new(&peers, &radio, identity());
        icm.open_provisioning(0, 30_000);

        let reply = icm.handle(NODE_MAC, &pair_req(7, NODE_TOKEN, "relayA"), 100).unwrap();
        assert_eq!(reply.header().msg_type, MsgType::PairAck.as_u8());
        assert_eq!(reply.seq(), 7);

        let ack = PairAck::decode(reply.body()).unwrap();
        assert_eq!(ack.ok, 1);
        assert_eq!(ack.chan, peers.borrow().channel());

        let db = peers.borrow();
        let peer = db.find_by_mac(NODE_MAC).unwrap();
        assert_eq!(peer.role, Role::Rel);
        assert_eq!(peer.name.as_str(), "relayA");
        assert_eq!(peer.token, NODE_TOKEN);
        assert!(peer.enabled);
    }

    #[test]
    fn pair_denied_when_closed_or_tokenless() {
        let peers = RefCell::new(PeerDb::load(MemKv::new()));
        let radio = RefCell::new(NullRadio);
        let mut icm = IcmAdapter::new(&peers, &radio, identity());

        // Window never opened.
        let reply = icm.handle(NODE_MAC, &pair_req(1, NODE_TOKEN, "x"), 0).unwrap();
        assert_eq!(PairAck::decode(reply.body()).unwrap().ok, 0);
        assert!(peers.borrow().find_by_mac(NODE_MAC).is_none());

        // Open, but the token is all zeroes.
        icm.open_provisioning(0, 1_000);
        let reply = icm
            .handle(NODE_MAC, &pair_req(2, DeviceToken([0; 16]), "x"), 10)
            .unwrap();
        assert_eq!(PairAck::decode(reply.body()).unwrap().ok, 0);

        // The window expires via tick().
        icm.tick(5_000);
        let reply = icm.handle(NODE_MAC, &pair_req(3, NODE_TOKEN, "x"), 5_001).unwrap();
        assert_eq!(PairAck::decode(reply.body()).unwrap().ok, 0);
    }

    #[test]
    fn net_set_chan_validates_and_echoes() {
        let peers = RefCell::new(PeerDb::load(MemKv::new()));
        let radio = RefCell::new(NullRadio);
        let mut icm = IcmAdapter::new(&peers, &radio, identity());

        let mut hdr = Header::new(MsgType::NetSetChan, FrameFlags::empty(), 9);
        hdr.sender_mac = MacAddr([0x10, 0, 0, 0, 0, 1]);
        hdr.sender_role = Role::Icm.as_u8();
        let req = Frame::compose(
            &hdr,
            &DeviceToken([0xA0; 16]),
            None,
            &NetSetChan { channel: 11 }.to_bytes(),
        )
        .unwrap();

        let reply = icm.handle(NODE_MAC, &req, 0).unwrap();
        assert_eq!(reply.header().msg_type, MsgType::NetSetChan.as_u8());
        assert_eq!(reply.seq(), 9);
        assert_eq!(NetSetChan::decode(reply.body()).unwrap().channel, 11);
        assert_eq!(peers.borrow().channel(), 11);

        // Channel 14 is out of range: no reply at all.
        let req = Frame::compose(
            &hdr,
            &DeviceToken([0xA0; 16]),
            None,
            &NetSetChan { channel: 14 }.to_bytes(),
        )
        .unwrap();
        assert!(icm.handle(NODE_MAC, &req, 0).is_none());
        assert_eq!(peers.borrow().channel(), 11);
    }

    #[test]
    fn config_write_chan_key_sets_the_channel() {
        let peers = RefCell::new(PeerDb::load(MemKv::new()));
        let radio = RefCell::new(NullRadio);
        let mut icm = IcmAdapter::new(&peers, &radio, identity());

        let reply = icm
            .handle(NODE_MAC, &config_write(CONFIG_KEY_CHANNEL, &[0x0B], 21), 0)
            .unwrap();
        assert_eq!(reply.header().msg_type, MsgType::NetSetChan.as_u8());
        assert_eq!(reply.seq(), 21);
        assert_eq!(NetSetChan::decode(reply.body()).unwrap().channel, 11);
        assert_eq!(peers.borrow().channel(), 11);

        // Foreign keys are not this adapter's business.
        assert!(icm
            .handle(NODE_MAC, &config_write(*b"MISC__", &[1], 22), 0)
            .is_none());
    }

    #[test]
    fn inbound_time_sync_is_ignored() {
        let peers = RefCell::new(PeerDb::load(MemKv::new()));
        let radio = RefCell::new(NullRadio);
        let mut icm = IcmAdapter::new(&peers, &radio, identity());

        let mut hdr = Header::new(MsgType::TimeSync, FrameFlags::empty(), 1);
        hdr.sender_role = Role::Icm.as_u8();
        let frame = Frame::compose(&hdr, &DeviceToken([0xA0; 16]), None, &[0u8; 12]).unwrap();
        assert!(icm.handle(NODE_MAC, &frame, 0).is_none());
    }

    #[test]
    fn virt_id_is_echoed() {
        let peers = RefCell::new(PeerDb::load(MemKv::new()));
        let radio = RefCell::new(NullRadio);
        let mut icm = IcmAdapter::new(&peers, &radio, identity());
        icm.open_provisioning(0, 1_000);

        let reply = icm.handle(NODE_MAC, &pair_req(4, NODE_TOKEN, "n"), 1).unwrap();
        assert_eq!(reply.header().virt_id, VIRT_PHY);
    }
}
