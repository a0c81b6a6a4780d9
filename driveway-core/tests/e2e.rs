//! Two full engines over a loopback radio: a coordinator driving a relay
//! node through a reliable pulse, channel migration and time sync.

use std::cell::RefCell;

use driveway_core::adapters::{Identity, IcmAdapter, RelAdapter};
use driveway_core::{
    AckEvent, Heartbeat, PeerDb, Router, RxItem, RxQueue, Stack, StackCfg, TxDoneQueue,
};
use driveway_driver::{KvStore, MemKv, Radio, RadioError, RelayBank, Rtc};
use driveway_wire::{
    ConfigWrite, CtrlRelay, DeviceToken, Frame, FrameFlags, Header, MacAddr, MsgType, NetSetChan,
    RelayOp, RlyState, Role, TopoToken, CONFIG_KEY_CHANNEL, VIRT_PHY,
};

const ICM_MAC: MacAddr = MacAddr([0x10, 0, 0, 0, 0, 0x01]);
const REL_MAC: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);
const ICM_TOKEN: DeviceToken = DeviceToken([0x5A; 16]);
const REL_TOKEN: DeviceToken = DeviceToken([0x11; 16]);
const TOPO: TopoToken = TopoToken([0x77; 16]);

/// Queues frames into an outbox the test ferries to the other node.
#[derive(Default)]
struct LoopRadio {
    outbox: Vec<(MacAddr, Vec<u8>)>,
    channel: u8,
    peers: Vec<MacAddr>,
}

impl Radio for LoopRadio {
    fn init(&mut self, channel: u8) -> Result<(), RadioError> {
        self.channel = channel;
        Ok(())
    }
    fn add_peer(&mut self, mac: MacAddr, _channel: u8) -> Result<(), RadioError> {
        if !self.peers.contains(&mac) {
            self.peers.push(mac);
        }
        Ok(())
    }
    fn del_peer(&mut self, mac: MacAddr) -> Result<(), RadioError> {
        self.peers.retain(|m| *m != mac);
        Ok(())
    }
    fn set_channel(&mut self, channel: u8) -> Result<(), RadioError> {
        self.channel = channel;
        Ok(())
    }
    fn send(&mut self, mac: MacAddr, frame: &[u8]) -> Result<(), RadioError> {
        if !self.peers.contains(&mac) {
            return Err(RadioError::PeerTable);
        }
        self.outbox.push((mac, frame.to_vec()));
        Ok(())
    }
}

struct SimRtc(u64);
impl Rtc for SimRtc {
    fn unix_seconds(&self) -> u64 {
        self.0
    }
    fn set_unix_seconds(&mut self, s: u64) {
        self.0 = s;
    }
}

struct Bank {
    mask: u32,
}
impl RelayBank for Bank {
    fn channels(&self) -> u8 {
        4
    }
    fn set(&mut self, idx: u8, on: bool) {
        if on {
            self.mask |= 1 << idx;
        } else {
            self.mask &= !(1 << idx);
        }
    }
    fn toggle(&mut self, idx: u8) {
        self.mask ^= 1 << idx;
    }
    fn get(&self, idx: u8) -> bool {
        self.mask & (1 << idx) != 0
    }
}

/// Moves everything a node radiated into the other node's RX queue.
fn ferry(from: &RefCell<LoopRadio>, from_mac: MacAddr, to_mac: MacAddr, to_rx: &RxQueue) {
    let mut radio = from.borrow_mut();
    for (dst, bytes) in radio.outbox.drain(..) {
        if dst == to_mac {
            assert!(to_rx.push(RxItem::new(from_mac, -40, &bytes)));
        }
    }
}

fn seeded_db<K: KvStore>(kv: K, role: Role, peer: (MacAddr, Role, DeviceToken), radio: &mut LoopRadio) -> PeerDb<K> {
    let mut db = PeerDb::load(kv);
    db.set_self_role(role).unwrap();
    db.set_topo_token(TOPO).unwrap();
    db.set_topo_version(1).unwrap();
    let (mac, peer_role, token) = peer;
    db.add(radio, mac, peer_role, token, "peer", true).unwrap();
    db
}

#[test]
fn reliable_relay_pulse_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Coordinator side.
    let icm_radio = RefCell::new(LoopRadio::default());
    let icm_peers = RefCell::new(seeded_db(
        MemKv::new(),
        Role::Icm,
        (REL_MAC, Role::Rel, REL_TOKEN),
        &mut *icm_radio.borrow_mut(),
    ));
    let icm_rx = RxQueue::new();
    let icm_tx_done = TxDoneQueue::new();
    let mut icm_stack = Stack::new(StackCfg::default(), &icm_radio, &icm_peers, &icm_rx, &icm_tx_done);
    icm_stack.begin().unwrap();
    let icm_id = Identity::new(ICM_TOKEN, Some(TOPO), ICM_MAC, Role::Icm, 1);
    let mut icm_adapter = IcmAdapter::new(&icm_peers, &icm_radio, icm_id.clone());
    let mut icm_router = Router::new(Role::Icm);
    icm_router.register(&mut icm_adapter);
    let mut icm_hb = Heartbeat::new(SimRtc(1_700_000_000), icm_id);

    // Relay side.
    let rel_radio = RefCell::new(LoopRadio::default());
    let rel_peers = RefCell::new(seeded_db(
        MemKv::new(),
        Role::Rel,
        (ICM_MAC, Role::Icm, ICM_TOKEN),
        &mut *rel_radio.borrow_mut(),
    ));
    let rel_rx = RxQueue::new();
    let rel_tx_done = TxDoneQueue::new();
    let mut rel_stack = Stack::new(StackCfg::default(), &rel_radio, &rel_peers, &rel_rx, &rel_tx_done);
    rel_stack.begin().unwrap();
    let rel_id = Identity::new(REL_TOKEN, Some(TOPO), REL_MAC, Role::Rel, 1);
    let mut rel_adapter = RelAdapter::new(Bank { mask: 0 }, rel_id.clone());
    let mut rel_router = Router::new(Role::Rel);
    rel_router.register(&mut rel_adapter);
    let mut rel_hb = Heartbeat::new(SimRtc(0), rel_id);

    // The coordinator fires a reliable, topology-bound pulse command.
    let req = CtrlRelay {
        channel: 0,
        op: RelayOp::On as u8,
        pulse_ms: 500,
    };
    let mut hdr = Header::new(MsgType::CtrlRelay, FrameFlags::RELIABLE | FrameFlags::HAS_TOPO, 42);
    hdr.sender_mac = ICM_MAC;
    hdr.sender_role = Role::Icm.as_u8();
    hdr.virt_id = VIRT_PHY;
    let frame = Frame::compose(&hdr, &ICM_TOKEN, Some(&TOPO), &req.to_bytes()).unwrap();
    assert!(icm_stack.send(REL_MAC, &frame, true, 0));

    // Drive both engines until the ACK settles.
    let mut ack = None;
    for step in 0..20u64 {
        let now = step * 5;
        icm_stack.poll(&mut icm_router, &mut icm_hb, now);
        ferry(&icm_radio, ICM_MAC, REL_MAC, &rel_rx);

        rel_stack.poll(&mut rel_router, &mut rel_hb, now);
        ferry(&rel_radio, REL_MAC, ICM_MAC, &icm_rx);

        if let Some(ev) = icm_stack.pop_ack_event() {
            ack = Some(ev);
            break;
        }
    }
    assert_eq!(ack, Some(AckEvent { mac: REL_MAC, seq: 42, ok: true }));

    // One command on a clean link: exactly one transmission, no retries.
    icm_stack.poll(&mut icm_router, &mut icm_hb, 100);
    assert!(icm_radio.borrow().outbox.is_empty());

    // The pulse auto-OFFs on the relay's clock.
    rel_router.tick(600);

    // An explicit state query now reports an empty mask.
    let mut hdr = Header::new(MsgType::RlyState, FrameFlags::empty(), 43);
    hdr.sender_mac = ICM_MAC;
    hdr.sender_role = Role::Icm.as_u8();
    let query = Frame::compose(&hdr, &ICM_TOKEN, None, &[]).unwrap();
    assert!(icm_stack.send(REL_MAC, &query, false, 600));
    icm_stack.poll(&mut icm_router, &mut icm_hb, 600);
    ferry(&icm_radio, ICM_MAC, REL_MAC, &rel_rx);
    rel_stack.poll(&mut rel_router, &mut rel_hb, 600);
    ferry(&rel_radio, REL_MAC, ICM_MAC, &icm_rx);

    let item = icm_rx.pop().unwrap();
    let reply = Frame::parse(item.bytes()).unwrap();
    assert_eq!(reply.header().msg_type, MsgType::RlyState.as_u8());
    assert_eq!(reply.seq(), 43);
    let state = RlyState::decode(reply.body()).unwrap();
    assert_eq!(state.mask, 0, "pulse must have auto-OFFed");
    assert_eq!(state.count, 4);
    assert_eq!(state.topo_ver, 1);
}

#[test]
fn unknown_sender_is_silently_dropped() {
    let radio = RefCell::new(LoopRadio::default());
    let peers = RefCell::new(PeerDb::load(MemKv::new()));
    let rx = RxQueue::new();
    let tx_done = TxDoneQueue::new();
    let mut stack = Stack::new(StackCfg::default(), &radio, &peers, &rx, &tx_done);
    let mut router = Router::new(Role::Icm);

    let mut hdr = Header::new(MsgType::Ping, FrameFlags::empty(), 1);
    hdr.sender_mac = REL_MAC;
    hdr.sender_role = Role::Rel.as_u8();
    let frame = Frame::compose(&hdr, &REL_TOKEN, None, &[0; 8]).unwrap();

    assert!(rx.push(RxItem::new(REL_MAC, 0, frame.as_bytes())));
    stack.poll(&mut router, &mut (), 0);

    // Nothing radiated back, nothing in the ack queue.
    assert!(radio.borrow().outbox.is_empty());
    assert!(stack.pop_ack_event().is_none());
}

#[test]
fn time_sync_propagates_to_non_authority_nodes() {
    // Coordinator with a valid wall clock.
    let icm_radio = RefCell::new(LoopRadio::default());
    let icm_peers = RefCell::new(seeded_db(
        MemKv::new(),
        Role::Icm,
        (REL_MAC, Role::Rel, REL_TOKEN),
        &mut *icm_radio.borrow_mut(),
    ));
    let icm_rx = RxQueue::new();
    let icm_tx_done = TxDoneQueue::new();
    let mut icm_stack = Stack::new(StackCfg::default(), &icm_radio, &icm_peers, &icm_rx, &icm_tx_done);
    icm_stack.begin().unwrap();
    let icm_id = Identity::new(ICM_TOKEN, Some(TOPO), ICM_MAC, Role::Icm, 1);
    let mut icm_router = Router::new(Role::Icm);
    let mut icm_hb = Heartbeat::new(SimRtc(1_700_000_000), icm_id);

    // Relay node whose RTC reads zero.
    let rel_radio = RefCell::new(LoopRadio::default());
    let rel_peers = RefCell::new(seeded_db(
        MemKv::new(),
        Role::Rel,
        (ICM_MAC, Role::Icm, ICM_TOKEN),
        &mut *rel_radio.borrow_mut(),
    ));
    let rel_rx = RxQueue::new();
    let rel_tx_done = TxDoneQueue::new();
    let mut rel_stack = Stack::new(StackCfg::default(), &rel_radio, &rel_peers, &rel_rx, &rel_tx_done);
    rel_stack.begin().unwrap();
    let rel_id = Identity::new(REL_TOKEN, Some(TOPO), REL_MAC, Role::Rel, 1);
    let mut rel_router = Router::new(Role::Rel);
    let mut rel_hb = Heartbeat::new(SimRtc(0), rel_id);

    // One heartbeat period on the coordinator radiates PING + TIME_SYNC.
    icm_hb.tick(&mut icm_stack, 2_000);
    icm_stack.poll(&mut icm_router, &mut icm_hb, 2_000);
    ferry(&icm_radio, ICM_MAC, REL_MAC, &rel_rx);

    rel_stack.poll(&mut rel_router, &mut rel_hb, 2_000);

    assert_eq!(rel_hb.rtc().unix_seconds(), 1_700_000_000);

    // The relay saw traffic, so its liveness view of the coordinator is fresh.
    let health = rel_hb.peer_health(ICM_MAC).unwrap();
    assert_eq!(health.last_seen_ms, 2_000);
    assert_eq!(health.missed, 0);
}

#[test]
fn channel_migration_via_config_write() {
    let icm_radio = RefCell::new(LoopRadio::default());
    let icm_peers = RefCell::new(seeded_db(
        MemKv::new(),
        Role::Icm,
        (REL_MAC, Role::Rel, REL_TOKEN),
        &mut *icm_radio.borrow_mut(),
    ));
    let icm_rx = RxQueue::new();
    let icm_tx_done = TxDoneQueue::new();
    let mut icm_stack = Stack::new(StackCfg::default(), &icm_radio, &icm_peers, &icm_rx, &icm_tx_done);
    icm_stack.begin().unwrap();
    let icm_id = Identity::new(ICM_TOKEN, Some(TOPO), ICM_MAC, Role::Icm, 1);
    let mut icm_adapter = IcmAdapter::new(&icm_peers, &icm_radio, icm_id);
    let mut icm_router = Router::new(Role::Icm);
    icm_router.register(&mut icm_adapter);

    // Any admitted ICM-role sender exercises the channel-write path.
    let cfg = ConfigWrite {
        key: CONFIG_KEY_CHANNEL,
        len: 1,
    };
    let mut body = Vec::new();
    body.extend_from_slice(&cfg.to_bytes());
    body.push(0x0B);

    let mut hdr = Header::new(MsgType::ConfigWrite, FrameFlags::HAS_TOPO, 13);
    hdr.sender_mac = REL_MAC;
    hdr.sender_role = Role::Icm.as_u8();
    let frame = Frame::compose(&hdr, &REL_TOKEN, Some(&TOPO), &body).unwrap();

    assert!(icm_rx.push(RxItem::new(REL_MAC, 0, frame.as_bytes())));
    icm_stack.poll(&mut icm_router, &mut (), 0);

    // Channel persisted and every enabled peer re-mirrored on it.
    assert_eq!(icm_peers.borrow().channel(), 11);
    assert_eq!(icm_radio.borrow().channel, 11);
    assert!(icm_radio.borrow().peers.contains(&REL_MAC));

    // The echoed NET_SET_CHAN went out to the sender.
    let radio = icm_radio.borrow();
    let (dst, bytes) = radio.outbox.last().unwrap();
    assert_eq!(*dst, REL_MAC);
    let reply = Frame::parse(bytes).unwrap();
    assert_eq!(reply.header().msg_type, MsgType::NetSetChan.as_u8());
    assert_eq!(reply.seq(), 13);
    assert_eq!(NetSetChan::decode(reply.body()).unwrap().channel, 11);
}
