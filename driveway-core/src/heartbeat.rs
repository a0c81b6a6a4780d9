//! Liveness tracking and time synchronization.
//!
//! Every node pings its enabled peers each period and counts silence. The
//! time authority (the coordinator unless overridden) also broadcasts the
//! wall clock; everyone else sets their RTC from admitted TIME_SYNC frames.

use heapless::Vec;

use driveway_driver::{KvStore, Radio, Rtc};
use driveway_util::{info, warn};
use driveway_wire::{Frame, MacAddr, MsgType, PingBody, Role, TimeSync, VIRT_PHY};

use crate::adapters::Identity;
use crate::config::{HB_MISSED_LIMIT, HB_PERIOD_MS, MAX_PEERS, TIME_VALID_MIN_EPOCH};
use crate::stack::{RxObserver, Stack};

/// Per-peer liveness state.
#[derive(Debug, Clone, Copy)]
pub struct PeerHealth {
    pub mac: MacAddr,
    pub last_seen_ms: u64,
    pub last_rssi: i8,
    pub missed: u16,
    /// Set once when the peer is declared lost; cleared on the next RX.
    pub lost: bool,
}

pub struct Heartbeat<RT: Rtc> {
    rtc: RT,
    id: Identity,
    seq: u16,
    period_ms: u32,
    missed_limit: u16,
    last_beat_ms: u64,
    authority_override: bool,
    states: Vec<PeerHealth, MAX_PEERS>,
}

impl<RT: Rtc> Heartbeat<RT> {
    pub fn new(rtc: RT, id: Identity) -> Self {
        Heartbeat {
            rtc,
            id,
            seq: 1,
            period_ms: HB_PERIOD_MS,
            missed_limit: HB_MISSED_LIMIT,
            last_beat_ms: 0,
            authority_override: false,
            states: Vec::new(),
        }
    }

    pub fn set_period_ms(&mut self, period_ms: u32) {
        self.period_ms = if period_ms == 0 { HB_PERIOD_MS } else { period_ms };
    }

    pub fn set_missed_limit(&mut self, limit: u16) {
        self.missed_limit = if limit == 0 { HB_MISSED_LIMIT } else { limit };
    }

    /// Forces this node to act as the time authority regardless of role.
    pub fn set_authority_override(&mut self, on: bool) {
        self.authority_override = on;
    }

    pub fn is_authority(&self) -> bool {
        self.authority_override || self.id.role == Role::Icm
    }

    pub fn peer_health(&self, mac: MacAddr) -> Option<&PeerHealth> {
        self.states.iter().find(|s| s.mac == mac)
    }

    pub fn rtc(&self) -> &RT {
        &self.rtc
    }

    /// One heartbeat step. Call after `Stack::poll` with the same `now_ms`.
    pub fn tick<R: Radio, K: KvStore>(&mut self, stack: &mut Stack<'_, R, K>, now_ms: u64) {
        let peers = enabled_peers(stack);

        if now_ms.saturating_sub(self.last_beat_ms) < u64::from(self.period_ms) {
            self.check_loss(&peers, now_ms);
            return;
        }
        self.last_beat_ms = now_ms;

        for &mac in &peers {
            self.send_ping(stack, mac, now_ms);
            let period = u64::from(self.period_ms);
            if let Some(state) = self.ensure_state(mac) {
                if now_ms.saturating_sub(state.last_seen_ms) >= period {
                    state.missed += 1;
                }
            }
        }

        let epoch_s = self.rtc.unix_seconds();
        if self.is_authority() && epoch_s >= TIME_VALID_MIN_EPOCH {
            self.broadcast_time_sync(stack, &peers, epoch_s, now_ms);
        }

        self.check_loss(&peers, now_ms);
    }

    fn next_seq(&mut self) -> u16 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    fn send_ping<R: Radio, K: KvStore>(
        &mut self,
        stack: &mut Stack<'_, R, K>,
        mac: MacAddr,
        now_ms: u64,
    ) {
        let seq = self.next_seq();
        let body = PingBody::default();
        if let Some(frame) = self
            .id
            .reply(MsgType::Ping, seq, VIRT_PHY, now_ms, &body.to_bytes())
        {
            stack.send(mac, &frame, false, now_ms);
        }
    }

    fn broadcast_time_sync<R: Radio, K: KvStore>(
        &mut self,
        stack: &mut Stack<'_, R, K>,
        peers: &[MacAddr],
        epoch_s: u64,
        now_ms: u64,
    ) {
        let body = TimeSync::from_epoch_ms(epoch_s * 1000);
        let seq = self.next_seq();
        let Some(frame) = self
            .id
            .reply(MsgType::TimeSync, seq, VIRT_PHY, now_ms, &body.to_bytes())
        else {
            return;
        };
        for &mac in peers {
            stack.send(mac, &frame, false, now_ms);
        }
    }

    fn ensure_state(&mut self, mac: MacAddr) -> Option<&mut PeerHealth> {
        if let Some(idx) = self.states.iter().position(|s| s.mac == mac) {
            return Some(&mut self.states[idx]);
        }
        self.states
            .push(PeerHealth {
                mac,
                last_seen_ms: 0,
                last_rssi: 0,
                missed: 0,
                lost: false,
            })
            .ok()?;
        self.states.last_mut()
    }

    fn check_loss(&mut self, peers: &[MacAddr], now_ms: u64) {
        let period = u64::from(self.period_ms);
        let limit = self.missed_limit;
        for &mac in peers {
            let Some(state) = self.ensure_state(mac) else {
                continue;
            };
            let over_window = now_ms.saturating_sub(state.last_seen_ms) >= period * u64::from(limit);
            if (state.missed >= limit || over_window) && !state.lost {
                state.lost = true;
                warn!("peer lost: {} missed={}", mac, state.missed);
            }
        }
    }
}

/// Enabled peer MACs, snapshotted so the borrow does not span sends.
fn enabled_peers<R: Radio, K: KvStore>(stack: &Stack<'_, R, K>) -> Vec<MacAddr, MAX_PEERS> {
    stack
        .peers()
        .borrow()
        .all()
        .iter()
        .filter(|p| p.enabled)
        .map(|p| p.mac)
        .collect()
}

impl<RT: Rtc> RxObserver for Heartbeat<RT> {
    /// Post-admission hook: refresh liveness and apply time sync.
    fn on_admitted(&mut self, src: MacAddr, frame: &Frame, rssi: i8, now_ms: u64) {
        let authority = self.is_authority();
        if let Some(state) = self.ensure_state(src) {
            state.last_seen_ms = now_ms;
            state.last_rssi = rssi;
            state.missed = 0;
            if state.lost {
                state.lost = false;
                info!("peer recovered: {}", src);
            }
        }

        if !authority && frame.header().msg_type == MsgType::TimeSync.as_u8() {
            if let Some(ts) = TimeSync::decode(frame.body()) {
                self.rtc.set_unix_seconds(ts.epoch_ms() / 1000);
            }
        }
    }
}
