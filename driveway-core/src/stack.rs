//! Admission and reliable delivery.
//!
//! RX path: parse → sender-role sanity → per-MAC sequence window → peer
//! admission (known, enabled, device-token equality, topology-token equality
//! iff `HAS_TOPO`) → ACK matching → router. Every rejection is a silent drop
//! so foreign senders learn nothing.
//!
//! TX path: reliable items get an ACK window per attempt; a reply echoing
//! the same (mac, seq) counts as the positive ACK. Timeouts and immediate
//! radio errors burn one attempt each and reschedule with capped backoff.

use core::cell::RefCell;

use heapless::Vec;

use driveway_driver::{KvStore, Radio};
use driveway_util::{debug, trace, warn};
use driveway_wire::{Frame, MacAddr, Role};

use crate::config::{StackCfg, ACK_MEMO_RING, AWAIT_RING, SEQ_TRACK_MAX, SEQ_WINDOW, TX_QUEUE_DEPTH};
use crate::peers::PeerDb;
use crate::queue::{AckEvent, RxQueue, TxDoneQueue, TxItem, TxQueues};
use crate::router::Router;

/// Fed every admitted frame, after ACK matching and before routing. The
/// heartbeat service implements this to track liveness and apply time sync.
pub trait RxObserver {
    fn on_admitted(&mut self, src: MacAddr, frame: &Frame, rssi: i8, now_ms: u64);
}

/// No-op observer.
impl RxObserver for () {
    fn on_admitted(&mut self, _src: MacAddr, _frame: &Frame, _rssi: i8, _now_ms: u64) {}
}

/// Optional send-completion hook. `ok` reflects the application-level
/// outcome for reliable sends and the transport outcome otherwise.
pub type SendHook = fn(MacAddr, bool);

/// Outstanding reliable send; `expires_ms == 0` marks a free slot.
#[derive(Clone, Copy, Default)]
struct AwaitSlot {
    mac: MacAddr,
    seq: u16,
    expires_ms: u64,
}

/// Recent positive ACK memo; `ts_ms == 0` marks a free slot. Catches replies
/// that land between a send completing and its retry being scheduled.
#[derive(Clone, Copy, Default)]
struct AckMemo {
    mac: MacAddr,
    seq: u16,
    ts_ms: u64,
}

/// Per-MAC duplicate-rejection window; a zero MAC marks a free slot.
/// Bit 0 of `mask` represents `hi`, bit n represents `hi - n`.
#[derive(Clone, Copy, Default)]
struct SeqWin {
    mac: MacAddr,
    hi: u16,
    mask: u16,
}

fn seq_greater(a: u16, b: u16) -> bool {
    let d = a.wrapping_sub(b);
    d != 0 && d < 0x8000
}

pub struct Stack<'a, R: Radio, K: KvStore> {
    cfg: StackCfg,
    radio: &'a RefCell<R>,
    peers: &'a RefCell<PeerDb<K>>,
    rx: &'a RxQueue,
    tx_done: &'a TxDoneQueue,
    q: TxQueues,
    awaits: [AwaitSlot; AWAIT_RING],
    acked: [AckMemo; ACK_MEMO_RING],
    seq_wins: [SeqWin; SEQ_TRACK_MAX],
    send_hook: Option<SendHook>,
}

impl<'a, R: Radio, K: KvStore> Stack<'a, R, K> {
    pub fn new(
        cfg: StackCfg,
        radio: &'a RefCell<R>,
        peers: &'a RefCell<PeerDb<K>>,
        rx: &'a RxQueue,
        tx_done: &'a TxDoneQueue,
    ) -> Self {
        Stack {
            cfg,
            radio,
            peers,
            rx,
            tx_done,
            q: TxQueues::new(),
            awaits: [AwaitSlot::default(); AWAIT_RING],
            acked: [AckMemo::default(); ACK_MEMO_RING],
            seq_wins: [SeqWin::default(); SEQ_TRACK_MAX],
            send_hook: None,
        }
    }

    /// Brings the radio up on the persisted channel and mirrors every
    /// enabled peer into its table.
    pub fn begin(&mut self) -> Result<(), driveway_driver::RadioError> {
        let db = self.peers.borrow();
        let mut radio = self.radio.borrow_mut();
        radio.init(db.channel())?;
        db.mirror_enabled(&mut *radio);
        Ok(())
    }

    /// Drops queued work and abandons outstanding awaits without further
    /// callbacks.
    pub fn end(&mut self) {
        self.rx.clear();
        self.tx_done.clear();
        self.q.clear();
        self.awaits = [AwaitSlot::default(); AWAIT_RING];
        self.acked = [AckMemo::default(); ACK_MEMO_RING];
        self.seq_wins = [SeqWin::default(); SEQ_TRACK_MAX];
    }

    pub fn set_send_hook(&mut self, hook: SendHook) {
        self.send_hook = Some(hook);
    }

    pub fn peers(&self) -> &'a RefCell<PeerDb<K>> {
        self.peers
    }

    pub fn radio(&self) -> &'a RefCell<R> {
        self.radio
    }

    /// Enqueues one composed frame. Reliable sends get the configured
    /// attempt budget; urgency comes from the frame's header flag. Returns
    /// `false` only when the target queue is saturated.
    pub fn send(&mut self, mac: MacAddr, frame: &Frame, reliable: bool, now_ms: u64) -> bool {
        let tries = if reliable { self.cfg.retries.max(1) } else { 1 };
        let item = TxItem::from_frame(mac, frame, reliable, tries, now_ms);
        let accepted = self.q.push_tx(item);
        if !accepted {
            warn!("tx queue saturated, dropping send to {}", mac);
        }
        accepted
    }

    /// Next ACK observability event, if any.
    pub fn pop_ack_event(&mut self) -> Option<AckEvent> {
        self.q.pop_ack()
    }

    /// One scheduler cycle: drain send completions, drain and route RX,
    /// pump TX with retries and ACK windows.
    pub fn poll(&mut self, router: &mut Router<'_>, obs: &mut dyn RxObserver, now_ms: u64) {
        self.drain_tx_done();
        self.drain_rx(router, obs, now_ms);
        self.pump_tx(now_ms);
    }

    fn drain_tx_done(&mut self) {
        while let Some(done) = self.tx_done.pop() {
            // Application-level success is decided by the ACK reply; only
            // transport failures surface here.
            if !done.ok {
                self.report(done.mac, false);
            }
        }
    }

    fn drain_rx(&mut self, router: &mut Router<'_>, obs: &mut dyn RxObserver, now_ms: u64) {
        while let Some(rx) = self.rx.pop() {
            let frame = match Frame::parse(rx.bytes()) {
                Ok(frame) => frame,
                Err(err) => {
                    trace!("rx parse error {:?} from {}", err, rx.mac);
                    continue;
                }
            };
            let hdr = frame.header();

            if Role::from_u8(hdr.sender_role).is_none() {
                continue;
            }
            if !self.accept_seq(rx.mac, hdr.seq) {
                trace!("rx duplicate seq {} from {}", hdr.seq, rx.mac);
                continue;
            }

            let admitted = {
                let db = self.peers.borrow();
                db.token_matches(rx.mac, &frame.device_token())
                    && match frame.topo_token() {
                        Some(topo) => db.topo_token_matches(&topo),
                        None => !frame.has_topo(),
                    }
            };
            if !admitted {
                trace!("rx admission drop from {}", rx.mac);
                continue;
            }

            self.satisfy_await(rx.mac, hdr.seq, now_ms);
            obs.on_admitted(rx.mac, &frame, rx.rssi, now_ms);
            router.route(rx.mac, &frame, self, now_ms);
        }
    }

    fn pump_tx(&mut self, now_ms: u64) {
        // Not-yet-due items are collected here and requeued once per cycle
        // to avoid a busy loop on the queue.
        let mut carry: Vec<TxItem, { TX_QUEUE_DEPTH * 2 }> = Vec::new();

        while let Some(mut tx) = self.q.pop_tx() {
            if tx.reliable && self.already_acked(tx.mac, tx.seq) {
                self.report(tx.mac, true);
                continue;
            }
            if tx.deadline_ms > now_ms {
                let _ = carry.push(tx);
                continue;
            }

            if tx.reliable {
                let sent = self.radio.borrow_mut().send(tx.mac, tx.bytes()).is_ok();
                if sent {
                    // Attempts burn when the ACK window expires, not here.
                    self.add_await(tx.mac, tx.seq, now_ms);
                    tx.deadline_ms = now_ms + u64::from(self.cfg.ack_timeout_ms);
                    let _ = carry.push(tx);
                } else if tx.tries_left > 1 {
                    tx.tries_left -= 1;
                    tx.deadline_ms = now_ms + u64::from(self.cfg.backoff(0));
                    let _ = carry.push(tx);
                } else {
                    self.fail_final(tx.mac, tx.seq);
                }
            } else {
                let sent = self.radio.borrow_mut().send(tx.mac, tx.bytes()).is_ok();
                self.report(tx.mac, sent);
            }
        }

        // Expired ACK windows drive retries for the matching carried items.
        let timeouts = self.reap_expired_awaits(now_ms);
        for (mac, seq) in &timeouts {
            for tx in carry.iter_mut() {
                if tx.reliable && tx.tries_left > 0 && tx.seq == *seq && tx.mac == *mac {
                    if tx.tries_left > 1 {
                        tx.tries_left -= 1;
                        tx.deadline_ms = now_ms + u64::from(self.cfg.backoff(1));
                    } else {
                        self.fail_final(tx.mac, tx.seq);
                        tx.tries_left = 0;
                    }
                }
            }
        }

        for tx in carry {
            if tx.tries_left == 0 {
                continue;
            }
            if tx.reliable && self.already_acked(tx.mac, tx.seq) {
                self.report(tx.mac, true);
                continue;
            }
            let _ = self.q.push_tx(tx);
        }
    }

    fn report(&mut self, mac: MacAddr, ok: bool) {
        if let Some(hook) = self.send_hook {
            hook(mac, ok);
        }
    }

    /// Exactly-once failure notification for an exhausted reliable send.
    fn fail_final(&mut self, mac: MacAddr, seq: u16) {
        debug!("reliable send to {} seq {} exhausted retries", mac, seq);
        self.q.push_ack(AckEvent { mac, seq, ok: false });
        self.report(mac, false);
    }

    fn add_await(&mut self, mac: MacAddr, seq: u16, now_ms: u64) {
        let expires_ms = now_ms + u64::from(self.cfg.ack_timeout_ms);
        // Prefer a free or expired slot; otherwise evict the one expiring
        // soonest.
        let mut idx = 0;
        let mut soonest = u64::MAX;
        for (i, slot) in self.awaits.iter().enumerate() {
            if slot.expires_ms == 0 || slot.expires_ms <= now_ms {
                idx = i;
                soonest = 0;
                break;
            }
            if slot.expires_ms < soonest {
                soonest = slot.expires_ms;
                idx = i;
            }
        }
        self.awaits[idx] = AwaitSlot {
            mac,
            seq,
            expires_ms,
        };
    }

    /// Marks a pending await as positively acked and memoizes the pair.
    /// Returns true when a waiter existed.
    fn satisfy_await(&mut self, mac: MacAddr, seq: u16, now_ms: u64) -> bool {
        let mut matched = false;
        for slot in self.awaits.iter_mut() {
            if slot.expires_ms != 0 && slot.seq == seq && slot.mac == mac {
                slot.expires_ms = 0;
                matched = true;
            }
        }
        if matched {
            self.record_ack(mac, seq, now_ms);
            self.q.push_ack(AckEvent { mac, seq, ok: true });
        }
        matched
    }

    fn record_ack(&mut self, mac: MacAddr, seq: u16, now_ms: u64) {
        let mut idx = 0;
        let mut oldest = u64::MAX;
        for (i, memo) in self.acked.iter().enumerate() {
            if memo.ts_ms == 0 {
                idx = i;
                oldest = 0;
                break;
            }
            if memo.ts_ms < oldest {
                oldest = memo.ts_ms;
                idx = i;
            }
        }
        self.acked[idx] = AckMemo {
            mac,
            seq,
            // The memo must read as occupied even at a zero clock.
            ts_ms: now_ms.max(1),
        };
    }

    fn already_acked(&self, mac: MacAddr, seq: u16) -> bool {
        self.acked
            .iter()
            .any(|memo| memo.ts_ms != 0 && memo.seq == seq && memo.mac == mac)
    }

    fn reap_expired_awaits(&mut self, now_ms: u64) -> Vec<(MacAddr, u16), AWAIT_RING> {
        let mut out = Vec::new();
        for slot in self.awaits.iter_mut() {
            if slot.expires_ms != 0 && slot.expires_ms <= now_ms {
                let _ = out.push((slot.mac, slot.seq));
                slot.expires_ms = 0;
            }
        }
        out
    }

    fn find_seq_slot(&mut self, mac: MacAddr) -> usize {
        let mut free_idx = None;
        for (i, win) in self.seq_wins.iter().enumerate() {
            if win.mac.is_zero() {
                if free_idx.is_none() {
                    free_idx = Some(i);
                }
                continue;
            }
            if win.mac == mac {
                return i;
            }
        }
        // Table full: evict slot 0 (small-table policy).
        let idx = free_idx.unwrap_or(0);
        self.seq_wins[idx] = SeqWin { mac, hi: 0, mask: 0 };
        idx
    }

    /// Wrap-aware 16-entry window. Accepts a sequence unless it is older
    /// than `hi - (WINDOW - 1)` or already marked seen.
    fn accept_seq(&mut self, mac: MacAddr, seq: u16) -> bool {
        let idx = self.find_seq_slot(mac);
        let win = &mut self.seq_wins[idx];

        if win.mask == 0 {
            win.hi = seq;
            win.mask = 1;
            return true;
        }
        if !seq_greater(seq, win.hi) {
            let back = win.hi.wrapping_sub(seq);
            if back >= SEQ_WINDOW {
                return false;
            }
            let bit = 1u16 << back;
            if win.mask & bit != 0 {
                return false;
            }
            win.mask |= bit;
            true
        } else {
            let ahead = seq.wrapping_sub(win.hi);
            if ahead >= SEQ_WINDOW {
                win.mask = 1;
            } else {
                win.mask = (win.mask << ahead) | 1;
            }
            win.hi = seq;
            true
        }
    }
}
