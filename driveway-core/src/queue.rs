//! Bounded queues between the radio callback context and the main loop.
//!
//! [`RxQueue`] and [`TxDoneQueue`] are fed from an ISR-like context and
//! drained by [`crate::stack::Stack::poll`], so they live behind a
//! critical-section mutex. The TX queues and the ACK observability queue are
//! only touched from the main loop and stay plain.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use driveway_wire::{Frame, MacAddr, MAX_FRAME};

use crate::config::{ACK_EVENT_DEPTH, RX_QUEUE_DEPTH, TX_DONE_DEPTH, TX_QUEUE_DEPTH};

/// One received frame, still unparsed.
#[derive(Clone)]
pub struct RxItem {
    pub mac: MacAddr,
    /// 0 when the radio cannot provide it.
    pub rssi: i8,
    len: u16,
    raw: [u8; MAX_FRAME],
}

impl RxItem {
    /// Copies `data` into a fresh item, truncating at the frame budget.
    pub fn new(mac: MacAddr, rssi: i8, data: &[u8]) -> Self {
        let len = data.len().min(MAX_FRAME);
        let mut raw = [0u8; MAX_FRAME];
        raw[..len].copy_from_slice(&data[..len]);
        RxItem {
            mac,
            rssi,
            len: len as u16,
            raw,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.raw[..self.len as usize]
    }
}

/// One scheduled transmission.
#[derive(Clone)]
pub(crate) struct TxItem {
    pub mac: MacAddr,
    pub reliable: bool,
    pub urgent: bool,
    /// Echoed by the reply that acts as the application-level ACK.
    pub seq: u16,
    pub tries_left: u8,
    /// When to (re)send next, monotonic ms.
    pub deadline_ms: u64,
    len: u16,
    raw: [u8; MAX_FRAME],
}

impl TxItem {
    pub fn from_frame(mac: MacAddr, frame: &Frame, reliable: bool, tries: u8, now_ms: u64) -> Self {
        let mut raw = [0u8; MAX_FRAME];
        raw[..frame.len()].copy_from_slice(frame.as_bytes());
        TxItem {
            mac,
            reliable,
            urgent: frame.urgent(),
            seq: frame.seq(),
            tries_left: tries,
            deadline_ms: now_ms,
            len: frame.len() as u16,
            raw,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.raw[..self.len as usize]
    }
}

/// Outcome of one reliable send, or a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckEvent {
    pub mac: MacAddr,
    pub seq: u16,
    pub ok: bool,
}

/// Transport-level send completion reported by the radio callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxDone {
    pub mac: MacAddr,
    pub ok: bool,
}

/// Shared RX queue. Producers run in the radio's receive callback; the only
/// consumer is the stack loop. When full, the newest frame is dropped.
pub struct RxQueue {
    inner: Mutex<RefCell<Deque<RxItem, RX_QUEUE_DEPTH>>>,
}

impl RxQueue {
    pub const fn new() -> Self {
        RxQueue {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Zero-wait push; `false` when the queue is saturated.
    pub fn push(&self, item: RxItem) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).push_back(item).is_ok())
    }

    pub fn pop(&self) -> Option<RxItem> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pop_front())
    }

    pub fn clear(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).clear());
    }
}

impl Default for RxQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared send-complete queue, same contexts as [`RxQueue`].
pub struct TxDoneQueue {
    inner: Mutex<RefCell<Deque<TxDone, TX_DONE_DEPTH>>>,
}

impl TxDoneQueue {
    pub const fn new() -> Self {
        TxDoneQueue {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub fn push(&self, done: TxDone) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).push_back(done).is_ok())
    }

    pub fn pop(&self) -> Option<TxDone> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pop_front())
    }

    pub fn clear(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).clear());
    }
}

impl Default for TxDoneQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Main-loop-only queues: normal and urgent TX plus ACK observability.
pub(crate) struct TxQueues {
    normal: Deque<TxItem, TX_QUEUE_DEPTH>,
    urgent: Deque<TxItem, TX_QUEUE_DEPTH>,
    ack: Deque<AckEvent, ACK_EVENT_DEPTH>,
}

impl TxQueues {
    pub const fn new() -> Self {
        TxQueues {
            normal: Deque::new(),
            urgent: Deque::new(),
            ack: Deque::new(),
        }
    }

    /// Routes by urgency; `false` when the target queue is saturated.
    pub fn push_tx(&mut self, item: TxItem) -> bool {
        if item.urgent {
            self.urgent.push_back(item).is_ok()
        } else {
            self.normal.push_back(item).is_ok()
        }
    }

    /// Urgent items always drain before normal ones.
    pub fn pop_tx(&mut self) -> Option<TxItem> {
        self.urgent.pop_front().or_else(|| self.normal.pop_front())
    }

    /// Overflow is tolerated here; the ack-memo ring keeps the scheduler
    /// correct even when an event is lost.
    pub fn push_ack(&mut self, ev: AckEvent) {
        let _ = self.ack.push_back(ev);
    }

    pub fn pop_ack(&mut self) -> Option<AckEvent> {
        self.ack.pop_front()
    }

    pub fn clear(&mut self) {
        self.normal.clear();
        self.urgent.clear();
        self.ack.clear();
    }
}
