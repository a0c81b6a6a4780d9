//! Physical sensor node adapter.

use driveway_driver::{BoardTemp, Rtc, SensorSnapshot, SensorSource, MAX_TF_LUNA_PAIRS};
use driveway_wire::{Frame, MacAddr, MsgType, PingBody, Role, SensReportHdr, MAX_BODY};

use crate::adapters::{uptime_s, Identity, RoleAdapter};
use crate::config::{SENS_MIN_POLL_MS, TIME_VALID_MIN_EPOCH};

/// Report blob format v1: fixed head plus up to eight packed pairs.
const FMT_V1: u16 = 0x0001;
const BLOB_HEAD_LEN: usize = 17;
const PAIR_LEN: usize = 8;
const MAX_BLOB_LEN: usize = BLOB_HEAD_LEN + MAX_TF_LUNA_PAIRS * PAIR_LEN;

/// Answers report and ping requests from a cached snapshot; `tick()` keeps
/// the cache fresh without exceeding the TF-Luna frame-rate budget.
pub struct SensAdapter<S: SensorSource, RT: Rtc, B: BoardTemp> {
    source: S,
    rtc: RT,
    temp: B,
    id: Identity,
    snap: SensorSnapshot,
    last_poll_ms: u64,
    min_poll_ms: u32,
    temp_c_x10: Option<i16>,
}

impl<S: SensorSource, RT: Rtc, B: BoardTemp> SensAdapter<S, RT, B> {
    pub fn new(source: S, rtc: RT, temp: B, id: Identity) -> Self {
        SensAdapter {
            source,
            rtc,
            temp,
            id,
            snap: SensorSnapshot::default(),
            last_poll_ms: 0,
            min_poll_ms: SENS_MIN_POLL_MS,
            temp_c_x10: None,
        }
    }

    /// Minimum interval between hardware polls.
    pub fn set_min_poll_ms(&mut self, ms: u32) {
        self.min_poll_ms = ms;
    }

    fn refresh_if_stale(&mut self, now_ms: u64) {
        if now_ms.wrapping_sub(self.last_poll_ms) < u64::from(self.min_poll_ms)
            && self.last_poll_ms != 0
        {
            return;
        }
        if let Some(snap) = self.source.poll() {
            self.snap = snap;
            self.last_poll_ms = now_ms;
        }
        if let Some(t) = self.temp.read_c_x10() {
            self.temp_c_x10 = Some(t);
        }
    }

    fn epoch_ms(&self) -> u64 {
        let secs = self.rtc.unix_seconds();
        if secs >= TIME_VALID_MIN_EPOCH {
            secs * 1000
        } else {
            0
        }
    }

    /// Encodes blob v1 into `out`, returning the used length. Pairs beyond
    /// `max_pairs` are dropped so the body always fits its budget.
    fn build_blob(&self, out: &mut [u8; MAX_BLOB_LEN], max_pairs: usize) -> usize {
        let epoch_ms = self.epoch_ms();
        out[0..4].copy_from_slice(&(epoch_ms as u32).to_le_bytes());
        out[4..8].copy_from_slice(&((epoch_ms >> 32) as u32).to_le_bytes());
        out[8..12].copy_from_slice(&self.snap.lux.to_le_bytes());
        out[12] = self.snap.is_day as u8;
        let n_pairs = self.snap.pairs.len().min(max_pairs);
        out[13] = n_pairs as u8;
        out[14..16].copy_from_slice(&self.temp_c_x10.unwrap_or(i16::MIN).to_le_bytes());
        out[16] = 0;

        let mut off = BLOB_HEAD_LEN;
        for pair in self.snap.pairs.iter().take(n_pairs) {
            out[off] = pair.index;
            out[off + 1] = pair.present_a as u8;
            out[off + 2] = pair.present_b as u8;
            out[off + 3] = pair.direction as u8;
            out[off + 4..off + 6].copy_from_slice(&pair.rate_hz.to_le_bytes());
            out[off + 6..off + 8].copy_from_slice(&0u16.to_le_bytes());
            off += PAIR_LEN;
        }
        off
    }

    fn report(&mut self, echo_seq: u16, virt_id: u8, now_ms: u64) -> Option<Frame> {
        self.refresh_if_stale(now_ms);

        let max_pairs = (MAX_BODY - SensReportHdr::SIZE - BLOB_HEAD_LEN) / PAIR_LEN;
        let mut blob = [0u8; MAX_BLOB_LEN];
        let blob_len = self.build_blob(&mut blob, max_pairs);

        let head = SensReportHdr {
            bytes: blob_len as u16,
            fmt: FMT_V1,
        };
        let mut body = [0u8; SensReportHdr::SIZE + MAX_BLOB_LEN];
        body[..SensReportHdr::SIZE].copy_from_slice(&head.to_bytes());
        body[SensReportHdr::SIZE..SensReportHdr::SIZE + blob_len].copy_from_slice(&blob[..blob_len]);

        self.id.reply(
            MsgType::SensReport,
            echo_seq,
            virt_id,
            now_ms,
            &body[..SensReportHdr::SIZE + blob_len],
        )
    }
}

impl<S: SensorSource, RT: Rtc, B: BoardTemp> RoleAdapter for SensAdapter<S, RT, B> {
    fn role(&self) -> Role {
        Role::Sens
    }

    fn handle(&mut self, _src: MacAddr, frame: &Frame, now_ms: u64) -> Option<Frame> {
        let hdr = frame.header();
        match MsgType::from_u8(hdr.msg_type)? {
            MsgType::SensReport => self.report(hdr.seq, hdr.virt_id, now_ms),

            MsgType::Ping => {
                self.refresh_if_stale(now_ms);
                let body = PingBody {
                    state_bits: self.snap.is_day as u16,
                    temp_c_x10: match self.temp_c_x10 {
                        Some(t) => t as u16,
                        None => 0,
                    },
                    uptime_s: uptime_s(now_ms),
                    reserved: 0,
                };
                self.id
                    .reply(MsgType::PingReply, hdr.seq, hdr.virt_id, now_ms, &body.to_bytes())
            }

            _ => None,
        }
    }

    fn tick(&mut self, now_ms: u64) {
        self.refresh_if_stale(now_ms);
    }
}
