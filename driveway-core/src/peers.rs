//! Persisted peer directory plus the device-wide topology credential.
//!
//! The directory is the single writer to both the typed KV store and the
//! radio peer table. Peers live in a contiguous slot layout keyed by a count
//! header; keys stay within the 6-character store limit:
//!
//! ```text
//! PECNT0        peer count
//! SELFRO        this device's role
//! NOWCHN        radio channel (1..=13)
//! TVER0         device-wide topology version
//! TTOK0         device-wide topology token, 32 hex chars
//! PEMnnn        slot MAC, 12 hex chars
//! PERnnn        slot role
//! PENnnn        slot name
//! PETnnn        slot device token, 32 hex chars
//! PEEnnn        slot enabled flag
//! PEVnnn        slot topology version
//! ```

use core::fmt::Write as _;

use heapless::{String, Vec};

use driveway_driver::{KvStore, Radio, RadioError};
use driveway_util::{info, warn};
use driveway_wire::{DeviceToken, MacAddr, Role, TopoToken};

use crate::config::{DEFAULT_CHANNEL, MAX_PEERS};

/// Peer names are short strings on the wire and in the store.
pub const MAX_NAME_LEN: usize = 15;

#[derive(Debug, Clone)]
pub struct Peer {
    pub mac: MacAddr,
    pub role: Role,
    pub name: String<MAX_NAME_LEN>,
    pub token: DeviceToken,
    pub enabled: bool,
    pub topo_ver: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// A peer with this MAC already existed; the stored record is untouched.
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerDbError {
    /// The zero MAC never names a peer.
    InvalidMac,
    TableFull,
    UnknownPeer,
    /// Channel outside 1..=13.
    BadChannel,
    /// The KV store rejected a write.
    Persist,
    Radio(RadioError),
}

impl From<RadioError> for PeerDbError {
    fn from(err: RadioError) -> Self {
        PeerDbError::Radio(err)
    }
}

pub struct PeerDb<K: KvStore> {
    kv: K,
    peers: Vec<Peer, MAX_PEERS>,
    self_role: Role,
    channel: u8,
    topo_token: Option<TopoToken>,
    topo_ver: u16,
}

type Key = String<6>;

fn key(prefix: &str) -> Key {
    let mut k = Key::new();
    let _ = k.push_str(prefix);
    k
}

fn slot_key(prefix: &str, idx: usize) -> Key {
    let mut k = Key::new();
    let _ = write!(k, "{prefix}{idx:03}");
    k
}

fn to_hex<const N: usize>(bytes: &[u8]) -> String<N> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::new();
    for b in bytes {
        let _ = out.push(DIGITS[(b >> 4) as usize] as char);
        let _ = out.push(DIGITS[(b & 0xF) as usize] as char);
    }
    out
}

fn from_hex(hex: &str, out: &mut [u8]) -> bool {
    if hex.len() != out.len() * 2 {
        return false;
    }
    let nib = |c: u8| -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'A'..=b'F' => Some(c - b'A' + 10),
            b'a'..=b'f' => Some(c - b'a' + 10),
            _ => None,
        }
    };
    let raw = hex.as_bytes();
    for (i, byte) in out.iter_mut().enumerate() {
        match (nib(raw[i * 2]), nib(raw[i * 2 + 1])) {
            (Some(hi), Some(lo)) => *byte = (hi << 4) | lo,
            _ => return false,
        }
    }
    true
}

pub fn is_valid_channel(channel: u8) -> bool {
    (1..=13).contains(&channel)
}

/// Truncates at a character boundary; wire names may be arbitrary UTF-8.
fn truncate_name(name: &str) -> String<MAX_NAME_LEN> {
    let mut out = String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

impl<K: KvStore> PeerDb<K> {
    /// Loads the persisted directory. Slots that fail to decode are skipped,
    /// not fatal; a fresh store yields an empty directory on the defaults.
    pub fn load(kv: K) -> Self {
        let channel = kv
            .get_i32(&key("NOWCHN"))
            .and_then(|v| u8::try_from(v).ok())
            .filter(|ch| is_valid_channel(*ch))
            .unwrap_or(DEFAULT_CHANNEL);
        let self_role = kv
            .get_i32(&key("SELFRO"))
            .and_then(|v| u8::try_from(v).ok())
            .and_then(Role::from_u8)
            .unwrap_or(Role::Icm);
        let topo_ver = kv.get_i32(&key("TVER0")).unwrap_or(0) as u16;
        let topo_token = kv.get_str(&key("TTOK0")).and_then(|hex| {
            let mut tok = [0u8; 16];
            from_hex(&hex, &mut tok).then_some(TopoToken(tok))
        });

        let mut db = PeerDb {
            kv,
            peers: Vec::new(),
            self_role,
            channel,
            topo_token,
            topo_ver,
        };
        db.load_slots();
        db
    }

    fn load_slots(&mut self) {
        let count = self.kv.get_i32(&key("PECNT0")).unwrap_or(0).max(0) as usize;
        for idx in 0..count.min(MAX_PEERS) {
            let Some(mac_hex) = self.kv.get_str(&slot_key("PEM", idx)) else {
                continue;
            };
            let mut mac = [0u8; 6];
            if !from_hex(&mac_hex, &mut mac) || mac == [0; 6] {
                continue;
            }

            let role = self
                .kv
                .get_i32(&slot_key("PER", idx))
                .and_then(|v| u8::try_from(v).ok())
                .and_then(Role::from_u8);
            let Some(role) = role else { continue };

            let name = self
                .kv
                .get_str(&slot_key("PEN", idx))
                .map(|stored| truncate_name(&stored))
                .unwrap_or_default();

            let mut token = [0u8; 16];
            if let Some(tok_hex) = self.kv.get_str(&slot_key("PET", idx)) {
                if !from_hex(&tok_hex, &mut token) {
                    token = [0; 16];
                }
            }

            let enabled = self.kv.get_bool(&slot_key("PEE", idx)).unwrap_or(false);
            let topo_ver = self.kv.get_i32(&slot_key("PEV", idx)).unwrap_or(0) as u32;

            let _ = self.peers.push(Peer {
                mac: MacAddr(mac),
                role,
                name,
                token: DeviceToken(token),
                enabled,
                topo_ver,
            });
        }
    }

    /// Re-adds every enabled peer to the radio table on the current channel.
    /// Best effort: a peer the radio rejects does not block the others.
    pub fn mirror_enabled<R: Radio>(&self, radio: &mut R) {
        for peer in self.peers.iter().filter(|p| p.enabled) {
            let _ = radio.del_peer(peer.mac);
            if radio.add_peer(peer.mac, self.channel).is_err() {
                warn!("radio refused peer {}", peer.mac);
            }
        }
    }

    /// Idempotent on MAC: re-adding an existing peer succeeds without
    /// touching the stored record.
    pub fn add<R: Radio>(
        &mut self,
        radio: &mut R,
        mac: MacAddr,
        role: Role,
        token: DeviceToken,
        name: &str,
        enabled: bool,
    ) -> Result<AddOutcome, PeerDbError> {
        if mac.is_zero() {
            return Err(PeerDbError::InvalidMac);
        }
        if self.find_by_mac(mac).is_some() {
            return Ok(AddOutcome::Exists);
        }

        let peer = Peer {
            mac,
            role,
            name: truncate_name(name),
            token,
            enabled,
            topo_ver: 0,
        };
        self.peers.push(peer).map_err(|_| PeerDbError::TableFull)?;
        self.save_all()?;

        if enabled {
            radio.del_peer(mac).ok();
            radio.add_peer(mac, self.channel)?;
        }
        info!("peer added: {} role={}", mac, role.as_u8());
        Ok(AddOutcome::Added)
    }

    /// Toggles persistence and the radio mirror together. Setting the
    /// current state again is a no-op.
    pub fn enable<R: Radio>(
        &mut self,
        radio: &mut R,
        mac: MacAddr,
        enabled: bool,
    ) -> Result<(), PeerDbError> {
        let peer = self
            .peers
            .iter_mut()
            .find(|p| p.mac == mac)
            .ok_or(PeerDbError::UnknownPeer)?;
        if peer.enabled == enabled {
            return Ok(());
        }
        peer.enabled = enabled;
        self.save_all()?;

        if enabled {
            radio.del_peer(mac).ok();
            radio.add_peer(mac, self.channel)?;
        } else {
            radio.del_peer(mac)?;
        }
        Ok(())
    }

    /// Removes from the radio first (when enabled), then from the store.
    pub fn remove<R: Radio>(&mut self, radio: &mut R, mac: MacAddr) -> Result<(), PeerDbError> {
        let idx = self
            .peers
            .iter()
            .position(|p| p.mac == mac)
            .ok_or(PeerDbError::UnknownPeer)?;
        if self.peers[idx].enabled {
            radio.del_peer(mac).ok();
        }
        self.peers.remove(idx);
        self.save_all()
    }

    pub fn find_by_mac(&self, mac: MacAddr) -> Option<&Peer> {
        self.peers.iter().find(|p| p.mac == mac)
    }

    /// True iff the peer exists, is enabled, and the token bytes are equal.
    pub fn token_matches(&self, mac: MacAddr, token: &DeviceToken) -> bool {
        match self.find_by_mac(mac) {
            Some(peer) => peer.enabled && peer.token == *token,
            None => false,
        }
    }

    pub fn all(&self) -> &[Peer] {
        &self.peers
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Persists the channel and re-mirrors every enabled peer on it. A peer
    /// that fails to migrate does not roll back the others.
    pub fn set_channel<R: Radio>(&mut self, radio: &mut R, channel: u8) -> Result<(), PeerDbError> {
        if !is_valid_channel(channel) {
            return Err(PeerDbError::BadChannel);
        }
        self.channel = channel;
        if !self.kv.put_i32(&key("NOWCHN"), channel as i32) {
            return Err(PeerDbError::Persist);
        }
        if radio.set_channel(channel).is_err() {
            warn!("radio rejected channel {}", channel);
        }
        self.mirror_enabled(radio);
        info!("channel set to {}", channel);
        Ok(())
    }

    pub fn self_role(&self) -> Role {
        self.self_role
    }

    pub fn set_self_role(&mut self, role: Role) -> Result<(), PeerDbError> {
        self.self_role = role;
        self.kv
            .put_i32(&key("SELFRO"), role.as_u8() as i32)
            .then_some(())
            .ok_or(PeerDbError::Persist)
    }

    pub fn topo_token(&self) -> Option<&TopoToken> {
        self.topo_token.as_ref()
    }

    pub fn set_topo_token(&mut self, token: TopoToken) -> Result<(), PeerDbError> {
        let hex: String<32> = to_hex(token.as_bytes());
        self.topo_token = Some(token);
        self.kv
            .put_str(&key("TTOK0"), &hex)
            .then_some(())
            .ok_or(PeerDbError::Persist)
    }

    pub fn topo_version(&self) -> u16 {
        self.topo_ver
    }

    pub fn set_topo_version(&mut self, version: u16) -> Result<(), PeerDbError> {
        self.topo_ver = version;
        self.kv
            .put_i32(&key("TVER0"), version as i32)
            .then_some(())
            .ok_or(PeerDbError::Persist)
    }

    pub fn topo_token_matches(&self, token: &TopoToken) -> bool {
        self.topo_token.as_ref() == Some(token)
    }

    fn save_slot(&mut self, idx: usize) -> bool {
        let peer = &self.peers[idx];
        let mac_hex: String<12> = to_hex(peer.mac.octets());
        let tok_hex: String<32> = to_hex(peer.token.as_bytes());
        let name = peer.name.clone();
        let role = peer.role.as_u8();
        let enabled = peer.enabled;
        let topo_ver = peer.topo_ver;

        self.kv.put_str(&slot_key("PEM", idx), &mac_hex)
            && self.kv.put_i32(&slot_key("PER", idx), role as i32)
            && self.kv.put_str(&slot_key("PEN", idx), &name)
            && self.kv.put_str(&slot_key("PET", idx), &tok_hex)
            && self.kv.put_bool(&slot_key("PEE", idx), enabled)
            && self.kv.put_i32(&slot_key("PEV", idx), topo_ver as i32)
    }

    fn clear_slot(&mut self, idx: usize) {
        for prefix in ["PEM", "PER", "PEN", "PET", "PEE", "PEV"] {
            self.kv.remove(&slot_key(prefix, idx));
        }
    }

    fn save_all(&mut self) -> Result<(), PeerDbError> {
        let old_count = self.kv.get_i32(&key("PECNT0")).unwrap_or(0).max(0) as usize;
        let new_count = self.peers.len();
        if !self.kv.put_i32(&key("PECNT0"), new_count as i32) {
            return Err(PeerDbError::Persist);
        }
        for idx in 0..new_count {
            if !self.save_slot(idx) {
                return Err(PeerDbError::Persist);
            }
        }
        // A shrink leaves stale tail slots behind; erase them.
        for idx in new_count..old_count {
            self.clear_slot(idx);
        }
        Ok(())
    }
}
