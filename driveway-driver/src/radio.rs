//! Fire-and-forget radio seam.
//!
//! The radio owns a small peer table: only MACs previously added can be
//! addressed. Incoming frames and send-completion events do not surface
//! here; the application's receive callback pushes them into the core's
//! shared queues from its ISR-like context.

use driveway_wire::MacAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// The radio has not been initialized.
    NotReady,
    /// The peer table rejected the operation (full, or unknown MAC).
    PeerTable,
    /// The requested channel is out of range for the PHY.
    BadChannel,
    /// The transmit path reported an immediate error.
    TxFailed,
}

pub trait Radio {
    /// Brings the radio up on the given channel.
    fn init(&mut self, channel: u8) -> Result<(), RadioError>;

    /// Registers `mac` as addressable on `channel`. Re-adding an existing
    /// peer updates its channel.
    fn add_peer(&mut self, mac: MacAddr, channel: u8) -> Result<(), RadioError>;

    fn del_peer(&mut self, mac: MacAddr) -> Result<(), RadioError>;

    fn set_channel(&mut self, channel: u8) -> Result<(), RadioError>;

    /// Queues one encoded frame for transmission. Success means the frame
    /// was handed to the PHY, not that it was received anywhere.
    fn send(&mut self, mac: MacAddr, frame: &[u8]) -> Result<(), RadioError>;
}
