// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

pub mod direct;

pub use direct::PanelLink;

/// What the link reports to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// TCP connection to the panel established
    Connected,
    /// Raw bytes as read from the socket; lines may span chunks
    Data(Vec<u8>),
    /// Connection lost; partial data should be discarded
    Disconnected,
}
