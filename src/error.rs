// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

use std::fmt;

/// Device families addressed by numeric ID on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Partition,
    Zone,
    Output,
    Task,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Partition => "partition",
            Self::Zone => "zone",
            Self::Output => "output",
            Self::Task => "task",
        }
    }

    /// Parse the lowercase name used in MQTT topics.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "partition" => Some(Self::Partition),
            "zone" => Some(Self::Zone),
            "output" => Some(Self::Output),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors that can occur in the envy-lan-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("No data from panel for {secs}s")]
    IdleTimeout { secs: u64 },

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("Unknown {kind} {id}")]
    UnknownDevice { kind: DeviceKind, id: u32 },
}

impl BridgeError {
    /// Whether this error is a transport fault and the link should be re-dialled.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::ConnectionTimeout
                | BridgeError::IdleTimeout { .. }
                | BridgeError::Disconnected
        )
    }

    pub(crate) fn invalid_config(details: impl Into<String>) -> Self {
        BridgeError::InvalidConfig {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
