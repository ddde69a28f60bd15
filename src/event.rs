// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

use bitflags::bitflags;
use serde::Serialize;

use crate::config::ZoneKind;
use crate::devices::output::OutputSnapshot;
use crate::devices::partition::{PartitionState, PartitionTarget};

bitflags! {
    /// Attributes of a partition that changed in one publication.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartitionChanges: u8 {
        const CURRENT = 0b01;
        const TARGET  = 0b10;
    }
}

bitflags! {
    /// Attributes of an output that changed in one publication.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputChanges: u8 {
        const CURRENT = 0b001;
        const TARGET  = 0b010;
        /// Door position state (increasing/decreasing/stopped)
        const MOTION  = 0b100;
    }
}

impl PartitionChanges {
    pub fn between(
        old: Option<(PartitionState, PartitionTarget)>,
        new: (PartitionState, PartitionTarget),
    ) -> Self {
        let Some((current, target)) = old else {
            return Self::all();
        };
        let mut changes = Self::empty();
        if current != new.0 {
            changes |= Self::CURRENT;
        }
        if target != new.1 {
            changes |= Self::TARGET;
        }
        changes
    }
}

impl OutputChanges {
    pub fn between(old: Option<&OutputSnapshot>, new: &OutputSnapshot) -> Self {
        let Some(old) = old else {
            return Self::all();
        };
        let (oc, ot, om) = old.codes();
        let (nc, nt, nm) = new.codes();
        let mut changes = Self::empty();
        if oc != nc {
            changes |= Self::CURRENT;
        }
        if ot != nt {
            changes |= Self::TARGET;
        }
        if om != nm {
            changes |= Self::MOTION;
        }
        changes
    }
}

/// Published device state, one variant per device family.
///
/// Hosts subscribe via `Dispatcher::subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<DeviceEvent>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum DeviceEvent {
    PartitionChanged {
        id: u32,
        current: PartitionState,
        target: PartitionTarget,
        #[serde(skip_serializing)]
        changed: PartitionChanges,
    },
    ZoneChanged {
        id: u32,
        kind: ZoneKind,
        sealed: bool,
    },
    OutputChanged {
        id: u32,
        state: OutputSnapshot,
        #[serde(skip_serializing)]
        changed: OutputChanges,
    },
    /// A momentary task fired and is back off.
    TaskReset { id: u32 },
}

impl DeviceEvent {
    /// Topic segment and numeric ID of the device this event describes.
    pub fn device(&self) -> (crate::error::DeviceKind, u32) {
        use crate::error::DeviceKind;
        match self {
            DeviceEvent::PartitionChanged { id, .. } => (DeviceKind::Partition, *id),
            DeviceEvent::ZoneChanged { id, .. } => (DeviceKind::Zone, *id),
            DeviceEvent::OutputChanged { id, .. } => (DeviceKind::Output, *id),
            DeviceEvent::TaskReset { id } => (DeviceKind::Task, *id),
        }
    }
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<DeviceEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<DeviceEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
