// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

use crate::config::{ZoneConfig, ZoneKind};
use crate::devices::Context;
use crate::event::DeviceEvent;
use crate::protocol::ZoneCondition;

/// A single sensor zone.
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: u32,
    pub kind: ZoneKind,
    sealed: bool,
}

impl Zone {
    pub fn new(config: &ZoneConfig) -> Self {
        Self {
            id: config.number,
            kind: config.kind,
            sealed: true,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Motion detected for a motion zone, contact open for a contact zone.
    pub fn is_triggered(&self) -> bool {
        !self.sealed
    }

    /// Apply a `ZoneStatus` condition. Returns whether the state changed.
    pub fn apply(&mut self, condition: ZoneCondition, ctx: &Context<'_>) -> bool {
        let sealed = condition.is_sealed();
        if sealed == self.sealed {
            return false;
        }
        self.sealed = sealed;
        ctx.notify(self.event());
        true
    }

    pub fn event(&self) -> DeviceEvent {
        DeviceEvent::ZoneChanged {
            id: self.id,
            kind: self.kind,
            sealed: self.sealed,
        }
    }
}
