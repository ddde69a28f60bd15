// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ModeBinding, PartitionConfig};
use crate::devices::Context;
use crate::event::{DeviceEvent, PartitionChanges};
use crate::protocol::{ArmingStatus, Command, Macro};

/// Logical arming mode selectable by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmMode {
    Stay,
    Away,
    Night,
}

impl ArmMode {
    /// Macro used when the mode's binding is hidden.
    pub fn default_macro(&self) -> Macro {
        match self {
            Self::Stay => Macro::ArmStay,
            Self::Away => Macro::ArmAway,
            Self::Night => Macro::ArmNight,
        }
    }

    fn target(&self) -> PartitionTarget {
        match self {
            Self::Stay => PartitionTarget::ArmedStay,
            Self::Away => PartitionTarget::ArmedAway,
            Self::Night => PartitionTarget::ArmedNight,
        }
    }
}

/// Target state of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionTarget {
    Disarmed,
    ArmedStay,
    ArmedAway,
    ArmedNight,
}

impl PartitionTarget {
    pub fn mode(&self) -> Option<ArmMode> {
        match self {
            Self::Disarmed => None,
            Self::ArmedStay => Some(ArmMode::Stay),
            Self::ArmedAway => Some(ArmMode::Away),
            Self::ArmedNight => Some(ArmMode::Night),
        }
    }
}

/// Current state of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PartitionState {
    /// No status received yet
    Unknown,
    Disarmed,
    ArmedStay,
    ArmedAway,
    ArmedNight,
    Alarm,
}

impl From<PartitionTarget> for PartitionState {
    fn from(target: PartitionTarget) -> Self {
        match target {
            PartitionTarget::Disarmed => Self::Disarmed,
            PartitionTarget::ArmedStay => Self::ArmedStay,
            PartitionTarget::ArmedAway => Self::ArmedAway,
            PartitionTarget::ArmedNight => Self::ArmedNight,
        }
    }
}

/// A single security partition.
#[derive(Debug, Clone)]
pub struct Partition {
    pub id: u32,
    code: String,
    stay: ModeBinding,
    away: ModeBinding,
    night: ModeBinding,
    current: PartitionState,
    target: Option<PartitionTarget>,
    published: Option<(PartitionState, PartitionTarget)>,
}

impl Partition {
    pub fn new(config: &PartitionConfig) -> Self {
        Self {
            id: config.number,
            code: config.code.clone(),
            stay: config.stay_mode,
            away: config.away_mode,
            night: config.night_mode,
            current: PartitionState::Unknown,
            target: None,
            published: None,
        }
    }

    fn binding(&self, mode: ArmMode) -> ModeBinding {
        match mode {
            ArmMode::Stay => self.stay,
            ArmMode::Away => self.away,
            ArmMode::Night => self.night,
        }
    }

    /// Current state as reported to hosts; `Unknown` reads as disarmed.
    pub fn current_state(&self) -> PartitionState {
        match self.current {
            PartitionState::Unknown => PartitionState::Disarmed,
            state => state,
        }
    }

    pub fn target_state(&self) -> PartitionTarget {
        self.target.unwrap_or(PartitionTarget::Disarmed)
    }

    /// Whether no status has been received since start.
    pub fn is_unknown(&self) -> bool {
        self.current == PartitionState::Unknown
    }

    /// Targets the host may select: disarm plus every mode that is not hidden.
    pub fn valid_targets(&self) -> Vec<PartitionTarget> {
        let mut targets = vec![PartitionTarget::Disarmed];
        for mode in [ArmMode::Stay, ArmMode::Away, ArmMode::Night] {
            if self.binding(mode) != ModeBinding::Hidden {
                targets.push(mode.target());
            }
        }
        targets
    }

    /// Map a reported arming literal back to the mode configured to produce it.
    pub fn target_for(&self, status: ArmingStatus) -> PartitionTarget {
        let mut target = match status {
            ArmingStatus::Disarmed => return PartitionTarget::Disarmed,
            ArmingStatus::ArmedStay => PartitionTarget::ArmedStay,
            ArmingStatus::ArmedAway => PartitionTarget::ArmedAway,
            ArmingStatus::ArmedNight => PartitionTarget::ArmedNight,
        };
        // Last matching binding wins
        for mode in [ArmMode::Stay, ArmMode::Away, ArmMode::Night] {
            if self
                .binding(mode)
                .macro_name()
                .is_some_and(|m| m.reported_status() == status)
            {
                target = mode.target();
            }
        }
        target
    }

    /// `PartitionStatus` / `PartitionEvent`. The panel is authoritative: both
    /// current and target are overwritten. An active alarm survives armed
    /// updates and is cleared by a disarm.
    pub fn apply_status(&mut self, status: ArmingStatus, ctx: &Context<'_>) -> PartitionChanges {
        let target = self.target_for(status);
        self.target = Some(target);
        if self.current != PartitionState::Alarm || target == PartitionTarget::Disarmed {
            self.current = target.into();
        }
        self.publish(ctx)
    }

    /// `PartitionAlarm`. Only an active alarm changes state.
    pub fn apply_alarm(&mut self, active: bool, ctx: &Context<'_>) -> PartitionChanges {
        if !active {
            return PartitionChanges::empty();
        }
        self.current = PartitionState::Alarm;
        self.publish(ctx)
    }

    /// Host request. Emits one `SmartPin` and records the target; the
    /// current state only moves once the panel reports it.
    pub fn set_target(&mut self, target: PartitionTarget, ctx: &Context<'_>) -> PartitionChanges {
        if self.target == Some(target) {
            debug!(partition = self.id, ?target, "target unchanged");
            return PartitionChanges::empty();
        }

        let (macro_name, selectable) = match target.mode() {
            None => (Macro::Disarm, true),
            Some(mode) => match self.binding(mode).macro_name() {
                Some(m) => (m, true),
                None => (mode.default_macro(), false),
            },
        };

        ctx.commands.send(Command::SmartPin {
            partition: self.id,
            macro_name,
            code: self.code.clone(),
        });

        if selectable {
            self.target = Some(target);
        } else {
            debug!(partition = self.id, ?target, "hidden mode requested, target left to panel");
        }
        self.publish(ctx)
    }

    pub fn publish(&mut self, ctx: &Context<'_>) -> PartitionChanges {
        let state = (self.current_state(), self.target_state());
        let changed = PartitionChanges::between(self.published, state);
        if !changed.is_empty() {
            debug!(partition = self.id, current = ?state.0, target = ?state.1, "partition state");
            self.published = Some(state);
            ctx.notify(DeviceEvent::PartitionChanged {
                id: self.id,
                current: state.0,
                target: state.1,
                changed,
            });
        }
        changed
    }
}
