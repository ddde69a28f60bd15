// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

//! Panel outputs driving doors, garage doors and switches.
//!
//! Every output variant shares one state machine, [`Barrier`], over the same
//! inputs: the last reported relay state, the confirmed state of the zone it
//! tracks, and whether a timed drive is in progress. What differs between a
//! door, a garage door and a switch is captured by a [`BarrierPolicy`]: how a
//! host request is coerced into a target, and how the published state is
//! derived from the inputs.
//!
//! Two regimes exist. Without a configured duration the output is
//! relay-driven and its state follows the panel. With a duration, driving the
//! output opens a waiting window during which the output reports that it is
//! moving; when the window ends the state resolves from the zone.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::debug;

use crate::config::{OutputConfig, OutputKind};
use crate::devices::{Abortable, Context};
use crate::event::{DeviceEvent, OutputChanges};
use crate::protocol::Command;
use crate::timer::{TimerKey, TimerKind};

/// Window a zone change must survive before it is applied.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

/// Garage door target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorTarget {
    Open,
    Closed,
}

/// Garage door current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DoorState {
    Open,
    Closed,
    Opening,
    Closing,
    Stopped,
}

impl DoorState {
    pub fn code(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closed => 1,
            Self::Opening => 2,
            Self::Closing => 3,
            Self::Stopped => 4,
        }
    }
}

impl DoorTarget {
    pub fn code(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closed => 1,
        }
    }
}

/// Direction a door is moving in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PositionState {
    Decreasing,
    Increasing,
    Stopped,
}

impl PositionState {
    fn between(current: u8, target: u8) -> Self {
        match target.cmp(&current) {
            std::cmp::Ordering::Greater => Self::Increasing,
            std::cmp::Ordering::Less => Self::Decreasing,
            std::cmp::Ordering::Equal => Self::Stopped,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Decreasing => 0,
            Self::Increasing => 1,
            Self::Stopped => 2,
        }
    }
}

/// A host request to move an output. Each policy coerces any variant into
/// its own target domain; requests are never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRequest {
    /// Continuous position, 0 (closed) to 100 (open). Larger values clamp.
    Position(u8),
    Door(DoorTarget),
    Switch(bool),
}

/// Map a continuous position onto the three positions a door reports.
pub fn quantize(position: u8) -> u8 {
    match position {
        0..=32 => 0,
        33..=67 => 50,
        _ => 100,
    }
}

/// Published state of one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutputSnapshot {
    Door {
        current: u8,
        target: u8,
        motion: PositionState,
    },
    GarageDoor {
        current: DoorState,
        target: DoorTarget,
    },
    Switch {
        on: bool,
    },
}

impl OutputSnapshot {
    /// (current, target, motion) as comparable codes.
    pub(crate) fn codes(&self) -> (u8, u8, u8) {
        match self {
            Self::Door {
                current,
                target,
                motion,
            } => (*current, *target, motion.code()),
            Self::GarageDoor { current, target } => (current.code(), target.code(), 0),
            Self::Switch { on } => (*on as u8, *on as u8, 0),
        }
    }
}

/// The inputs every derived value is a function of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inputs {
    pub relay_on: bool,
    /// Confirmed zone state, `true` when unsealed.
    pub zone_open: bool,
    pub waiting: bool,
    /// A drive duration is configured.
    pub timed: bool,
}

/// Which side a request drives the output towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    Open,
    Close,
}

pub trait BarrierPolicy {
    const KIND: OutputKind;

    type Target: Copy + PartialEq + fmt::Debug;

    fn initial_target() -> Self::Target;

    fn coerce(request: TargetRequest) -> Self::Target;

    /// Whether a relay-driven output reads this target as "close".
    fn closes(target: Self::Target) -> bool;

    /// Target exposed once a drive has been issued.
    fn align(drive: Drive, requested: Self::Target, target_override: Option<u8>) -> Self::Target;

    fn resolve_target(inputs: &Inputs, target: Self::Target) -> Self::Target;

    fn snapshot(inputs: &Inputs, target: Self::Target) -> OutputSnapshot;
}

/// Door with a 0/50/100 position.
#[derive(Debug, Clone, Copy)]
pub struct DoorPolicy;

impl BarrierPolicy for DoorPolicy {
    const KIND: OutputKind = OutputKind::Door;

    type Target = u8;

    fn initial_target() -> u8 {
        0
    }

    fn coerce(request: TargetRequest) -> u8 {
        match request {
            TargetRequest::Position(v) => quantize(v.min(100)),
            TargetRequest::Door(DoorTarget::Open) | TargetRequest::Switch(true) => 100,
            TargetRequest::Door(DoorTarget::Closed) | TargetRequest::Switch(false) => 0,
        }
    }

    fn closes(target: u8) -> bool {
        target == 0
    }

    fn align(drive: Drive, requested: u8, target_override: Option<u8>) -> u8 {
        match (target_override.map(|t| t.min(100)), drive) {
            (Some(t), Drive::Open) => t,
            (Some(t), Drive::Close) => 100 - t,
            (None, _) => requested,
        }
    }

    fn resolve_target(inputs: &Inputs, target: u8) -> u8 {
        if inputs.waiting {
            target
        } else if inputs.timed {
            if inputs.zone_open { 100 } else { 0 }
        } else if inputs.relay_on {
            100
        } else {
            0
        }
    }

    fn snapshot(inputs: &Inputs, target: u8) -> OutputSnapshot {
        let current = if inputs.waiting {
            100 - target
        } else if inputs.zone_open {
            100
        } else {
            0
        };
        OutputSnapshot::Door {
            current,
            target,
            motion: PositionState::between(current, target),
        }
    }
}

/// Garage door opener with open/closed targets.
#[derive(Debug, Clone, Copy)]
pub struct GaragePolicy;

impl GaragePolicy {
    /// Overrides name an absolute side: 0 is closed, anything else open.
    fn override_side(target_override: u8) -> DoorTarget {
        if target_override == 0 {
            DoorTarget::Closed
        } else {
            DoorTarget::Open
        }
    }

    fn side(open: bool) -> DoorTarget {
        if open { DoorTarget::Open } else { DoorTarget::Closed }
    }
}

impl BarrierPolicy for GaragePolicy {
    const KIND: OutputKind = OutputKind::GarageDoorOpener;

    type Target = DoorTarget;

    fn initial_target() -> DoorTarget {
        DoorTarget::Closed
    }

    fn coerce(request: TargetRequest) -> DoorTarget {
        match request {
            TargetRequest::Position(v) => Self::side(quantize(v.min(100)) != 0),
            TargetRequest::Door(target) => target,
            TargetRequest::Switch(on) => Self::side(on),
        }
    }

    fn closes(target: DoorTarget) -> bool {
        target == DoorTarget::Closed
    }

    fn align(drive: Drive, requested: DoorTarget, target_override: Option<u8>) -> DoorTarget {
        match (target_override.map(Self::override_side), drive) {
            (Some(side), Drive::Open) => side,
            (Some(DoorTarget::Open), Drive::Close) => DoorTarget::Closed,
            (Some(DoorTarget::Closed), Drive::Close) => DoorTarget::Open,
            (None, _) => requested,
        }
    }

    fn resolve_target(inputs: &Inputs, target: DoorTarget) -> DoorTarget {
        if inputs.waiting {
            target
        } else if inputs.timed {
            Self::side(inputs.zone_open)
        } else {
            Self::side(inputs.relay_on)
        }
    }

    fn snapshot(inputs: &Inputs, target: DoorTarget) -> OutputSnapshot {
        let current = if inputs.waiting {
            match target {
                DoorTarget::Open => DoorState::Opening,
                DoorTarget::Closed => DoorState::Closing,
            }
        } else if inputs.timed {
            if inputs.zone_open { DoorState::Open } else { DoorState::Closed }
        } else {
            match (inputs.zone_open, inputs.relay_on) {
                (true, true) => DoorState::Open,
                (false, false) => DoorState::Closed,
                (false, true) => DoorState::Opening,
                (true, false) => DoorState::Stopped,
            }
        };
        OutputSnapshot::GarageDoor { current, target }
    }
}

/// On/off switch.
#[derive(Debug, Clone, Copy)]
pub struct SwitchPolicy;

impl BarrierPolicy for SwitchPolicy {
    const KIND: OutputKind = OutputKind::Switch;

    type Target = bool;

    fn initial_target() -> bool {
        false
    }

    fn coerce(request: TargetRequest) -> bool {
        match request {
            TargetRequest::Position(v) => quantize(v.min(100)) != 0,
            TargetRequest::Door(target) => target == DoorTarget::Open,
            TargetRequest::Switch(on) => on,
        }
    }

    fn closes(target: bool) -> bool {
        !target
    }

    fn align(drive: Drive, requested: bool, target_override: Option<u8>) -> bool {
        match (target_override, drive) {
            (Some(t), Drive::Open) => t != 0,
            (Some(t), Drive::Close) => t == 0,
            (None, _) => requested,
        }
    }

    fn resolve_target(inputs: &Inputs, target: bool) -> bool {
        if inputs.waiting {
            target
        } else if inputs.timed {
            inputs.zone_open
        } else {
            inputs.relay_on
        }
    }

    fn snapshot(inputs: &Inputs, target: bool) -> OutputSnapshot {
        OutputSnapshot::Switch {
            on: if inputs.waiting { target } else { inputs.zone_open },
        }
    }
}

/// One output's state machine.
#[derive(Debug)]
pub struct Barrier<P: BarrierPolicy> {
    id: u32,
    zone: Option<u32>,
    tracking: Option<u32>,
    group: Option<u32>,
    duration: Option<Duration>,
    target_override: Option<u8>,
    debounce: bool,

    relay_on: bool,
    zone_open: bool,
    pending_zone: Option<bool>,
    waiting: bool,
    target: P::Target,

    /// Last published state; `None` until the first publication.
    published: Option<OutputSnapshot>,
    _policy: PhantomData<P>,
}

impl<P: BarrierPolicy> Barrier<P> {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            id: config.number,
            zone: config.followed_zone(),
            tracking: config.tracking_zone(),
            group: config.exclusion_zone(),
            duration: config.duration_secs().map(Duration::from_secs),
            target_override: config.target,
            debounce: config.debounce_enabled(),
            relay_on: false,
            zone_open: false,
            pending_zone: None,
            waiting: false,
            target: P::initial_target(),
            published: None,
            _policy: PhantomData,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> OutputKind {
        P::KIND
    }

    /// Zone whose state this output follows.
    pub fn zone(&self) -> Option<u32> {
        self.zone
    }

    /// Zone keying this output's mutual-exclusion group.
    pub fn group(&self) -> Option<u32> {
        self.group
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn zone_open(&self) -> bool {
        self.zone_open
    }

    pub fn pending_zone(&self) -> Option<bool> {
        self.pending_zone
    }

    fn inputs(&self) -> Inputs {
        Inputs {
            relay_on: self.relay_on,
            zone_open: self.zone_open,
            waiting: self.waiting,
            timed: self.duration.is_some(),
        }
    }

    /// Relay-driven outputs with no override read requests literally.
    fn is_plain(&self) -> bool {
        self.target_override.is_none() && self.duration.is_none()
    }

    fn timer_key(&self, kind: TimerKind) -> TimerKey {
        TimerKey::new(self.id, kind)
    }

    pub fn target(&self) -> P::Target {
        P::resolve_target(&self.inputs(), self.target)
    }

    /// State as it would be published now.
    pub fn snapshot(&self) -> OutputSnapshot {
        let inputs = self.inputs();
        P::snapshot(&inputs, P::resolve_target(&inputs, self.target))
    }

    /// Decide how `request` would drive the output, or `None` if it repeats
    /// the current target. Does not change any state.
    pub fn plan(&self, request: TargetRequest) -> Option<Drive> {
        let requested = P::coerce(request);
        if requested == self.target() {
            return None;
        }
        if self.waiting || (self.is_plain() && P::closes(requested)) {
            Some(Drive::Close)
        } else {
            Some(Drive::Open)
        }
    }

    /// Issue a drive previously returned by [`plan`](Self::plan). Siblings
    /// must already have been aborted for [`Drive::Open`].
    pub fn drive(&mut self, request: TargetRequest, drive: Drive, ctx: &mut Context<'_>) {
        let requested = P::coerce(request);
        debug!(output = self.id, ?requested, ?drive, "drive");
        match drive {
            Drive::Close => {
                ctx.commands.send(Command::OutputOff { output: self.id });
                self.stop_waiting(ctx);
            }
            Drive::Open => {
                ctx.commands.send(Command::OutputOn { output: self.id });
                if let Some(duration) = self.duration {
                    self.waiting = true;
                    ctx.timers.start(self.timer_key(TimerKind::Waiting), duration);
                }
            }
        }
        self.target = P::align(drive, requested, self.target_override);
        self.publish(ctx);
    }

    fn stop_waiting(&mut self, ctx: &mut Context<'_>) {
        ctx.timers.cancel(self.timer_key(TimerKind::Waiting));
        self.waiting = false;
    }

    /// Zone fan-out. Debounced outputs hold the value for
    /// [`DEBOUNCE_WINDOW`], restarting the window on every call.
    pub fn set_zone_state(&mut self, open: bool, ctx: &mut Context<'_>) {
        if self.debounce {
            self.pending_zone = Some(open);
            ctx.timers
                .start(self.timer_key(TimerKind::Debounce), DEBOUNCE_WINDOW);
        } else {
            self.confirm_zone(open, ctx);
        }
    }

    fn confirm_zone(&mut self, open: bool, ctx: &Context<'_>) {
        if open != self.zone_open {
            self.zone_open = open;
            self.publish(ctx);
        }
    }

    /// Relay state reported by `OutputStatus`. Outputs without their own
    /// tracking zone take the relay as their zone state, even when they
    /// follow a group zone.
    pub fn set_relay_state(&mut self, on: bool, ctx: &Context<'_>) {
        if on == self.relay_on {
            return;
        }
        self.relay_on = on;
        if self.tracking.is_none() {
            self.zone_open = on;
        }
        self.publish(ctx);
    }

    /// One of this output's timers elapsed. The caller has already matched
    /// the fire against the live token.
    pub fn on_timer(&mut self, kind: TimerKind, ctx: &Context<'_>) {
        match kind {
            TimerKind::Waiting => {
                if self.waiting {
                    debug!(output = self.id, "waiting window ended");
                    self.waiting = false;
                    self.publish(ctx);
                }
            }
            TimerKind::Debounce => {
                if let Some(open) = self.pending_zone.take() {
                    self.confirm_zone(open, ctx);
                }
            }
        }
    }

    /// Recompute derived state and notify if it differs from what was last
    /// published.
    pub fn publish(&mut self, ctx: &Context<'_>) -> OutputChanges {
        let inputs = self.inputs();
        self.target = P::resolve_target(&inputs, self.target);
        let snapshot = P::snapshot(&inputs, self.target);

        let changed = OutputChanges::between(self.published.as_ref(), &snapshot);
        if !changed.is_empty() {
            debug!(output = self.id, ?snapshot, "output state");
            self.published = Some(snapshot);
            ctx.notify(DeviceEvent::OutputChanged {
                id: self.id,
                state: snapshot,
                changed,
            });
        }
        changed
    }
}

impl<P: BarrierPolicy> Abortable for Barrier<P> {
    fn id(&self) -> u32 {
        self.id
    }

    fn abort(&mut self, ctx: &mut Context<'_>) {
        debug!(output = self.id, "abort");
        self.stop_waiting(ctx);
        ctx.commands.send(Command::OutputOff { output: self.id });
        self.publish(ctx);
    }
}

/// An output of any kind, as held by the registry.
#[derive(Debug)]
pub enum Output {
    Door(Barrier<DoorPolicy>),
    GarageDoor(Barrier<GaragePolicy>),
    Switch(Barrier<SwitchPolicy>),
}

macro_rules! each {
    ($output:expr, $b:ident => $body:expr) => {
        match $output {
            Output::Door($b) => $body,
            Output::GarageDoor($b) => $body,
            Output::Switch($b) => $body,
        }
    };
}

impl Output {
    pub fn from_config(config: &OutputConfig) -> Self {
        match config.kind {
            OutputKind::Door => Output::Door(Barrier::new(config)),
            OutputKind::GarageDoorOpener => Output::GarageDoor(Barrier::new(config)),
            OutputKind::Switch => Output::Switch(Barrier::new(config)),
        }
    }

    pub fn kind(&self) -> OutputKind {
        each!(self, b => b.kind())
    }

    pub fn zone(&self) -> Option<u32> {
        each!(self, b => b.zone())
    }

    pub fn group(&self) -> Option<u32> {
        each!(self, b => b.group())
    }

    pub fn is_waiting(&self) -> bool {
        each!(self, b => b.is_waiting())
    }

    pub fn zone_open(&self) -> bool {
        each!(self, b => b.zone_open())
    }

    pub fn snapshot(&self) -> OutputSnapshot {
        each!(self, b => b.snapshot())
    }

    pub fn plan(&self, request: TargetRequest) -> Option<Drive> {
        each!(self, b => b.plan(request))
    }

    pub fn drive(&mut self, request: TargetRequest, drive: Drive, ctx: &mut Context<'_>) {
        each!(self, b => b.drive(request, drive, ctx))
    }

    pub fn set_zone_state(&mut self, open: bool, ctx: &mut Context<'_>) {
        each!(self, b => b.set_zone_state(open, ctx))
    }

    pub fn set_relay_state(&mut self, on: bool, ctx: &Context<'_>) {
        each!(self, b => b.set_relay_state(on, ctx))
    }

    pub fn on_timer(&mut self, kind: TimerKind, ctx: &Context<'_>) {
        each!(self, b => b.on_timer(kind, ctx))
    }

    pub fn publish(&mut self, ctx: &Context<'_>) -> OutputChanges {
        each!(self, b => b.publish(ctx))
    }
}

impl Abortable for Output {
    fn id(&self) -> u32 {
        each!(self, b => b.id)
    }

    fn abort(&mut self, ctx: &mut Context<'_>) {
        each!(self, b => b.abort(ctx))
    }
}
