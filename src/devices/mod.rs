// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

pub mod output;
pub mod partition;
pub mod task;
pub mod zone;

pub use output::{
    Barrier, BarrierPolicy, DoorPolicy, DoorState, DoorTarget, Drive, GaragePolicy, Output,
    OutputSnapshot, PositionState, SwitchPolicy, TargetRequest,
};
pub use partition::{ArmMode, Partition, PartitionState, PartitionTarget};
pub use task::Task;
pub use zone::Zone;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::{DeviceEvent, EventSender};
use crate::protocol::Command;
use crate::timer::Timers;

/// Outbound command path towards the panel link.
#[derive(Debug, Clone)]
pub struct CommandSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSink {
    pub fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, command: Command) {
        debug!(%command, "command");
        if self.tx.send(command).is_err() {
            warn!("Command channel closed, command dropped");
        }
    }
}

/// Everything a state machine may touch while handling one input.
pub struct Context<'a> {
    pub commands: &'a CommandSink,
    pub events: &'a EventSender,
    pub timers: &'a mut Timers,
}

impl Context<'_> {
    pub fn notify(&self, event: DeviceEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Capability used by the mutual-exclusion coordinator to stop a sibling.
pub trait Abortable {
    fn id(&self) -> u32;

    /// Cancel any timed drive and switch the relay off.
    fn abort(&mut self, ctx: &mut Context<'_>);
}

#[cfg(test)]
pub(crate) mod harness {
    use tokio::sync::mpsc;

    use super::*;
    use crate::event::{EventReceiver, event_channel};
    use crate::timer::{TimerFired, TimerReceiver};

    /// Channels and timers for driving a state machine in isolation.
    pub(crate) struct Harness {
        pub commands: CommandSink,
        pub command_rx: mpsc::UnboundedReceiver<Command>,
        pub events: EventSender,
        pub event_rx: EventReceiver,
        pub timers: Timers,
        pub timer_rx: TimerReceiver,
    }

    impl Harness {
        pub fn new() -> Self {
            let (commands, command_rx) = CommandSink::channel();
            let (events, event_rx) = event_channel(64);
            let (timers, timer_rx) = Timers::new();
            Self {
                commands,
                command_rx,
                events,
                event_rx,
                timers,
                timer_rx,
            }
        }

        pub fn ctx(&mut self) -> Context<'_> {
            Context {
                commands: &self.commands,
                events: &self.events,
                timers: &mut self.timers,
            }
        }

        pub fn commands(&mut self) -> Vec<Command> {
            let mut out = Vec::new();
            while let Ok(command) = self.command_rx.try_recv() {
                out.push(command);
            }
            out
        }

        pub fn events(&mut self) -> Vec<DeviceEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.event_rx.try_recv() {
                out.push(event);
            }
            out
        }

        /// Wait for the next fire that belongs to a live timer.
        pub async fn next_timer(&mut self) -> TimerFired {
            loop {
                let fired = self.timer_rx.recv().await.expect("timer channel closed");
                if self.timers.expire(&fired) {
                    return fired;
                }
            }
        }
    }
}
