// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

//! Routes link data, timer fires and host requests to device state machines.
//!
//! A [`Dispatcher`] owns the registry, the line framer and the timers, and is
//! driven from a single task by [`Dispatcher::run`]. Every input is handled to
//! completion before the next one is looked at, so protocol events are
//! applied in arrival order and no two state machines run concurrently.

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::devices::{
    Abortable, CommandSink, Context, Drive, OutputSnapshot, PartitionState, PartitionTarget,
    TargetRequest,
};
use crate::error::{BridgeError, DeviceKind, Result};
use crate::event::{DeviceEvent, EventReceiver, EventSender, OutputChanges, PartitionChanges};
use crate::framer::LineFramer;
use crate::protocol::{self, Event};
use crate::registry::Registry;
use crate::timer::{TimerFired, TimerReceiver, Timers};
use crate::transport::LinkEvent;

/// Something the host wants done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    SetPartition { id: u32, target: PartitionTarget },
    SetOutput { id: u32, request: TargetRequest },
    ActivateTask { id: u32 },
    /// Broadcast the current state of every device.
    Announce,
}

pub struct Dispatcher {
    registry: Registry,
    framer: LineFramer,
    commands: CommandSink,
    events: EventSender,
    timers: Timers,
    timer_rx: TimerReceiver,
}

fn unknown(kind: DeviceKind, id: u32) -> BridgeError {
    BridgeError::UnknownDevice { kind, id }
}

impl Dispatcher {
    pub fn new(registry: Registry, commands: CommandSink, events: EventSender) -> Self {
        let (timers, timer_rx) = Timers::new();
        Self {
            registry,
            framer: LineFramer::new(),
            commands,
            events,
            timers,
            timer_rx,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn split(&mut self) -> (&mut Registry, Context<'_>) {
        (
            &mut self.registry,
            Context {
                commands: &self.commands,
                events: &self.events,
                timers: &mut self.timers,
            },
        )
    }

    // ------------------------------------------------------------------
    // Link input
    // ------------------------------------------------------------------

    pub fn handle_chunk(&mut self, chunk: &[u8]) {
        for line in self.framer.push(chunk) {
            self.handle_line(&line);
        }
    }

    pub fn handle_line(&mut self, line: &str) {
        match protocol::decode(line) {
            Some(event) => self.handle_event(event),
            None => trace!(line, "ignored line"),
        }
    }

    /// Partial data from a dead connection must not prefix the next one.
    pub fn link_down(&mut self) {
        if !self.framer.pending().is_empty() {
            debug!(bytes = self.framer.pending().len(), "discarding partial line");
        }
        self.framer.clear();
    }

    pub fn handle_event(&mut self, event: Event) {
        trace!(event = event.name(), "panel event");
        let (registry, mut ctx) = self.split();
        match event {
            Event::PartitionStatus { partition, status }
            | Event::PartitionEvent { partition, status } => match registry.partition_mut(partition) {
                Some(p) => {
                    p.apply_status(status, &ctx);
                }
                None => debug!(partition, "status for unknown partition"),
            },
            Event::PartitionAlarm { partition, active } => match registry.partition_mut(partition) {
                Some(p) => {
                    p.apply_alarm(active, &ctx);
                }
                None => debug!(partition, "alarm for unknown partition"),
            },
            Event::PartitionReady { partition, ready } => {
                trace!(partition, ready, "partition ready");
            }
            Event::ZoneBypass { zone, bypassed } => {
                trace!(zone, bypassed, "zone bypass");
            }
            Event::ZoneStatus { zone, condition, .. } => {
                match registry.zone_mut(zone) {
                    Some(z) => {
                        z.apply(condition, &ctx);
                    }
                    None => debug!(zone, "status for unknown zone"),
                }
                let open = !condition.is_sealed();
                for id in registry.zone_watchers(zone).to_vec() {
                    if let Some(output) = registry.output_mut(id) {
                        output.set_zone_state(open, &mut ctx);
                    }
                }
            }
            Event::OutputStatus { output, on } => match registry.output_mut(output) {
                Some(o) => o.set_relay_state(on, &ctx),
                None => debug!(output, "status for unknown output"),
            },
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub fn handle_timer(&mut self, fired: TimerFired) {
        let (registry, mut ctx) = self.split();
        if !ctx.timers.expire(&fired) {
            return;
        }
        if let Some(output) = registry.output_mut(fired.key.output) {
            output.on_timer(fired.key.kind, &ctx);
        }
    }

    /// Wait for the next timer fire. Used when driving the dispatcher by hand.
    pub async fn next_timer(&mut self) -> Option<TimerFired> {
        self.timer_rx.recv().await
    }

    // ------------------------------------------------------------------
    // Host requests
    // ------------------------------------------------------------------

    pub fn set_partition_target(&mut self, id: u32, target: PartitionTarget) -> Result<()> {
        let (registry, ctx) = self.split();
        let partition = registry
            .partition_mut(id)
            .ok_or_else(|| unknown(DeviceKind::Partition, id))?;
        partition.set_target(target, &ctx);
        Ok(())
    }

    /// Move an output. An opening drive first aborts every other output in
    /// the same exclusion group.
    pub fn set_output_target(&mut self, id: u32, request: TargetRequest) -> Result<()> {
        let (registry, mut ctx) = self.split();
        let output = registry
            .output(id)
            .ok_or_else(|| unknown(DeviceKind::Output, id))?;
        let Some(drive) = output.plan(request) else {
            debug!(output = id, ?request, "target unchanged");
            return Ok(());
        };

        if drive == Drive::Open {
            for sibling in registry.siblings(id) {
                if let Some(other) = registry.output_mut(sibling) {
                    other.abort(&mut ctx);
                }
            }
        }
        if let Some(output) = registry.output_mut(id) {
            output.drive(request, drive, &mut ctx);
        }
        Ok(())
    }

    pub fn activate_task(&mut self, id: u32) -> Result<()> {
        let (registry, ctx) = self.split();
        let task = registry
            .task_mut(id)
            .ok_or_else(|| unknown(DeviceKind::Task, id))?;
        task.activate(&ctx);
        Ok(())
    }

    pub fn handle_request(&mut self, request: HostRequest) -> Result<()> {
        match request {
            HostRequest::SetPartition { id, target } => self.set_partition_target(id, target),
            HostRequest::SetOutput { id, request } => self.set_output_target(id, request),
            HostRequest::ActivateTask { id } => self.activate_task(id),
            HostRequest::Announce => {
                self.announce();
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    pub fn partition_state(&self, id: u32) -> Result<(PartitionState, PartitionTarget)> {
        let p = self
            .registry
            .partition(id)
            .ok_or_else(|| unknown(DeviceKind::Partition, id))?;
        Ok((p.current_state(), p.target_state()))
    }

    pub fn valid_targets(&self, id: u32) -> Result<Vec<PartitionTarget>> {
        self.registry
            .partition(id)
            .map(|p| p.valid_targets())
            .ok_or_else(|| unknown(DeviceKind::Partition, id))
    }

    pub fn zone_sealed(&self, id: u32) -> Result<bool> {
        self.registry
            .zone(id)
            .map(|z| z.is_sealed())
            .ok_or_else(|| unknown(DeviceKind::Zone, id))
    }

    pub fn output_state(&self, id: u32) -> Result<OutputSnapshot> {
        self.registry
            .output(id)
            .map(|o| o.snapshot())
            .ok_or_else(|| unknown(DeviceKind::Output, id))
    }

    pub fn task_on(&self, id: u32) -> Result<bool> {
        self.registry
            .task(id)
            .map(|t| t.is_on())
            .ok_or_else(|| unknown(DeviceKind::Task, id))
    }

    /// Broadcast a snapshot of every device, whether or not it changed.
    pub fn announce(&self) {
        let send = |event| {
            let _ = self.events.send(event);
        };
        for p in self.registry.partitions() {
            send(DeviceEvent::PartitionChanged {
                id: p.id,
                current: p.current_state(),
                target: p.target_state(),
                changed: PartitionChanges::all(),
            });
        }
        for z in self.registry.zones() {
            send(z.event());
        }
        for (id, o) in self.registry.outputs() {
            send(DeviceEvent::OutputChanged {
                id,
                state: o.snapshot(),
                changed: OutputChanges::all(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    /// Process link events, timer fires and host requests until the link or
    /// request channel closes.
    pub async fn run(
        mut self,
        mut link: mpsc::Receiver<LinkEvent>,
        mut requests: mpsc::Receiver<HostRequest>,
    ) {
        loop {
            tokio::select! {
                event = link.recv() => match event {
                    Some(LinkEvent::Data(chunk)) => self.handle_chunk(&chunk),
                    Some(LinkEvent::Connected) => info!("Panel link up"),
                    Some(LinkEvent::Disconnected) => {
                        info!("Panel link down");
                        self.link_down();
                    }
                    None => {
                        info!("Link closed, dispatcher stopping");
                        break;
                    }
                },
                Some(fired) = self.timer_rx.recv() => self.handle_timer(fired),
                request = requests.recv() => match request {
                    Some(request) => {
                        if let Err(e) = self.handle_request(request) {
                            warn!("Host request rejected: {}", e);
                        }
                    }
                    None => {
                        info!("Host closed, dispatcher stopping");
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, OutputConfig, OutputKind, PartitionConfig, ZoneConfig, ZoneKind};
    use crate::event::event_channel;
    use crate::protocol::Command;

    fn dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<Command>, EventReceiver) {
        let mut p = PartitionConfig::new(1, "1234");
        p.zones.push(ZoneConfig {
            number: 2,
            name: String::new(),
            kind: ZoneKind::Motion,
        });
        p.outputs.push(
            OutputConfig::new(3, OutputKind::Door)
                .with_zone(2)
                .with_debounce(false),
        );
        let config = DeviceConfig {
            partitions: vec![p],
            ..Default::default()
        };
        let registry = Registry::from_config(&config).unwrap();
        let (commands, command_rx) = CommandSink::channel();
        let (events, event_rx) = event_channel(64);
        (Dispatcher::new(registry, commands, events), command_rx, event_rx)
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let (mut d, mut commands, mut events) = dispatcher();
        d.handle_line("Security_system::OutputStatus(OutputNumber = 99, IsOutputOn = true)");
        d.handle_line("Security_system::PartitionStatus(PartitionNumber = 9, CurrentPartitionArmingStatus = Disarmed)");
        d.handle_line("Security_system::ZoneStatus(ZoneNumber = 77, CurrentZoneStatus = Unsealed, ZoneSummary = 0)");
        d.handle_line("not a panel line");
        assert!(commands.try_recv().is_err());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_chunks_are_framed_in_order() {
        let (mut d, _commands, _events) = dispatcher();
        d.handle_chunk(b"Security_system::PartitionStatus(PartitionNumber = 1, CurrentPartitionArming");
        d.handle_chunk(b"Status = ArmedAway)\nSecurity_system::PartitionStatus(PartitionNumber = 1, CurrentPartitionArmingStatus = Disarmed)\n");
        assert_eq!(
            d.partition_state(1).unwrap(),
            (PartitionState::Disarmed, PartitionTarget::Disarmed)
        );
    }

    #[test]
    fn test_link_down_drops_partial_line() {
        let (mut d, _commands, _events) = dispatcher();
        d.handle_chunk(b"Security_system::ZoneStatus(ZoneNumber = 2, Current");
        d.link_down();
        d.handle_chunk(b"ZoneStatus = Unsealed, ZoneSummary = 1)\n");
        assert!(d.zone_sealed(2).unwrap());
    }

    #[test]
    fn test_zone_fans_out_to_output() {
        let (mut d, _commands, _events) = dispatcher();
        d.handle_line("Security_system::ZoneStatus(ZoneNumber = 2, CurrentZoneStatus = Unsealed, ZoneSummary = 1)");
        assert!(!d.zone_sealed(2).unwrap());
        match d.output_state(3).unwrap() {
            OutputSnapshot::Door { current, .. } => assert_eq!(current, 100),
            other => panic!("unexpected snapshot {other:?}"),
        }
    }

    #[test]
    fn test_unknown_device_requests_fail() {
        let (mut d, _commands, _events) = dispatcher();
        assert!(matches!(
            d.set_output_target(8, TargetRequest::Position(100)),
            Err(BridgeError::UnknownDevice {
                kind: DeviceKind::Output,
                id: 8
            })
        ));
        assert!(d.activate_task(1).is_err());
        assert!(d.set_partition_target(2, PartitionTarget::Disarmed).is_err());
    }

    #[test]
    fn test_announce_covers_every_device() {
        let (d, _commands, mut events) = dispatcher();
        d.announce();
        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.device());
        }
        assert_eq!(
            kinds,
            vec![
                (DeviceKind::Partition, 1),
                (DeviceKind::Zone, 2),
                (DeviceKind::Output, 3)
            ]
        );
    }
}
