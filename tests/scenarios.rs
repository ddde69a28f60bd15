// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge
//
// End-to-end behaviour through the public dispatcher API: config in, panel
// lines and host requests through, commands and device events out.

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Duration, Instant};

use envy_lan_bridge::{
    Command, CommandSink, DeviceConfig, DeviceEvent, Dispatcher, DoorState, DoorTarget,
    EventReceiver, OutputConfig, OutputKind, OutputSnapshot, PartitionConfig, PartitionState, PartitionTarget, Registry,
    TargetRequest, TaskConfig, ZoneConfig, ZoneKind, event_channel,
};
use envy_lan_bridge::protocol::Macro;

struct Rig {
    dispatcher: Dispatcher,
    commands: UnboundedReceiver<Command>,
    events: EventReceiver,
}

impl Rig {
    fn new(config: DeviceConfig) -> Self {
        let registry = Registry::from_config(&config).unwrap();
        let (sink, commands) = CommandSink::channel();
        let (events_tx, events) = event_channel(256);
        Self {
            dispatcher: Dispatcher::new(registry, sink, events_tx),
            commands,
            events,
        }
    }

    fn line(&mut self, line: &str) {
        self.dispatcher.handle_line(line);
    }

    fn commands(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            out.push(command);
        }
        out
    }

    fn events(&mut self) -> Vec<DeviceEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    fn output_events(&mut self, id: u32) -> Vec<OutputSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DeviceEvent::OutputChanged { id: got, state, .. } if got == id => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Wait for the next timer on the paused clock and process it.
    async fn fire_next_timer(&mut self) {
        let fired = self.dispatcher.next_timer().await.unwrap();
        self.dispatcher.handle_timer(fired);
    }

    fn door(&self, id: u32) -> (u8, u8) {
        match self.dispatcher.output_state(id).unwrap() {
            OutputSnapshot::Door {
                current, target, ..
            } => (current, target),
            other => panic!("output {id} is not a door: {other:?}"),
        }
    }

    fn garage(&self, id: u32) -> (DoorState, DoorTarget) {
        match self.dispatcher.output_state(id).unwrap() {
            OutputSnapshot::GarageDoor { current, target } => (current, target),
            other => panic!("output {id} is not a garage door: {other:?}"),
        }
    }
}

fn zone(number: u32, kind: ZoneKind) -> ZoneConfig {
    ZoneConfig {
        number,
        name: String::new(),
        kind,
    }
}

fn zone_line(zone: u32, sealed: bool) -> String {
    format!(
        "Security_system::ZoneStatus(ZoneNumber = {zone}, CurrentZoneStatus = {}, ZoneSummary = 0)",
        if sealed { "Sealed" } else { "Unsealed" }
    )
}

/// Door 5 (zone 2, group 2, 10s) and switch 6 (group 2) on partition 1.
fn shared_group() -> DeviceConfig {
    let mut partition = PartitionConfig::new(1, "1234");
    partition.zones.push(zone(2, ZoneKind::Contact));
    partition.outputs.push(
        OutputConfig::new(5, OutputKind::Door)
            .with_zone(2)
            .with_group_zone(2)
            .with_duration(10),
    );
    partition
        .outputs
        .push(OutputConfig::new(6, OutputKind::Switch).with_group_zone(2));
    DeviceConfig {
        partitions: vec![partition],
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_group_exclusion_then_waiting_resolves_from_sealed_zone() {
    let mut rig = Rig::new(shared_group());
    let start = Instant::now();

    rig.dispatcher
        .set_output_target(5, TargetRequest::Position(100))
        .unwrap();
    assert_eq!(
        rig.commands(),
        vec![
            Command::OutputOff { output: 6 },
            Command::OutputOn { output: 5 }
        ]
    );
    assert_eq!(rig.door(5), (0, 100));
    assert!(rig.dispatcher.registry().output(5).unwrap().is_waiting());

    // No panel feedback: the window closes on its own
    rig.fire_next_timer().await;
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert!(!rig.dispatcher.registry().output(5).unwrap().is_waiting());
    assert_eq!(rig.door(5), (0, 0));
    assert!(rig.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_waiting_resolves_from_confirmed_open_zone() {
    let mut rig = Rig::new(shared_group());
    rig.dispatcher
        .set_output_target(5, TargetRequest::Position(100))
        .unwrap();
    rig.commands();

    rig.line(&zone_line(2, false));
    // Debounce confirms first; the door still reads as moving
    rig.fire_next_timer().await;
    assert!(rig.dispatcher.registry().output(5).unwrap().zone_open());
    assert_eq!(rig.door(5), (0, 100));

    rig.fire_next_timer().await;
    assert_eq!(rig.door(5), (100, 100));
}

#[tokio::test(start_paused = true)]
async fn test_new_request_while_waiting_closes() {
    let mut rig = Rig::new(shared_group());
    rig.dispatcher
        .set_output_target(5, TargetRequest::Position(100))
        .unwrap();
    rig.commands();

    rig.dispatcher
        .set_output_target(5, TargetRequest::Position(0))
        .unwrap();
    assert_eq!(rig.commands(), vec![Command::OutputOff { output: 5 }]);
    assert!(!rig.dispatcher.registry().output(5).unwrap().is_waiting());
    assert_eq!(rig.door(5), (0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_sibling_waiting_window_is_cancelled() {
    let mut partition = PartitionConfig::new(1, "1234");
    partition.zones.push(zone(4, ZoneKind::Contact));
    partition.outputs.push(
        OutputConfig::new(7, OutputKind::Door)
            .with_group_zone(4)
            .with_duration(30),
    );
    partition.outputs.push(
        OutputConfig::new(8, OutputKind::Door)
            .with_group_zone(4)
            .with_duration(5),
    );
    let mut rig = Rig::new(DeviceConfig {
        partitions: vec![partition],
        ..Default::default()
    });
    let start = Instant::now();

    rig.dispatcher
        .set_output_target(7, TargetRequest::Position(100))
        .unwrap();
    rig.dispatcher
        .set_output_target(8, TargetRequest::Position(100))
        .unwrap();
    assert_eq!(
        rig.commands(),
        vec![
            Command::OutputOff { output: 8 },
            Command::OutputOn { output: 7 },
            Command::OutputOff { output: 7 },
            Command::OutputOn { output: 8 },
        ]
    );
    assert!(!rig.dispatcher.registry().output(7).unwrap().is_waiting());

    // Only door 8's window is still live
    rig.fire_next_timer().await;
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(start.elapsed() < Duration::from_secs(30));
    assert!(!rig.dispatcher.registry().output(8).unwrap().is_waiting());
}

fn debounced_door() -> DeviceConfig {
    let mut partition = PartitionConfig::new(1, "1234");
    partition.zones.push(zone(2, ZoneKind::Contact));
    partition
        .outputs
        .push(OutputConfig::new(3, OutputKind::Door).with_zone(2));
    DeviceConfig {
        partitions: vec![partition],
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_zone_flap_is_superseded() {
    let mut rig = Rig::new(debounced_door());
    let start = Instant::now();

    rig.line(&zone_line(2, false));
    tokio::time::advance(Duration::from_millis(500)).await;
    rig.line(&zone_line(2, true));
    rig.events();

    rig.fire_next_timer().await;
    assert!(start.elapsed() >= Duration::from_millis(2500));
    // Open was never reflected
    assert!(rig.output_events(3).is_empty());
    assert_eq!(rig.door(3), (0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_zone_change_confirms_after_window() {
    let mut rig = Rig::new(debounced_door());
    let start = Instant::now();

    rig.line(&zone_line(2, false));
    assert_eq!(rig.door(3), (0, 0));

    rig.fire_next_timer().await;
    assert!(start.elapsed() >= Duration::from_secs(2));
    let published = rig.output_events(3);
    assert_eq!(published.len(), 1);
    assert!(matches!(
        published[0],
        OutputSnapshot::Door { current: 100, .. }
    ));
}

#[test]
fn test_relay_status_is_idempotent() {
    let mut partition = PartitionConfig::new(1, "1234");
    partition.outputs.push(OutputConfig::new(9, OutputKind::Switch));
    let mut rig = Rig::new(DeviceConfig {
        partitions: vec![partition],
        ..Default::default()
    });

    let on = "Security_system::OutputStatus(OutputNumber = 9, IsOutputOn = true)";
    rig.line(on);
    rig.line(on);
    rig.line(on);
    assert_eq!(
        rig.output_events(9),
        vec![OutputSnapshot::Switch { on: true }]
    );

    // Requesting what is already reported sends nothing
    rig.dispatcher
        .set_output_target(9, TargetRequest::Switch(true))
        .unwrap();
    assert!(rig.commands().is_empty());
    assert!(rig.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_grouped_switch_follows_its_relay() {
    let mut rig = Rig::new(shared_group());

    rig.dispatcher
        .set_output_target(6, TargetRequest::Switch(true))
        .unwrap();
    assert_eq!(
        rig.commands(),
        vec![
            Command::OutputOff { output: 5 },
            Command::OutputOn { output: 6 }
        ]
    );
    rig.events();

    rig.line("Security_system::OutputStatus(OutputNumber = 6, IsOutputOn = true)");
    assert_eq!(
        rig.dispatcher.output_state(6).unwrap(),
        OutputSnapshot::Switch { on: true }
    );
    assert_eq!(
        rig.output_events(6),
        vec![OutputSnapshot::Switch { on: true }]
    );

    rig.dispatcher
        .set_output_target(6, TargetRequest::Switch(true))
        .unwrap();
    assert!(rig.commands().is_empty());

    rig.dispatcher
        .set_output_target(6, TargetRequest::Switch(false))
        .unwrap();
    assert_eq!(rig.commands(), vec![Command::OutputOff { output: 6 }]);
    rig.line("Security_system::OutputStatus(OutputNumber = 6, IsOutputOn = false)");
    assert_eq!(
        rig.dispatcher.output_state(6).unwrap(),
        OutputSnapshot::Switch { on: false }
    );
}

/// Garage opener 7 on zone 3 with a 12s travel time.
fn timed_garage() -> DeviceConfig {
    let mut partition = PartitionConfig::new(1, "1234");
    partition.zones.push(zone(3, ZoneKind::Contact));
    partition.outputs.push(
        OutputConfig::new(7, OutputKind::GarageDoorOpener)
            .with_zone(3)
            .with_duration(12),
    );
    DeviceConfig {
        partitions: vec![partition],
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_garage_open_and_close_cycle() {
    let mut rig = Rig::new(timed_garage());
    let start = Instant::now();

    rig.dispatcher
        .set_output_target(7, TargetRequest::Door(DoorTarget::Open))
        .unwrap();
    assert_eq!(rig.commands(), vec![Command::OutputOn { output: 7 }]);
    assert_eq!(rig.garage(7), (DoorState::Opening, DoorTarget::Open));

    // Debounced zone change lands inside the window
    rig.line(&zone_line(3, false));
    rig.fire_next_timer().await;
    assert_eq!(rig.garage(7), (DoorState::Opening, DoorTarget::Open));

    rig.fire_next_timer().await;
    assert!(start.elapsed() >= Duration::from_secs(12));
    assert_eq!(rig.garage(7), (DoorState::Open, DoorTarget::Open));

    // A timed opener is pulsed to close as well
    rig.dispatcher
        .set_output_target(7, TargetRequest::Door(DoorTarget::Closed))
        .unwrap();
    assert_eq!(rig.commands(), vec![Command::OutputOn { output: 7 }]);
    assert_eq!(rig.garage(7), (DoorState::Closing, DoorTarget::Closed));

    rig.line(&zone_line(3, true));
    rig.fire_next_timer().await;
    rig.fire_next_timer().await;
    assert_eq!(rig.garage(7), (DoorState::Closed, DoorTarget::Closed));
    assert!(rig.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_door_position_quantization() {
    for (requested, expected) in [(0, 0), (32, 0), (33, 50), (50, 50), (67, 50), (68, 100), (100, 100)] {
        let mut partition = PartitionConfig::new(1, "1234");
        partition
            .outputs
            .push(OutputConfig::new(5, OutputKind::Door).with_duration(10));
        let mut rig = Rig::new(DeviceConfig {
            partitions: vec![partition],
            ..Default::default()
        });

        rig.dispatcher
            .set_output_target(5, TargetRequest::Position(requested))
            .unwrap();
        assert_eq!(rig.door(5).1, expected, "position {requested}");
        let sent = rig.commands();
        if expected == 0 {
            assert!(sent.is_empty(), "position {requested}");
        } else {
            assert_eq!(sent, vec![Command::OutputOn { output: 5 }]);
        }
    }
}

fn partition_only() -> DeviceConfig {
    DeviceConfig {
        partitions: vec![PartitionConfig::new(1, "4321")],
        tasks: vec![TaskConfig {
            number: 3,
            name: String::new(),
        }],
        ..Default::default()
    }
}

#[test]
fn test_partition_panel_is_authoritative() {
    let mut rig = Rig::new(partition_only());

    rig.dispatcher
        .set_partition_target(1, PartitionTarget::ArmedAway)
        .unwrap();
    assert_eq!(
        rig.commands(),
        vec![Command::SmartPin {
            partition: 1,
            macro_name: Macro::ArmAway,
            code: "4321".to_string(),
        }]
    );
    // Not confirmed yet
    assert_eq!(
        rig.dispatcher.partition_state(1).unwrap(),
        (PartitionState::Disarmed, PartitionTarget::ArmedAway)
    );

    rig.line("Security_system::PartitionStatus(PartitionNumber = 1, CurrentPartitionArmingStatus = ArmedStay)");
    assert_eq!(
        rig.dispatcher.partition_state(1).unwrap(),
        (PartitionState::ArmedStay, PartitionTarget::ArmedStay)
    );
}

#[test]
fn test_partition_alarm_holds_until_disarmed() {
    let mut rig = Rig::new(partition_only());
    rig.line("Security_system::PartitionStatus(PartitionNumber = 1, CurrentPartitionArmingStatus = ArmedAway)");
    rig.line("Security_system::PartitionAlarm(PartitionNumber = 1, IsPartitionAlarmActive = true)");
    assert_eq!(
        rig.dispatcher.partition_state(1).unwrap().0,
        PartitionState::Alarm
    );

    rig.line("Security_system::PartitionEvent(PartitionNumber = 1, CurrentPartitionArmingEvent = ArmedAway)");
    assert_eq!(
        rig.dispatcher.partition_state(1).unwrap().0,
        PartitionState::Alarm
    );

    rig.line("Security_system::PartitionStatus(PartitionNumber = 1, CurrentPartitionArmingStatus = Disarmed)");
    assert_eq!(
        rig.dispatcher.partition_state(1).unwrap(),
        (PartitionState::Disarmed, PartitionTarget::Disarmed)
    );
}

#[test]
fn test_task_fires_and_resets() {
    let mut rig = Rig::new(partition_only());
    rig.dispatcher.activate_task(3).unwrap();
    assert_eq!(rig.commands(), vec![Command::ActivateTask { task: 3 }]);
    assert!(
        rig.events()
            .iter()
            .any(|e| matches!(e, DeviceEvent::TaskReset { id: 3 }))
    );
    assert!(!rig.dispatcher.task_on(3).unwrap());
}
