// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge
//
//! # envy-lan-bridge
//!
//! Bridges the text protocol of an Envy security panel's integration
//! service to a model of smart-home devices: security partitions, motion and
//! contact sensors, doors, garage doors, switches and momentary tasks.
//!
//! Inbound lines such as
//! `Security_system::ZoneStatus(ZoneNumber = 2, CurrentZoneStatus = Unsealed, ZoneSummary = 1)`
//! update device state machines, which publish [`DeviceEvent`]s and emit
//! [`Command`]s back to the panel. Doors driven by a timed relay report a
//! waiting window while they move, zone changes can be debounced, and
//! outputs sharing a group zone are mutually exclusive.
//!
//! ## Quick Start
//!
//! ```no_run
//! use envy_lan_bridge::{DeviceConfig, EnvyBridge, TargetRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config: DeviceConfig = toml::from_str(r#"
//!         [link]
//!         address = "192.168.1.50"
//!
//!         [[partitions]]
//!         number = 1
//!         code = "1234"
//!
//!           [[partitions.outputs]]
//!           number = 5
//!           type = "Door"
//!           duration = 10
//!     "#)?;
//!
//!     let bridge = EnvyBridge::start(config)?;
//!     let mut events = bridge.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     bridge.set_output(5, TargetRequest::Position(100)).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod devices;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod framer;
pub mod protocol;
pub mod registry;
pub mod timer;
pub mod transport;

// Re-exports for convenience
pub use bridge::EnvyBridge;
pub use config::{
    DeviceConfig, LinkConfig, LinkConfigBuilder, ModeBinding, OutputConfig, OutputKind,
    PartitionConfig, TaskConfig, ZoneConfig, ZoneKind,
};
pub use devices::{
    CommandSink, DoorState, DoorTarget, OutputSnapshot, PartitionState, PartitionTarget,
    PositionState, TargetRequest,
};
pub use dispatcher::{Dispatcher, HostRequest};
pub use error::{BridgeError, DeviceKind, Result};
pub use event::{DeviceEvent, EventReceiver, OutputChanges, PartitionChanges, event_channel};
pub use protocol::{Command, Event};
pub use registry::Registry;
pub use transport::{LinkEvent, PanelLink};
