// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::DeviceConfig;
use crate::devices::{CommandSink, PartitionTarget, TargetRequest};
use crate::dispatcher::{Dispatcher, HostRequest};
use crate::error::{BridgeError, Result};
use crate::event::{EventReceiver, EventSender, event_channel};
use crate::registry::Registry;
use crate::transport::PanelLink;

/// A running bridge: panel link plus dispatcher task.
///
/// # Example
///
/// ```no_run
/// use envy_lan_bridge::{DeviceConfig, EnvyBridge, PartitionTarget};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config: DeviceConfig = toml::from_str(&std::fs::read_to_string("config.toml")?)?;
///     let mut bridge = EnvyBridge::start(config)?;
///
///     let mut events = bridge.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     bridge.set_partition(1, PartitionTarget::ArmedAway).await?;
///
///     tokio::signal::ctrl_c().await?;
///     bridge.shutdown();
///     Ok(())
/// }
/// ```
pub struct EnvyBridge {
    event_tx: EventSender,
    requests: mpsc::Sender<HostRequest>,
    link: PanelLink,
    dispatcher_handle: Option<JoinHandle<()>>,
}

impl EnvyBridge {
    /// Validate the configuration, build the registry and start the link and
    /// dispatcher tasks. Must be called from within a tokio runtime.
    pub fn start(config: DeviceConfig) -> Result<Self> {
        let registry = Registry::from_config(&config)?;
        let (event_tx, _event_rx) = event_channel(256);
        let (commands, command_rx) = CommandSink::channel();
        let (link_tx, link_rx) = mpsc::channel(64);
        let (request_tx, request_rx) = mpsc::channel(64);

        let link = PanelLink::spawn(config.link.clone(), command_rx, link_tx);
        let dispatcher = Dispatcher::new(registry, commands, event_tx.clone());
        let dispatcher_handle = tokio::spawn(dispatcher.run(link_rx, request_rx));

        info!(
            partitions = config.partitions.len(),
            zones = config.zones().count(),
            outputs = config.outputs().count(),
            tasks = config.tasks.len(),
            "Bridge started"
        );

        Ok(Self {
            event_tx,
            requests: request_tx,
            link,
            dispatcher_handle: Some(dispatcher_handle),
        })
    }

    /// Subscribe to published device state.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    pub async fn request(&self, request: HostRequest) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }

    pub async fn set_partition(&self, id: u32, target: PartitionTarget) -> Result<()> {
        self.request(HostRequest::SetPartition { id, target }).await
    }

    pub async fn set_output(&self, id: u32, request: TargetRequest) -> Result<()> {
        self.request(HostRequest::SetOutput { id, request }).await
    }

    pub async fn activate_task(&self, id: u32) -> Result<()> {
        self.request(HostRequest::ActivateTask { id }).await
    }

    /// Ask for every device's current state to be broadcast.
    pub async fn announce(&self) -> Result<()> {
        self.request(HostRequest::Announce).await
    }

    /// Clone of the request channel, for hosts that feed requests from
    /// another task.
    pub fn requests(&self) -> mpsc::Sender<HostRequest> {
        self.requests.clone()
    }

    pub fn shutdown(&mut self) {
        info!("Stopping bridge");
        self.link.shutdown();
        if let Some(handle) = self.dispatcher_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for EnvyBridge {
    fn drop(&mut self) {
        if self.dispatcher_handle.is_some() {
            self.shutdown();
        }
    }
}
