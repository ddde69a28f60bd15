// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

//! TCP link to the panel's integration service.
//!
//! The link task dials the panel, announces itself with an
//! `UpdateSecurityStatus` keepalive on connect and then every keepalive
//! interval, forwards raw reads to the dispatcher and writes commands as they
//! arrive. A closed socket, a read error or read inactivity beyond the idle
//! timeout tears the connection down; the task then waits the reconnect delay
//! and dials again, forever. Commands produced while the link is down are
//! dropped.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, interval, sleep, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::Command;
use crate::transport::LinkEvent;

/// Handle to the background link task. Dropping it stops the task.
pub struct PanelLink {
    handle: Option<JoinHandle<()>>,
}

impl PanelLink {
    /// Start the link task. It runs until `events` is closed or the
    /// command channel's senders are all dropped.
    pub fn spawn(
        config: LinkConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        let handle = tokio::spawn(run_link(config, commands, events));
        Self {
            handle: Some(handle),
        }
    }

    /// Stop the link task.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PanelLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The keepalive line sent on connect and every keepalive interval.
pub fn keepalive(config: &LinkConfig) -> Command {
    Command::UpdateSecurityStatus {
        controller_type: config.controller_type.clone(),
        controller_address: config.endpoint(),
        ready_zones: config.ready_zones.clone(),
        alarm_zones: config.alarm_zones.clone(),
    }
}

async fn run_link(
    config: LinkConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<LinkEvent>,
) {
    let reconnect_delay = Duration::from_millis(config.reconnect_delay_ms);
    loop {
        drop_queued(&mut commands);

        let endpoint = config.endpoint();
        info!("Connecting to panel at {}", endpoint);
        let connected = timeout(
            Duration::from_millis(config.idle_timeout_ms),
            TcpStream::connect(&endpoint),
        )
        .await;

        let result = match connected {
            Ok(Ok(stream)) => {
                info!("Connected to panel");
                if events.send(LinkEvent::Connected).await.is_err() {
                    return;
                }
                let result = serve(stream, &config, &mut commands, &events).await;
                if events.send(LinkEvent::Disconnected).await.is_err() {
                    return;
                }
                result
            }
            Ok(Err(e)) => Err(BridgeError::Io(e)),
            Err(_) => Err(BridgeError::ConnectionTimeout),
        };

        match result {
            Ok(()) => return,
            Err(e) if e.is_retryable() => {
                warn!(
                    "Panel link lost: {}. Reconnecting in {:.1}s",
                    e,
                    reconnect_delay.as_secs_f64()
                );
            }
            Err(e) => {
                error!("Panel link stopped: {}", e);
                return;
            }
        }

        sleep(reconnect_delay).await;
    }
}

fn drop_queued(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Ok(command) = commands.try_recv() {
        warn!(%command, "Link down, dropping command");
    }
}

async fn write_command(writer: &mut OwnedWriteHalf, command: &Command) -> Result<()> {
    debug!(%command, "write");
    writer.write_all(command.to_line().as_bytes()).await?;
    Ok(())
}

/// Serve one connection until it fails. `Ok(())` means the bridge is
/// shutting down.
async fn serve(
    stream: TcpStream,
    config: &LinkConfig,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::Sender<LinkEvent>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let keepalive = keepalive(config);
    let idle = Duration::from_millis(config.idle_timeout_ms);
    // First tick completes immediately
    let mut ticker = interval(Duration::from_millis(config.keepalive_interval_ms.max(1)));
    let mut deadline = Instant::now() + idle;
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                write_command(&mut writer, &keepalive).await?;
            }
            _ = sleep_until(deadline) => {
                return Err(BridgeError::IdleTimeout { secs: idle.as_secs() });
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => return Err(BridgeError::Disconnected),
                Ok(n) => {
                    deadline = Instant::now() + idle;
                    if events.send(LinkEvent::Data(buf[..n].to_vec())).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(BridgeError::Io(e)),
            },
            command = commands.recv() => match command {
                Some(command) => write_command(&mut writer, &command).await?,
                None => return Ok(()),
            },
        }
    }
}
