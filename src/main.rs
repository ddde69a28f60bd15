// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// MQTT bridge

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use envy_lan_bridge::{
    DeviceConfig, DeviceEvent, DeviceKind, DoorTarget, EnvyBridge, HostRequest, PartitionTarget,
    TargetRequest,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "envy2mqtt")]
#[command(about = "Bridge between an Envy security panel and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    mqtt: MqttToml,
    #[serde(flatten)]
    devices: DeviceConfig,
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_topic")]
    topic: String,
}

fn default_client_id() -> String {
    "envy-bridge".to_string()
}
fn default_topic() -> String {
    "envy".to_string()
}

fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    let config: Config = toml::from_str(&text).context("Failed to parse config file")?;
    config
        .devices
        .validate()
        .context("Invalid device configuration")?;
    parse_mqtt_url(&config.mqtt.url)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// State messages: the device event flattened next to a timestamp
#[derive(Serialize)]
struct MqttState<'a> {
    now: u64,
    #[serde(flatten)]
    event: &'a DeviceEvent,
}

// Inbound set request; exactly one field is expected
#[derive(Debug, Default, Deserialize)]
struct MqttSetRequest {
    #[serde(default)]
    target: Option<PartitionTarget>,
    #[serde(default)]
    position: Option<u8>,
    #[serde(default)]
    door: Option<DoorTarget>,
    #[serde(default)]
    on: Option<bool>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn state_topic(base: &str, event: &DeviceEvent) -> String {
    let (kind, id) = event.device();
    format!("{base}/{}/{id}/state", kind.as_str())
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

/// Split `<base>/<kind>/<id>/set` into the addressed device.
fn parse_set_topic(base: &str, topic: &str) -> Option<(DeviceKind, u32)> {
    let rest = topic.strip_prefix(base)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let kind = DeviceKind::from_name(parts.next()?)?;
    let id = parts.next()?.parse().ok()?;
    match (parts.next(), parts.next()) {
        (Some("set"), None) => Some((kind, id)),
        _ => None,
    }
}

/// Translate a set request into the dispatcher's vocabulary. `None` when the
/// payload carries nothing the device kind understands.
fn to_host_request(kind: DeviceKind, id: u32, set: &MqttSetRequest) -> Option<HostRequest> {
    match kind {
        DeviceKind::Partition => set
            .target
            .map(|target| HostRequest::SetPartition { id, target }),
        DeviceKind::Output => {
            let request = if let Some(position) = set.position {
                TargetRequest::Position(position)
            } else if let Some(door) = set.door {
                TargetRequest::Door(door)
            } else {
                TargetRequest::Switch(set.on?)
            };
            Some(HostRequest::SetOutput { id, request })
        }
        DeviceKind::Task => match set.on {
            Some(true) => Some(HostRequest::ActivateTask { id }),
            _ => None,
        },
        // Sensors are read-only
        DeviceKind::Zone => None,
    }
}

// ---------------------------------------------------------------------------
// Bridge event → MQTT
// ---------------------------------------------------------------------------

async fn forward_events(
    mut rx: broadcast::Receiver<DeviceEvent>,
    client: AsyncClient,
    topic: String,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                debug!(?event, "Device state");
                let msg = MqttState {
                    now: now_epoch_ms(),
                    event: &event,
                };
                publish_json(&client, &state_topic(&topic, &event), &msg, true).await;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event receiver lagged, missed {n} events");
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Event channel closed");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT → bridge requests
// ---------------------------------------------------------------------------

async fn handle_set(
    base: &str,
    topic: &str,
    payload: &str,
    requests: &mpsc::Sender<HostRequest>,
) {
    let Some((kind, id)) = parse_set_topic(base, topic) else {
        debug!("Ignoring message on {topic}");
        return;
    };
    let set = match serde_json::from_str::<MqttSetRequest>(payload) {
        Ok(set) => set,
        Err(e) => {
            warn!("Failed to parse set request on {topic}: {e}");
            return;
        }
    };
    match to_host_request(kind, id, &set) {
        Some(request) => {
            info!("MQTT request for {kind} {id}: {payload}");
            if requests.send(request).await.is_err() {
                error!("Bridge stopped, dropping request for {kind} {id}");
            }
        }
        None => warn!("Unsupported set request for {kind} {id}: {payload}"),
    }
}

async fn run_mqtt(
    mut eventloop: rumqttc::EventLoop,
    client: AsyncClient,
    topic: String,
    requests: mpsc::Sender<HostRequest>,
) {
    let sub_topic = format!("{topic}/+/+/set");
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // rumqttc does not resubscribe after a broker restart
                info!("MQTT: connected, subscribing to {sub_topic}");
                if let Err(e) = client.subscribe(&sub_topic, QoS::AtLeastOnce).await {
                    error!("Failed to subscribe to {sub_topic}: {e}");
                }
                if requests.send(HostRequest::Announce).await.is_err() {
                    error!("Bridge stopped, cannot announce state");
                }
            }
            Ok(Event::Incoming(Packet::Publish(msg))) => {
                let payload = String::from_utf8_lossy(&msg.payload);
                handle_set(&topic, &msg.topic, &payload, &requests).await;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT event loop error: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=envy_lan_bridge=debug). Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let mut bridge = EnvyBridge::start(config.devices.clone())
            .context("Failed to start panel bridge")?;

        let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
        let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, eventloop) = AsyncClient::new(mqtt_opts, 256);

        let event_handle = tokio::spawn(forward_events(
            bridge.subscribe(),
            client.clone(),
            config.mqtt.topic.clone(),
        ));
        let mqtt_handle = tokio::spawn(run_mqtt(
            eventloop,
            client,
            config.mqtt.topic.clone(),
            bridge.requests(),
        ));

        info!("MQTT bridge running. Send SIGHUP to reload, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config...");
                true
            }
        };

        event_handle.abort();
        mqtt_handle.abort();
        bridge.shutdown();

        if !restart {
            break;
        }

        match load_config(&cli.config) {
            Ok(new_config) => {
                config = new_config;
                info!("Config reloaded successfully");
            }
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Split an MQTT URL (`mqtt://host:port`, `tcp://host:port` or bare
/// `host[:port]`) into host and port. The port defaults to 1883.
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let authority = ["mqtt://", "tcp://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .unwrap_or(url)
        .trim_end_matches('/');
    anyhow::ensure!(!authority.is_empty(), "MQTT URL has no host: {url}");

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .with_context(|| format!("Invalid MQTT port in {url}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), 1883)),
    }
}
