//! Example: Connect to a panel and print every device state change.

use envy_lan_bridge::{DeviceConfig, DeviceEvent, EnvyBridge, LinkConfig, PartitionConfig, ZoneConfig, ZoneKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut partition = PartitionConfig::new(1, "1234");
    partition.zones.push(ZoneConfig {
        number: 1,
        name: "Hallway".to_string(),
        kind: ZoneKind::Motion,
    });
    let config = DeviceConfig {
        link: LinkConfig::builder().address("192.168.0.100").build(),
        partitions: vec![partition],
        ..Default::default()
    };

    let mut bridge = EnvyBridge::start(config)?;
    let mut events = bridge.subscribe();

    println!("Listening for device events (Ctrl+C to stop)...\n");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(DeviceEvent::ZoneChanged { id, kind, sealed }) => {
                        println!("Zone {} ({:?}) {}", id, kind, if sealed { "sealed" } else { "unsealed" });
                    }
                    Ok(DeviceEvent::PartitionChanged { id, current, target, .. }) => {
                        println!("Partition {}: {:?} (target {:?})", id, current, target);
                    }
                    Ok(event) => {
                        println!("Event: {:?}", event);
                    }
                    Err(e) => {
                        println!("Event channel error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }
        }
    }

    bridge.shutdown();
    Ok(())
}
