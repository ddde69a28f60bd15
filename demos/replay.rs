//! Example: Replay a captured panel log through the dispatcher offline and
//! print the commands and device events it produces.
//!
//! The log carries no timestamps, so lines are spaced `gap_ms` apart
//! (default 1000) on a paused clock. Debounce and waiting-window timers due
//! in each gap fire before the next line, and whatever is still running
//! after the last line is run to completion.
//!
//! ```text
//! cargo run --example replay -- config.toml panel.log [gap_ms]
//! ```

use anyhow::Context;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Duration, Instant};

use envy_lan_bridge::{
    Command, CommandSink, DeviceConfig, Dispatcher, EventReceiver, Registry, event_channel,
};

/// Run every timer due within `window`, printing what each one produced.
async fn advance(
    dispatcher: &mut Dispatcher,
    window: Duration,
    output: &mut Output,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + window;
    while let Ok(Some(fired)) = tokio::time::timeout_at(deadline, dispatcher.next_timer()).await {
        dispatcher.handle_timer(fired);
        output.flush()?;
    }
    Ok(())
}

struct Output {
    start: Instant,
    commands: UnboundedReceiver<Command>,
    events: EventReceiver,
}

impl Output {
    fn flush(&mut self) -> anyhow::Result<()> {
        let at = self.start.elapsed().as_millis();
        while let Ok(command) = self.commands.try_recv() {
            println!("{at:>8}ms -> {}", command);
        }
        while let Ok(event) = self.events.try_recv() {
            println!("{at:>8}ms <- {}", serde_json::to_string(&event)?);
        }
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread", start_paused = true)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());
    let log_path = args
        .next()
        .context("usage: replay <config.toml> <panel.log> [gap_ms]")?;
    let gap = match args.next() {
        Some(ms) => Duration::from_millis(ms.parse().context("gap_ms must be a number")?),
        None => Duration::from_secs(1),
    };

    let config: DeviceConfig = toml::from_str(
        &std::fs::read_to_string(&config_path).context("Failed to read config file")?,
    )
    .context("Failed to parse config file")?;
    let registry = Registry::from_config(&config)?;

    let (commands, command_rx) = CommandSink::channel();
    let (events, _) = event_channel(1024);
    let mut dispatcher = Dispatcher::new(registry, commands, events);
    let mut output = Output {
        start: Instant::now(),
        commands: command_rx,
        events: dispatcher.subscribe(),
    };

    let log = std::fs::read_to_string(&log_path).context("Failed to read panel log")?;
    for line in log.split_inclusive('\n') {
        dispatcher.handle_chunk(line.as_bytes());
        output.flush()?;
        advance(&mut dispatcher, gap, &mut output).await?;
    }

    // Let open waiting windows and debounces finish
    advance(&mut dispatcher, Duration::from_secs(24 * 60 * 60), &mut output).await?;

    println!("\nFinal state:");
    dispatcher.announce();
    while let Ok(event) = output.events.try_recv() {
        println!("   {}", serde_json::to_string(&event)?);
    }
    Ok(())
}
