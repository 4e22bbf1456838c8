//! mpd-link command line
//!
//! Connects to the configured MPD server and either prints one piece of
//! state or follows connection and idle events until interrupted.
//!
//! Usage:
//!   mpd-link [watch]
//!   mpd-link features | status | stats | outputs | current
//!   mpd-link raw <command...>

use mpd_link::bus::{self, MpdEvent};
use mpd_link::config;
use mpd_link::{ConnectionSettings, MpdConnection};

use anyhow::{bail, Result};
use std::env;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mpd_link=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let action = args.first().map(String::as_str).unwrap_or("watch");

    let config = config::load_config()?;
    tracing::debug!(
        "Configuration loaded, server: {}:{}",
        config.server.host,
        config.server.port
    );

    let bus = bus::create_bus();
    let connection = MpdConnection::new(ConnectionSettings::from(&config), bus.clone());
    connection.connect().await?;

    let outcome = match action {
        "watch" => watch(&connection).await,
        "features" => {
            if let Some(features) = connection.server_features().await {
                print!("{}", features);
            }
            Ok(())
        }
        "status" => print_json(&connection.get_current_status().await?),
        "stats" => print_json(&connection.get_statistics().await?),
        "outputs" => print_json(&connection.get_outputs().await?),
        "current" => print_json(&connection.get_current_song().await?),
        "raw" => {
            if args.len() < 2 {
                bail!("raw needs a command");
            }
            let response = connection.send_raw(&args[1..].join(" ")).await?;
            for line in response.lines() {
                println!("{}", line);
            }
            Ok(())
        }
        other => {
            eprintln!("Unknown action: {}", other);
            eprintln!("Actions: watch, features, status, stats, outputs, current, raw");
            Ok(())
        }
    };

    connection.disconnect().await;
    outcome
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Log bus events until Ctrl+C; print status whenever another client changed something
async fn watch(connection: &MpdConnection) -> Result<()> {
    let mut events = connection.bus().subscribe();
    tracing::info!(
        "Watching MPD (v{})",
        connection
            .capabilities()
            .await
            .map(|c| c.version().to_string())
            .unwrap_or_default()
    );

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(MpdEvent::NonIdle { changed, external: true, .. }) => {
                    tracing::info!("Server changed: {}", changed.join(", "));
                    if changed.iter().any(|c| c == "player" || c == "mixer") {
                        let status = connection.get_current_status().await?;
                        println!("{}", serde_json::to_string(&status)?);
                    }
                }
                Ok(MpdEvent::Disconnected { host }) => {
                    bail!("Lost connection to {}", host);
                }
                Ok(other) => tracing::debug!("{:?}", other),
                Err(e) => tracing::warn!("Event stream lagged: {}", e),
            }
        }
    }
}
