//! Relay Server Application
//!
//! Hosts the audio and text channels. Type a line to chat with every
//! connected peer; `/stop`, `/start`, `/status` and `/quit` control the
//! session.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use synconnect::{
    audio::SinkFactory,
    config::AppConfig,
    events::{ChatEvent, Origin},
    protocol::TextFraming,
    RelayServer,
};

#[derive(Parser, Debug)]
#[command(name = "synconnect-server", version, about = "LAN intercom relay server")]
struct Args {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, env = "SYNCONNECT_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind both channels to
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    audio_port: Option<u16>,

    #[arg(long)]
    text_port: Option<u16>,

    /// Text framing: "length-prefixed" or "raw"
    #[arg(long)]
    framing: Option<TextFraming>,

    /// List audio devices and exit
    #[cfg(feature = "device")]
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if list_devices_requested(&args) {
        return Ok(());
    }

    let mut config = AppConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.audio_port {
        config.server.audio_port = port;
    }
    if let Some(port) = args.text_port {
        config.server.text_port = port;
    }
    if let Some(framing) = args.framing {
        config.server.text_framing = framing;
    }
    config.validate()?;

    tracing::info!("Starting SynConnect relay server");

    let server = Arc::new(RelayServer::from_config(&config, sink_factory(&config)));
    spawn_display(&server);
    server.start().context("starting session")?;

    println!("Type to chat. Commands: /status /stop /start /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "/quit" => break,
            "/status" => {
                let running = server.is_running();
                println!(
                    "session: {}  audio peers: {}  text peers: {}  relays: {}",
                    if running { "running" } else { "stopped" },
                    server.audio_peer_count(),
                    server.text_peer_count(),
                    server.active_relays(),
                );
            }
            "/stop" => {
                let server = server.clone();
                tokio::task::spawn_blocking(move || server.stop()).await??;
            }
            "/start" => {
                let server = server.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || server.start()).await? {
                    tracing::error!("Could not start session: {}", e);
                }
            }
            text => {
                let server = server.clone();
                let text = text.to_string();
                match tokio::task::spawn_blocking(move || server.send_text(&text)).await? {
                    Ok(_) => {}
                    Err(e) => tracing::error!("Message not sent: {}", e),
                }
            }
        }
    }

    let server_for_stop = server.clone();
    tokio::task::spawn_blocking(move || server_for_stop.stop()).await??;
    tracing::info!("Bye");
    Ok(())
}

#[cfg(feature = "device")]
fn sink_factory(config: &AppConfig) -> Arc<dyn SinkFactory> {
    Arc::new(synconnect::audio::CpalSinkFactory::new(
        config.audio.output_device.clone(),
    ))
}

#[cfg(not(feature = "device"))]
fn sink_factory(_config: &AppConfig) -> Arc<dyn SinkFactory> {
    tracing::warn!("Built without the `device` feature; relayed audio is not played locally");
    Arc::new(synconnect::audio::NullSinkFactory)
}

#[cfg(feature = "device")]
fn list_devices_requested(args: &Args) -> bool {
    if args.list_devices {
        print_devices();
    }
    args.list_devices
}

#[cfg(not(feature = "device"))]
fn list_devices_requested(_args: &Args) -> bool {
    false
}

#[cfg(feature = "device")]
fn print_devices() {
    println!("\n=== Available Audio Devices ===");
    for device in synconnect::audio::list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, device_type, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

/// Print chat events on a plain thread; the receiver blocks
fn spawn_display(server: &RelayServer) {
    let events = server.events();
    let spawned = std::thread::Builder::new()
        .name("display".to_string())
        .spawn(move || {
            for event in events.iter() {
                println!("{}", render(&event));
            }
        });
    if let Err(e) = spawned {
        tracing::error!("No chat display: {}", e);
    }
}

fn render(event: &ChatEvent) -> String {
    match event {
        ChatEvent::SessionStarted {
            audio_addr,
            text_addr,
        } => format!("* Connection enabled (audio {}, text {})", audio_addr, text_addr),
        ChatEvent::SessionStopped => "* Disconnected".to_string(),
        ChatEvent::PeerJoined { channel, id, addr } => {
            format!("* {:?} peer {} joined from {}", channel, id, addr)
        }
        ChatEvent::PeerLeft { channel, id, addr } => {
            format!("* {:?} peer {} ({}) left", channel, id, addr)
        }
        ChatEvent::Message { origin, text, at } => {
            let who = match origin {
                Origin::Local => "me".to_string(),
                Origin::Remote { addr, .. } => addr.to_string(),
            };
            format!("[{}] {}: {}", at.format("%H:%M:%S"), who, text)
        }
    }
}
