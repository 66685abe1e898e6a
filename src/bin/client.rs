//! Participant Application
//!
//! Joins a relay server's text channel and, when built with real audio
//! devices, its audio channel. Type to chat; `/mute`, `/unmute`, `/pause`,
//! `/resume` and `/quit` control the call.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use synconnect::{
    config::AppConfig,
    events::{ChatEvent, Origin},
    protocol::TextFraming,
    TextClient, VoiceClient,
};

#[derive(Parser, Debug)]
#[command(name = "synconnect-client", version, about = "LAN intercom participant")]
struct Args {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, env = "SYNCONNECT_CONFIG")]
    config: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    audio_port: Option<u16>,

    #[arg(long)]
    text_port: Option<u16>,

    /// Text framing: "length-prefixed" or "raw"
    #[arg(long)]
    framing: Option<TextFraming>,

    /// Text chat only
    #[arg(long)]
    no_voice: bool,
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
    let mut config = AppConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(host) = args.host {
        config.client.host = host;
    }
    if let Some(port) = args.audio_port {
        config.client.audio_port = port;
    }
    if let Some(port) = args.text_port {
        config.client.text_port = port;
    }
    if let Some(framing) = args.framing {
        config.client.text_framing = framing;
    }
    config.validate()?;

    let mut text = TextClient::connect(
        config.client.text_addr()?,
        config.client.text_framing,
        config.client.text_buffer,
    )
    .context("joining text chat")?;

    let events = text.events();
    std::thread::Builder::new()
        .name("display".to_string())
        .spawn(move || {
            for event in events.iter() {
                if let ChatEvent::Message { origin, text, at } = event {
                    let who = match origin {
                        Origin::Local => "me".to_string(),
                        Origin::Remote { .. } => "peer".to_string(),
                    };
                    println!("[{}] {}: {}", at.format("%H:%M:%S"), who, text);
                }
            }
        })?;

    let mut voice = if args.no_voice {
        None
    } else {
        start_voice(&config)
    };

    println!("Type to chat. Commands: /mute /unmute /pause /resume /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "/quit" => break,
            "/mute" | "/unmute" => match &voice {
                Some(call) => {
                    call.set_muted(line.trim() == "/mute");
                    println!("* {}", if call.is_muted() { "Muted" } else { "Unmuted" });
                }
                None => println!("* No voice call"),
            },
            "/pause" | "/resume" => match &voice {
                Some(call) => {
                    if line.trim() == "/pause" {
                        call.pause();
                    } else {
                        call.resume();
                    }
                    println!(
                        "* Voice call {}",
                        if call.is_streaming() { "streaming" } else { "paused" }
                    );
                }
                None => println!("* No voice call"),
            },
            message => {
                if !text.is_connected() {
                    println!("* Disconnected from server");
                    break;
                }
                if let Err(e) = text.send_text(message) {
                    tracing::error!("Message not sent: {}", e);
                }
            }
        }
    }

    if let Some(call) = voice.as_mut() {
        call.disconnect();
    }
    text.disconnect();
    Ok(())
}

#[cfg(feature = "device")]
fn start_voice(config: &AppConfig) -> Option<VoiceClient> {
    use std::sync::Arc;
    use synconnect::audio::{CpalSink, CpalSource};

    let format = config.audio.format();
    let attempt = || -> synconnect::Result<VoiceClient> {
        let source = CpalSource::open(&config.audio.input_device, &format)?;
        let sink = CpalSink::open(&config.audio.output_device, &format)?;
        VoiceClient::connect(
            config.client.audio_addr()?,
            Box::new(source),
            Arc::new(sink),
            config.client.frame_bytes,
        )
    };

    match attempt() {
        Ok(call) => Some(call),
        Err(e) => {
            tracing::error!("Voice call unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "device"))]
fn start_voice(_config: &AppConfig) -> Option<VoiceClient> {
    tracing::warn!("Built without the `device` feature; joining text chat only");
    None
}
