//! Acceptor Loops
//!
//! Block in `accept()`, register each new connection, spawn its relay
//! thread. An accept failure ends the loop quietly; during shutdown that
//! is exactly how the loop is stopped.

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::connection::Connection;
use super::listener::Listener;
use super::registry::AudioPeer;
use super::relay::{run_audio_relay, run_text_relay, AudioChannel, TextChannel};
use crate::events::{ChatEvent, Channel};

/// Next connection, or `None` once the loop should end
fn next_connection(
    listener: &Listener,
    running: &AtomicBool,
    label: &str,
) -> Option<(TcpStream, SocketAddr)> {
    match listener.accept() {
        Ok((stream, addr)) => {
            if !running.load(Ordering::Acquire) {
                // Wake-up connection from the closer, or a latecomer
                return None;
            }
            Some((stream, addr))
        }
        Err(e) => {
            if running.load(Ordering::Acquire) {
                tracing::warn!("{} accept failed, listener stopping: {}", label, e);
            } else {
                tracing::debug!("{} listener closed", label);
            }
            None
        }
    }
}

pub fn run_audio_acceptor(listener: Listener, running: Arc<AtomicBool>, channel: AudioChannel) {
    while let Some((stream, addr)) = next_connection(&listener, &running, "Audio") {
        register_audio(stream, addr, &channel);
    }
}

fn register_audio(stream: TcpStream, addr: SocketAddr, channel: &AudioChannel) {
    let (conn, reader) = match Connection::open(stream) {
        Ok(opened) => opened,
        Err(e) => {
            tracing::warn!("Could not set up audio connection from {}: {}", addr, e);
            return;
        }
    };

    // One sink per live audio connection; no sink, no registration
    let sink = match channel.sinks.open(&channel.format) {
        Ok(sink) => sink,
        Err(e) => {
            tracing::warn!("Refusing audio peer {}: no output sink ({})", addr, e);
            conn.close();
            return;
        }
    };

    let id = conn.id();
    let peer = Arc::new(AudioPeer { conn, sink });
    channel.registry.insert(peer.clone());
    tracing::info!("Audio peer {} connected: {}", id, addr);
    channel.events.emit(ChatEvent::PeerJoined {
        channel: Channel::Audio,
        id,
        addr,
    });

    let relay_peer = peer.clone();
    let relay_channel = channel.clone();
    let spawned = channel.workers.spawn(format!("audio-relay-{}", id.as_u64()), move || {
        run_audio_relay(relay_peer, reader, relay_channel)
    });

    if let Err(e) = spawned {
        tracing::warn!("Could not start relay for audio peer {}: {}", addr, e);
        peer.conn.close();
        if let Some(removed) = channel.registry.remove(id) {
            removed.sink.stop();
            channel.events.emit(ChatEvent::PeerLeft {
                channel: Channel::Audio,
                id,
                addr,
            });
        }
    }
}

pub fn run_text_acceptor(listener: Listener, running: Arc<AtomicBool>, channel: TextChannel) {
    while let Some((stream, addr)) = next_connection(&listener, &running, "Text") {
        register_text(stream, addr, &channel);
    }
}

fn register_text(stream: TcpStream, addr: SocketAddr, channel: &TextChannel) {
    let (conn, reader) = match Connection::open(stream) {
        Ok(opened) => opened,
        Err(e) => {
            tracing::warn!("Could not set up text connection from {}: {}", addr, e);
            return;
        }
    };

    let id = conn.id();
    channel.registry.insert(conn.clone());
    tracing::info!("Text peer {} connected: {}", id, addr);
    channel.events.emit(ChatEvent::PeerJoined {
        channel: Channel::Text,
        id,
        addr,
    });

    let relay_conn = conn.clone();
    let relay_channel = channel.clone();
    let spawned = channel.workers.spawn(format!("text-relay-{}", id.as_u64()), move || {
        run_text_relay(relay_conn, reader, relay_channel)
    });

    if let Err(e) = spawned {
        tracing::warn!("Could not start relay for text peer {}: {}", addr, e);
        conn.close();
        if channel.registry.remove(id).is_some() {
            channel.events.emit(ChatEvent::PeerLeft {
                channel: Channel::Text,
                id,
                addr,
            });
        }
    }
}
