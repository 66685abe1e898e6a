//! Relay server session lifecycle
//!
//! `start` binds both listeners (failing before any thread exists if either
//! bind fails) and spawns the two acceptor threads. `stop` tears the
//! session down in a fixed order: listeners, then connections, then relay
//! threads, then audio sinks.

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::{AudioFormat, SinkFactory};
use crate::config::{AppConfig, ServerConfig};
use crate::error::{NetworkError, Result};
use crate::events::{self, ChatEvent, EventSink, Origin};
use crate::network::acceptor::{run_audio_acceptor, run_text_acceptor};
use crate::network::relay::broadcast_text;
use crate::network::{
    AudioChannel, AudioRegistry, Listener, ListenerCloser, TextChannel, TextRegistry, Tracked,
    Workers,
};

/// The relay server.
///
/// Owns at most one session at a time. Safe to share between threads; the
/// front-end only ever calls `start`, `stop`, `send_text` and reads
/// `events()`.
pub struct RelayServer {
    config: ServerConfig,
    format: AudioFormat,
    sinks: Arc<dyn SinkFactory>,
    events: EventSink,
    events_rx: Receiver<ChatEvent>,
    session: Mutex<Option<Session>>,
}

/// Everything that lives between one `start` and the matching `stop`
struct Session {
    running: Arc<AtomicBool>,
    audio_closer: ListenerCloser,
    text_closer: ListenerCloser,
    acceptors: Vec<JoinHandle<()>>,
    audio: AudioChannel,
    text: TextChannel,
    workers: Arc<Workers>,
    audio_addr: SocketAddr,
    text_addr: SocketAddr,
}

impl RelayServer {
    pub fn new(config: ServerConfig, format: AudioFormat, sinks: Arc<dyn SinkFactory>) -> Self {
        let (events, events_rx) = events::channel();
        Self {
            config,
            format,
            sinks,
            events,
            events_rx,
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &AppConfig, sinks: Arc<dyn SinkFactory>) -> Self {
        Self::new(config.server.clone(), config.audio.format(), sinks)
    }

    /// Display events. Every clone competes for the same events.
    pub fn events(&self) -> Receiver<ChatEvent> {
        self.events_rx.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind both channels and start accepting
    pub fn start(&self) -> Result<()> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(NetworkError::AlreadyRunning.into());
        }

        let audio_listener = Listener::bind(self.config.audio_addr()?, self.config.backlog)?;
        let text_listener = Listener::bind(self.config.text_addr()?, self.config.backlog)?;
        let audio_addr = audio_listener.local_addr();
        let text_addr = text_listener.local_addr();
        let audio_closer = audio_listener.closer()?;
        let text_closer = text_listener.closer()?;

        let running = Arc::new(AtomicBool::new(true));
        let workers = Arc::new(Workers::new());
        let audio = AudioChannel {
            registry: Arc::new(AudioRegistry::new()),
            sinks: self.sinks.clone(),
            format: self.format,
            frame_bytes: self.config.frame_bytes,
            events: self.events.clone(),
            workers: workers.clone(),
        };
        let text = TextChannel {
            registry: Arc::new(TextRegistry::new()),
            framing: self.config.text_framing,
            read_buffer: self.config.text_buffer,
            events: self.events.clone(),
            workers: workers.clone(),
        };

        let mut acceptors = Vec::with_capacity(2);
        let audio_running = running.clone();
        let audio_channel = audio.clone();
        acceptors.push(
            thread::Builder::new()
                .name("audio-accept".to_string())
                .spawn(move || run_audio_acceptor(audio_listener, audio_running, audio_channel))?,
        );

        let text_running = running.clone();
        let text_channel = text.clone();
        let spawned = thread::Builder::new()
            .name("text-accept".to_string())
            .spawn(move || run_text_acceptor(text_listener, text_running, text_channel));
        match spawned {
            Ok(handle) => acceptors.push(handle),
            Err(e) => {
                running.store(false, Ordering::Release);
                audio_closer.close();
                for handle in acceptors {
                    let _ = handle.join();
                }
                return Err(e.into());
            }
        }

        tracing::info!(
            "Session started: audio on {}, text on {} ({} framing)",
            audio_addr,
            text_addr,
            self.config.text_framing
        );
        self.events.emit(ChatEvent::SessionStarted {
            audio_addr,
            text_addr,
        });

        *slot = Some(Session {
            running,
            audio_closer,
            text_closer,
            acceptors,
            audio,
            text,
            workers,
            audio_addr,
            text_addr,
        });
        Ok(())
    }

    /// End the session. No-op when none is running.
    pub fn stop(&self) -> Result<()> {
        // Held for the whole teardown so a concurrent start waits for the ports
        let mut slot = self.session.lock();
        let session = match slot.take() {
            Some(session) => session,
            None => return Ok(()),
        };
        session.shutdown();
        tracing::info!("Session stopped");
        self.events.emit(ChatEvent::SessionStopped);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Send a message from this process to every text peer.
    ///
    /// Surrounding whitespace is trimmed and empty messages are ignored.
    /// Returns the number of peers written to.
    pub fn send_text(&self, text: &str) -> Result<usize> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(0);
        }

        let (registry, framing) = match self.session.lock().as_ref() {
            Some(session) => (session.text.registry.clone(), session.text.framing),
            None => return Err(NetworkError::NotConnected.into()),
        };

        let delivered = broadcast_text(&registry, None, framing, text.as_bytes());
        self.events.emit(ChatEvent::message(Origin::Local, text));
        Ok(delivered)
    }

    pub fn audio_peer_count(&self) -> usize {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.audio.registry.len())
            .unwrap_or(0)
    }

    pub fn text_peer_count(&self) -> usize {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.text.registry.len())
            .unwrap_or(0)
    }

    /// Relay threads still running in the current session
    pub fn active_relays(&self) -> usize {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.workers.active())
            .unwrap_or(0)
    }

    /// Bound audio address of the running session
    pub fn audio_addr(&self) -> Option<SocketAddr> {
        self.session.lock().as_ref().map(|s| s.audio_addr)
    }

    /// Bound text address of the running session
    pub fn text_addr(&self) -> Option<SocketAddr> {
        self.session.lock().as_ref().map(|s| s.text_addr)
    }
}

impl Session {
    fn shutdown(self) {
        // 1. Listeners: unblocks both acceptors
        self.running.store(false, Ordering::Release);
        self.audio_closer.close();
        self.text_closer.close();
        for handle in self.acceptors {
            if handle.join().is_err() {
                tracing::warn!("Acceptor thread panicked");
            }
        }

        // 2. Connections: unblocks every relay loop
        let audio_peers = self.audio.registry.drain();
        let text_peers = self.text.registry.drain();
        for peer in &audio_peers {
            peer.connection().close();
        }
        for peer in &text_peers {
            peer.connection().close();
        }

        // 3. Relay loops
        self.workers.join_all();

        // 4. Sinks the relay loops did not already release
        tracing::debug!(
            "Released {} audio and {} text connections",
            audio_peers.len(),
            text_peers.len()
        );
        for peer in audio_peers {
            peer.sink.stop();
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
