//! Participant side of both channels
//!
//! A voice call is two threads on one socket: `voice-send` pulls chunks from
//! the capture source and writes them (unless muted or paused), `voice-recv`
//! reads whatever the server relays and plays it (unless paused). Pausing
//! keeps the connection registered with the server. Text chat is one
//! receive thread plus `send_text` on the caller's thread.

use crossbeam_channel::Receiver;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::{AudioSink, AudioSource};
use crate::error::{NetworkError, Result};
use crate::events::{self, ChatEvent, EventSink, Origin};
use crate::network::Connection;
use crate::protocol::{encode_text, TextDecoder, TextFraming};

fn dial(addr: SocketAddr) -> Result<(Arc<Connection>, TcpStream)> {
    let stream = TcpStream::connect(addr).map_err(|e| NetworkError::ConnectionFailed {
        addr: addr.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Connection::open(stream)?)
}

/// Audio channel participant
pub struct VoiceClient {
    conn: Arc<Connection>,
    sink: Arc<dyn AudioSink>,
    muted: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    chunks_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    send_thread: Option<JoinHandle<()>>,
    recv_thread: Option<JoinHandle<()>>,
}

impl VoiceClient {
    /// Connect and start streaming in both directions
    pub fn connect(
        addr: SocketAddr,
        mut source: Box<dyn AudioSource>,
        sink: Arc<dyn AudioSink>,
        frame_bytes: usize,
    ) -> Result<Self> {
        let (conn, mut reader) = dial(addr)?;
        let muted = Arc::new(AtomicBool::new(false));
        let streaming = Arc::new(AtomicBool::new(true));
        let running = Arc::new(AtomicBool::new(true));
        let chunks_sent = Arc::new(AtomicU64::new(0));
        let bytes_received = Arc::new(AtomicU64::new(0));

        let send_conn = conn.clone();
        let send_muted = muted.clone();
        let send_streaming = streaming.clone();
        let send_running = running.clone();
        let sent = chunks_sent.clone();
        let send_thread = thread::Builder::new()
            .name("voice-send".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; frame_bytes];
                while send_running.load(Ordering::Relaxed) {
                    let n = match source.read_chunk(&mut buf) {
                        Ok(0) => continue,
                        Ok(n) => n,
                        Err(e) => {
                            tracing::debug!("Capture ended: {}", e);
                            break;
                        }
                    };
                    // Muted or paused calls drop the capture instead of stalling it
                    if send_muted.load(Ordering::Relaxed)
                        || !send_streaming.load(Ordering::Relaxed)
                    {
                        continue;
                    }
                    if let Err(e) = send_conn.send(&buf[..n]) {
                        tracing::debug!("Voice send failed: {}", e);
                        break;
                    }
                    sent.fetch_add(1, Ordering::Relaxed);
                }
            })?;

        let recv_sink = sink.clone();
        let recv_streaming = streaming.clone();
        let recv_running = running.clone();
        let received = bytes_received.clone();
        let recv_thread = thread::Builder::new()
            .name("voice-recv".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; frame_bytes];
                loop {
                    let n = match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::debug!("Voice receive failed: {}", e);
                            break;
                        }
                    };
                    received.fetch_add(n as u64, Ordering::Relaxed);
                    if !recv_streaming.load(Ordering::Relaxed) {
                        continue;
                    }
                    if let Err(e) = recv_sink.write(&buf[..n]) {
                        tracing::debug!("Playback write failed: {}", e);
                    }
                }
                // Server gone: stop capturing too
                recv_running.store(false, Ordering::Relaxed);
            })?;

        tracing::info!("Voice call connected to {}", addr);
        Ok(Self {
            conn,
            sink,
            muted,
            streaming,
            running,
            chunks_sent,
            bytes_received,
            send_thread: Some(send_thread),
            recv_thread: Some(recv_thread),
        })
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Flip the mute state, returning the new one
    pub fn toggle_mute(&self) -> bool {
        !self.muted.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Stop sending and playing audio but stay connected
    pub fn pause(&self) {
        if self.streaming.swap(false, Ordering::Relaxed) {
            tracing::info!("Voice call paused");
        }
    }

    pub fn resume(&self) {
        if !self.streaming.swap(true, Ordering::Relaxed) {
            tracing::info!("Voice call resumed");
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.running.load(Ordering::Relaxed) && !self.conn.is_closed()
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Hang up: close the socket, join both threads, release playback
    pub fn disconnect(&mut self) {
        if self.send_thread.is_none() && self.recv_thread.is_none() {
            return;
        }
        self.running.store(false, Ordering::Relaxed);
        self.conn.close();
        for handle in [self.send_thread.take(), self.recv_thread.take()]
            .into_iter()
            .flatten()
        {
            let _ = handle.join();
        }
        self.sink.stop();
        tracing::info!("Voice call ended");
    }
}

impl Drop for VoiceClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Text channel participant
pub struct TextClient {
    conn: Arc<Connection>,
    framing: TextFraming,
    events: EventSink,
    events_rx: Receiver<ChatEvent>,
    recv_thread: Option<JoinHandle<()>>,
}

impl TextClient {
    pub fn connect(addr: SocketAddr, framing: TextFraming, read_buffer: usize) -> Result<Self> {
        let (conn, mut reader) = dial(addr)?;
        let (events, events_rx) = events::channel();

        let recv_events = events.clone();
        let recv_conn = conn.clone();
        let recv_thread = thread::Builder::new()
            .name("text-recv".to_string())
            .spawn(move || {
                let mut decoder = TextDecoder::new(framing);
                let mut buf = vec![0u8; read_buffer];
                loop {
                    let n = match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::debug!("Text receive failed: {}", e);
                            break;
                        }
                    };
                    let messages = match decoder.push(&buf[..n]) {
                        Ok(messages) => messages,
                        Err(e) => {
                            tracing::warn!("Bad frame from server: {}", e);
                            break;
                        }
                    };
                    for message in messages {
                        recv_events.emit(ChatEvent::message(
                            Origin::Remote { id: None, addr },
                            String::from_utf8_lossy(&message),
                        ));
                    }
                }
                // Server gone: refuse further sends
                recv_conn.close();
            })?;

        tracing::info!("Text chat connected to {}", addr);
        Ok(Self {
            conn,
            framing,
            events,
            events_rx,
            recv_thread: Some(recv_thread),
        })
    }

    /// Incoming messages plus a `Local` echo of everything sent
    pub fn events(&self) -> Receiver<ChatEvent> {
        self.events_rx.clone()
    }

    /// False once the server closed the channel or `disconnect` ran
    pub fn is_connected(&self) -> bool {
        !self.conn.is_closed()
    }

    /// Send one message. Trimmed; returns false when nothing was left to send.
    pub fn send_text(&self, text: &str) -> Result<bool> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        if self.conn.is_closed() {
            return Err(NetworkError::NotConnected.into());
        }

        let framed = encode_text(self.framing, text.as_bytes())?;
        if let Err(e) = self.conn.send(&framed) {
            self.conn.close();
            return Err(NetworkError::SendFailed(e.to_string()).into());
        }
        self.events.emit(ChatEvent::message(Origin::Local, text));
        Ok(true)
    }

    pub fn disconnect(&mut self) {
        self.conn.close();
        if let Some(handle) = self.recv_thread.take() {
            let _ = handle.join();
            tracing::info!("Text chat disconnected");
        }
    }
}

impl Drop for TextClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
