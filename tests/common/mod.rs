#![allow(dead_code)]

use crossbeam_channel::Receiver;
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use synconnect::audio::{AudioFormat, MemorySinkFactory};
use synconnect::config::ServerConfig;
use synconnect::events::ChatEvent;
use synconnect::protocol::TextFraming;
use synconnect::RelayServer;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn local_config(framing: TextFraming) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        audio_port: 0,
        text_port: 0,
        text_framing: framing,
        ..ServerConfig::default()
    }
}

pub fn start_server(framing: TextFraming) -> (RelayServer, Arc<MemorySinkFactory>) {
    let sinks = Arc::new(MemorySinkFactory::new());
    let server = RelayServer::new(local_config(framing), AudioFormat::default(), sinks.clone());
    server.start().expect("server starts");
    (server, sinks)
}

/// Poll until `cond` holds or the timeout passes
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn dial(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream
}

/// Connect an audio peer and wait until the server has registered it
pub fn join_audio(server: &RelayServer) -> TcpStream {
    let before = server.audio_peer_count();
    let stream = dial(server.audio_addr().unwrap());
    assert!(wait_until(|| server.audio_peer_count() == before + 1));
    stream
}

/// Connect a text peer and wait until the server has registered it
pub fn join_text(server: &RelayServer) -> TcpStream {
    let before = server.text_peer_count();
    let stream = dial(server.text_addr().unwrap());
    assert!(wait_until(|| server.text_peer_count() == before + 1));
    stream
}

pub fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).expect("read_exact");
    buf
}

/// True when nothing arrives within `wait`
pub fn stays_silent(stream: &mut TcpStream, wait: Duration) -> bool {
    stream.set_read_timeout(Some(wait)).unwrap();
    let mut buf = [0u8; 1];
    let silent = match stream.read(&mut buf) {
        Ok(_) => false,
        Err(e) => matches!(
            e.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ),
    };
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    silent
}

/// True once the server side has closed the stream
pub fn sees_eof(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(e) => {
                return !matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                )
            }
        }
    }
}

/// Next chat message text, skipping other events
pub fn next_message(rx: &Receiver<ChatEvent>) -> Option<(synconnect::Origin, String)> {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(left).ok()? {
            ChatEvent::Message { origin, text, .. } => return Some((origin, text)),
            _ => continue,
        }
    }
}

pub fn length_prefixed(text: &str) -> Vec<u8> {
    let mut framed = (text.len() as u32).to_be_bytes().to_vec();
    framed.extend_from_slice(text.as_bytes());
    framed
}
