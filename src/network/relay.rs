//! Per-connection relay loops
//!
//! One thread per connection reads until EOF or error, fanning each read out
//! to every *other* registered peer. The loop exit is the only cleanup
//! trigger: close the socket, remove the entry by id, release the sink.

use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use std::sync::Arc;

use super::connection::{Connection, ConnectionId};
use super::registry::{AudioPeer, AudioRegistry, TextRegistry};
use super::workers::Workers;
use crate::audio::{AudioFormat, SinkFactory};
use crate::events::{ChatEvent, Channel, EventSink, Origin};
use crate::protocol::{encode_text, TextDecoder, TextFraming};

/// Everything the audio acceptor and relay loops share
#[derive(Clone)]
pub struct AudioChannel {
    pub registry: Arc<AudioRegistry>,
    pub sinks: Arc<dyn SinkFactory>,
    pub format: AudioFormat,
    pub frame_bytes: usize,
    pub events: EventSink,
    pub workers: Arc<Workers>,
}

/// Everything the text acceptor and relay loops share
#[derive(Clone)]
pub struct TextChannel {
    pub registry: Arc<TextRegistry>,
    pub framing: TextFraming,
    pub read_buffer: usize,
    pub events: EventSink,
    pub workers: Arc<Workers>,
}

/// Read one chunk, retrying on EINTR. `None` on EOF or error.
fn read_chunk(reader: &mut TcpStream, buf: &mut [u8], id: ConnectionId) -> Option<usize> {
    loop {
        match reader.read(buf) {
            Ok(0) => {
                tracing::debug!("Connection {} closed by peer", id);
                return None;
            }
            Ok(n) => return Some(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("Connection {} read failed: {}", id, e);
                return None;
            }
        }
    }
}

/// Audio Relay Loop
pub fn run_audio_relay(peer: Arc<AudioPeer>, mut reader: TcpStream, channel: AudioChannel) {
    let id = peer.conn.id();
    let mut buf = vec![0u8; channel.frame_bytes];

    while let Some(n) = read_chunk(&mut reader, &mut buf, id) {
        let frame = &buf[..n];
        fan_out_audio(&channel.registry, id, frame);

        // Self-monitor
        if let Err(e) = peer.sink.write(frame) {
            tracing::debug!("Monitor write for {} failed: {}", id, e);
        }
    }

    peer.conn.close();
    if let Some(removed) = channel.registry.remove(id) {
        removed.sink.stop();
        tracing::info!("Audio peer {} ({}) disconnected", id, peer.conn.peer_addr());
        channel.events.emit(ChatEvent::PeerLeft {
            channel: Channel::Audio,
            id,
            addr: peer.conn.peer_addr(),
        });
    }
}

/// Write one frame to every registered peer except `from`, socket then
/// sink. A failing peer is closed so its own loop tears it down; the rest
/// still get the frame. Returns how many sockets took it.
pub fn fan_out_audio(registry: &AudioRegistry, from: ConnectionId, frame: &[u8]) -> usize {
    let mut delivered = 0;
    for other in registry.others(from) {
        if let Err(e) = other.conn.send(frame) {
            tracing::debug!("Audio write to {} failed: {}", other.conn.id(), e);
            other.conn.close();
            continue;
        }
        delivered += 1;
        if let Err(e) = other.sink.write(frame) {
            tracing::debug!("Sink write for {} failed: {}", other.conn.id(), e);
        }
    }
    delivered
}

/// Text Relay Loop
pub fn run_text_relay(conn: Arc<Connection>, mut reader: TcpStream, channel: TextChannel) {
    let id = conn.id();
    let addr = conn.peer_addr();
    let mut decoder = TextDecoder::new(channel.framing);
    let mut buf = vec![0u8; channel.read_buffer];

    'read: while let Some(n) = read_chunk(&mut reader, &mut buf, id) {
        let messages = match decoder.push(&buf[..n]) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Dropping text peer {}: {}", id, e);
                break 'read;
            }
        };

        for message in messages {
            broadcast_text(&channel.registry, Some(id), channel.framing, &message);
            let text = String::from_utf8_lossy(&message).into_owned();
            channel.events.emit(ChatEvent::message(
                Origin::Remote { id: Some(id), addr },
                text,
            ));
        }
    }

    conn.close();
    if channel.registry.remove(id).is_some() {
        tracing::info!("Text peer {} ({}) disconnected", id, addr);
        channel.events.emit(ChatEvent::PeerLeft {
            channel: Channel::Text,
            id,
            addr,
        });
    }
}

/// Frame `payload` once and write it to every text peer except `except`.
/// Returns how many peers took it.
pub fn broadcast_text(
    registry: &TextRegistry,
    except: Option<ConnectionId>,
    framing: TextFraming,
    payload: &[u8],
) -> usize {
    let framed = match encode_text(framing, payload) {
        Ok(framed) => framed,
        Err(e) => {
            tracing::warn!("Not broadcasting message: {}", e);
            return 0;
        }
    };

    let targets = match except {
        Some(id) => registry.others(id),
        None => registry.snapshot(),
    };

    let mut delivered = 0;
    for conn in targets {
        match conn.send(&framed) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::debug!("Text write to {} failed: {}", conn.id(), e);
                conn.close();
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioSink, MemorySink};
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::Duration;

    fn audio_peer(listener: &TcpListener) -> (Arc<AudioPeer>, Arc<MemorySink>, TcpStream) {
        let remote = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let (accepted, _) = listener.accept().unwrap();
        let (conn, _reader) = Connection::open(accepted).unwrap();
        let sink = Arc::new(MemorySink::new());
        let peer = Arc::new(AudioPeer {
            conn,
            sink: sink.clone() as Arc<dyn AudioSink>,
        });
        (peer, sink, remote)
    }

    #[test]
    fn test_fan_out_skips_sender_and_survives_dead_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let registry = AudioRegistry::new();
        let (a, sink_a, _remote_a) = audio_peer(&listener);
        let (b, sink_b, _remote_b) = audio_peer(&listener);
        let (c, sink_c, mut remote_c) = audio_peer(&listener);
        registry.insert(a.clone());
        registry.insert(b.clone());
        registry.insert(c.clone());

        // b is already gone; its write fails but c still gets the frame
        b.conn.close();
        let frame = [5u8; 64];
        assert_eq!(fan_out_audio(&registry, a.conn.id(), &frame), 1);

        let mut received = [0u8; 64];
        remote_c.read_exact(&mut received).unwrap();
        assert_eq!(received, frame);
        assert_eq!(sink_c.bytes(), frame.to_vec());
        assert!(sink_b.is_empty());
        assert!(sink_a.is_empty());
    }

    #[test]
    fn test_broadcast_frames_once_per_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let registry = TextRegistry::new();
        let mut remotes = Vec::new();
        for _ in 0..2 {
            let remote = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
            remote
                .set_read_timeout(Some(Duration::from_secs(2)))
                .unwrap();
            let (accepted, _) = listener.accept().unwrap();
            let (conn, _reader) = Connection::open(accepted).unwrap();
            registry.insert(conn);
            remotes.push(remote);
        }

        let sent = broadcast_text(&registry, None, TextFraming::LengthPrefixed, b"hey");
        assert_eq!(sent, 2);
        for remote in &mut remotes {
            let mut buf = [0u8; 7];
            remote.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, &[0, 0, 0, 3, b'h', b'e', b'y']);
        }
    }
}
