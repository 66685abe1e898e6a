//! Participant clients against a live relay server

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use synconnect::audio::{ChannelSource, MemorySink};
use synconnect::error::{Error, NetworkError};
use synconnect::events::{ChatEvent, Origin};
use synconnect::protocol::TextFraming;
use synconnect::{TextClient, VoiceClient};

fn voice_client(
    server: &synconnect::RelayServer,
) -> (VoiceClient, crossbeam_channel::Sender<Vec<u8>>, Arc<MemorySink>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let speaker = Arc::new(MemorySink::new());
    let before = server.audio_peer_count();
    let client = VoiceClient::connect(
        server.audio_addr().unwrap(),
        Box::new(ChannelSource::new(rx)),
        speaker.clone(),
        1024,
    )
    .unwrap();
    assert!(wait_until(|| server.audio_peer_count() == before + 1));
    (client, tx, speaker)
}

#[test]
fn test_voice_call_between_two_clients() {
    let (server, sinks) = start_server(TextFraming::LengthPrefixed);
    let (mut alice, alice_mic, alice_speaker) = voice_client(&server);
    let (mut bob, _bob_mic, bob_speaker) = voice_client(&server);

    alice_mic.send(vec![7u8; 1024]).unwrap();

    assert!(wait_until(|| bob_speaker.len() == 1024));
    assert_eq!(bob_speaker.bytes(), vec![7u8; 1024]);
    assert!(wait_until(|| alice.chunks_sent() == 1));
    assert_eq!(bob.bytes_received(), 1024);
    assert!(alice_speaker.is_empty());

    // Server plays the sender's own audio on its monitor sink
    let alice_monitor = sinks.sink(0).unwrap();
    assert!(wait_until(|| alice_monitor.len() == 1024));

    alice.disconnect();
    assert!(alice_speaker.is_stopped());
    assert!(wait_until(|| server.audio_peer_count() == 1));
    assert!(bob.is_connected());

    bob.disconnect();
    server.stop().unwrap();
}

#[test]
fn test_muted_voice_stays_registered_but_silent() {
    let (server, _sinks) = start_server(TextFraming::LengthPrefixed);
    let (alice, alice_mic, _alice_speaker) = voice_client(&server);
    let (_bob, _bob_mic, bob_speaker) = voice_client(&server);

    alice.set_muted(true);
    assert!(alice.is_muted());
    alice_mic.send(vec![1u8; 512]).unwrap();
    std::thread::sleep(Duration::from_millis(150));

    assert!(bob_speaker.is_empty());
    assert_eq!(alice.chunks_sent(), 0);
    assert_eq!(server.audio_peer_count(), 2);

    assert!(!alice.toggle_mute());
    alice_mic.send(vec![2u8; 512]).unwrap();
    assert!(wait_until(|| bob_speaker.len() == 512));
    assert_eq!(bob_speaker.bytes(), vec![2u8; 512]);

    server.stop().unwrap();
}

#[test]
fn test_paused_call_stays_registered() {
    let (server, _sinks) = start_server(TextFraming::LengthPrefixed);
    let (alice, alice_mic, alice_speaker) = voice_client(&server);
    let (bob, bob_mic, bob_speaker) = voice_client(&server);

    alice.pause();
    assert!(!alice.is_streaming());
    alice_mic.send(vec![3u8; 256]).unwrap();
    std::thread::sleep(Duration::from_millis(150));
    assert!(bob_speaker.is_empty());
    assert_eq!(alice.chunks_sent(), 0);
    assert_eq!(server.audio_peer_count(), 2);
    assert!(alice.is_connected());

    // A paused call still drains what the server relays but plays none of it
    bob_mic.send(vec![4u8; 256]).unwrap();
    assert!(wait_until(|| alice.bytes_received() == 256));
    assert!(alice_speaker.is_empty());

    alice.resume();
    alice_mic.send(vec![5u8; 256]).unwrap();
    assert!(wait_until(|| bob_speaker.len() == 256));
    assert_eq!(bob_speaker.bytes(), vec![5u8; 256]);
    assert!(bob.is_streaming());

    server.stop().unwrap();
}

#[test]
fn test_voice_client_notices_server_stop() {
    let (server, _sinks) = start_server(TextFraming::LengthPrefixed);
    let (alice, _alice_mic, _speaker) = voice_client(&server);

    server.stop().unwrap();
    assert!(wait_until(|| !alice.is_connected()));
}

#[test]
fn test_text_clients_chat_through_server() {
    let (server, _sinks) = start_server(TextFraming::LengthPrefixed);
    let server_events = server.events();

    let alice = TextClient::connect(server.text_addr().unwrap(), TextFraming::LengthPrefixed, 1024)
        .unwrap();
    assert!(wait_until(|| server.text_peer_count() == 1));
    let bob = TextClient::connect(server.text_addr().unwrap(), TextFraming::LengthPrefixed, 1024)
        .unwrap();
    assert!(wait_until(|| server.text_peer_count() == 2));

    assert!(!alice.send_text("  \n").unwrap());
    assert!(alice.send_text(" hi bob ").unwrap());

    // Sender sees its own message as a local echo
    let (origin, text) = next_message(&alice.events()).unwrap();
    assert_eq!(origin, Origin::Local);
    assert_eq!(text, "hi bob");

    let (origin, text) = next_message(&bob.events()).unwrap();
    assert!(matches!(origin, Origin::Remote { id: None, .. }));
    assert_eq!(text, "hi bob");

    let (_, text) = next_message(&server_events).unwrap();
    assert_eq!(text, "hi bob");

    // Server-originated text reaches both clients
    assert_eq!(server.send_text("from the host").unwrap(), 2);
    let (_, text) = next_message(&alice.events()).unwrap();
    assert_eq!(text, "from the host");
    let (_, text) = next_message(&bob.events()).unwrap();
    assert_eq!(text, "from the host");

    server.stop().unwrap();
}

#[test]
fn test_text_client_reads_raw_server() {
    let (server, _sinks) = start_server(TextFraming::Raw);
    let client =
        TextClient::connect(server.text_addr().unwrap(), TextFraming::Raw, 1024).unwrap();
    assert!(wait_until(|| server.text_peer_count() == 1));
    let mut legacy = join_text(&server);

    legacy.write_all(b"old build").unwrap();
    let (_, text) = next_message(&client.events()).unwrap();
    assert_eq!(text, "old build");

    client.send_text("new build").unwrap();
    assert_eq!(read_n(&mut legacy, 9), b"new build");

    server.stop().unwrap();
}

#[test]
fn test_text_client_send_after_disconnect_fails() {
    let (server, _sinks) = start_server(TextFraming::LengthPrefixed);
    let mut client =
        TextClient::connect(server.text_addr().unwrap(), TextFraming::LengthPrefixed, 1024)
            .unwrap();
    client.disconnect();
    assert!(client.send_text("anyone?").is_err());
    server.stop().unwrap();
}

#[test]
fn test_text_client_send_after_server_stop_fails() {
    let (server, _sinks) = start_server(TextFraming::LengthPrefixed);
    let client =
        TextClient::connect(server.text_addr().unwrap(), TextFraming::LengthPrefixed, 1024)
            .unwrap();
    assert!(wait_until(|| server.text_peer_count() == 1));
    let events = client.events();

    server.stop().unwrap();
    assert!(wait_until(|| !client.is_connected()));

    assert!(matches!(
        client.send_text("anyone there?"),
        Err(Error::Network(NetworkError::NotConnected))
    ));
    // No local echo for a message nobody got
    assert!(!events
        .try_iter()
        .any(|event| matches!(event, ChatEvent::Message { .. })));
}
