//! # SynConnect
//!
//! Two-party LAN intercom: a relay server that fans raw PCM audio out to
//! every other connected peer and broadcasts text chat between them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               RELAY SERVER                               │
//! │                                                                          │
//! │   :5000 audio listener                     :5001 text listener           │
//! │   ┌──────────────────┐                     ┌──────────────────┐          │
//! │   │  audio-accept    │                     │   text-accept    │          │
//! │   │  (acceptor loop) │                     │  (acceptor loop) │          │
//! │   └────────┬─────────┘                     └────────┬─────────┘          │
//! │            │ insert {conn, sink}                    │ insert {conn}      │
//! │            ▼                                        ▼                    │
//! │   ┌──────────────────┐                     ┌──────────────────┐          │
//! │   │  Audio Registry  │  ConnectionId keyed │  Text Registry   │          │
//! │   │ Mutex<BTreeMap>  │◄──── snapshots ────►│ Mutex<BTreeMap>  │          │
//! │   └────────┬─────────┘                     └────────┬─────────┘          │
//! │            │                                        │                    │
//! │   ┌────────┴─────────┐                     ┌────────┴─────────┐          │
//! │   │ audio-relay-<id> │ one per peer        │ text-relay-<id>  │          │
//! │   │ read chunk ──►   │                     │ read message ──► │          │
//! │   │  other peers'    │                     │  other peers     │          │
//! │   │  socket + sink   │                     │  + ChatEvent     │          │
//! │   │  own sink        │                     │    (display)     │          │
//! │   └──────────────────┘                     └──────────────────┘          │
//! └──────────────────────────────────────────────────────────────────────────┘
//!                ▲        │                          ▲        │
//!                │ PCM    ▼ PCM                      │ text   ▼ text
//!        ┌───────┴────────────────┐          ┌───────┴────────────────┐
//!        │ VoiceClient            │          │ TextClient             │
//!        │ voice-send / voice-recv│          │ send_text / text-recv  │
//!        └────────────────────────┘          └────────────────────────┘
//! ```
//!
//! Every blocking read runs on its own named thread. Shutdown closes the
//! underlying sockets, which is what unblocks those reads.

pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod protocol;
pub mod server;

pub use client::{TextClient, VoiceClient};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use events::{ChatEvent, Origin};
pub use server::RelayServer;

/// Application-wide constants
pub mod constants {
    /// Default bind/connect host
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Default TCP port for the audio channel
    pub const DEFAULT_AUDIO_PORT: u16 = 5000;

    /// Default TCP port for the text channel
    pub const DEFAULT_TEXT_PORT: u16 = 5001;

    /// PCM sample rate carried on the audio channel
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Mono
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Device buffer size in sample frames
    pub const DEFAULT_FRAMES_PER_BUFFER: u32 = 1024;

    /// Maximum bytes taken from the audio socket per read
    pub const DEFAULT_FRAME_BYTES: usize = 1024;

    /// Maximum bytes taken from a raw-framed text socket per read
    pub const DEFAULT_TEXT_BUFFER: usize = 1024;

    /// Pending-connection backlog per listener
    pub const DEFAULT_BACKLOG: i32 = 2;

    /// Bytes per PCM sample (signed 16-bit)
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Largest accepted length-prefixed text message
    pub const MAX_TEXT_MESSAGE: usize = 64 * 1024;

    /// Bounded wait used when polling capture sources
    pub const SOURCE_POLL_MS: u64 = 50;

    /// Lock-free sample ring capacity, in samples
    pub const RING_BUFFER_CAPACITY: usize = 44100;

    /// Display events held while nobody drains them
    pub const EVENT_QUEUE_CAPACITY: usize = 1024;
}
