//! Events handed to the display collaborator
//!
//! The core never formats anything for presentation. A CLI or GUI holds
//! the receiving end of the channel and renders these however it likes.

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use std::net::SocketAddr;

use crate::constants::EVENT_QUEUE_CAPACITY;
use crate::network::ConnectionId;

/// Which of the two TCP channels an event concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Audio,
    Text,
}

/// Who sent a chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Origin {
    /// Sent from this process
    Local,
    /// Read from a connected peer
    Remote {
        id: Option<ConnectionId>,
        addr: SocketAddr,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    SessionStarted {
        audio_addr: SocketAddr,
        text_addr: SocketAddr,
    },
    SessionStopped,
    PeerJoined {
        channel: Channel,
        id: ConnectionId,
        addr: SocketAddr,
    },
    PeerLeft {
        channel: Channel,
        id: ConnectionId,
        addr: SocketAddr,
    },
    Message {
        origin: Origin,
        text: String,
        at: DateTime<Local>,
    },
}

impl ChatEvent {
    pub fn message(origin: Origin, text: impl Into<String>) -> Self {
        ChatEvent::Message {
            origin,
            text: text.into(),
            at: Local::now(),
        }
    }
}

/// Sending half of the display channel
///
/// Emission never fails or blocks. Events are dropped when the queue is
/// full (nobody is draining it) or every receiver is gone.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<ChatEvent>,
}

impl EventSink {
    pub fn emit(&self, event: ChatEvent) {
        if let Err(TrySendError::Full(event)) = self.tx.try_send(event) {
            tracing::trace!("Display queue full, dropping {:?}", event);
        }
    }
}

/// Create a display channel holding at most `EVENT_QUEUE_CAPACITY` events
pub fn channel() -> (EventSink, Receiver<ChatEvent>) {
    let (tx, rx) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
    (EventSink { tx }, rx)
}
