//! TCP transport for both channels
//!
//! Thread-per-connection, blocking I/O. A relay thread only stops when its
//! socket is closed underneath it, so every closable resource here
//! (`Connection`, `ListenerCloser`) exposes an explicit `close()`.

pub mod acceptor;
pub mod connection;
pub mod listener;
pub mod registry;
pub mod relay;
pub mod workers;

pub use connection::{Connection, ConnectionId};
pub use listener::{Listener, ListenerCloser};
pub use registry::{AudioPeer, AudioRegistry, Registry, TextRegistry, Tracked};
pub use relay::{AudioChannel, TextChannel};
pub use workers::Workers;
