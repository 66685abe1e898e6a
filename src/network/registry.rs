//! Connection registries
//!
//! Entries are keyed by [`ConnectionId`], never by position, so removing one
//! peer can't disturb another peer's entry. Fan-out works on a snapshot taken
//! under the lock; the lock is never held across socket or sink I/O.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::connection::{Connection, ConnectionId};
use crate::audio::AudioSink;

/// Anything stored in a registry owns a connection
pub trait Tracked: Send + Sync {
    fn connection(&self) -> &Connection;
}

impl Tracked for Connection {
    fn connection(&self) -> &Connection {
        self
    }
}

/// A registered audio connection and its playback sink
pub struct AudioPeer {
    pub conn: Arc<Connection>,
    pub sink: Arc<dyn AudioSink>,
}

impl Tracked for AudioPeer {
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub type AudioRegistry = Registry<AudioPeer>;
pub type TextRegistry = Registry<Connection>;

/// Live connections of one channel, ordered by connect time
pub struct Registry<E> {
    entries: Mutex<BTreeMap<ConnectionId, Arc<E>>>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<E: Tracked> Registry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: Arc<E>) -> ConnectionId {
        let id = entry.connection().id();
        self.entries.lock().insert(id, entry);
        id
    }

    /// Remove by key. `None` when someone else already removed it.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<E>> {
        self.entries.lock().remove(&id)
    }

    /// Every entry except `id`, in connect order
    pub fn others(&self, id: ConnectionId) -> Vec<Arc<E>> {
        self.entries
            .lock()
            .iter()
            .filter(|(key, _)| **key != id)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Every entry, in connect order
    pub fn snapshot(&self) -> Vec<Arc<E>> {
        self.entries.lock().values().cloned().collect()
    }

    /// Empty the registry, handing back what it held
    pub fn drain(&self) -> Vec<Arc<E>> {
        std::mem::take(&mut *self.entries.lock())
            .into_values()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormat, MemorySink, MemorySinkFactory, SinkFactory};
    use std::net::{TcpListener, TcpStream};

    fn connection(listener: &TcpListener) -> (Arc<Connection>, TcpStream) {
        let remote = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        let (conn, _reader) = Connection::open(accepted).unwrap();
        (conn, remote)
    }

    #[test]
    fn test_others_excludes_sender() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let registry = TextRegistry::new();
        let (a, _ra) = connection(&listener);
        let (b, _rb) = connection(&listener);
        let (c, _rc) = connection(&listener);
        registry.insert(a.clone());
        registry.insert(b.clone());
        registry.insert(c.clone());

        let others: Vec<ConnectionId> = registry.others(b.id()).iter().map(|e| e.id()).collect();
        assert_eq!(others, vec![a.id(), c.id()]);
    }

    #[test]
    fn test_remove_by_key_keeps_sinks_paired() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let factory = MemorySinkFactory::new();
        let registry = AudioRegistry::new();

        let mut ids = Vec::new();
        let mut remotes = Vec::new();
        for _ in 0..3 {
            let (conn, remote) = connection(&listener);
            let sink = factory.open(&AudioFormat::default()).unwrap();
            ids.push(registry.insert(Arc::new(AudioPeer { conn, sink })));
            remotes.push(remote);
        }

        // Remove the middle peer twice, as two racing teardowns would
        assert!(registry.remove(ids[1]).is_some());
        assert!(registry.remove(ids[1]).is_none());

        // The last peer still owns the third sink
        let remaining = registry.snapshot();
        let last = &remaining[1];
        assert_eq!(last.conn.id(), ids[2]);
        last.sink.write(&[1, 2]).unwrap();
        assert_eq!(factory.sink(2).unwrap().bytes(), vec![1, 2]);
        assert!(factory.sink(0).unwrap().is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_drain_empties() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let registry = AudioRegistry::new();
        let (conn, _remote) = connection(&listener);
        registry.insert(Arc::new(AudioPeer {
            conn,
            sink: Arc::new(MemorySink::new()),
        }));

        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }
}
