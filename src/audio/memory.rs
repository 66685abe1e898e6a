//! Device-free sinks and sources
//!
//! `NullSink` lets a headless server run without any audio hardware.
//! `MemorySink` records everything written to it, and `ChannelSource` plays
//! back frames pushed into a channel.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{AudioFormat, AudioSink, AudioSource, SinkFactory};
use crate::constants::SOURCE_POLL_MS;
use crate::error::AudioError;

/// Discards PCM, counting bytes
#[derive(Default)]
pub struct NullSink {
    bytes_written: AtomicU64,
    stopped: AtomicBool,
}

impl NullSink {
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

impl AudioSink for NullSink {
    fn write(&self, pcm: &[u8]) -> Result<(), AudioError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(AudioError::SinkClosed);
        }
        self.bytes_written
            .fetch_add(pcm.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[derive(Default)]
pub struct NullSinkFactory;

impl SinkFactory for NullSinkFactory {
    fn open(&self, _format: &AudioFormat) -> Result<Arc<dyn AudioSink>, AudioError> {
        Ok(Arc::new(NullSink::default()))
    }
}

/// Records every byte written
#[derive(Default)]
pub struct MemorySink {
    data: Mutex<Vec<u8>>,
    writes: AtomicU64,
    stopped: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `write` calls accepted
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl AudioSink for MemorySink {
    fn write(&self, pcm: &[u8]) -> Result<(), AudioError> {
        if self.is_stopped() {
            return Err(AudioError::SinkClosed);
        }
        self.data.lock().extend_from_slice(pcm);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Opens `MemorySink`s and keeps a handle to each, in open order
#[derive(Default)]
pub struct MemorySinkFactory {
    opened: Mutex<Vec<Arc<MemorySink>>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sink opened so far, oldest first
    pub fn sinks(&self) -> Vec<Arc<MemorySink>> {
        self.opened.lock().clone()
    }

    pub fn sink(&self, index: usize) -> Option<Arc<MemorySink>> {
        self.opened.lock().get(index).cloned()
    }

    pub fn opened(&self) -> usize {
        self.opened.lock().len()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&self, _format: &AudioFormat) -> Result<Arc<dyn AudioSink>, AudioError> {
        let sink = Arc::new(MemorySink::new());
        self.opened.lock().push(sink.clone());
        Ok(sink)
    }
}

/// Capture source fed from a channel of PCM frames
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
    leftover: Vec<u8>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            leftover: Vec::new(),
        }
    }
}

impl AudioSource for ChannelSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        if self.leftover.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(SOURCE_POLL_MS)) {
                Ok(frame) => self.leftover = frame,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => return Err(AudioError::SourceClosed),
            }
        }

        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_rejects_after_stop() {
        let sink = MemorySink::new();
        sink.write(&[1, 2, 3]).unwrap();
        sink.stop();
        assert!(matches!(sink.write(&[4]), Err(AudioError::SinkClosed)));
        assert_eq!(sink.bytes(), vec![1, 2, 3]);
        assert_eq!(sink.write_count(), 1);
    }

    #[test]
    fn test_factory_tracks_open_order() {
        let factory = MemorySinkFactory::new();
        let format = AudioFormat::default();
        let first = factory.open(&format).unwrap();
        let _second = factory.open(&format).unwrap();

        first.write(&[9; 4]).unwrap();
        assert_eq!(factory.opened(), 2);
        assert_eq!(factory.sink(0).unwrap().len(), 4);
        assert!(factory.sink(1).unwrap().is_empty());
    }

    #[test]
    fn test_channel_source_splits_large_frames() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut source = ChannelSource::new(rx);
        tx.send(vec![7u8; 10]).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 2);
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 0);

        drop(tx);
        assert!(matches!(
            source.read_chunk(&mut buf),
            Err(AudioError::SourceClosed)
        ));
    }

    #[test]
    fn test_null_sink_counts() {
        let sink = NullSink::default();
        sink.write(&[0; 1024]).unwrap();
        assert_eq!(sink.bytes_written(), 1024);
    }
}
