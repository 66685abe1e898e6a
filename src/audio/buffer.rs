//! Lock-free sample ring and PCM byte helpers
//!
//! The ring sits between a relay/capture thread and a device callback, so
//! neither side ever takes a lock.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free ring of PCM samples
pub struct SampleRing {
    queue: ArrayQueue<i16>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl SampleRing {
    /// Create a new ring buffer with the specified capacity in samples
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a sample. Returns false when full (overflow, sample dropped).
    pub fn push(&self, sample: i16) -> bool {
        match self.queue.push(sample) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Push every sample of a slice, returning how many fit
    pub fn push_slice(&self, samples: &[i16]) -> usize {
        samples.iter().filter(|s| self.push(**s)).count()
    }

    /// Pop a sample, counting an underrun when empty
    pub fn pop(&self) -> Option<i16> {
        match self.queue.pop() {
            Some(sample) => Some(sample),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Pop without counting underrun
    pub fn try_pop(&self) -> Option<i16> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Drop everything queued
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }
}

/// Reassembles little-endian i16 samples from reads that may end mid-sample
#[derive(Debug, Default)]
pub struct PcmCarry {
    pending: Option<u8>,
}

impl PcmCarry {
    pub fn decode(&mut self, pcm: &[u8], out: &mut Vec<i16>) {
        let mut bytes = pcm;
        if let Some(low) = self.pending.take() {
            match bytes.split_first() {
                Some((high, rest)) => {
                    out.push(i16::from_le_bytes([low, *high]));
                    bytes = rest;
                }
                None => {
                    self.pending = Some(low);
                    return;
                }
            }
        }

        let mut chunks = bytes.chunks_exact(2);
        out.extend(chunks.by_ref().map(|c| i16::from_le_bytes([c[0], c[1]])));
        if let [last] = chunks.remainder() {
            self.pending = Some(*last);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

pub fn sample_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

pub fn f32_to_sample(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
