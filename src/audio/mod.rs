//! Audio device collaborator
//!
//! The relay only ever needs to push PCM bytes into an output and pull PCM
//! bytes out of an input. Those two capabilities are the traits below; the
//! `cpal` back-end (feature `device`) and the in-memory ones implement them.

pub mod buffer;
pub mod memory;

#[cfg(feature = "device")]
pub mod capture;
#[cfg(feature = "device")]
pub mod device;
#[cfg(feature = "device")]
pub mod playback;

use std::sync::Arc;

use crate::constants::*;
use crate::error::AudioError;

pub use buffer::{PcmCarry, SampleRing};
pub use memory::{ChannelSource, MemorySink, MemorySinkFactory, NullSink, NullSinkFactory};

#[cfg(feature = "device")]
pub use capture::CpalSource;
#[cfg(feature = "device")]
pub use device::{list_devices, AudioDeviceInfo};
#[cfg(feature = "device")]
pub use playback::{CpalSink, CpalSinkFactory};

/// Signed 16-bit little-endian PCM stream parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Device buffer size in sample frames
    pub frames_per_buffer: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frames_per_buffer: DEFAULT_FRAMES_PER_BUFFER,
        }
    }
}

impl AudioFormat {
    /// Bytes in one sample frame (all channels)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Bytes in one device buffer
    pub fn chunk_bytes(&self) -> usize {
        self.frames_per_buffer as usize * self.bytes_per_frame()
    }
}

/// Playback side: one per registered audio connection.
///
/// Written to from several relay threads at once.
pub trait AudioSink: Send + Sync {
    /// Queue PCM bytes for playback. The slice may split a sample.
    fn write(&self, pcm: &[u8]) -> Result<(), AudioError>;

    /// Stop playback and release the device. Later writes fail.
    fn stop(&self);
}

/// Opens a fresh output per accepted audio connection
pub trait SinkFactory: Send + Sync {
    fn open(&self, format: &AudioFormat) -> Result<Arc<dyn AudioSink>, AudioError>;
}

/// Capture side.
pub trait AudioSource: Send {
    /// Fill `buf` with captured PCM bytes.
    ///
    /// Waits at most about `SOURCE_POLL_MS`; `Ok(0)` means nothing was
    /// captured in that window.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunk_size() {
        let format = AudioFormat::default();
        assert_eq!(format.bytes_per_frame(), 2);
        assert_eq!(format.chunk_bytes(), 2048);
    }
}
