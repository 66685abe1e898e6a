//! Microphone capture through cpal
//!
//! Same thread-owned stream layout as playback, run in reverse: the input
//! callback converts to 16-bit samples and pushes them into a ring that
//! `read_chunk` drains.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::buffer::{f32_to_sample, SampleRing};
use super::device::find_input_device;
use super::{AudioFormat, AudioSource};
use crate::constants::{RING_BUFFER_CAPACITY, SOURCE_POLL_MS};
use crate::error::AudioError;

pub struct CpalSource {
    ring: Arc<SampleRing>,
    running: Arc<AtomicBool>,
    samples_captured: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalSource {
    /// Start capturing from `device_name` (empty = default input)
    pub fn open(device_name: &str, format: &AudioFormat) -> Result<Self, AudioError> {
        let device = find_input_device(device_name)?;
        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = Arc::new(SampleRing::new(RING_BUFFER_CAPACITY));
        let running = Arc::new(AtomicBool::new(true));
        let samples_captured = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let ring_for_callback = ring.clone();
        let running_for_callback = running.clone();
        let running_for_loop = running.clone();
        let captured = samples_captured.clone();

        let handle = thread::Builder::new()
            .name("cpal-input".to_string())
            .spawn(move || {
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running_for_callback.load(Ordering::Relaxed) {
                            return;
                        }
                        captured.fetch_add(data.len() as u64, Ordering::Relaxed);
                        for value in data {
                            // Overflow drops the newest samples
                            let _ = ring_for_callback.push(f32_to_sample(*value));
                        }
                    },
                    |err| tracing::warn!("Input stream error: {}", err),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::StreamError("capture thread exited".into()));
            }
        }

        Ok(Self {
            ring,
            running,
            samples_captured,
            thread_handle: Some(handle),
        })
    }

    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioSource for CpalSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(AudioError::SourceClosed);
        }

        // Wait for a full chunk, but never longer than one poll window
        let wanted = buf.len() / 2;
        let deadline = Instant::now() + Duration::from_millis(SOURCE_POLL_MS);
        while self.ring.len() < wanted && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        let mut written = 0;
        while written + 2 <= buf.len() {
            match self.ring.try_pop() {
                Some(sample) => {
                    buf[written..written + 2].copy_from_slice(&sample.to_le_bytes());
                    written += 2;
                }
                None => break,
            }
        }
        Ok(written)
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}
