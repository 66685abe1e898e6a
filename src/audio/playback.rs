//! cpal playback sinks
//!
//! Each sink owns a thread that owns the cpal stream (streams are not
//! `Send` on every platform). Relay threads feed it through a lock-free
//! sample ring; the device callback drains the ring and plays silence on
//! underrun.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::buffer::{sample_to_f32, PcmCarry, SampleRing};
use super::device::find_output_device;
use super::{AudioFormat, AudioSink, SinkFactory};
use crate::constants::RING_BUFFER_CAPACITY;
use crate::error::AudioError;

/// Opens one output stream per sink on the configured device
pub struct CpalSinkFactory {
    device_name: String,
}

impl CpalSinkFactory {
    /// Empty `device_name` selects the default output device
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }
}

impl SinkFactory for CpalSinkFactory {
    fn open(&self, format: &AudioFormat) -> Result<Arc<dyn AudioSink>, AudioError> {
        let sink = CpalSink::open(&self.device_name, format)?;
        Ok(Arc::new(sink))
    }
}

pub struct CpalSink {
    ring: Arc<SampleRing>,
    carry: Mutex<PcmCarry>,
    running: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl CpalSink {
    pub fn open(device_name: &str, format: &AudioFormat) -> Result<Self, AudioError> {
        let device = find_output_device(device_name)?;
        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = Arc::new(SampleRing::new(RING_BUFFER_CAPACITY));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let ring_for_callback = ring.clone();
        let running_for_loop = running.clone();

        let handle = thread::Builder::new()
            .name("cpal-output".to_string())
            .spawn(move || {
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for out in data.iter_mut() {
                            *out = ring_for_callback.pop().map(sample_to_f32).unwrap_or(0.0);
                        }
                    },
                    |err| tracing::warn!("Output stream error: {}", err),
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
                // Stream is dropped here, stopping playback
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
                return Err(AudioError::StreamError("playback thread exited".into()));
            }
        }

        Ok(Self {
            ring,
            carry: Mutex::new(PcmCarry::default()),
            running,
            thread_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn underruns(&self) -> usize {
        self.ring.underrun_count()
    }
}

impl AudioSink for CpalSink {
    fn write(&self, pcm: &[u8]) -> Result<(), AudioError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(AudioError::SinkClosed);
        }
        let mut samples = Vec::with_capacity(pcm.len() / 2 + 1);
        // Held across the push so concurrent writers enqueue whole chunks
        let mut carry = self.carry.lock();
        carry.decode(pcm, &mut samples);
        if self.ring.push_slice(&samples) < samples.len() {
            return Err(AudioError::BufferOverflow);
        }
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }
        self.ring.clear();
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop();
    }
}
