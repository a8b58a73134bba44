//! Native microphone capture using CPAL.
//!
//! Desktop hosts have no audio session to configure, so `configure`/`activate`
//! only track state. Capture runs on a dedicated thread because `cpal::Stream`
//! is `!Send` on some platforms; dropping the stream on that thread ends capture.

use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::platform::{AudioBuffer, AudioCategory, AudioDevice};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

struct CaptureThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// Default input device via CPAL, delivering mono f32 buffers to the tap.
pub struct CpalAudioDevice {
    sample_rate: u32,
    buffer_size: usize,
    category: Mutex<Option<AudioCategory>>,
    active: AtomicBool,
    tap: Mutex<Option<mpsc::UnboundedSender<AudioBuffer>>>,
    capture: Mutex<Option<CaptureThread>>,
}

impl CpalAudioDevice {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            buffer_size: config.tap_buffer_size,
            category: Mutex::new(None),
            active: AtomicBool::new(false),
            tap: Mutex::new(None),
            capture: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn run_capture(
        sample_rate: u32,
        buffer_size: usize,
        tap: mpsc::UnboundedSender<AudioBuffer>,
        ready_tx: std_mpsc::Sender<VoiceResult<()>>,
        stop_rx: std_mpsc::Receiver<()>,
    ) {
        let stream = match Self::open_stream(sample_rate, buffer_size, tap) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        let _ = ready_tx.send(Ok(()));
        // Either a stop signal or the device being dropped ends capture.
        let _ = stop_rx.recv();
        drop(stream);
        info!("⏹️ Microphone capture stopped");
    }

    fn open_stream(
        sample_rate: u32,
        buffer_size: usize,
        tap: mpsc::UnboundedSender<AudioBuffer>,
    ) -> VoiceResult<cpal::Stream> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::DeviceUnavailable("No input device available".to_string()))?;
        info!(
            "📱 Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        let default_config = device.default_input_config()?;
        info!("🔧 Default config: {:?}", default_config);

        // Capture in the device's native channel layout and downmix to mono.
        let channels = default_config.channels().max(1);
        let stream_config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(buffer_size as u32),
        };

        let mut pending = Vec::with_capacity(buffer_size);
        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels as usize) {
                    let sample = frame.iter().sum::<f32>() / frame.len() as f32;
                    pending.push(sample);
                    if pending.len() >= buffer_size {
                        let buffer = AudioBuffer {
                            samples: std::mem::replace(&mut pending, Vec::with_capacity(buffer_size)),
                            captured_at: Instant::now(),
                        };
                        // Receiver gone means the session tore down; the stream stops shortly.
                        let _ = tap.send(buffer);
                    }
                }
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;
        stream.play()?;
        Ok(stream)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AudioDevice for CpalAudioDevice {
    fn configure(&self, category: AudioCategory) -> VoiceResult<()> {
        *lock(&self.category) = Some(category);
        Ok(())
    }

    fn activate(&self) -> VoiceResult<()> {
        if lock(&self.category).is_none() {
            return Err(VoiceError::DeviceUnavailable(
                "audio device activated before configure".to_string(),
            ));
        }
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    fn deactivate(&self) -> VoiceResult<()> {
        self.active.store(false, Ordering::Release);
        Ok(())
    }

    fn install_tap(&self, sink: mpsc::UnboundedSender<AudioBuffer>) -> VoiceResult<()> {
        *lock(&self.tap) = Some(sink);
        Ok(())
    }

    fn remove_tap(&self) {
        *lock(&self.tap) = None;
    }

    fn start_input(&self) -> VoiceResult<()> {
        if *lock(&self.category) != Some(AudioCategory::Record) {
            return Err(VoiceError::DeviceUnavailable(
                "device is not configured for recording".to_string(),
            ));
        }
        let tap = lock(&self.tap)
            .clone()
            .ok_or_else(|| VoiceError::DeviceUnavailable("no input tap installed".to_string()))?;

        let mut capture = lock(&self.capture);
        if capture.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (sample_rate, buffer_size) = (self.sample_rate, self.buffer_size);
        let handle = thread::spawn(move || {
            Self::run_capture(sample_rate, buffer_size, tap, ready_tx, stop_rx)
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("🎤 Microphone capture started ({}Hz)", sample_rate);
                *capture = Some(CaptureThread { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(VoiceError::DeviceUnavailable(
                "capture thread exited during startup".to_string(),
            )),
        }
    }

    fn stop_input(&self) {
        if let Some(capture) = lock(&self.capture).take() {
            let _ = capture.stop_tx.send(());
            if capture.handle.join().is_err() {
                warn!("Capture thread panicked");
            }
        }
    }
}

impl Drop for CpalAudioDevice {
    fn drop(&mut self) {
        self.stop_input();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_input_requires_record_category_and_tap() {
        let device = CpalAudioDevice::new(&VoiceConfig::default());
        assert!(device.start_input().is_err());

        device.configure(AudioCategory::Record).unwrap();
        assert!(matches!(device.start_input(), Err(VoiceError::DeviceUnavailable(_))));
    }

    #[test]
    fn remove_tap_clears_sink() {
        let device = CpalAudioDevice::new(&VoiceConfig::default());
        device.configure(AudioCategory::Record).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        device.install_tap(tx).unwrap();
        device.remove_tap();
        assert!(matches!(device.start_input(), Err(VoiceError::DeviceUnavailable(_))));
    }

    #[test]
    fn activation_tracks_state() {
        let device = CpalAudioDevice::new(&VoiceConfig::default());
        assert!(device.activate().is_err());
        device.configure(AudioCategory::Playback).unwrap();
        device.activate().unwrap();
        assert!(device.is_active());
        device.deactivate().unwrap();
        assert!(!device.is_active());
    }
}
