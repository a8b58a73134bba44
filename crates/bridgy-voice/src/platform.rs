//! Narrow interfaces to the platform: audio device, synthesis engine,
//! recognition engine and permission queries.
//!
//! Engines report back over tokio channels; the session that started them owns
//! the receiving end and applies events in arrival order.

use crate::error::VoiceResult;
use async_trait::async_trait;
use std::time::Instant;
use tokio::sync::mpsc;

/// How the shared device should be configured before a job uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCategory {
    /// Speaker output for synthesized speech.
    Playback,
    /// Microphone capture, ducking other audio.
    Record,
}

/// One buffer delivered by the input tap.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,
    pub captured_at: Instant,
}

/// Shared microphone/speaker. Playback and capture are never active at once.
pub trait AudioDevice: Send + Sync {
    fn configure(&self, category: AudioCategory) -> VoiceResult<()>;
    fn activate(&self) -> VoiceResult<()>;
    fn deactivate(&self) -> VoiceResult<()>;
    /// Route captured buffers into `sink` until [`remove_tap`](Self::remove_tap).
    fn install_tap(&self, sink: mpsc::UnboundedSender<AudioBuffer>) -> VoiceResult<()>;
    /// Removing a tap that is not installed is a no-op.
    fn remove_tap(&self);
    fn start_input(&self) -> VoiceResult<()>;
    /// Stopping input that is not running is a no-op.
    fn stop_input(&self);
}

/// Text plus the voice parameters used to speak it.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// BCP-47 locale of the voice, e.g. `en-US`.
    pub voice_locale: String,
    /// Engine speaking rate (0.5 is the platform's normal pace).
    pub rate: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Finished,
    Cancelled,
    Failed(String),
}

pub trait SpeechSynthesizer: Send + Sync {
    /// Begin speaking. Completion is reported on `events`.
    fn speak(
        &self,
        utterance: &Utterance,
        events: mpsc::UnboundedSender<SynthesisEvent>,
    ) -> VoiceResult<()>;
    /// Halt playback immediately.
    fn stop(&self);
}

/// Why the recognition engine gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFailure {
    /// The engine's own cancellation, usually triggered by our teardown.
    Cancelled,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Best transcript so far; replaces the previous partial.
    Partial(String),
    Final(String),
    Error(EngineFailure),
}

/// A running recognition request.
pub trait RecognitionTask: Send {
    /// No more audio will be appended.
    fn end_audio(&mut self);
    fn cancel(&mut self);
}

pub trait SpeechRecognizer: Send + Sync {
    fn is_available(&self) -> bool;
    /// Start recognizing buffers from `audio`, reporting results on `events`.
    fn start(
        &self,
        audio: mpsc::UnboundedReceiver<AudioBuffer>,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> VoiceResult<Box<dyn RecognitionTask>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Undetermined,
}

/// Permission queries for the microphone and the recognition service.
#[async_trait]
pub trait Authorization: Send + Sync {
    fn microphone(&self) -> Permission;
    fn recognition(&self) -> Permission;
    /// Prompt the user if undetermined; returns the resulting status.
    async fn request_microphone(&self) -> Permission;
    async fn request_recognition(&self) -> Permission;
}
