//! Placeholder platform collaborators.
//!
//! In-memory device, synthesizer, recognizer and authorization that record what
//! they were asked to do and let a driver inject engine events. Use them to run
//! the manager without hardware (tests, demos, CI).

use crate::error::{VoiceError, VoiceResult};
use crate::platform::{
    AudioBuffer, AudioCategory, AudioDevice, Authorization, EngineFailure, Permission,
    RecognitionEvent, RecognitionTask, SpeechRecognizer, SpeechSynthesizer, SynthesisEvent,
    Utterance,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One call made on [`PlaceholderAudioDevice`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Configure(AudioCategory),
    Activate,
    Deactivate,
    InstallTap,
    RemoveTap,
    StartInput,
    StopInput,
}

#[derive(Default)]
struct DeviceState {
    calls: Vec<DeviceCall>,
    active: bool,
    tap: Option<mpsc::UnboundedSender<AudioBuffer>>,
    input_running: bool,
}

/// Audio device that only keeps state and a call trace.
#[derive(Default)]
pub struct PlaceholderAudioDevice {
    state: Mutex<DeviceState>,
    fail_activation: AtomicBool,
}

impl PlaceholderAudioDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `activate` fail with `DeviceUnavailable`.
    pub fn fail_activation(&self, fail: bool) {
        self.fail_activation.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        lock(&self.state).calls.clone()
    }

    pub fn count(&self, call: &DeviceCall) -> usize {
        lock(&self.state).calls.iter().filter(|c| *c == call).count()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    pub fn has_tap(&self) -> bool {
        lock(&self.state).tap.is_some()
    }

    pub fn is_input_running(&self) -> bool {
        lock(&self.state).input_running
    }

    /// Feed captured samples through the tap. Returns `false` if nothing is capturing.
    pub fn push_buffer(&self, samples: Vec<f32>) -> bool {
        let state = lock(&self.state);
        match (&state.tap, state.input_running) {
            (Some(tap), true) => tap
                .send(AudioBuffer {
                    samples,
                    captured_at: Instant::now(),
                })
                .is_ok(),
            _ => false,
        }
    }
}

impl AudioDevice for PlaceholderAudioDevice {
    fn configure(&self, category: AudioCategory) -> VoiceResult<()> {
        lock(&self.state).calls.push(DeviceCall::Configure(category));
        Ok(())
    }

    fn activate(&self) -> VoiceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::Activate);
        if self.fail_activation.load(Ordering::SeqCst) {
            return Err(VoiceError::DeviceUnavailable("audio session busy".to_string()));
        }
        state.active = true;
        Ok(())
    }

    fn deactivate(&self) -> VoiceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::Deactivate);
        state.active = false;
        Ok(())
    }

    fn install_tap(&self, sink: mpsc::UnboundedSender<AudioBuffer>) -> VoiceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::InstallTap);
        state.tap = Some(sink);
        Ok(())
    }

    fn remove_tap(&self) {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::RemoveTap);
        state.tap = None;
    }

    fn start_input(&self) -> VoiceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::StartInput);
        state.input_running = true;
        Ok(())
    }

    fn stop_input(&self) {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::StopInput);
        state.input_running = false;
    }
}

#[derive(Default)]
struct SynthesizerState {
    spoken: Vec<String>,
    events: Option<mpsc::UnboundedSender<SynthesisEvent>>,
    stops: usize,
}

/// Synthesizer that "plays" until told to [`finish`](Self::finish).
#[derive(Default)]
pub struct PlaceholderSynthesizer {
    state: Mutex<SynthesizerState>,
    auto_finish: AtomicBool,
}

impl PlaceholderSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `Finished` as soon as playback starts.
    pub fn auto_finish(self) -> Self {
        self.auto_finish.store(true, Ordering::SeqCst);
        self
    }

    /// Texts passed to `speak`, in order.
    pub fn spoken(&self) -> Vec<String> {
        lock(&self.state).spoken.clone()
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }

    /// Complete the current utterance.
    pub fn finish(&self) {
        self.emit(SynthesisEvent::Finished);
    }

    pub fn fail(&self, detail: &str) {
        self.emit(SynthesisEvent::Failed(detail.to_string()));
    }

    fn emit(&self, event: SynthesisEvent) {
        if let Some(tx) = lock(&self.state).events.take() {
            let _ = tx.send(event);
        }
    }
}

impl SpeechSynthesizer for PlaceholderSynthesizer {
    fn speak(
        &self,
        utterance: &Utterance,
        events: mpsc::UnboundedSender<SynthesisEvent>,
    ) -> VoiceResult<()> {
        let mut state = lock(&self.state);
        state.spoken.push(utterance.text.clone());
        if self.auto_finish.load(Ordering::SeqCst) {
            let _ = events.send(SynthesisEvent::Finished);
        }
        state.events = Some(events);
        Ok(())
    }

    fn stop(&self) {
        let mut state = lock(&self.state);
        state.stops += 1;
        if let Some(tx) = state.events.take() {
            let _ = tx.send(SynthesisEvent::Cancelled);
        }
    }
}

#[derive(Default)]
struct RecognizerState {
    events: Option<mpsc::UnboundedSender<RecognitionEvent>>,
    audio: Option<mpsc::UnboundedReceiver<AudioBuffer>>,
    started: usize,
}

#[derive(Default)]
struct TaskLog {
    audio_ended: AtomicBool,
    cancels: AtomicUsize,
}

/// Recognizer driven by the test or demo through [`partial`](Self::partial),
/// [`finalize`](Self::finalize), [`error`](Self::error) and [`close`](Self::close).
pub struct PlaceholderRecognizer {
    state: Arc<Mutex<RecognizerState>>,
    log: Arc<TaskLog>,
    available: AtomicBool,
    echo_cancel: AtomicBool,
}

impl Default for PlaceholderRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderRecognizer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecognizerState::default())),
            log: Arc::new(TaskLog::default()),
            available: AtomicBool::new(true),
            echo_cancel: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// When set (the default), cancelling a task reports `Error(Cancelled)` like platform engines do.
    pub fn set_echo_cancel(&self, echo: bool) {
        self.echo_cancel.store(echo, Ordering::SeqCst);
    }

    pub fn partial(&self, text: &str) {
        self.emit(RecognitionEvent::Partial(text.to_string()));
    }

    pub fn finalize(&self, text: &str) {
        self.emit(RecognitionEvent::Final(text.to_string()));
    }

    pub fn error(&self, failure: EngineFailure) {
        self.emit(RecognitionEvent::Error(failure));
    }

    /// Drop the event sender without a final result.
    pub fn close(&self) {
        lock(&self.state).events = None;
    }

    pub fn started(&self) -> usize {
        lock(&self.state).started
    }

    pub fn audio_ended(&self) -> bool {
        self.log.audio_ended.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.log.cancels.load(Ordering::SeqCst)
    }

    /// Number of buffers received since the last drain.
    pub fn drain_audio(&self) -> usize {
        let mut state = lock(&self.state);
        let mut n = 0;
        if let Some(rx) = state.audio.as_mut() {
            while rx.try_recv().is_ok() {
                n += 1;
            }
        }
        n
    }

    fn emit(&self, event: RecognitionEvent) {
        if let Some(tx) = lock(&self.state).events.as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl SpeechRecognizer for PlaceholderRecognizer {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn start(
        &self,
        audio: mpsc::UnboundedReceiver<AudioBuffer>,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> VoiceResult<Box<dyn RecognitionTask>> {
        let mut state = lock(&self.state);
        state.started += 1;
        state.audio = Some(audio);
        state.events = Some(events);
        self.log.audio_ended.store(false, Ordering::SeqCst);
        Ok(Box::new(PlaceholderTask {
            generation: state.started,
            state: Arc::clone(&self.state),
            log: Arc::clone(&self.log),
            echo_cancel: self.echo_cancel.load(Ordering::SeqCst),
        }))
    }
}

struct PlaceholderTask {
    /// Value of `started` when this task was created; later tasks own the sender.
    generation: usize,
    state: Arc<Mutex<RecognizerState>>,
    log: Arc<TaskLog>,
    echo_cancel: bool,
}

impl RecognitionTask for PlaceholderTask {
    fn end_audio(&mut self) {
        self.log.audio_ended.store(true, Ordering::SeqCst);
    }

    fn cancel(&mut self) {
        self.log.cancels.fetch_add(1, Ordering::SeqCst);
        let state = lock(&self.state);
        if self.echo_cancel && state.started == self.generation {
            if let Some(tx) = state.events.as_ref() {
                let _ = tx.send(RecognitionEvent::Error(EngineFailure::Cancelled));
            }
        }
    }
}

/// Authorization with fixed statuses. Requests for an undetermined permission
/// resolve to `grant_on_request`.
pub struct FixedAuthorization {
    microphone: Mutex<Permission>,
    recognition: Mutex<Permission>,
    grant_on_request: bool,
}

impl FixedAuthorization {
    pub fn new(microphone: Permission, recognition: Permission) -> Self {
        Self {
            microphone: Mutex::new(microphone),
            recognition: Mutex::new(recognition),
            grant_on_request: true,
        }
    }

    pub fn granted() -> Self {
        Self::new(Permission::Granted, Permission::Granted)
    }

    /// Both undetermined; a request grants or denies depending on `grant`.
    pub fn undetermined(grant: bool) -> Self {
        Self {
            grant_on_request: grant,
            ..Self::new(Permission::Undetermined, Permission::Undetermined)
        }
    }

    fn request(&self, slot: &Mutex<Permission>) -> Permission {
        let mut status = lock(slot);
        if *status == Permission::Undetermined {
            *status = if self.grant_on_request {
                Permission::Granted
            } else {
                Permission::Denied
            };
        }
        *status
    }
}

#[async_trait]
impl Authorization for FixedAuthorization {
    fn microphone(&self) -> Permission {
        *lock(&self.microphone)
    }

    fn recognition(&self) -> Permission {
        *lock(&self.recognition)
    }

    async fn request_microphone(&self) -> Permission {
        self.request(&self.microphone)
    }

    async fn request_recognition(&self) -> Permission {
        self.request(&self.recognition)
    }
}
