//! **SpeechRecognitionSession** — capture the microphone and produce one transcript.
//!
//! States: `Starting → Listening → Finalizing → Done`.
//!
//! Exactly one finality path runs per session:
//! - the engine reports a final result: `Ok(transcript)`
//! - the caller stops, the session is preempted, or the engine reports its own
//!   cancellation: `Ok(accumulated)` if anything was heard, otherwise `Err(Cancelled)`
//! - the engine reports a genuine error: `Err(EngineError)`
//!
//! Teardown always completes before the outcome resolves, so a caller that sees
//! the result may start the next interaction right away.

use crate::arbiter::{AudioJob, AudioOwnership, AudioResourceArbiter, JobKind};
use crate::error::{VoiceError, VoiceResult};
use crate::outcome::{self, Outcome, Resolver};
use crate::platform::{
    AudioCategory, AudioDevice, Authorization, EngineFailure, Permission, RecognitionEvent,
    RecognitionTask, SpeechRecognizer,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    Starting,
    Listening,
    Finalizing,
    Done,
}

/// Collaborators a session needs, shared with the manager.
#[derive(Clone)]
pub struct RecognitionContext {
    pub arbiter: Arc<AudioResourceArbiter>,
    pub device: Arc<dyn AudioDevice>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub authorization: Arc<dyn Authorization>,
    /// Observable "is listening" flag.
    pub listening: Arc<watch::Sender<bool>>,
}

struct SessionInner {
    state: RecognitionState,
    accumulated_transcript: String,
    is_final: bool,
    task: Option<Box<dyn RecognitionTask>>,
}

pub struct SpeechRecognitionSession {
    ctx: RecognitionContext,
    ownership: AudioOwnership,
    inner: Mutex<SessionInner>,
    resolver: Resolver<String>,
    done: Notify,
}

impl SpeechRecognitionSession {
    /// Acquire the device (preempting its holder) and start capturing.
    pub fn start(ctx: RecognitionContext, runtime: &Handle) -> (Arc<Self>, Outcome<String>) {
        let (resolver, outcome) = outcome::channel();

        let session = Arc::new_cyclic(|weak: &Weak<Self>| {
            let as_job: Weak<dyn AudioJob> = weak.clone();
            let ownership = ctx.arbiter.acquire(JobKind::Recognition, as_job);
            Self {
                ctx: ctx.clone(),
                ownership,
                inner: Mutex::new(SessionInner {
                    state: RecognitionState::Starting,
                    accumulated_transcript: String::new(),
                    is_final: false,
                    task: None,
                }),
                resolver,
                done: Notify::new(),
            }
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        match session.begin(events_tx) {
            Ok(()) => {
                runtime.spawn(Arc::clone(&session).pump(events_rx));
            }
            Err(e) => {
                warn!("Speech recognition failed to start: {}", e);
                session.finalize(false, |_| Err(e));
            }
        }

        (session, outcome)
    }

    fn begin(&self, events: mpsc::UnboundedSender<RecognitionEvent>) -> VoiceResult<()> {
        let mut inner = self.lock_inner();
        if inner.state != RecognitionState::Starting {
            return Ok(());
        }

        let auth = &self.ctx.authorization;
        if auth.microphone() != Permission::Granted || auth.recognition() != Permission::Granted {
            return Err(VoiceError::AuthorizationDenied);
        }
        if !self.ctx.recognizer.is_available() {
            return Err(VoiceError::DeviceUnavailable(
                "speech recognizer is not available".to_string(),
            ));
        }

        self.ctx.device.configure(AudioCategory::Record)?;
        self.ctx.device.activate()?;

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        self.ctx.device.install_tap(audio_tx)?;
        inner.task = Some(self.ctx.recognizer.start(audio_rx, events)?);
        self.ctx.device.start_input()?;

        inner.state = RecognitionState::Listening;
        self.ctx.listening.send_replace(true);
        info!("🎤 Listening");
        Ok(())
    }

    async fn pump(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<RecognitionEvent>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.apply(event),
                    None => {
                        debug!("Recognizer closed its event stream");
                        self.finalize(false, with_content_rule);
                        return;
                    }
                },
                _ = self.done.notified() => return,
            }
        }
    }

    /// Apply one engine event. Events after `Done` are ignored.
    pub fn apply(&self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Partial(text) => {
                let mut inner = self.lock_inner();
                if inner.state == RecognitionState::Listening {
                    debug!("Partial transcript: {:?}", text);
                    inner.accumulated_transcript = text;
                }
            }
            RecognitionEvent::Final(text) => {
                self.finalize(true, move |_| Ok(text));
            }
            RecognitionEvent::Error(EngineFailure::Cancelled) => {
                self.finalize(false, with_content_rule);
            }
            RecognitionEvent::Error(EngineFailure::Other(detail)) => {
                self.finalize(false, move |_| Err(VoiceError::EngineError(detail)));
            }
        }
    }

    /// Caller-initiated stop. Succeeds with whatever was heard, or resolves `Cancelled` if nothing was.
    pub fn stop(&self) -> bool {
        self.finalize(false, with_content_rule)
    }

    /// Run the single finality path: decide, tear down, then resolve.
    fn finalize<F>(&self, engine_final: bool, decide: F) -> bool
    where
        F: FnOnce(&str) -> VoiceResult<String>,
    {
        let mut inner = self.lock_inner();
        if matches!(inner.state, RecognitionState::Finalizing | RecognitionState::Done) {
            debug!("Recognition already {:?}; ignoring", inner.state);
            return false;
        }

        inner.state = RecognitionState::Finalizing;
        let result = decide(&inner.accumulated_transcript);
        if let Ok(ref transcript) = result {
            inner.is_final = engine_final;
            inner.accumulated_transcript.clone_from(transcript);
        }

        self.teardown(&mut inner);
        inner.state = RecognitionState::Done;
        drop(inner);

        match &result {
            Ok(t) => info!("✅ Recognition finished ({} chars)", t.chars().count()),
            Err(e) => info!("Recognition ended: {}", e),
        }
        self.done.notify_one();
        self.resolver.resolve(result)
    }

    fn teardown(&self, inner: &mut SessionInner) {
        let device = &self.ctx.device;
        device.stop_input();
        device.remove_tap();
        if let Some(mut task) = inner.task.take() {
            task.end_audio();
            task.cancel();
        }
        if self.ctx.arbiter.is_current(&self.ownership) {
            if let Err(e) = device.deactivate() {
                warn!("Failed to deactivate audio after recognition: {}", e);
            }
        }
        self.ctx.arbiter.release(&self.ownership);
        self.ctx.listening.send_replace(false);
    }

    pub fn state(&self) -> RecognitionState {
        self.lock_inner().state
    }

    pub fn is_done(&self) -> bool {
        self.state() == RecognitionState::Done
    }

    pub fn is_final(&self) -> bool {
        self.lock_inner().is_final
    }

    pub fn transcript(&self) -> String {
        self.lock_inner().accumulated_transcript.clone()
    }

    fn lock_inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A stop with content is a successful capture; without content it is a cancellation.
/// Whitespace-only transcripts count as no content.
fn with_content_rule(accumulated: &str) -> VoiceResult<String> {
    if accumulated.trim().is_empty() {
        Err(VoiceError::Cancelled)
    } else {
        Ok(accumulated.to_string())
    }
}

impl AudioJob for SpeechRecognitionSession {
    fn preempt(&self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::{
        DeviceCall, FixedAuthorization, PlaceholderAudioDevice, PlaceholderRecognizer,
    };

    struct Rig {
        ctx: RecognitionContext,
        device: Arc<PlaceholderAudioDevice>,
        recognizer: Arc<PlaceholderRecognizer>,
        listening: watch::Receiver<bool>,
    }

    impl Rig {
        fn new(authorization: FixedAuthorization) -> Self {
            let device = Arc::new(PlaceholderAudioDevice::new());
            let recognizer = Arc::new(PlaceholderRecognizer::new());
            let (tx, listening) = watch::channel(false);
            Self {
                ctx: RecognitionContext {
                    arbiter: Arc::new(AudioResourceArbiter::new()),
                    device: device.clone(),
                    recognizer: recognizer.clone(),
                    authorization: Arc::new(authorization),
                    listening: Arc::new(tx),
                },
                device,
                recognizer,
                listening,
            }
        }

        fn granted() -> Self {
            Self::new(FixedAuthorization::granted())
        }

        fn listen(&self) -> (Arc<SpeechRecognitionSession>, Outcome<String>) {
            SpeechRecognitionSession::start(self.ctx.clone(), &Handle::current())
        }
    }

    #[tokio::test]
    async fn final_result_resolves_success() {
        let rig = Rig::granted();
        let (session, outcome) = rig.listen();
        assert_eq!(session.state(), RecognitionState::Listening);
        assert!(*rig.listening.borrow());

        rig.recognizer.partial("bon");
        rig.recognizer.finalize("bonjour");
        assert_eq!(outcome.await, Ok("bonjour".to_string()));
        assert!(session.is_final());
        assert!(!*rig.listening.borrow());
        assert!(!rig.device.is_active());
    }

    #[tokio::test]
    async fn partials_do_not_resolve() {
        let rig = Rig::granted();
        let (session, mut outcome) = rig.listen();

        session.apply(RecognitionEvent::Partial("hel".into()));
        session.apply(RecognitionEvent::Partial("hello".into()));
        assert_eq!(outcome.try_take(), None);
        assert_eq!(session.transcript(), "hello");
        assert_eq!(session.state(), RecognitionState::Listening);
    }

    #[tokio::test]
    async fn stop_with_content_succeeds() {
        let rig = Rig::granted();
        let (session, outcome) = rig.listen();
        session.apply(RecognitionEvent::Partial("hello world".into()));

        assert!(session.stop());
        assert_eq!(outcome.await, Ok("hello world".to_string()));
    }

    #[tokio::test]
    async fn stop_without_content_is_cancelled() {
        let rig = Rig::granted();
        let (session, outcome) = rig.listen();
        session.stop();
        assert_eq!(outcome.await, Err(VoiceError::Cancelled));
    }

    #[tokio::test]
    async fn teardown_precedes_resolution() {
        let rig = Rig::granted();
        let (session, mut outcome) = rig.listen();
        session.apply(RecognitionEvent::Partial("word".into()));
        session.stop();

        // Resolution is observable synchronously and the device is already free.
        assert_eq!(outcome.try_take(), Some(Ok("word".to_string())));
        assert!(!rig.device.has_tap());
        assert!(!rig.device.is_input_running());
        assert!(!rig.device.is_active());
        assert_eq!(rig.ctx.arbiter.holder(), None);
        assert!(rig.recognizer.audio_ended());
    }

    #[tokio::test]
    async fn whitespace_transcript_counts_as_empty() {
        let rig = Rig::granted();
        let (session, outcome) = rig.listen();
        session.apply(RecognitionEvent::Partial("  ".into()));
        session.stop();
        assert_eq!(outcome.await, Err(VoiceError::Cancelled));
    }

    #[tokio::test]
    async fn stop_resolves_without_engine_cancel_event() {
        let rig = Rig::granted();
        rig.recognizer.set_echo_cancel(false);
        let (session, mut outcome) = rig.listen();
        session.apply(RecognitionEvent::Partial("quiet engine".into()));

        assert!(session.stop());
        assert_eq!(outcome.try_take(), Some(Ok("quiet engine".to_string())));
        assert_eq!(rig.recognizer.cancel_count(), 1);
        assert!(session.is_done());
    }

    #[tokio::test]
    async fn engine_cancellation_follows_content_rule() {
        let rig = Rig::granted();
        let (session, outcome) = rig.listen();
        session.apply(RecognitionEvent::Partial("merci".into()));
        session.apply(RecognitionEvent::Error(EngineFailure::Cancelled));
        assert_eq!(outcome.await, Ok("merci".to_string()));

        let (session, outcome) = rig.listen();
        session.apply(RecognitionEvent::Error(EngineFailure::Cancelled));
        assert_eq!(outcome.await, Err(VoiceError::Cancelled));
    }

    #[tokio::test]
    async fn engine_error_is_failure_even_with_content() {
        let rig = Rig::granted();
        let (session, outcome) = rig.listen();
        session.apply(RecognitionEvent::Partial("partial".into()));
        session.apply(RecognitionEvent::Error(EngineFailure::Other("server gone".into())));
        assert_eq!(outcome.await, Err(VoiceError::EngineError("server gone".to_string())));
    }

    #[tokio::test]
    async fn stop_twice_is_idempotent() {
        let rig = Rig::granted();
        let (session, outcome) = rig.listen();
        session.apply(RecognitionEvent::Partial("once".into()));

        assert!(session.stop());
        let calls_after_first = rig.device.calls();
        assert!(!session.stop());
        assert_eq!(rig.device.calls(), calls_after_first);
        assert_eq!(rig.device.count(&DeviceCall::Deactivate), 1);
        assert_eq!(outcome.await, Ok("once".to_string()));
    }

    #[tokio::test]
    async fn denied_microphone_never_listens() {
        let rig = Rig::new(FixedAuthorization::new(Permission::Denied, Permission::Granted));
        let (session, outcome) = rig.listen();
        assert_eq!(session.state(), RecognitionState::Done);
        assert_eq!(outcome.await, Err(VoiceError::AuthorizationDenied));
        assert!(!*rig.listening.borrow());
        assert_eq!(rig.device.count(&DeviceCall::StartInput), 0);
        assert_eq!(rig.recognizer.started(), 0);
    }

    #[tokio::test]
    async fn undetermined_recognition_is_denied() {
        let rig = Rig::new(FixedAuthorization::new(Permission::Granted, Permission::Undetermined));
        let (_session, outcome) = rig.listen();
        assert_eq!(outcome.await, Err(VoiceError::AuthorizationDenied));
    }

    #[tokio::test]
    async fn unavailable_recognizer_is_device_unavailable() {
        let rig = Rig::granted();
        rig.recognizer.set_available(false);
        let (_session, outcome) = rig.listen();
        assert!(matches!(outcome.await, Err(VoiceError::DeviceUnavailable(_))));
        assert_eq!(rig.ctx.arbiter.holder(), None);
    }

    #[tokio::test]
    async fn closed_event_stream_finalizes_with_content() {
        let rig = Rig::granted();
        let (_session, outcome) = rig.listen();
        rig.recognizer.partial("almost");
        rig.recognizer.close();
        assert_eq!(outcome.await, Ok("almost".to_string()));
    }

    #[tokio::test]
    async fn tap_buffers_reach_recognizer() {
        let rig = Rig::granted();
        let (session, _outcome) = rig.listen();
        assert!(rig.device.push_buffer(vec![0.0; 1024]));
        assert_eq!(rig.recognizer.drain_audio(), 1);

        session.stop();
        assert!(!rig.device.push_buffer(vec![0.0; 1024]));
    }
}
