//! **VoiceInteractionManager** — the only entry point callers use.
//!
//! Holds the arbiter and the single active job. Every request is routed through
//! [`plan`], an exhaustive `(ActiveKind, Request)` table, so each pair has exactly
//! one outcome.

use crate::arbiter::{AudioResourceArbiter, JobKind};
use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::outcome::Outcome;
use crate::platform::{AudioDevice, Authorization, Permission, SpeechRecognizer, SpeechSynthesizer};
use crate::recognition::{RecognitionContext, SpeechRecognitionSession};
use crate::synthesis::SpeechSynthesisJob;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

/// Platform collaborators the manager drives.
#[derive(Clone)]
pub struct VoiceBackends {
    pub device: Arc<dyn AudioDevice>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub authorization: Arc<dyn Authorization>,
}

/// What currently holds the manager's attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveKind {
    Idle,
    Speaking,
    Listening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Speak,
    StartListening,
    StopListening,
    StopSpeaking,
}

/// Action taken for a `(ActiveKind, Request)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to preempt; start the requested job.
    Start,
    /// Cancel the running synthesis (outcome `Cancelled`), then start.
    CancelSynthesisThenStart,
    /// Finalize the running session by the content rule, then start.
    StopRecognitionThenStart,
    StopRecognition,
    CancelSynthesis,
    Ignore,
}

pub fn plan(active: ActiveKind, request: Request) -> Transition {
    use ActiveKind::*;
    use Request::*;

    match (active, request) {
        (Idle, Speak) | (Idle, StartListening) => Transition::Start,
        (Speaking, Speak) | (Speaking, StartListening) => Transition::CancelSynthesisThenStart,
        (Listening, Speak) | (Listening, StartListening) => Transition::StopRecognitionThenStart,
        (Listening, StopListening) => Transition::StopRecognition,
        (Speaking, StopSpeaking) => Transition::CancelSynthesis,
        (Idle, StopListening)
        | (Speaking, StopListening)
        | (Idle, StopSpeaking)
        | (Listening, StopSpeaking) => Transition::Ignore,
    }
}

enum ActiveJob {
    Idle,
    Speaking(Arc<SpeechSynthesisJob>),
    Listening(Arc<SpeechRecognitionSession>),
}

impl ActiveJob {
    /// Finished jobs count as idle.
    fn kind(&self) -> ActiveKind {
        match self {
            ActiveJob::Speaking(job) if !job.is_done() => ActiveKind::Speaking,
            ActiveJob::Listening(session) if !session.is_done() => ActiveKind::Listening,
            _ => ActiveKind::Idle,
        }
    }

    fn preempt(&self) {
        match self {
            ActiveJob::Speaking(job) => {
                job.cancel();
            }
            ActiveJob::Listening(session) => {
                session.stop();
            }
            ActiveJob::Idle => {}
        }
    }
}

/// Façade over the shared audio device. Construct once and share by reference or `Arc`.
///
/// Intended for one outstanding request at a time; calls are serialized by an
/// internal lock so overlapping callers cannot interleave device mutations.
pub struct VoiceInteractionManager {
    config: VoiceConfig,
    backends: VoiceBackends,
    arbiter: Arc<AudioResourceArbiter>,
    runtime: Handle,
    active: Mutex<ActiveJob>,
    listening: Arc<watch::Sender<bool>>,
}

impl VoiceInteractionManager {
    /// Create a manager on the current tokio runtime.
    pub fn new(backends: VoiceBackends, config: VoiceConfig) -> VoiceResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| VoiceError::Config(format!("no tokio runtime: {}", e)))?;
        Self::with_runtime(backends, config, runtime)
    }

    /// Create a manager whose engine event tasks run on `runtime`.
    pub fn with_runtime(
        backends: VoiceBackends,
        config: VoiceConfig,
        runtime: Handle,
    ) -> VoiceResult<Self> {
        config.validate()?;
        info!("🎭 Voice interaction manager ready ({})", config.locale);
        let (listening, _) = watch::channel(false);
        Ok(Self {
            config,
            backends,
            arbiter: Arc::new(AudioResourceArbiter::new()),
            runtime,
            active: Mutex::new(ActiveJob::Idle),
            listening: Arc::new(listening),
        })
    }

    /// Speak `text`. Any active recognition is finalized first.
    pub fn speak(&self, text: impl Into<String>) -> Outcome<()> {
        let mut active = self.lock_active();
        self.route(&active, Request::Speak);

        let (job, outcome) = SpeechSynthesisJob::start(
            self.config.utterance(text),
            Arc::clone(&self.arbiter),
            Arc::clone(&self.backends.device),
            Arc::clone(&self.backends.synthesizer),
            &self.runtime,
        );
        *active = ActiveJob::Speaking(job);
        outcome
    }

    /// Start capturing speech. Any active synthesis is cancelled and any prior
    /// session is finalized with what it heard.
    pub fn start_listening(&self) -> Outcome<String> {
        let mut active = self.lock_active();
        self.route(&active, Request::StartListening);

        let ctx = RecognitionContext {
            arbiter: Arc::clone(&self.arbiter),
            device: Arc::clone(&self.backends.device),
            recognizer: Arc::clone(&self.backends.recognizer),
            authorization: Arc::clone(&self.backends.authorization),
            listening: Arc::clone(&self.listening),
        };
        let (session, outcome) = SpeechRecognitionSession::start(ctx, &self.runtime);
        *active = ActiveJob::Listening(session);
        outcome
    }

    /// Finish the active recognition session. No-op when nothing is listening.
    pub fn stop_listening(&self) {
        let active = self.lock_active();
        self.route(&active, Request::StopListening);
    }

    /// Cancel active synthesis. No-op when nothing is speaking.
    pub fn stop_speaking(&self) {
        let active = self.lock_active();
        self.route(&active, Request::StopSpeaking);
    }

    fn route(&self, active: &ActiveJob, request: Request) {
        let kind = active.kind();
        let transition = plan(kind, request);
        debug!("{:?} + {:?} -> {:?}", kind, request, transition);

        match transition {
            Transition::CancelSynthesisThenStart
            | Transition::StopRecognitionThenStart
            | Transition::StopRecognition
            | Transition::CancelSynthesis => active.preempt(),
            Transition::Start | Transition::Ignore => {}
        }
    }

    /// Ask for microphone and recognition access if not yet determined.
    pub async fn request_authorization(&self) -> VoiceResult<()> {
        let auth = &self.backends.authorization;
        let microphone = match auth.microphone() {
            Permission::Undetermined => auth.request_microphone().await,
            status => status,
        };
        let recognition = match auth.recognition() {
            Permission::Undetermined => auth.request_recognition().await,
            status => status,
        };
        info!("Authorization: microphone {:?}, recognition {:?}", microphone, recognition);

        if microphone == Permission::Granted && recognition == Permission::Granted {
            Ok(())
        } else {
            Err(VoiceError::AuthorizationDenied)
        }
    }

    pub fn is_listening(&self) -> bool {
        *self.listening.borrow()
    }

    /// Watch the listening flag (e.g. to drive a record button).
    pub fn subscribe_listening(&self) -> watch::Receiver<bool> {
        self.listening.subscribe()
    }

    /// Best transcript so far while listening, for live captions.
    pub fn partial_transcript(&self) -> Option<String> {
        match &*self.lock_active() {
            ActiveJob::Listening(session) if !session.is_done() => Some(session.transcript()),
            _ => None,
        }
    }

    pub fn active(&self) -> ActiveKind {
        self.lock_active().kind()
    }

    /// Job kind holding the audio device right now.
    pub fn audio_holder(&self) -> Option<JobKind> {
        self.arbiter.holder()
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveJob> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
