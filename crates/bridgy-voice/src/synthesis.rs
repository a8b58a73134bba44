//! **SpeechSynthesisJob** — speak one utterance on the shared device.
//!
//! States: `Queued → Speaking → {Finished, Cancelled, Failed}`. The outcome
//! resolves when playback ends; preemption or an explicit stop halts the
//! synthesizer and resolves [`VoiceError::Cancelled`] unless playback already
//! finished.

use crate::arbiter::{AudioJob, AudioOwnership, AudioResourceArbiter, JobKind};
use crate::error::{VoiceError, VoiceResult};
use crate::outcome::{self, Outcome, Resolver};
use crate::platform::{AudioCategory, AudioDevice, SpeechSynthesizer, SynthesisEvent, Utterance};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Queued,
    Speaking,
    Finished,
    Cancelled,
    Failed,
}

impl SynthesisState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SynthesisState::Finished | SynthesisState::Cancelled | SynthesisState::Failed
        )
    }
}

pub struct SpeechSynthesisJob {
    utterance: Utterance,
    arbiter: Arc<AudioResourceArbiter>,
    device: Arc<dyn AudioDevice>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    ownership: AudioOwnership,
    state: Mutex<SynthesisState>,
    resolver: Resolver<()>,
    done: Notify,
}

impl SpeechSynthesisJob {
    /// Acquire the device (preempting its holder), start playback, and return the job with its outcome.
    pub fn start(
        utterance: Utterance,
        arbiter: Arc<AudioResourceArbiter>,
        device: Arc<dyn AudioDevice>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        runtime: &Handle,
    ) -> (Arc<Self>, Outcome<()>) {
        let (resolver, outcome) = outcome::channel();

        let job = Arc::new_cyclic(|weak: &Weak<Self>| {
            let as_job: Weak<dyn AudioJob> = weak.clone();
            let ownership = arbiter.acquire(JobKind::Synthesis, as_job);
            Self {
                utterance,
                arbiter: Arc::clone(&arbiter),
                device,
                synthesizer,
                ownership,
                state: Mutex::new(SynthesisState::Queued),
                resolver,
                done: Notify::new(),
            }
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        match job.begin(events_tx) {
            Ok(()) => {
                runtime.spawn(Arc::clone(&job).pump(events_rx));
            }
            Err(e) => {
                warn!("Speech synthesis failed to start: {}", e);
                job.finish(SynthesisState::Failed, Err(e));
            }
        }

        (job, outcome)
    }

    fn begin(&self, events: mpsc::UnboundedSender<SynthesisEvent>) -> VoiceResult<()> {
        let mut state = self.lock_state();
        if *state != SynthesisState::Queued {
            // Preempted between acquire and setup.
            return Ok(());
        }
        self.device.configure(AudioCategory::Playback)?;
        self.device.activate()?;
        self.synthesizer.speak(&self.utterance, events)?;
        *state = SynthesisState::Speaking;
        info!("🔊 Speaking {} chars ({})", self.utterance.text.chars().count(), self.utterance.voice_locale);
        Ok(())
    }

    async fn pump(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<SynthesisEvent>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SynthesisEvent::Finished) => {
                        self.finish(SynthesisState::Finished, Ok(()));
                    }
                    Some(SynthesisEvent::Cancelled) => {
                        self.finish(SynthesisState::Cancelled, Err(VoiceError::Cancelled));
                    }
                    Some(SynthesisEvent::Failed(detail)) => {
                        self.finish(SynthesisState::Failed, Err(VoiceError::EngineError(detail)));
                    }
                    None => {
                        self.finish(
                            SynthesisState::Failed,
                            Err(VoiceError::EngineError("synthesizer closed without completing".to_string())),
                        );
                        return;
                    }
                },
                _ = self.done.notified() => return,
            }
        }
    }

    /// Stop playback. No-op once the job has reached a terminal state.
    pub fn cancel(&self) -> bool {
        self.finish(SynthesisState::Cancelled, Err(VoiceError::Cancelled))
    }

    /// Move to `terminal`, tear down, then resolve. Only the first caller acts.
    fn finish(&self, terminal: SynthesisState, result: VoiceResult<()>) -> bool {
        let mut state = self.lock_state();
        if state.is_terminal() {
            debug!("Synthesis already {:?}; ignoring {:?}", *state, terminal);
            return false;
        }

        if *state == SynthesisState::Speaking && terminal != SynthesisState::Finished {
            self.synthesizer.stop();
        }

        // A successor that already took the device keeps it active.
        if self.arbiter.is_current(&self.ownership) {
            if let Err(e) = self.device.deactivate() {
                warn!("Failed to deactivate audio after synthesis: {}", e);
            }
        }
        self.arbiter.release(&self.ownership);

        *state = terminal;
        drop(state);
        info!("Synthesis {:?}", terminal);

        self.done.notify_one();
        self.resolver.resolve(result)
    }

    pub fn state(&self) -> SynthesisState {
        *self.lock_state()
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn utterance(&self) -> &Utterance {
        &self.utterance
    }

    fn lock_state(&self) -> MutexGuard<'_, SynthesisState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AudioJob for SpeechSynthesisJob {
    fn preempt(&self) {
        self.cancel();
    }
}
