//! # Bridgy Voice - Voice Interaction Session Manager
//!
//! Speaks flashcard text aloud and transcribes spoken answers over a single
//! shared microphone/speaker. Every request receives exactly one outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 VoiceInteractionManager                       │
//! │   speak() / start_listening() / stop_listening()              │
//! │         │                                                     │
//! │         ▼                                                     │
//! │  ┌──────────────────┐   preempt   ┌───────────────────────┐  │
//! │  │  AudioResource   │────────────→│   previous job        │  │
//! │  │    Arbiter       │             │ (teardown + resolve)  │  │
//! │  └──────────────────┘             └───────────────────────┘  │
//! │         │ ownership                                           │
//! │         ▼                                                     │
//! │  ┌──────────────────┐        ┌──────────────────────────┐    │
//! │  │ SpeechSynthesis  │        │ SpeechRecognition        │    │
//! │  │      Job         │        │    Session               │    │
//! │  └──────────────────┘        └──────────────────────────┘    │
//! │         │                              │                      │
//! │         ▼                              ▼                      │
//! │   Outcome<()>                   Outcome<String>               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod arbiter;
pub mod config;
pub mod error;
pub mod manager;
#[cfg(feature = "native-audio")]
pub mod native;
pub mod outcome;
pub mod placeholder;
pub mod platform;
pub mod recognition;
pub mod synthesis;

pub use arbiter::{AudioJob, AudioOwnership, AudioResourceArbiter, JobKind};
pub use config::VoiceConfig;
pub use error::{VoiceError, VoiceResult};
pub use manager::{plan, ActiveKind, Request, Transition, VoiceBackends, VoiceInteractionManager};
#[cfg(feature = "native-audio")]
pub use native::CpalAudioDevice;
pub use outcome::{Outcome, Resolver};
pub use placeholder::{
    DeviceCall, FixedAuthorization, PlaceholderAudioDevice, PlaceholderRecognizer,
    PlaceholderSynthesizer,
};
pub use platform::{
    AudioBuffer, AudioCategory, AudioDevice, Authorization, EngineFailure, Permission,
    RecognitionEvent, RecognitionTask, SpeechRecognizer, SpeechSynthesizer, SynthesisEvent,
    Utterance,
};
pub use recognition::{RecognitionContext, RecognitionState, SpeechRecognitionSession};
pub use synthesis::{SpeechSynthesisJob, SynthesisState};
