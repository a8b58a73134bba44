//! Error types for the voice interaction subsystem

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can be delivered through an [`Outcome`](crate::Outcome) or returned by setup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    /// Microphone permission or recognition authorization missing. Not retried automatically.
    #[error("Speech authorization denied")]
    AuthorizationDenied,

    /// Microphone, speaker or recognizer not accessible right now.
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Superseded by a newer request or stopped without content. Informational.
    #[error("Voice interaction cancelled")]
    Cancelled,

    /// Opaque failure reported by the recognition or synthesis engine, surfaced verbatim.
    #[error("Speech engine error: {0}")]
    EngineError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl VoiceError {
    /// Transient failures a caller may retry after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VoiceError::DeviceUnavailable(_) | VoiceError::EngineError(_))
    }

    /// Whether the user should be pointed at the system settings.
    pub fn needs_settings(&self) -> bool {
        matches!(self, VoiceError::AuthorizationDenied)
    }

    /// Cancellation is never shown to the user as an error.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, VoiceError::Cancelled)
    }
}

impl From<std::io::Error> for VoiceError {
    fn from(err: std::io::Error) -> Self {
        VoiceError::Io(err.to_string())
    }
}

impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::Config(err.to_string())
    }
}

#[cfg(feature = "native-audio")]
impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}

#[cfg(feature = "native-audio")]
impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}

#[cfg(feature = "native-audio")]
impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}
