//! Voice configuration loaded from defaults, an optional TOML file, and the environment.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | BRIDGY_VOICE_CONFIG | config/voice | Path (without extension) of the TOML file. |
//! | BRIDGY_VOICE_LOCALE | en-US | Voice and recognition locale. |
//! | BRIDGY_VOICE_SPEECH_RATE | 0.5 | Synthesis rate (0.5 is the platform's normal pace). |
//! | BRIDGY_VOICE_TAP_BUFFER_SIZE | 1024 | Frames per captured buffer. |
//! | BRIDGY_VOICE_SAMPLE_RATE | 16000 | Capture sample rate for the native backend. |

use crate::error::{VoiceError, VoiceResult};
use crate::platform::Utterance;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime settings for the voice interaction manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub locale: String,
    pub speech_rate: f32,
    pub tap_buffer_size: usize,
    pub sample_rate: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            speech_rate: 0.5,
            tap_buffer_size: 1024,
            sample_rate: 16000,
        }
    }
}

impl VoiceConfig {
    /// Load config. Precedence: env `BRIDGY_VOICE_*` > file at `BRIDGY_VOICE_CONFIG` (or `config/voice`) > defaults.
    pub fn load() -> VoiceResult<Self> {
        let path = std::env::var("BRIDGY_VOICE_CONFIG").unwrap_or_else(|_| "config/voice".to_string());
        Self::load_from(Path::new(&path))
    }

    /// Same as [`load`](Self::load) with an explicit file path. A missing file is not an error.
    pub fn load_from(path: &Path) -> VoiceResult<Self> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("locale", defaults.locale)?
            .set_default("speech_rate", f64::from(defaults.speech_rate))?
            .set_default("tap_buffer_size", defaults.tap_buffer_size as i64)?
            .set_default("sample_rate", i64::from(defaults.sample_rate))?
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("BRIDGY_VOICE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> VoiceResult<()> {
        if self.locale.trim().is_empty() {
            return Err(VoiceError::Config("locale must not be empty".to_string()));
        }
        if !(self.speech_rate.is_finite() && self.speech_rate > 0.0) {
            return Err(VoiceError::Config(format!(
                "speech_rate must be positive, got {}",
                self.speech_rate
            )));
        }
        if self.tap_buffer_size == 0 {
            return Err(VoiceError::Config("tap_buffer_size must be non-zero".to_string()));
        }
        if self.sample_rate == 0 {
            return Err(VoiceError::Config("sample_rate must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Utterance for `text` in the configured voice.
    pub fn utterance(&self, text: impl Into<String>) -> Utterance {
        Utterance {
            text: text.into(),
            voice_locale: self.locale.clone(),
            rate: self.speech_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Loader tests read process-wide env; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn defaults_match_app() {
        let c = VoiceConfig::default();
        assert_eq!(c.locale, "en-US");
        assert!((c.speech_rate - 0.5).abs() < 1e-6);
        assert_eq!(c.tap_buffer_size, 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "locale = \"de-DE\"\nspeech_rate = 0.4").unwrap();

        let c = VoiceConfig::load_from(&path).unwrap();
        assert_eq!(c.locale, "de-DE");
        assert!((c.speech_rate - 0.4).abs() < 1e-6);
        assert_eq!(c.tap_buffer_size, 1024);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let c = VoiceConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(c.sample_rate, 16000);
    }

    #[test]
    fn env_overrides_file_and_defaults() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.toml");
        std::fs::write(&path, "locale = \"de-DE\"\n").unwrap();

        std::env::set_var("BRIDGY_VOICE_LOCALE", "fr-FR");
        std::env::set_var("BRIDGY_VOICE_SPEECH_RATE", "0.8");
        let loaded = VoiceConfig::load_from(&path);
        std::env::remove_var("BRIDGY_VOICE_LOCALE");
        std::env::remove_var("BRIDGY_VOICE_SPEECH_RATE");

        let c = loaded.unwrap();
        assert_eq!(c.locale, "fr-FR");
        assert!((c.speech_rate - 0.8).abs() < 1e-6);
        assert_eq!(c.tap_buffer_size, 1024);
    }

    #[test]
    fn rejects_bad_values() {
        let c = VoiceConfig {
            speech_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(VoiceError::Config(_))));

        let c = VoiceConfig {
            locale: " ".to_string(),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn utterance_uses_configured_voice() {
        let u = VoiceConfig::default().utterance("bonjour");
        assert_eq!(u.text, "bonjour");
        assert_eq!(u.voice_locale, "en-US");
    }
}
