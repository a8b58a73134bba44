//! Example: Speak-mode drill
//!
//! Speaks the front of a flashcard, listens for the learner's answer and prints
//! the transcript. Placeholder engines stand in for the platform, with a
//! background task playing the part of the learner.

use bridgy_voice::{
    FixedAuthorization, PlaceholderAudioDevice, PlaceholderRecognizer, PlaceholderSynthesizer,
    VoiceBackends, VoiceConfig, VoiceError, VoiceInteractionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = VoiceConfig::load()?;
    info!("🃏 Speak mode ({}, rate {})", config.locale, config.speech_rate);

    let recognizer = Arc::new(PlaceholderRecognizer::new());
    let backends = VoiceBackends {
        device: Arc::new(PlaceholderAudioDevice::new()),
        synthesizer: Arc::new(PlaceholderSynthesizer::new().auto_finish()),
        recognizer: recognizer.clone(),
        authorization: Arc::new(FixedAuthorization::undetermined(true)),
    };
    let manager = VoiceInteractionManager::new(backends, config)?;
    manager.request_authorization().await?;

    manager.speak("How do you say 'thank you' in French?").await?;

    let answer = manager.start_listening();
    let learner = {
        let recognizer = Arc::clone(&recognizer);
        tokio::spawn(async move {
            for partial in ["mer", "merci", "merci beaucoup"] {
                tokio::time::sleep(Duration::from_millis(150)).await;
                recognizer.partial(partial);
            }
        })
    };
    learner.await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The learner taps "stop" once they have said the phrase.
    manager.stop_listening();

    match answer.await {
        Ok(transcript) => info!("✅ Heard: {}", transcript),
        Err(VoiceError::Cancelled) => info!("Nothing heard"),
        Err(e) if e.needs_settings() => warn!("Enable microphone access in Settings: {}", e),
        Err(e) => warn!("Try again: {}", e),
    }

    Ok(())
}
