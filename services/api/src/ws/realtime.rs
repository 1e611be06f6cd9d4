//! Opens the realtime backend session for one call.

use crate::config::Config;
use anyhow::{Context, Result};
use callbridge_core::subscribed_events;
use openai_realtime::session::InputAudioTranscription;
use openai_realtime::{BusEvent, RealtimeApi, SessionConfig, TurnDetection};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;

/// Session parameters for a phone call: the configured turn detection, and the
/// telephony audio format on both directions so payloads pass through untouched.
pub fn session_config(config: &Config) -> SessionConfig {
    let mut session = SessionConfig::default();
    session.instructions = config.system_message.clone();
    session.voice = config.voice.clone();
    session.input_audio_format = config.audio_format;
    session.output_audio_format = config.audio_format;
    session.input_audio_transcription = Some(InputAudioTranscription::default());
    session.turn_detection = config.server_vad.then(TurnDetection::server_vad);
    session.temperature = config.temperature;
    session
}

/// Connects, subscribes the call's event channel and sends `session.update`.
pub async fn open(
    config: &Config,
    session: &SessionConfig,
) -> Result<(RealtimeApi, mpsc::UnboundedReceiver<BusEvent>)> {
    let api_key = SecretString::from(config.openai_api_key.expose_secret().to_owned());
    let api = RealtimeApi::with_url(config.realtime_url.clone(), Some(api_key));

    // Subscribe first so nothing dispatched right after the handshake is missed.
    let events = api.bus().forward(&subscribed_events());
    api.connect(&config.realtime_model)
        .await
        .context("Failed to connect to the realtime backend")?;

    api.send("session.update", json!({ "session": session.to_payload() }))
        .context("Failed to send session update")?;
    info!(
        model = %config.realtime_model,
        voice = %session.voice,
        audio_format = %session.input_audio_format,
        turn_detection = ?session.turn_detection_type(),
        "Realtime session configured"
    );
    Ok((api, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openai_realtime::types::AudioFormat;
    use tracing::Level;

    fn config(server_vad: bool) -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            openai_api_key: SecretString::from("key".to_string()),
            realtime_url: "ws://127.0.0.1:1".to_string(),
            realtime_model: "model".to_string(),
            voice: "echo".to_string(),
            system_message: "Be kind.".to_string(),
            audio_format: AudioFormat::G711Alaw,
            temperature: 0.7,
            server_vad,
            greeting: None,
            public_host: None,
            log_level: Level::INFO,
        }
    }

    #[test]
    fn test_session_uses_the_call_audio_format_and_server_vad() {
        let session = session_config(&config(true)).to_payload();
        assert_eq!(session["input_audio_format"], "g711_alaw");
        assert_eq!(session["output_audio_format"], "g711_alaw");
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["voice"], "echo");
        assert_eq!(session["instructions"], "Be kind.");
        assert_eq!(session["temperature"], 0.7);
    }

    #[test]
    fn test_session_without_turn_detection() {
        let session = session_config(&config(false));
        assert_eq!(session.turn_detection_type(), None);
        assert!(session.to_payload()["turn_detection"].is_null());
    }
}
