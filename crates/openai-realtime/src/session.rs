//! The `session.update` configuration.

use crate::error::{RealtimeError, Result};
use openai_realtime_types::AudioFormat;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// Server-side voice activity detection settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        /// 0.0 to 1.0
        threshold: f64,
        /// Audio kept from before speech started.
        prefix_padding_ms: u32,
        /// Silence required before speech is marked as stopped.
        silence_duration_ms: u32,
    },
}

impl TurnDetection {
    pub fn server_vad() -> Self {
        TurnDetection::ServerVad {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 200,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TurnDetection::ServerVad { .. } => "server_vad",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

impl Default for InputAudioTranscription {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxOutputTokens {
    Limited(u32),
    Infinite,
}

impl Serialize for MaxOutputTokens {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxOutputTokens::Limited(n) => serializer.serialize_u32(*n),
            MaxOutputTokens::Infinite => serializer.serialize_str("inf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    pub input_audio_transcription: Option<InputAudioTranscription>,
    pub turn_detection: Option<TurnDetection>,
    pub tool_choice: String,
    pub temperature: f64,
    pub max_response_output_tokens: MaxOutputTokens,
    tools: Vec<ToolDefinition>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: String::new(),
            voice: "alloy".to_string(),
            input_audio_format: AudioFormat::Pcm16,
            output_audio_format: AudioFormat::Pcm16,
            input_audio_transcription: None,
            turn_detection: None,
            tool_choice: "auto".to_string(),
            temperature: 0.8,
            max_response_output_tokens: MaxOutputTokens::Limited(4096),
            tools: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn add_tool(&mut self, definition: ToolDefinition) -> Result<()> {
        if definition.name.is_empty() {
            return Err(RealtimeError::Validation(
                "Missing tool name in definition".to_string(),
            ));
        }
        if self.tools.iter().any(|t| t.name == definition.name) {
            return Err(RealtimeError::Validation(format!(
                "Tool \"{}\" already added. Please remove it before trying to add again.",
                definition.name
            )));
        }
        self.tools.push(definition);
        Ok(())
    }

    pub fn remove_tool(&mut self, name: &str) -> Result<ToolDefinition> {
        let position = self
            .tools
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| {
                RealtimeError::NotFound(format!(
                    "Tool \"{}\" does not exist, cannot be removed.",
                    name
                ))
            })?;
        Ok(self.tools.remove(position))
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Active turn detection mode, `None` when the client commits manually.
    pub fn turn_detection_type(&self) -> Option<&'static str> {
        self.turn_detection.as_ref().map(TurnDetection::kind)
    }

    /// The `session` object sent with `session.update`.
    pub fn to_payload(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();

        json!({
            "modalities": self.modalities,
            "instructions": self.instructions,
            "voice": self.voice,
            "input_audio_format": self.input_audio_format,
            "output_audio_format": self.output_audio_format,
            "input_audio_transcription": self.input_audio_transcription,
            "turn_detection": self.turn_detection,
            "tools": tools,
            "tool_choice": self.tool_choice,
            "temperature": self.temperature,
            "max_response_output_tokens": self.max_response_output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_tool() -> ToolDefinition {
        ToolDefinition {
            name: "get_weather".to_string(),
            description: "Looks up the weather".to_string(),
            parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        }
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.turn_detection_type(), None);
        assert_eq!(config.max_response_output_tokens, MaxOutputTokens::Limited(4096));

        let payload = config.to_payload();
        assert_eq!(payload["modalities"], json!(["text", "audio"]));
        assert_eq!(payload["input_audio_format"], "pcm16");
        assert_eq!(payload["turn_detection"], Value::Null);
        assert_eq!(payload["temperature"], json!(0.8));
        assert_eq!(payload["max_response_output_tokens"], json!(4096));
    }

    #[test]
    fn test_server_vad_payload() {
        let config = SessionConfig {
            turn_detection: Some(TurnDetection::server_vad()),
            input_audio_format: AudioFormat::G711Ulaw,
            output_audio_format: AudioFormat::G711Ulaw,
            input_audio_transcription: Some(InputAudioTranscription::default()),
            max_response_output_tokens: MaxOutputTokens::Infinite,
            ..Default::default()
        };
        assert_eq!(config.turn_detection_type(), Some("server_vad"));

        let payload = config.to_payload();
        assert_eq!(
            payload["turn_detection"],
            json!({"type": "server_vad", "threshold": 0.5, "prefix_padding_ms": 300, "silence_duration_ms": 200})
        );
        assert_eq!(payload["output_audio_format"], "g711_ulaw");
        assert_eq!(payload["input_audio_transcription"], json!({"model": "whisper-1"}));
        assert_eq!(payload["max_response_output_tokens"], "inf");
    }

    #[test]
    fn test_tools() {
        let mut config = SessionConfig::default();
        config.add_tool(weather_tool()).unwrap();
        assert!(matches!(
            config.add_tool(weather_tool()),
            Err(RealtimeError::Validation(_))
        ));
        assert!(matches!(
            config.add_tool(ToolDefinition {
                name: String::new(),
                ..weather_tool()
            }),
            Err(RealtimeError::Validation(_))
        ));

        let payload = config.to_payload();
        assert_eq!(payload["tools"][0]["type"], "function");
        assert_eq!(payload["tools"][0]["name"], "get_weather");

        assert_eq!(config.remove_tool("get_weather").unwrap().name, "get_weather");
        assert!(matches!(
            config.remove_tool("get_weather"),
            Err(RealtimeError::NotFound(_))
        ));
        assert!(config.tools().is_empty());
    }
}
