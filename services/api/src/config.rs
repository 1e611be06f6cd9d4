use openai_realtime::transport::{DEFAULT_MODEL, DEFAULT_URL};
use openai_realtime::types::AudioFormat;
use secrecy::SecretString;
use std::net::SocketAddr;
use tracing::Level;

pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful and bubbly AI assistant who loves to chat about \
anything the user is interested in and is prepared to offer them facts. \
Always stay positive, but work in a joke when appropriate.";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: SecretString,
    pub realtime_url: String,
    pub realtime_model: String,
    pub voice: String,
    pub system_message: String,
    /// Used for both the caller leg and the realtime session.
    pub audio_format: AudioFormat,
    pub temperature: f64,
    /// Server-side voice activity detection. When off, callers end their turn
    /// with a keypad digit.
    pub server_vad: bool,
    /// When set, the assistant speaks first.
    pub greeting: Option<String>,
    /// Host advertised in the stream-connect directive.
    pub public_host: Option<String>,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = match std::env::var("BIND_ADDRESS") {
            Ok(address) => address,
            Err(_) => format!("0.0.0.0:{}", var_or("PORT", "3000")),
        };
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = optional_var("OPENAI_API_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let audio_format_str = var_or("AUDIO_FORMAT", "g711_ulaw");
        let audio_format = audio_format_str
            .parse::<AudioFormat>()
            .map_err(|e| ConfigError::InvalidValue("AUDIO_FORMAT".to_string(), e))?;

        let temperature_str = var_or("TEMPERATURE", "0.8");
        let temperature = temperature_str
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "TEMPERATURE".to_string(),
                    format!("'{}' is not a number", temperature_str),
                )
            })?;

        let server_vad = match var_or("TURN_DETECTION", "server_vad").to_lowercase().as_str() {
            "server_vad" => true,
            "none" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "TURN_DETECTION".to_string(),
                    format!("'{}' is not one of server_vad, none", other),
                ));
            }
        };

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_url: var_or("REALTIME_URL", DEFAULT_URL),
            realtime_model: var_or("REALTIME_MODEL", DEFAULT_MODEL),
            voice: var_or("VOICE", "alloy"),
            system_message: var_or("SYSTEM_MESSAGE", DEFAULT_SYSTEM_MESSAGE),
            audio_format,
            temperature,
            server_vad,
            greeting: optional_var("GREETING"),
            public_host: optional_var("PUBLIC_HOST"),
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            for var in [
                "BIND_ADDRESS",
                "PORT",
                "OPENAI_API_KEY",
                "REALTIME_URL",
                "REALTIME_MODEL",
                "VOICE",
                "SYSTEM_MESSAGE",
                "AUDIO_FORMAT",
                "TEMPERATURE",
                "TURN_DETECTION",
                "GREETING",
                "PUBLIC_HOST",
                "RUST_LOG",
            ] {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.openai_api_key.expose_secret(), "test-openai-key");
        assert_eq!(config.realtime_url, DEFAULT_URL);
        assert_eq!(config.realtime_model, DEFAULT_MODEL);
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.system_message, DEFAULT_SYSTEM_MESSAGE);
        assert_eq!(config.audio_format, AudioFormat::G711Ulaw);
        assert_eq!(config.temperature, 0.8);
        assert!(config.server_vad);
        assert_eq!(config.greeting, None);
        assert_eq!(config.public_host, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("OPENAI_API_KEY", "custom-openai-key");
            env::set_var("REALTIME_URL", "ws://localhost:9000/v1/realtime");
            env::set_var("REALTIME_MODEL", "gpt-4o-mini-realtime-preview");
            env::set_var("VOICE", "shimmer");
            env::set_var("SYSTEM_MESSAGE", "Answer briefly.");
            env::set_var("AUDIO_FORMAT", "pcm16");
            env::set_var("TEMPERATURE", "0.6");
            env::set_var("TURN_DETECTION", "none");
            env::set_var("GREETING", "Say hello to the caller.");
            env::set_var("PUBLIC_HOST", "calls.example.com");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.realtime_url, "ws://localhost:9000/v1/realtime");
        assert_eq!(config.realtime_model, "gpt-4o-mini-realtime-preview");
        assert_eq!(config.voice, "shimmer");
        assert_eq!(config.system_message, "Answer briefly.");
        assert_eq!(config.audio_format, AudioFormat::Pcm16);
        assert_eq!(config.temperature, 0.6);
        assert!(!config.server_vad);
        assert_eq!(config.greeting.as_deref(), Some("Say hello to the caller."));
        assert_eq!(config.public_host.as_deref(), Some("calls.example.com"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_port_fallback() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("PORT", "5050");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:5050");
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_audio_format() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("AUDIO_FORMAT", "mp3");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "AUDIO_FORMAT"),
            _ => panic!("Expected InvalidValue for AUDIO_FORMAT"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_temperature() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("TEMPERATURE", "warm");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "TEMPERATURE"),
            _ => panic!("Expected InvalidValue for TEMPERATURE"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_turn_detection() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("TURN_DETECTION", "semantic");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "TURN_DETECTION"),
            _ => panic!("Expected InvalidValue for TURN_DETECTION"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "OPENAI_API_KEY"),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }
}
