use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tutor_core::{GatewayConfig, LanguageTags};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub completion_url: String,
    pub completion_api_key: Option<String>,
    pub chat_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub completion_timeout: Duration,
    pub data_dir: PathBuf,
    pub primary_language: String,
    pub secondary_language: String,
    pub log_level: Level,
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let completion_url = std::env::var("COMPLETION_URL")
            .map_err(|_| ConfigError::MissingVar("COMPLETION_URL".to_string()))?;
        if !completion_url.starts_with("http://") && !completion_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "COMPLETION_URL".to_string(),
                format!("'{}' is not an http(s) URL", completion_url),
            ));
        }

        let completion_api_key = std::env::var("COMPLETION_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let max_tokens = parse_var("MAX_TOKENS", 500u32)?;
        let temperature = parse_var("TEMPERATURE", 0.7f32)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue(
                "TEMPERATURE".to_string(),
                format!("{} is outside 0.0..=2.0", temperature),
            ));
        }
        let timeout_secs = parse_var("COMPLETION_TIMEOUT_SECS", 8u64)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "COMPLETION_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let primary_language =
            std::env::var("PRIMARY_LANGUAGE").unwrap_or_else(|_| "en-US".to_string());
        let secondary_language =
            std::env::var("SECONDARY_LANGUAGE").unwrap_or_else(|_| "hi-IN".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            completion_url,
            completion_api_key,
            chat_model,
            max_tokens,
            temperature,
            completion_timeout: Duration::from_secs(timeout_secs),
            data_dir,
            primary_language,
            secondary_language,
            log_level,
        })
    }

    /// Settings for the completion endpoint client.
    pub fn gateway_config(&self) -> GatewayConfig {
        let mut gateway = GatewayConfig::new(self.completion_url.clone());
        gateway.api_key = self.completion_api_key.clone();
        gateway.model = self.chat_model.clone();
        gateway.max_tokens = self.max_tokens;
        gateway.temperature = self.temperature;
        gateway.timeout = self.completion_timeout;
        gateway
    }

    pub fn language_tags(&self) -> LanguageTags {
        LanguageTags::new(&self.primary_language, &self.secondary_language)
    }
}
