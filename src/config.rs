//! Runtime configuration, resolved once at startup from flags, the
//! environment and an optional `.env` file.

use clap::Args;

use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_SAMPLE_SIZE: usize = 5;
pub const MAX_SAMPLE_SIZE: usize = 50;

/// Legacy variable name still honoured when `GEMINI_API_KEY` is unset.
const FALLBACK_API_KEY_VAR: &str = "API_KEY";

/// Flags shared by every command that talks to the text-generation service.
#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, help = "API key for the Gemini API.")]
    pub api_key: Option<String>,
    #[arg(long, env = "BOMBABOT_MODEL", default_value = DEFAULT_MODEL, help = "Model identifier.")]
    pub model: String,
    #[arg(long, env = "BOMBABOT_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE, help = "Sampling temperature.")]
    pub temperature: f32,
    #[arg(long, env = "BOMBABOT_SAMPLE_SIZE", default_value_t = DEFAULT_SAMPLE_SIZE, help = "Number of records sent as a data sample.")]
    pub sample_size: usize,
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL, help = "Base URL of the Gemini API.")]
    pub base_url: String,
}

/// Validated settings injected into the client and gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub sample_size: usize,
    pub base_url: String,
}

impl GatewayArgs {
    pub fn resolve(self) -> Result<GatewayConfig, ConfigError> {
        let fallback = std::env::var(FALLBACK_API_KEY_VAR).ok();
        self.resolve_with_fallback(fallback)
    }

    fn resolve_with_fallback(self, fallback: Option<String>) -> Result<GatewayConfig, ConfigError> {
        let api_key = self
            .api_key
            .or(fallback)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if self.sample_size > MAX_SAMPLE_SIZE {
            return Err(ConfigError::SampleTooLarge {
                max: MAX_SAMPLE_SIZE,
                got: self.sample_size,
            });
        }

        Ok(GatewayConfig {
            api_key,
            model: self.model,
            temperature: self.temperature,
            sample_size: self.sample_size,
            base_url: self.base_url.trim_end_matches('/').to_string(),
        })
    }
}
