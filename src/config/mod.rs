// src/config/mod.rs
// All tunables load from the environment (.env supported). The config is
// built once in main and threaded through AppState; no global statics.

use crate::analysis::trigger::TriggerMode;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct VigilConfig {
    // ── Analysis Configuration
    pub trigger_mode: TriggerMode,
    pub max_fix_attempts: u32,
    pub trust_capability_block: bool,

    // ── Capability (LLM) Configuration
    pub capability_base_url: String,
    pub capability_api_key: String,
    pub capability_model: String,
    pub capability_timeout: u64,
    pub capability_max_output_tokens: usize,

    // ── Host (GitHub) Configuration
    pub github_base_url: String,
    pub github_token: String,
    pub github_timeout: u64,

    // ── Database Configuration
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Chat Notification
    pub chat_webhook_url: String,

    // ── Server Configuration
    pub host: String,
    pub port: u16,

    // ── CORS Settings
    pub cors_origin: String,

    // ── Logging Configuration
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Values may carry trailing comments when sourced from .env files
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl VigilConfig {
    pub fn from_env() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            eprintln!("Config: no .env file found, using environment variables and defaults");
        }

        // An unrecognized trigger mode is a startup error, never a default
        let trigger_mode: TriggerMode =
            env_var_or("VIGIL_TRIGGER_MODE", "hybrid".to_string()).parse()?;

        let config = Self {
            trigger_mode,
            max_fix_attempts: env_var_or("VIGIL_MAX_FIX_ATTEMPTS", 3),
            trust_capability_block: env_var_or("VIGIL_TRUST_CAPABILITY_BLOCK", false),
            capability_base_url: env_var_or(
                "VIGIL_CAPABILITY_BASE_URL",
                "https://api.openai.com".to_string(),
            ),
            capability_api_key: env_var_or("VIGIL_CAPABILITY_API_KEY", String::new()),
            capability_model: env_var_or("VIGIL_CAPABILITY_MODEL", "gpt-5".to_string()),
            capability_timeout: env_var_or("VIGIL_CAPABILITY_TIMEOUT", 120),
            capability_max_output_tokens: env_var_or("VIGIL_CAPABILITY_MAX_OUTPUT_TOKENS", 8192),
            github_base_url: env_var_or(
                "VIGIL_GITHUB_BASE_URL",
                "https://api.github.com".to_string(),
            ),
            github_token: env_var_or("VIGIL_GITHUB_TOKEN", String::new()),
            github_timeout: env_var_or("VIGIL_GITHUB_TIMEOUT", 30),
            database_url: env_var_or("DATABASE_URL", "sqlite:./vigil.db".to_string()),
            sqlite_max_connections: env_var_or("SQLITE_MAX_CONNECTIONS", 10),
            chat_webhook_url: env_var_or("VIGIL_CHAT_WEBHOOK_URL", String::new()),
            host: env_var_or("VIGIL_HOST", "0.0.0.0".to_string()),
            port: env_var_or("VIGIL_PORT", 3100),
            cors_origin: env_var_or("VIGIL_CORS_ORIGIN", "http://localhost:3000".to_string()),
            log_level: env_var_or("VIGIL_LOG_LEVEL", "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Endpoint URLs are checked once at startup; a typo should fail loudly
    /// here rather than as a transport error on the first analysis.
    fn validate(&self) -> Result<()> {
        Url::parse(&self.capability_base_url).with_context(|| {
            format!(
                "Invalid VIGIL_CAPABILITY_BASE_URL '{}'",
                self.capability_base_url
            )
        })?;
        Url::parse(&self.github_base_url)
            .with_context(|| format!("Invalid VIGIL_GITHUB_BASE_URL '{}'", self.github_base_url))?;
        if !self.chat_webhook_url.is_empty() {
            Url::parse(&self.chat_webhook_url).with_context(|| {
                format!("Invalid VIGIL_CHAT_WEBHOOK_URL '{}'", self.chat_webhook_url)
            })?;
        }
        Ok(())
    }

    // --- Convenience Methods for Common Operations ---

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get full capability API URL for a given endpoint
    pub fn capability_api_url(&self, endpoint: &str) -> String {
        format!("{}/v1/{}", self.capability_base_url, endpoint)
    }

    /// Chat alerts are optional; an empty webhook URL disables them
    pub fn chat_notifications_enabled(&self) -> bool {
        !self.chat_webhook_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> VigilConfig {
        VigilConfig {
            trigger_mode: TriggerMode::Hybrid,
            max_fix_attempts: 3,
            trust_capability_block: false,
            capability_base_url: "https://api.openai.com".to_string(),
            capability_api_key: "test-key".to_string(),
            capability_model: "gpt-5".to_string(),
            capability_timeout: 120,
            capability_max_output_tokens: 8192,
            github_base_url: "https://api.github.com".to_string(),
            github_token: "ghs_test".to_string(),
            github_timeout: 30,
            database_url: "sqlite::memory:".to_string(),
            sqlite_max_connections: 5,
            chat_webhook_url: String::new(),
            host: "127.0.0.1".to_string(),
            port: 3100,
            cors_origin: "http://localhost:3000".to_string(),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_convenience_methods() {
        let config = test_config();

        assert_eq!(config.bind_address(), "127.0.0.1:3100");
        assert!(
            config
                .capability_api_url("chat/completions")
                .ends_with("/v1/chat/completions")
        );
        assert!(!config.chat_notifications_enabled());

        let mut with_chat = test_config();
        with_chat.chat_webhook_url = "https://chat.example.com/hook".to_string();
        assert!(with_chat.chat_notifications_enabled());
    }

    #[test]
    fn test_env_var_or_falls_back_on_missing() {
        // VIGIL_DOES_NOT_EXIST is never set by the test harness
        let value: u32 = env_var_or("VIGIL_DOES_NOT_EXIST", 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_validate_rejects_garbage_endpoint_urls() {
        let mut config = test_config();
        assert!(config.validate().is_ok());

        config.capability_base_url = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("VIGIL_CAPABILITY_BASE_URL"));

        let mut config = test_config();
        config.chat_webhook_url = "::/broken".to_string();
        assert!(config.validate().is_err());
    }
}
