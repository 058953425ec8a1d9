//! Layered configuration: defaults, then `rti-assist.toml`, then `RTI_*`
//! environment variables (`__` separates nested keys).

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{GenerationParams, LLMConfig, LLMProvider};
use crate::infrastructure::security::keyring::KeyringManager;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use validator::Validate;

pub const DEFAULT_CONFIG_FILE: &str = "rti-assist.toml";
const KEYRING_SERVICE: &str = "RtiAssist";
const KEYRING_ENTRY: &str = "google";
/// Fallback environment variable for the Gemini key.
const LEGACY_KEY_VAR: &str = "LLM_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LlmSettings {
    #[validate(url)]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub model: String,
    pub api_key: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,
    #[validate(nested)]
    pub filter_generation: GenerationParams,
    #[validate(nested)]
    pub report_generation: GenerationParams,
    #[validate(nested)]
    pub chat_generation: GenerationParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetrySettings {
    #[validate(range(max = 10))]
    pub max_retries: u32,
    #[validate(range(min = 1))]
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchPolicy {
    /// Surface `AppError::NoMatch` to the caller.
    Fail,
    /// Generate a report from the "no data" marker instead.
    NoDataReport,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineSettings {
    pub on_no_match: NoMatchPolicy,
    #[validate(range(min = 1, max = 50))]
    pub chat_history_turns: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub database_url: String,
    #[validate(nested)]
    pub llm: LlmSettings,
    #[validate(nested)]
    pub retry: RetrySettings,
    #[validate(nested)]
    pub pipeline: PipelineSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        let llm = LLMConfig::default();
        Self {
            database_url: "sqlite://rti-assist.db?mode=rwc".to_string(),
            llm: LlmSettings {
                base_url: llm.base_url,
                model: llm.model,
                api_key: None,
                timeout_secs: 120,
                filter_generation: GenerationParams::filter_generation(),
                report_generation: GenerationParams::report_generation(),
                chat_generation: GenerationParams::chat(),
            },
            retry: RetrySettings {
                max_retries: 3,
                base_delay_ms: 1000,
            },
            pipeline: PipelineSettings {
                on_no_match: NoMatchPolicy::Fail,
                chat_history_turns: 10,
            },
        }
    }
}

impl AppConfig {
    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RTI_").split("__"))
    }

    /// Load and validate. A missing config file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config: AppConfig = Self::figment(path)
            .extract()
            .map_err(|e| AppError::ConfigError(format!("Failed to load configuration: {}", e)))?;

        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var(LEGACY_KEY_VAR).ok().filter(|k| !k.is_empty());
        }

        config
            .validate()
            .map_err(|e| AppError::ConfigError(format!("Invalid configuration: {}", e)))?;

        debug!(
            database_url = %config.database_url,
            model = %config.llm.model,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn llm_config(&self, generation: GenerationParams) -> LLMConfig {
        LLMConfig {
            provider: LLMProvider::Google,
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            api_key: self.llm.api_key.clone(),
            generation,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry.base_delay_ms)
    }
}

/// API key storage in the OS keyring, used when no key is configured.
pub struct ConfigService {
    keyring: KeyringManager,
}

impl ConfigService {
    pub fn new() -> Self {
        Self {
            keyring: KeyringManager::new(KEYRING_SERVICE),
        }
    }

    pub fn save_api_key(&self, key: &str) -> Result<()> {
        self.keyring.set_secret(KEYRING_ENTRY, key)
    }

    pub fn get_api_key(&self) -> Result<String> {
        self.keyring.get_secret(KEYRING_ENTRY)
    }

    pub fn delete_api_key(&self) -> Result<()> {
        self.keyring.delete_secret(KEYRING_ENTRY)
    }

    /// Fill `config.llm.api_key` from the keyring if it is still empty.
    pub fn resolve_api_key(&self, config: &mut AppConfig) {
        if config.llm.api_key.is_some() {
            return;
        }
        match self.get_api_key() {
            Ok(key) => config.llm.api_key = Some(key),
            Err(err) => debug!(error = %err, "No API key in keyring"),
        }
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}
