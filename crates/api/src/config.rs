//! Settings
//!
//! Layered as built-in defaults, then an optional TOML file, then
//! `SENTINEL_`-prefixed environment variables with `__` between nested keys
//! (for example `SENTINEL_SCHEDULER__INTERVAL_SECS=300`). Credentials are read
//! from their own well-known variables.

use crate::rate_limit::RateLimitConfig;
use alerting::StateMachineConfig;
use analysis::{AnalysisConfig, GeminiConfig};
use evidence::ProviderConfig;
use investigation::InvestigationConfig;
use notifier::{DiscordConfig, DispatcherConfig};
use scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Variable naming the settings file
pub const CONFIG_PATH_VAR: &str = "STATUS_SENTINEL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "sentinel.toml";

const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
const DISCORD_BOT_TOKEN: &str = "DISCORD_BOT_TOKEN";
const TWITTER_API_IO_KEY: &str = "TWITTER_API_IO_KEY";
const GOOGLE_SEARCH_API_KEY: &str = "GOOGLE_SEARCH_API_KEY";
const GOOGLE_SEARCH_CX: &str = "GOOGLE_SEARCH_CX";

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Missing required credential: {0}")]
    MissingCredential(&'static str),
    #[error("Invalid setting: {0}")]
    Invalid(String),
    #[error("Failed to initialize {component}: {message}")]
    Component { component: &'static str, message: String },
}

/// Process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the monitored service
    pub service_name: String,
    pub log_level: String,
    pub log_json: bool,
    pub listen_addr: String,
    /// Registered channels document
    pub targets_path: PathBuf,
    pub scheduler: SchedulerConfig,
    pub evidence: ProviderConfig,
    pub investigation: InvestigationConfig,
    pub analysis: AnalysisConfig,
    pub gemini: GeminiConfig,
    pub state_machine: StateMachineConfig,
    pub discord: DiscordConfig,
    /// Limit on manual diagnostic runs
    pub diagnose_rate_limit: RateLimitConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_name: "VRChat".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            listen_addr: "0.0.0.0:8080".to_string(),
            targets_path: PathBuf::from("notify_channels.json"),
            scheduler: SchedulerConfig::default(),
            evidence: ProviderConfig::default(),
            investigation: InvestigationConfig::default(),
            analysis: AnalysisConfig::default(),
            gemini: GeminiConfig::default(),
            state_machine: StateMachineConfig::default(),
            discord: DiscordConfig::default(),
            diagnose_rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Settings {
    /// Load from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::load_from(&vars)
    }

    /// Load using `vars` in place of the process environment
    pub fn load_from(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let path = vars
            .get(CONFIG_PATH_VAR)
            .map(String::as_str)
            .unwrap_or(DEFAULT_CONFIG_PATH);

        let settings: Settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            )
            .build()?
            .try_deserialize()?;

        let mut settings = settings;
        settings.apply_credentials(vars)?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_credentials(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        let lookup = |name: &str| vars.get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        self.gemini.api_key = lookup(GEMINI_API_KEY).ok_or(ConfigError::MissingCredential(GEMINI_API_KEY))?;
        self.discord.bot_token = lookup(DISCORD_BOT_TOKEN).ok_or(ConfigError::MissingCredential(DISCORD_BOT_TOKEN))?;

        if let Some(key) = lookup(TWITTER_API_IO_KEY) {
            self.evidence.social_api_key = Some(key);
        }
        if let Some(key) = lookup(GOOGLE_SEARCH_API_KEY) {
            self.evidence.web_api_key = Some(key);
        }
        if let Some(cx) = lookup(GOOGLE_SEARCH_CX) {
            self.evidence.web_search_cx = Some(cx);
        }

        // One service name for the payload, headlines, and presence
        self.analysis.service_name = self.service_name.clone();
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Invalid("scheduler.interval_secs must be positive".to_string()));
        }
        let sm = &self.state_machine;
        for (name, value) in [
            ("state_machine.suspect_threshold", sm.suspect_threshold),
            ("state_machine.confirm_threshold", sm.confirm_threshold),
            ("analysis.confirmed_floor", self.analysis.confirmed_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if sm.suspected_streak == 0 {
            return Err(ConfigError::Invalid("state_machine.suspected_streak must be positive".to_string()));
        }
        // Provider calls are cut off at provider_timeout_ms; retries must finish first
        if self.evidence.retry_budget_ms >= self.investigation.provider_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "evidence.retry_budget_ms ({}) must be below investigation.provider_timeout_ms ({})",
                self.evidence.retry_budget_ms, self.investigation.provider_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            service_name: self.service_name.clone(),
        }
    }
}
