//! Configuration management for the avatar client
//!
//! Priority is env > TOML file > built-in defaults.

pub mod file;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::sdk::ConfigProvider;
use crate::session::liveness::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_INACTIVITY_TIMEOUT, DEFAULT_RECONNECT_COOLDOWN,
};
use crate::{Error, Result};

use file::AvatarConfigFile;

/// Default agent service URL
const DEFAULT_AGENT_URL: &str = "http://localhost:8000";

/// Default session identifier sent to the agent
const DEFAULT_SESSION_ID: &str = "demo-session";

/// Default agent request timeout
const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Full client configuration
#[derive(Debug)]
pub struct Config {
    /// Speech/avatar service settings
    pub avatar: AvatarConfig,

    /// Remote chat agent settings
    pub agent: AgentConfig,

    /// Session orchestration tuning
    pub session: SessionSettings,

    /// Explicit TTS endpoint, overriding the region default
    pub speech_endpoint: Option<String>,
}

/// Settings handed to the speech/avatar SDK when a session starts
#[derive(Debug)]
pub struct AvatarConfig {
    /// Service region
    pub region: String,

    /// Subscription key for the speech service
    pub subscription_key: Option<SecretString>,

    /// TTS voice
    pub voice: String,

    /// Avatar character
    pub avatar_character: String,

    /// Avatar style
    pub avatar_style: String,

    /// Speech recognition locales
    pub recognition_locales: Vec<String>,

    /// System prompt for the conversation
    pub system_prompt: String,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            region: "eastus2".to_string(),
            subscription_key: None,
            voice: "en-US-JennyNeural".to_string(),
            avatar_character: "lisa".to_string(),
            avatar_style: "casual-sitting".to_string(),
            recognition_locales: vec!["en-US".to_string()],
            system_prompt: "You are a helpful assistant.".to_string(),
        }
    }
}

impl AvatarConfig {
    /// Check that the settings are usable
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoad` if a required field is empty
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::ConfigLoad("avatar.region must not be empty".to_string()));
        }
        if self.voice.trim().is_empty() {
            return Err(Error::ConfigLoad("avatar.voice must not be empty".to_string()));
        }
        if self.recognition_locales.is_empty() {
            return Err(Error::ConfigLoad(
                "at least one recognition locale is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote chat agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL; queries go to `{base_url}/ask_agent`
    pub base_url: String,

    /// Session identifier sent with every query
    pub session_id: String,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AGENT_URL.to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }
}

/// Session orchestration tuning
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Session identifier sent to the chat agent
    pub session_id: String,

    /// How often the liveness monitor samples
    pub hang_check_interval: Duration,

    /// Inactivity after which an active session is reconnected
    pub inactivity_timeout: Duration,

    /// Pause before reconnecting a hung session
    pub reconnect_cooldown: Duration,

    /// Silence appended after the last sentence of each reply
    pub ending_silence_ms: u32,

    /// Show assistant text sentence by sentence as it is spoken
    pub align_display_with_speech: bool,

    /// Speak the interrupted sentence again after a reconnect
    pub repeat_sentence_after_reconnect: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_string(),
            hang_check_interval: DEFAULT_CHECK_INTERVAL,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            reconnect_cooldown: DEFAULT_RECONNECT_COOLDOWN,
            ending_silence_ms: 0,
            align_display_with_speech: true,
            repeat_sentence_after_reconnect: true,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file is malformed or a setting is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file()?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoad` if the merged settings are invalid
    pub fn from_sources(fc: AvatarConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = AvatarConfig::default();

        let avatar = AvatarConfig {
            region: env("AVATAR_SPEECH_REGION")
                .or(fc.avatar.region)
                .unwrap_or(defaults.region),
            subscription_key: env("AVATAR_SPEECH_KEY")
                .or(fc.avatar.subscription_key)
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            voice: env("AVATAR_VOICE")
                .or(fc.avatar.voice)
                .unwrap_or(defaults.voice),
            avatar_character: env("AVATAR_CHARACTER")
                .or(fc.avatar.character)
                .unwrap_or(defaults.avatar_character),
            avatar_style: env("AVATAR_STYLE")
                .or(fc.avatar.style)
                .unwrap_or(defaults.avatar_style),
            recognition_locales: env("AVATAR_LOCALES")
                .map(|s| split_list(&s))
                .or(fc.avatar.locales)
                .unwrap_or(defaults.recognition_locales),
            system_prompt: env("AVATAR_SYSTEM_PROMPT")
                .or(fc.avatar.system_prompt)
                .unwrap_or(defaults.system_prompt),
        };
        avatar.validate()?;

        let agent = AgentConfig {
            base_url: env("AVATAR_AGENT_URL")
                .or(fc.agent.url)
                .unwrap_or_else(|| DEFAULT_AGENT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            session_id: env("AVATAR_SESSION_ID")
                .or(fc.agent.session_id)
                .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
            timeout: fc
                .agent
                .timeout_secs
                .map_or(DEFAULT_AGENT_TIMEOUT, Duration::from_secs),
        };

        let s = fc.session;
        let session = SessionSettings {
            session_id: agent.session_id.clone(),
            hang_check_interval: s
                .hang_check_interval_secs
                .map_or(DEFAULT_CHECK_INTERVAL, Duration::from_secs),
            inactivity_timeout: s
                .inactivity_timeout_secs
                .map_or(DEFAULT_INACTIVITY_TIMEOUT, Duration::from_secs),
            reconnect_cooldown: s
                .reconnect_cooldown_secs
                .map_or(DEFAULT_RECONNECT_COOLDOWN, Duration::from_secs),
            ending_silence_ms: s.ending_silence_ms.unwrap_or(0),
            align_display_with_speech: s.align_display_with_speech.unwrap_or(true),
            repeat_sentence_after_reconnect: s.repeat_sentence_after_reconnect.unwrap_or(true),
        };
        if session.hang_check_interval.is_zero() {
            return Err(Error::ConfigLoad(
                "session.hang_check_interval_secs must be positive".to_string(),
            ));
        }

        Ok(Self {
            avatar,
            agent,
            session,
            speech_endpoint: fc.speech.endpoint,
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Loads avatar settings from env and the config file on every request
#[derive(Debug, Default, Clone, Copy)]
pub struct FileConfigProvider;

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn load(&self) -> Result<AvatarConfig> {
        let config = tokio::task::spawn_blocking(Config::load)
            .await
            .map_err(|e| Error::ConfigLoad(e.to_string()))?;

        config.map(|c| c.avatar).map_err(|e| match e {
            Error::ConfigLoad(_) => e,
            other => Error::ConfigLoad(other.to_string()),
        })
    }
}
