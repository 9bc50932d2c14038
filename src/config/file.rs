//! TOML configuration file loading
//!
//! Supports `~/.config/omni/avatar/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AvatarConfigFile {
    /// Speech/avatar service settings
    #[serde(default)]
    pub avatar: AvatarFileConfig,

    /// Remote chat agent settings
    #[serde(default)]
    pub agent: AgentFileConfig,

    /// Session orchestration tuning
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Speech synthesis endpoint overrides
    #[serde(default)]
    pub speech: SpeechFileConfig,
}

/// Speech/avatar service configuration
#[derive(Debug, Default, Deserialize)]
pub struct AvatarFileConfig {
    /// Service region (e.g. "eastus2")
    pub region: Option<String>,

    /// Subscription key for the speech service
    pub subscription_key: Option<String>,

    /// TTS voice (e.g. "en-US-JennyNeural")
    pub voice: Option<String>,

    /// Avatar character (e.g. "lisa")
    pub character: Option<String>,

    /// Avatar style (e.g. "casual-sitting")
    pub style: Option<String>,

    /// Speech recognition locales
    pub locales: Option<Vec<String>>,

    /// System prompt seeded into the transcript
    pub system_prompt: Option<String>,
}

/// Remote chat agent configuration
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// Base URL of the agent service
    pub url: Option<String>,

    /// Session identifier sent with every query
    pub session_id: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Session orchestration configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Seconds between hang checks
    pub hang_check_interval_secs: Option<u64>,

    /// Seconds without interaction before an active session is reconnected
    pub inactivity_timeout_secs: Option<u64>,

    /// Seconds to wait after closing a hung session before restarting it
    pub reconnect_cooldown_secs: Option<u64>,

    /// Silence appended after the last chunk of each reply, in milliseconds
    pub ending_silence_ms: Option<u32>,

    /// Log each chunk to the transcript as it starts playing
    pub align_display_with_speech: Option<bool>,

    /// Speak the interrupted sentence again after a reconnect
    pub repeat_sentence_after_reconnect: Option<bool>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Full TTS endpoint URL, overriding the region-derived default
    pub endpoint: Option<String>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config_file(content: &str) -> Result<AvatarConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `AvatarConfigFile::default()` if the file doesn't exist.
///
/// # Errors
///
/// Returns error if the file exists but cannot be read or parsed
pub fn load_config_file() -> Result<AvatarConfigFile> {
    let Some(path) = config_file_path() else {
        return Ok(AvatarConfigFile::default());
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AvatarConfigFile::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config = parse_config_file(&content).inspect_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "failed to parse config file");
    })?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path
///
/// `AVATAR_CONFIG` overrides the default `~/.config/omni/avatar/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AVATAR_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("avatar")
            .join("config.toml")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let fc = parse_config_file("").unwrap();
        assert!(fc.avatar.region.is_none());
        assert!(fc.agent.url.is_none());
        assert!(fc.session.inactivity_timeout_secs.is_none());
    }

    #[test]
    fn parses_sections() {
        let fc = parse_config_file(
            r#"
            [avatar]
            region = "westeurope"
            voice = "en-GB-SoniaNeural"
            locales = ["en-GB", "fr-FR"]

            [agent]
            url = "https://agent.example.com"
            session_id = "kiosk-1"

            [session]
            inactivity_timeout_secs = 90
            align_display_with_speech = false
            "#,
        )
        .unwrap();

        assert_eq!(fc.avatar.region.as_deref(), Some("westeurope"));
        assert_eq!(
            fc.avatar.locales,
            Some(vec!["en-GB".to_string(), "fr-FR".to_string()])
        );
        assert_eq!(fc.agent.session_id.as_deref(), Some("kiosk-1"));
        assert_eq!(fc.session.inactivity_timeout_secs, Some(90));
        assert_eq!(fc.session.align_display_with_speech, Some(false));
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(matches!(
            parse_config_file("[avatar\nregion = 1"),
            Err(crate::Error::Toml(_))
        ));
    }

    #[test]
    fn config_path_is_under_omni() {
        if std::env::var("AVATAR_CONFIG").is_ok() {
            return;
        }
        let path = config_file_path().unwrap();
        assert!(path.ends_with("omni/avatar/config.toml"));
    }
}
