//! Configuration — YAML config + env var overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Known provider presets
const PROVIDER_PRESETS: &[(&str, Option<&str>)] = &[
    ("openai", None),
    ("openrouter", Some("https://openrouter.ai/api/v1")),
];

/// Provider-specific API key env vars (checked before OPENAI_API_KEY fallback)
const PROVIDER_KEY_ENV_VARS: &[(&str, &str)] = &[("openrouter", "OPENROUTER_API_KEY")];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// "openai" | "openrouter" | "custom"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Chat model name
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (set here or via env var)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL for the OpenAI-compatible API (auto-set for known providers)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Ollama cloud key for web search and fetch (or OLLAMA_API_KEY)
    #[serde(default)]
    pub ollama_api_key: Option<String>,

    /// Model used for avatar generation
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Model used for speech synthesis
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// Language used until the user picks one
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Where persisted state lives (relative to the config file)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// How often due reminders are checked
    #[serde(default = "default_reminder_poll")]
    pub reminder_poll_seconds: u64,

    /// Quiet time before an idle remark
    #[serde(default = "default_idle_prompt")]
    pub idle_prompt_seconds: u64,

    /// How often the screen is checked in proactive mode
    #[serde(default = "default_proactive_poll")]
    pub proactive_poll_seconds: u64,

    /// Auto-dismiss delay for notifications
    #[serde(default = "default_notification_seconds")]
    pub notification_seconds: u64,

    /// Messages of history sent with each conversational request
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    /// How long an avatar reaction lasts
    #[serde(default = "default_reaction_millis")]
    pub reaction_millis: u64,

    /// Resolved project root (set at load time, not serialized from YAML)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_image_model() -> String {
    "gpt-image-1".into()
}
fn default_tts_model() -> String {
    "gpt-4o-mini-tts".into()
}
fn default_language() -> String {
    "en-US".into()
}
fn default_data_dir() -> String {
    "kibo_data".into()
}
fn default_reminder_poll() -> u64 {
    10
}
fn default_idle_prompt() -> u64 {
    180
}
fn default_proactive_poll() -> u64 {
    90
}
fn default_notification_seconds() -> u64 {
    10
}
fn default_context_messages() -> usize {
    5
}
fn default_reaction_millis() -> u64 {
    1200
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let mut config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config.yaml")?;

        config.project_root = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf()
            .canonicalize()
            .unwrap_or_else(|_| {
                config_path
                    .parent()
                    .unwrap_or(Path::new("."))
                    .to_path_buf()
            });

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load config from the default location (project_root/config.yaml)
    pub fn load_from_dir(project_root: &Path) -> Result<Self> {
        Self::load(&project_root.join("config.yaml"))
    }

    fn apply_env(&mut self) {
        if let Ok(p) = std::env::var("KIBO_PROVIDER") {
            self.provider = p;
        }

        // Base URL: env var > config > provider preset
        if let Ok(url) = std::env::var("KIBO_BASE_URL") {
            self.base_url = Some(url);
        } else if self.base_url.is_none() {
            self.base_url = PROVIDER_PRESETS
                .iter()
                .find(|(p, _)| *p == self.provider)
                .and_then(|(_, url)| url.map(String::from));
        }

        // API key: provider-specific env var > OPENAI_API_KEY > config
        let provider_key_var = PROVIDER_KEY_ENV_VARS
            .iter()
            .find(|(p, _)| *p == self.provider)
            .map(|(_, var)| *var);
        if let Some(var) = provider_key_var {
            if let Ok(key) = std::env::var(var) {
                self.api_key = Some(key);
            }
        }
        if self.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.api_key = Some(key);
            }
        }

        if let Ok(m) = std::env::var("KIBO_MODEL") {
            self.model = m;
        }

        if let Ok(key) = std::env::var("OLLAMA_API_KEY") {
            self.ollama_api_key = Some(key);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.provider == "custom" && self.base_url.is_none() {
            anyhow::bail!(
                "Provider 'custom' requires base_url in config.yaml or KIBO_BASE_URL env var"
            );
        }
        if self.reminder_poll_seconds == 0 || self.proactive_poll_seconds == 0 {
            anyhow::bail!("Poll intervals must be at least one second");
        }
        Ok(())
    }

    /// Resolve the persisted-state directory
    pub fn resolve_data_dir(&self) -> PathBuf {
        let p = Path::new(&self.data_dir);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.project_root.join(p)
        }
    }

    pub fn reminder_poll(&self) -> Duration {
        Duration::from_secs(self.reminder_poll_seconds)
    }

    pub fn idle_prompt(&self) -> Duration {
        Duration::from_secs(self.idle_prompt_seconds)
    }

    pub fn proactive_poll(&self) -> Duration {
        Duration::from_secs(self.proactive_poll_seconds)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_seconds)
    }

    pub fn reaction_duration(&self) -> Duration {
        Duration::from_millis(self.reaction_millis)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            ollama_api_key: None,
            image_model: default_image_model(),
            tts_model: default_tts_model(),
            default_language: default_language(),
            data_dir: default_data_dir(),
            reminder_poll_seconds: default_reminder_poll(),
            idle_prompt_seconds: default_idle_prompt(),
            proactive_poll_seconds: default_proactive_poll(),
            notification_seconds: default_notification_seconds(),
            context_messages: default_context_messages(),
            reaction_millis: default_reaction_millis(),
            project_root: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_defaults() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "provider: openai\nmodel: gpt-4.1").unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.reminder_poll_seconds, 10);
        assert_eq!(config.idle_prompt_seconds, 180);
        assert_eq!(config.proactive_poll_seconds, 90);
        assert_eq!(config.notification_seconds, 10);
        assert_eq!(config.context_messages, 5);
    }

    #[test]
    fn test_load_config_custom_values() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "provider: custom\nbase_url: http://localhost:11434/v1\nidle_prompt_seconds: 60\ndefault_language: ja-JP"
        )
        .unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.provider, "custom");
        assert_eq!(
            config.base_url.as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert_eq!(config.idle_prompt(), Duration::from_secs(60));
        assert_eq!(config.default_language, "ja-JP");
    }

    #[test]
    fn test_ollama_key_from_yaml() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "ollama_api_key: ok-123").unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert!(config.ollama_api_key.is_some());
        assert!(Config::default().ollama_api_key.is_none());
    }

    #[test]
    fn test_custom_without_base_url_fails() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "provider: custom\nmodel: llama3").unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn test_zero_poll_interval_fails() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "reminder_poll_seconds: 0").unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn test_relative_data_dir_resolves_against_root() {
        let config = Config {
            project_root: PathBuf::from("/srv/kibo"),
            ..Config::default()
        };
        assert_eq!(config.resolve_data_dir(), PathBuf::from("/srv/kibo/kibo_data"));
    }
}
