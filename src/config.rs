use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::DEFAULT_OLLAMA_BASE_URL;
use crate::speech::{BackoffPolicy, BackoffStrategy};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub persona: PersonaConfig,
    pub brain: BrainConfig,
    pub speech: SpeechConfig,
    pub voice: VoiceConfig,
    pub camera: CameraConfig,
    pub preferences: PreferencesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "companion".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Who the companion is and what it says when it cannot think
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Display name used in subtitles ("Miya: ...")
    pub name: String,
    /// System preamble sent ahead of every user turn
    pub system_prompt: String,
    /// Reply used when no model could be loaded
    pub fallback_reply: String,
    /// Reply used when the model returns nothing
    pub empty_reply: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "Miya".to_string(),
            system_prompt:
                "You are Miya. Reply in 1-3 sentences. Be affectionate and flirty but not explicit."
                    .to_string(),
            fallback_reply: "I'm here… but my brain isn't loaded yet.".to_string(),
            empty_reply: "Hmm?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Models to try, best first
    pub ladder: Vec<String>,
    pub temperature: Option<f32>,
    pub max_gen_len: Option<u32>,
    pub ollama_url: String,
    /// Connection setup limit for the Ollama client. Model pulls and chat
    /// streams have no overall deadline.
    pub connect_timeout_secs: u64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            ladder: vec!["llama3.2:3b".to_string(), "llama3.2:1b".to_string()],
            temperature: None,
            max_gen_len: None,
            ollama_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub retry: RetryConfig,
}

/// Recognition error backoff; `max_attempts` unset means retry while wanted
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub strategy: BackoffStrategy,
    pub max_delay_ms: u64,
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            base_delay_ms: policy.base_delay.as_millis() as u64,
            strategy: policy.strategy,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            max_attempts: policy.max_attempts,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            strategy: self.strategy,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub rate: f32,
    pub pitch: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            rate: 0.95,
            pitch: 1.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Detection loop tick (one display frame at 60Hz by default)
    pub frame_interval_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
        }
    }
}

impl CameraConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// JSON file holding the mic/cam auto flags
    pub path: PathBuf,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/preferences.json"),
        }
    }
}

impl Config {
    /// Load from `path` (any format the `config` crate understands), then
    /// apply `COMPANION__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("COMPANION").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .context("Failed to deserialize config")
    }
}
