//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DebateError;
use crate::participant::Gender;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DEBATEHISTORY_CONFIG";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub generator: GeneratorConfig,
    pub speech: SpeechConfig,
    /// Voice mapping. When absent, the speech backend's defaults apply.
    pub voices: Option<VoicesConfig>,
    pub playback: PlaybackConfig,
    pub history: HistoryConfig,
    pub prompts: PromptsConfig,
}

/// Settings for the dialogue generation endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model: String,
    /// OpenAI-compatible base URL. Overridden by `OPENAI_API_BASE`.
    pub api_base: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            max_tokens: 1500,
            temperature: Some(0.9),
            request_timeout_secs: 120,
            connect_timeout_secs: 30,
        }
    }
}

/// Which speech backend voices the transcript.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    /// OpenAI-compatible `/audio/speech` endpoint returning raw PCM.
    #[default]
    Remote,
    /// Local Kokoro engine (downloads its model on first use).
    Kokoro,
    /// No speech.
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub backend: SpeechBackend,
    /// Model for the remote backend.
    pub model: String,
    pub sample_rate: u32,
    /// Directory that receives rendered WAV clips while listening.
    pub output_dir: Option<PathBuf>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackend::Remote,
            model: "gpt-4o-mini-tts".to_string(),
            sample_rate: 24_000,
            output_dir: None,
        }
    }
}

/// Voice configuration for TTS.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VoicesConfig {
    /// Figure id to voice id.
    #[serde(default)]
    pub figures: HashMap<String, String>,
    pub user_male: String,
    pub user_female: String,
    /// Used for figures missing from the map.
    pub fallback_male: String,
    pub fallback_female: String,
}

impl VoicesConfig {
    /// Voice names understood by OpenAI-compatible speech endpoints.
    pub fn remote_default() -> Self {
        let figures = [
            ("ataturk", "onyx"),
            ("socrates", "fable"),
            ("marx", "echo"),
            ("curie", "nova"),
            ("machiavelli", "ash"),
            ("confucius", "sage"),
            ("hypatia", "shimmer"),
        ];
        Self {
            figures: figures
                .iter()
                .map(|(id, voice)| (id.to_string(), voice.to_string()))
                .collect(),
            user_male: "alloy".to_string(),
            user_female: "coral".to_string(),
            fallback_male: "echo".to_string(),
            fallback_female: "nova".to_string(),
        }
    }

    /// Voice ids shipped with the Kokoro engine.
    pub fn kokoro_default() -> Self {
        let figures = [
            ("ataturk", "am_michael"),
            ("socrates", "bm_george"),
            ("marx", "bm_lewis"),
            ("curie", "bf_emma"),
            ("machiavelli", "am_adam"),
            ("confucius", "bm_daniel"),
            ("hypatia", "bf_isabella"),
        ];
        Self {
            figures: figures
                .iter()
                .map(|(id, voice)| (id.to_string(), voice.to_string()))
                .collect(),
            user_male: "am_eric".to_string(),
            user_female: "af_sky".to_string(),
            fallback_male: "am_adam".to_string(),
            fallback_female: "af_bella".to_string(),
        }
    }

    /// Voice for a seated figure.
    pub fn voice_for_figure(&self, id: &str, gender: Gender) -> &str {
        match self.figures.get(id) {
            Some(voice) => voice,
            None => match gender {
                Gender::Male => &self.fallback_male,
                Gender::Female => &self.fallback_female,
            },
        }
    }
}

/// Pacing for chained playback.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pause after a clip finishes before the next one is requested.
    pub completion_pause_ms: u64,
    /// Pause after a failed synthesis before moving on.
    pub error_pause_ms: u64,
    /// Delay used when a silent user message is skipped.
    pub skip_delay_ms: u64,
    /// Playback speed; 1.0 is natural speed.
    pub speed: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            completion_pause_ms: 600,
            error_pause_ms: 1000,
            skip_delay_ms: 100,
            speed: 1.0,
        }
    }
}

impl PlaybackConfig {
    pub fn completion_pause(&self) -> Duration {
        Duration::from_millis(self.completion_pause_ms)
    }

    pub fn error_pause(&self) -> Duration {
        Duration::from_millis(self.error_pause_ms)
    }

    pub fn skip_delay(&self) -> Duration {
        Duration::from_millis(self.skip_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_records: usize,
    /// Storage directory. Defaults to the platform data directory.
    pub directory: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_records: 20,
            directory: None,
        }
    }
}

impl HistoryConfig {
    /// Resolve the storage directory.
    pub fn resolve_directory(&self) -> PathBuf {
        match &self.directory {
            Some(dir) => dir.clone(),
            None => default_data_dir(),
        }
    }
}

/// Prompt templates.
///
/// Placeholders: `{topic}`, `{audience}`, `{audience_guidance}`,
/// `{participants}`, `{participant_ids}`, `{user_gender}`, `{transcript}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub system_template: String,
    pub opening_template: String,
    pub continuation_template: String,
    pub summary_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_template: DEFAULT_SYSTEM_PROMPT.to_string(),
            opening_template: DEFAULT_OPENING_PROMPT.to_string(),
            continuation_template: DEFAULT_CONTINUATION_PROMPT.to_string(),
            summary_template: DEFAULT_SUMMARY_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from `$DEBATEHISTORY_CONFIG`, then the user config directory,
    /// falling back to the embedded defaults.
    pub fn load_default() -> Result<Self, DebateError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(path);
        }

        match dirs::config_dir().map(|d| d.join("debatehistory").join("config.toml")) {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(default_config()),
        }
    }

    /// Voice mapping in effect for the configured backend.
    pub fn voices(&self) -> VoicesConfig {
        match &self.voices {
            Some(voices) => voices.clone(),
            None => match self.speech.backend {
                SpeechBackend::Kokoro => VoicesConfig::kokoro_default(),
                SpeechBackend::Remote | SpeechBackend::None => VoicesConfig::remote_default(),
            },
        }
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

/// Platform data directory for saved sessions.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("debatehistory")
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a simulator for an educational app called "Debate with History".

CURRENT TOPIC: "{topic}"
TARGET AUDIENCE: {audience}

Simulate a round-table discussion between the following historical figures:
{participants}

A human participant ({user_gender}) may also join the table. Their lines appear
as "User" in the conversation. Address them directly when they speak.

DEBATE RULES:
- Stay strictly in character. Each figure argues from their own philosophy,
  era and temperament, and may address the others by the titles listed.
- Language must suit the audience: {audience_guidance}
- Participants respond to each other rather than stating opinions in a vacuum.
- Modern topics are interpreted through each figure's historical lens.
- Never speak as the User and never acknowledge being an AI.

OUTPUT RULES:
- Respond only with JSON matching the requested schema.
- speakerId must be exactly one of: {participant_ids}
- mood is one of: neutral, passionate, thoughtful, angry, amused
- relevantQuote is optional: a short real quote of the speaker that fits the turn.
- No stage directions, no markdown, no text in parentheses describing gestures.
"#;

const DEFAULT_OPENING_PROMPT: &str = r#"Start the debate on "{topic}". Have 2 or 3 participants give their opening thoughts."#;

const DEFAULT_CONTINUATION_PROMPT: &str = r#"Here is the conversation so far:
{transcript}

Generate the next 1-3 turns of the debate. Move the conversation forward or have them challenge each other. If the User spoke last, respond to the User first. Reactions in brackets show how the User felt about a line."#;

const DEFAULT_SUMMARY_PROMPT: &str = r#"Summarize this debate on "{topic}".

{transcript}

Write the summary in the dominant language of the conversation, using these sections:
📌 Topic: one sentence.
⚔️ Main conflict: the central disagreement.
🗣️ Key arguments: one bullet per speaker.
💬 Best quote: the single most memorable line and who said it.
🏁 Conclusion: where the debate landed.
Plain text only, no markdown headings."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::from_str(
            r#"
[generator]
model = "llama3:8b"

[history]
max_records = 5
"#,
        )
        .unwrap();

        assert_eq!(config.generator.model, "llama3:8b");
        assert_eq!(config.generator.api_base, "https://api.openai.com/v1");
        assert_eq!(config.history.max_records, 5);
        assert_eq!(config.playback.completion_pause_ms, 600);
        assert!(config.prompts.system_template.contains("{participants}"));
    }

    #[test]
    fn test_voices_follow_backend() {
        let config = Config::from_str("[speech]\nbackend = \"kokoro\"\n").unwrap();
        assert_eq!(config.voices(), VoicesConfig::kokoro_default());

        let config = default_config();
        assert_eq!(config.voices(), VoicesConfig::remote_default());
    }

    #[test]
    fn test_voice_fallback_by_gender() {
        let voices = VoicesConfig::remote_default();
        assert_eq!(voices.voice_for_figure("curie", Gender::Female), "nova");
        assert_eq!(voices.voice_for_figure("newcomer", Gender::Male), "echo");
        assert_eq!(voices.voice_for_figure("newcomer", Gender::Female), "nova");
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(matches!(
            Config::from_str("[history]\nmax_records = \"many\"\n"),
            Err(DebateError::ConfigError(_))
        ));
    }
}
