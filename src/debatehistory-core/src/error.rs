//! Error types for the debate system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Invalid participant count: expected {min}-{max}, got {actual}")]
    InvalidParticipantCount {
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("API key missing: set OPENAI_API_KEY (or add it to .env) before starting a debate")]
    MissingApiKey,

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("TTS error: {0}")]
    TtsError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
