//! Debate with History core library
//!
//! Stages round-table debates between historical figures: dialogue
//! generation, session history, speech synthesis and sequential playback.

pub mod audio;
pub mod config;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod participant;
pub mod playback;
pub mod prompt;
pub mod session;
pub mod settings;
pub mod transcript;
pub mod tts;

pub use audio::{AudioSink, NullSink, WavSink};
pub use config::{Config, SpeechBackend};
pub use error::DebateError;
pub use history::{FileStore, KeyValueStore, MemoryStore, SessionHistory, SessionRecord};
pub use orchestrator::{DialogueGenerator, OpenAiDialogueGenerator};
pub use participant::{HistoricalFigure, USER_SPEAKER_ID};
pub use playback::{PlaybackController, PlaybackMachine, PlaybackState};
pub use session::DebateSession;
pub use settings::{AgeGroup, DebateSettings, UserVoice};
pub use transcript::{ChatMessage, DialogueTurn, Mood, Reaction, Transcript};
pub use tts::{AudioClip, KokoroSynthesizer, RemoteSpeechSynthesizer, SpeechSynthesizer};
