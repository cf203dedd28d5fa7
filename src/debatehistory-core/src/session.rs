//! A running debate: settings, transcript and autosave into history.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DebateError;
use crate::history::{SessionHistory, SessionRecord};
use crate::orchestrator::DialogueGenerator;
use crate::settings::DebateSettings;
use crate::transcript::{ChatMessage, Reaction, Transcript};

/// One debate session.
#[derive(Debug, Clone)]
pub struct DebateSession {
    id: String,
    settings: DebateSettings,
    transcript: Transcript,
}

impl DebateSession {
    /// Start a new session and record it right away, so it shows up in
    /// history before any turn exists.
    pub fn start(settings: DebateSettings, history: &mut SessionHistory) -> Self {
        let session = Self {
            id: Uuid::new_v4().to_string(),
            settings,
            transcript: Transcript::new(),
        };
        info!(session = %session.id, topic = %session.settings.topic, "session started");
        session.save(history);
        session
    }

    /// Continue a saved session under its original id.
    pub fn resume(record: &SessionRecord) -> Self {
        debug!(session = %record.id, "session resumed");
        Self {
            id: record.id.clone(),
            settings: record.settings(),
            transcript: record.messages.clone(),
        }
    }

    /// Settings of a saved session, for starting a fresh one.
    pub fn clone_settings(record: &SessionRecord) -> DebateSettings {
        record.settings()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &DebateSettings {
        &self.settings
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Request the next batch of turns and append it. On error the
    /// transcript is left as it was.
    pub async fn next_turns(
        &mut self,
        generator: &dyn DialogueGenerator,
        history: &mut SessionHistory,
    ) -> Result<&[ChatMessage], DebateError> {
        let turns = generator
            .generate_turns(&self.settings, &self.transcript)
            .await?;

        let start = self.transcript.len();
        self.transcript.append_turns(turns);
        debug!(
            session = %self.id,
            added = self.transcript.len() - start,
            "turns appended"
        );
        self.save(history);
        Ok(&self.transcript.messages()[start..])
    }

    /// Append a line spoken by the user.
    pub fn add_user_message(
        &mut self,
        text: &str,
        history: &mut SessionHistory,
    ) -> Result<&ChatMessage, DebateError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DebateError::ConfigError("Message cannot be empty".to_string()));
        }
        self.transcript.append_user_message(text);
        self.save(history);
        self.transcript
            .messages()
            .last()
            .ok_or_else(|| DebateError::Generation("transcript is empty".to_string()))
    }

    /// Set the reaction on the message at `index`.
    pub fn react(
        &mut self,
        index: usize,
        reaction: Option<Reaction>,
        history: &mut SessionHistory,
    ) -> bool {
        let Some(id) = self.transcript.get(index).map(|m| m.id.clone()) else {
            return false;
        };
        let updated = self.transcript.set_reaction(&id, reaction);
        if updated {
            self.save(history);
        }
        updated
    }

    pub async fn summarize(&self, generator: &dyn DialogueGenerator) -> Result<String, DebateError> {
        if self.transcript.is_empty() {
            return Err(DebateError::Generation(
                "Nothing to summarize yet".to_string(),
            ));
        }
        generator.summarize(&self.settings, &self.transcript).await
    }

    /// Snapshot for history.
    pub fn record(&self) -> SessionRecord {
        SessionRecord::new(self.id.clone(), &self.settings, &self.transcript)
    }

    fn save(&self, history: &mut SessionHistory) {
        history.upsert(self.record());
    }
}
