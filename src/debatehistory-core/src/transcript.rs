//! Dialogue turns, chat messages and the append-only transcript.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DebateError;
use crate::participant::USER_SPEAKER_ID;

/// Emotional tone of a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Passionate,
    Thoughtful,
    Angry,
    Amused,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Neutral,
        Mood::Passionate,
        Mood::Thoughtful,
        Mood::Angry,
        Mood::Amused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Passionate => "passionate",
            Mood::Thoughtful => "thoughtful",
            Mood::Angry => "angry",
            Mood::Amused => "amused",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reaction the user can attach to a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Reaction {
    Agree,
    Disagree,
    Interesting,
}

impl Reaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reaction::Agree => "Agree",
            Reaction::Disagree => "Disagree",
            Reaction::Interesting => "Interesting",
        }
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reaction {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agree" | "+" => Ok(Reaction::Agree),
            "disagree" | "-" => Ok(Reaction::Disagree),
            "interesting" | "!" => Ok(Reaction::Interesting),
            other => Err(DebateError::ConfigError(format!(
                "Unknown reaction '{}'. Expected agree, disagree or interesting",
                other
            ))),
        }
    }
}

/// One utterance as produced by the generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DialogueTurn {
    pub speaker_id: String,
    pub text: String,
    #[serde(default)]
    pub mood: Mood,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_quote: Option<String>,
}

/// A turn placed in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(flatten)]
    pub turn: DialogueTurn,
    /// Milliseconds since the Unix epoch. Display and persistence only.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_reaction: Option<Reaction>,
}

impl ChatMessage {
    pub fn speaker_id(&self) -> &str {
        &self.turn.speaker_id
    }

    pub fn text(&self) -> &str {
        &self.turn.text
    }

    pub fn is_user(&self) -> bool {
        self.turn.speaker_id == USER_SPEAKER_ID
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The ordered list of messages in a session.
///
/// Append-only: the only in-place edit is setting a reaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChatMessage> {
        self.messages.get(index)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Timestamp for the next message: never earlier than the last one.
    fn next_timestamp(&self) -> i64 {
        let now = now_millis();
        match self.messages.last() {
            Some(last) if last.timestamp >= now => last.timestamp + 1,
            _ => now,
        }
    }

    /// Append a batch of turns, giving each a fresh id and an increasing
    /// timestamp. Returns the appended messages.
    pub fn append_turns(&mut self, turns: Vec<DialogueTurn>) -> &[ChatMessage] {
        let start = self.messages.len();
        let base = self.next_timestamp();
        for (offset, turn) in turns.into_iter().enumerate() {
            self.messages.push(ChatMessage {
                id: Uuid::new_v4().to_string(),
                turn,
                timestamp: base + offset as i64,
                user_reaction: None,
            });
        }
        &self.messages[start..]
    }

    /// Append a message spoken by the human participant.
    pub fn append_user_message(&mut self, text: impl Into<String>) -> &ChatMessage {
        let turn = DialogueTurn {
            speaker_id: USER_SPEAKER_ID.to_string(),
            text: text.into(),
            mood: Mood::Neutral,
            relevant_quote: None,
        };
        let appended = self.append_turns(vec![turn]);
        &appended[0]
    }

    /// Set (or replace) the reaction on a message. Returns false when no
    /// message has that id.
    pub fn set_reaction(&mut self, id: &str, reaction: Option<Reaction>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.user_reaction = reaction;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(speaker: &str, text: &str) -> DialogueTurn {
        DialogueTurn {
            speaker_id: speaker.to_string(),
            text: text.to_string(),
            mood: Mood::Thoughtful,
            relevant_quote: None,
        }
    }

    #[test]
    fn test_append_preserves_arrival_order() {
        let mut transcript = Transcript::new();
        transcript.append_turns(vec![turn("socrates", "one"), turn("marx", "two")]);
        transcript.append_user_message("three");
        transcript.append_turns(vec![turn("curie", "four")]);

        let texts: Vec<&str> = transcript.messages().iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["one", "two", "three", "four"]);
        assert!(transcript.get(2).unwrap().is_user());
    }

    #[test]
    fn test_ids_unique_and_timestamps_increase() {
        let mut transcript = Transcript::new();
        transcript.append_turns(vec![turn("a", "1"), turn("b", "2"), turn("c", "3")]);
        transcript.append_turns(vec![turn("a", "4")]);

        let messages = transcript.messages();
        for pair in messages.windows(2) {
            assert_ne!(pair[0].id, pair[1].id);
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
    }

    #[test]
    fn test_reaction_does_not_reorder() {
        let mut transcript = Transcript::new();
        transcript.append_turns(vec![turn("a", "1"), turn("b", "2")]);
        let first_id = transcript.messages()[0].id.clone();

        assert!(transcript.set_reaction(&first_id, Some(Reaction::Agree)));
        assert!(!transcript.set_reaction("missing", Some(Reaction::Agree)));

        assert_eq!(transcript.messages()[0].id, first_id);
        assert_eq!(transcript.messages()[0].user_reaction, Some(Reaction::Agree));
        assert_eq!(transcript.messages()[1].user_reaction, None);
    }

    #[test]
    fn test_message_json_shape() {
        let mut transcript = Transcript::new();
        transcript.append_turns(vec![DialogueTurn {
            relevant_quote: Some("Know thyself.".to_string()),
            ..turn("socrates", "hello")
        }]);
        let value = serde_json::to_value(&transcript).unwrap();
        let first = &value[0];
        assert_eq!(first["speakerId"], "socrates");
        assert_eq!(first["mood"], "thoughtful");
        assert_eq!(first["relevantQuote"], "Know thyself.");
        assert!(first.get("userReaction").is_none());
    }
}
