//! Session settings chosen before a debate starts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DebateError;
use crate::participant::HistoricalFigure;

pub const MIN_PARTICIPANTS: usize = 2;
pub const MAX_PARTICIPANTS: usize = 4;

pub const SUGGESTED_TOPICS: &[&str] = &[
    "Artificial Intelligence Ethics",
    "Universal Basic Income",
    "The Future of Democracy",
    "Social Media and Truth",
    "Climate Change Responsibility",
];

/// Target audience tier; controls the register of the generated dialogue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AgeGroup {
    #[serde(rename = "Child (8-12)")]
    Child,
    #[serde(rename = "Teen (13-17)")]
    Teen,
    #[default]
    #[serde(rename = "Adult (18+)")]
    Adult,
}

impl AgeGroup {
    pub fn label(&self) -> &'static str {
        match self {
            AgeGroup::Child => "Child (8-12)",
            AgeGroup::Teen => "Teen (13-17)",
            AgeGroup::Adult => "Adult (18+)",
        }
    }

    /// Register guidance handed to the generator.
    pub fn guidance(&self) -> &'static str {
        match self {
            AgeGroup::Child => "Keep it simple, use analogies and everyday examples, avoid jargon.",
            AgeGroup::Teen => "Be clear and lively, introduce key terms and explain them briefly.",
            AgeGroup::Adult => "Use sophisticated philosophical arguments and precise terminology.",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AgeGroup {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "child" | "kid" | "kids" => Ok(AgeGroup::Child),
            "teen" | "teens" => Ok(AgeGroup::Teen),
            "adult" | "adults" => Ok(AgeGroup::Adult),
            other => Err(DebateError::ConfigError(format!(
                "Unknown age group '{}'. Expected child, teen or adult",
                other
            ))),
        }
    }
}

/// How the human participant's own messages are voiced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserVoice {
    Male,
    Female,
    #[default]
    Silent,
}

impl UserVoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserVoice::Male => "male",
            UserVoice::Female => "female",
            UserVoice::Silent => "silent",
        }
    }
}

impl fmt::Display for UserVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserVoice {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(UserVoice::Male),
            "female" | "f" => Ok(UserVoice::Female),
            "silent" | "none" | "off" => Ok(UserVoice::Silent),
            other => Err(DebateError::ConfigError(format!(
                "Unknown user voice '{}'. Expected male, female or silent",
                other
            ))),
        }
    }
}

/// Settings for one debate session. Immutable once the session starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DebateSettings {
    pub topic: String,
    pub age_group: AgeGroup,
    pub participants: Vec<HistoricalFigure>,
    #[serde(rename = "userGender", default)]
    pub user_voice: UserVoice,
}

impl DebateSettings {
    pub fn new(
        topic: impl Into<String>,
        age_group: AgeGroup,
        participants: Vec<HistoricalFigure>,
        user_voice: UserVoice,
    ) -> Result<Self, DebateError> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(DebateError::ConfigError("Topic cannot be empty".to_string()));
        }

        let actual = participants.len();
        if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&actual) {
            return Err(DebateError::InvalidParticipantCount {
                min: MIN_PARTICIPANTS,
                max: MAX_PARTICIPANTS,
                actual,
            });
        }

        Ok(Self {
            topic,
            age_group,
            participants,
            user_voice,
        })
    }

    /// Find a seated participant by exact id.
    pub fn participant(&self, id: &str) -> Option<&HistoricalFigure> {
        self.participants.iter().find(|p| p.id == id)
    }
}
