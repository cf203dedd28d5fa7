//! Prompt construction for the dialogue generator.

use regex::{Captures, Regex};
use serde_json::{Value, json};
use std::sync::LazyLock;

use crate::config::PromptsConfig;
use crate::participant::USER_SPEAKER_ID;
use crate::settings::DebateSettings;
use crate::transcript::{ChatMessage, Mood, Transcript};

/// Label used for speakers the generator invented.
pub const UNKNOWN_SPEAKER: &str = "Unknown";

/// Most turns accepted from a single generation call.
pub const MAX_TURNS_PER_BATCH: usize = 3;

/// Turns requested when the debate opens.
pub const MIN_OPENING_TURNS: usize = 2;

/// Full name of a speaker as shown to the model.
pub fn speaker_name<'a>(settings: &'a DebateSettings, speaker_id: &str) -> &'a str {
    if speaker_id == USER_SPEAKER_ID {
        return "User";
    }
    settings
        .participant(speaker_id)
        .map(|p| p.name.as_str())
        .unwrap_or(UNKNOWN_SPEAKER)
}

/// Short label of a speaker for transcript display.
pub fn speaker_label<'a>(settings: &'a DebateSettings, speaker_id: &str) -> &'a str {
    if speaker_id == USER_SPEAKER_ID {
        return "You";
    }
    settings
        .participant(speaker_id)
        .map(|p| p.short_name.as_str())
        .unwrap_or(UNKNOWN_SPEAKER)
}

/// Render one message as `speaker-name: text [reaction]`.
pub fn render_line(settings: &DebateSettings, message: &ChatMessage) -> String {
    let mut line = format!(
        "{}: {}",
        speaker_name(settings, message.speaker_id()),
        message.text()
    );
    if let Some(reaction) = message.user_reaction {
        line.push_str(&format!(" [{}]", reaction));
    }
    line
}

/// Render the whole transcript, one line per message.
pub fn render_transcript(settings: &DebateSettings, transcript: &Transcript) -> String {
    transcript
        .messages()
        .iter()
        .map(|m| render_line(settings, m))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_participants(settings: &DebateSettings) -> String {
    settings
        .participants
        .iter()
        .map(|p| {
            let mut entry = format!(
                "- {} (id: {}, {}). Philosophy: {}. Personality: {}",
                p.name,
                p.id,
                p.gender.as_str(),
                p.philosophy,
                p.description
            );
            if !p.honorifics.is_empty() {
                entry.push_str(&format!(" Titles: {}.", p.honorifics.join(", ")));
            }
            if !p.quotes.is_empty() {
                let quotes: Vec<String> = p.quotes.iter().map(|q| format!("\"{}\"", q)).collect();
                entry.push_str(&format!(" Known quotes: {}", quotes.join(" ")));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn participant_ids(settings: &DebateSettings) -> String {
    settings
        .participants
        .iter()
        .map(|p| p.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").ok());

/// Substitute placeholders in one pass, so values are never re-expanded.
/// Unknown placeholders are left as written.
fn fill(template: &str, settings: &DebateSettings, transcript: &str) -> String {
    let Some(re) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &Captures| match &caps[1] {
        "topic" => settings.topic.clone(),
        "audience" => settings.age_group.label().to_string(),
        "audience_guidance" => settings.age_group.guidance().to_string(),
        "participants" => describe_participants(settings),
        "participant_ids" => participant_ids(settings),
        "user_gender" => settings.user_voice.as_str().to_string(),
        "transcript" => transcript.to_string(),
        _ => caps[0].to_string(),
    })
    .into_owned()
}

/// System instruction: personas, audience and debate rules.
pub fn system_prompt(prompts: &PromptsConfig, settings: &DebateSettings) -> String {
    fill(&prompts.system_template, settings, "")
}

/// Opening request for an empty transcript, continuation otherwise.
pub fn context_prompt(
    prompts: &PromptsConfig,
    settings: &DebateSettings,
    transcript: &Transcript,
) -> String {
    if transcript.is_empty() {
        fill(&prompts.opening_template, settings, "")
    } else {
        let lines = render_transcript(settings, transcript);
        fill(&prompts.continuation_template, settings, &lines)
    }
}

pub fn summary_prompt(
    prompts: &PromptsConfig,
    settings: &DebateSettings,
    transcript: &Transcript,
) -> String {
    let lines = render_transcript(settings, transcript);
    fill(&prompts.summary_template, settings, &lines)
}

/// JSON schema for a batch of turns, wrapped in an object as structured
/// output endpoints require. The opening batch asks for at least two turns.
pub fn turns_schema(settings: &DebateSettings, opening: bool) -> Value {
    let min_items = if opening { MIN_OPENING_TURNS } else { 1 };
    let ids: Vec<&str> = settings.participants.iter().map(|p| p.id.as_str()).collect();
    let moods: Vec<&str> = Mood::ALL.iter().map(|m| m.as_str()).collect();

    json!({
        "type": "object",
        "properties": {
            "turns": {
                "type": "array",
                "minItems": min_items,
                "maxItems": MAX_TURNS_PER_BATCH,
                "items": {
                    "type": "object",
                    "properties": {
                        "speakerId": {
                            "type": "string",
                            "description": format!(
                                "The ID of the historical figure speaking (must match one of: {})",
                                ids.join(", ")
                            ),
                        },
                        "text": { "type": "string" },
                        "mood": { "type": "string", "enum": moods },
                        "relevantQuote": { "type": "string" },
                    },
                    "required": ["speakerId", "text", "mood"],
                },
            },
        },
        "required": ["turns"],
    })
}
