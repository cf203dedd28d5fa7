//! Dialogue orchestration.
//!
//! Builds prompts, calls the generation endpoint and validates what comes
//! back. Model output is treated as untrusted input: it is cleaned, parsed
//! leniently and speaker ids are repaired against the seated participants.

use crate::config::{GeneratorConfig, PromptsConfig};
use crate::error::DebateError;
use crate::participant::{HistoricalFigure, USER_SPEAKER_ID};
use crate::prompt::{self, MAX_TURNS_PER_BATCH};
use crate::settings::DebateSettings;
use crate::transcript::{DialogueTurn, Mood, Transcript};

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of new dialogue.
#[async_trait]
pub trait DialogueGenerator: Send + Sync {
    /// Produce the next batch of turns for the given transcript.
    async fn generate_turns(
        &self,
        settings: &DebateSettings,
        transcript: &Transcript,
    ) -> Result<Vec<DialogueTurn>, DebateError>;

    /// Produce a free-text summary of the debate so far.
    async fn summarize(
        &self,
        settings: &DebateSettings,
        transcript: &Transcript,
    ) -> Result<String, DebateError>;
}

/// Generator backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiDialogueGenerator {
    client: Client<OpenAIConfig>,
    api_key: String,
    generator: GeneratorConfig,
    prompts: PromptsConfig,
}

impl OpenAiDialogueGenerator {
    pub fn new(
        api_key: impl Into<String>,
        generator: GeneratorConfig,
        prompts: PromptsConfig,
    ) -> Result<Self, DebateError> {
        let api_key = api_key.into();

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(generator.request_timeout_secs))
            .connect_timeout(Duration::from_secs(generator.connect_timeout_secs))
            .build()
            .map_err(|e| {
                DebateError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(&api_key)
            .with_api_base(&generator.api_base);

        let client = Client::with_config(config).with_http_client(http_client);

        Ok(Self {
            client,
            api_key,
            generator,
            prompts,
        })
    }

    async fn complete(
        &self,
        system: String,
        user: String,
        response_format: Option<ResponseFormat>,
    ) -> Result<String, DebateError> {
        if self.api_key.trim().is_empty() {
            return Err(DebateError::MissingApiKey);
        }

        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: system.into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: user.into(),
                name: None,
            }),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.generator.model)
            .max_completion_tokens(self.generator.max_tokens)
            .messages(messages);
        if let Some(temperature) = self.generator.temperature {
            args.temperature(temperature);
        }
        if let Some(format) = response_format {
            args.response_format(format);
        }
        let request = args.build()?;

        debug!(model = %self.generator.model, "requesting completion");
        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(content)
    }
}

#[async_trait]
impl DialogueGenerator for OpenAiDialogueGenerator {
    async fn generate_turns(
        &self,
        settings: &DebateSettings,
        transcript: &Transcript,
    ) -> Result<Vec<DialogueTurn>, DebateError> {
        let system = prompt::system_prompt(&self.prompts, settings);
        let context = prompt::context_prompt(&self.prompts, settings, transcript);
        let format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("The next turns of the debate".to_string()),
                name: "debate_turns".to_string(),
                schema: Some(prompt::turns_schema(settings, transcript.is_empty())),
                strict: Some(false),
            },
        };

        let raw = self.complete(system, context, Some(format)).await?;
        parse_turns(&raw, &settings.participants)
    }

    async fn summarize(
        &self,
        settings: &DebateSettings,
        transcript: &Transcript,
    ) -> Result<String, DebateError> {
        let system = prompt::system_prompt(&self.prompts, settings);
        let request = prompt::summary_prompt(&self.prompts, settings, transcript);

        let raw = self.complete(system, request, None).await?;
        let summary = strip_reasoning(&raw).trim().to_string();
        if summary.is_empty() {
            return Err(DebateError::Generation("Empty summary".to_string()));
        }
        Ok(summary)
    }
}

/// A turn as the model wrote it, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTurn {
    #[serde(alias = "speaker", alias = "speaker_id")]
    speaker_id: String,
    text: String,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default, alias = "relevant_quote")]
    relevant_quote: Option<String>,
}

/// Parse and validate a batch of turns from raw model output.
///
/// Accepts `{"turns": [...]}`, a bare array, or a single turn object.
/// Fails on malformed JSON, missing fields or an empty batch; extra turns
/// beyond the batch limit are dropped.
pub fn parse_turns(
    raw: &str,
    participants: &[HistoricalFigure],
) -> Result<Vec<DialogueTurn>, DebateError> {
    let cleaned = strip_code_fences(&strip_reasoning(raw));
    let value: Value = serde_json::from_str(cleaned.trim())
        .map_err(|e| DebateError::Generation(format!("Model returned invalid JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("turns") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(DebateError::Generation(
                    "Field 'turns' is not an array".to_string(),
                ));
            }
            None => vec![Value::Object(map)],
        },
        _ => {
            return Err(DebateError::Generation(
                "Expected a JSON array of turns".to_string(),
            ));
        }
    };

    if items.len() > MAX_TURNS_PER_BATCH {
        warn!(
            returned = items.len(),
            "model returned more turns than requested, keeping the first {}", MAX_TURNS_PER_BATCH
        );
    }

    let mut turns = Vec::with_capacity(MAX_TURNS_PER_BATCH);
    for item in items.into_iter().take(MAX_TURNS_PER_BATCH) {
        let raw_turn: RawTurn = serde_json::from_value(item)
            .map_err(|e| DebateError::Generation(format!("Malformed turn: {}", e)))?;

        let text = clean_spoken_text(&raw_turn.text);
        if text.is_empty() {
            return Err(DebateError::Generation(format!(
                "Turn for '{}' has no text",
                raw_turn.speaker_id
            )));
        }

        if raw_turn.speaker_id.trim().eq_ignore_ascii_case(USER_SPEAKER_ID) {
            warn!("model spoke for the user, dropping turn");
            continue;
        }
        let speaker_id = normalize_speaker_id(&raw_turn.speaker_id, participants);

        turns.push(DialogueTurn {
            speaker_id,
            text,
            mood: parse_mood(raw_turn.mood.as_deref()),
            relevant_quote: raw_turn
                .relevant_quote
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
        });
    }

    if turns.is_empty() {
        return Err(DebateError::Generation("Model returned no turns".to_string()));
    }

    Ok(turns)
}

fn parse_mood(mood: Option<&str>) -> Mood {
    let Some(mood) = mood else {
        return Mood::Neutral;
    };
    let normalized = mood.trim().to_lowercase();
    match Mood::ALL.iter().find(|m| m.as_str() == normalized) {
        Some(m) => *m,
        None => {
            debug!(mood = %mood, "unknown mood, using neutral");
            Mood::Neutral
        }
    }
}

/// Map a generated speaker id onto a seated participant.
///
/// Exact id, then case-insensitive id, then case-insensitive short name or
/// name, then substring containment either way. Unmatched ids are returned
/// as written.
pub fn normalize_speaker_id(raw: &str, participants: &[HistoricalFigure]) -> String {
    let trimmed = raw.trim();

    if let Some(p) = participants.iter().find(|p| p.id == trimmed) {
        return p.id.clone();
    }

    let lower = trimmed.to_lowercase();
    if lower.is_empty() {
        return raw.to_string();
    }

    if let Some(p) = participants.iter().find(|p| p.id.to_lowercase() == lower) {
        return p.id.clone();
    }

    if let Some(p) = participants
        .iter()
        .find(|p| p.short_name.to_lowercase() == lower || p.name.to_lowercase() == lower)
    {
        return p.id.clone();
    }

    if let Some(p) = participants.iter().find(|p| {
        let id = p.id.to_lowercase();
        let short = p.short_name.to_lowercase();
        lower.contains(&id)
            || lower.contains(&short)
            || (lower.chars().count() >= 3 && short.contains(&lower))
    }) {
        return p.id.clone();
    }

    raw.to_string()
}

static REASONING_TAGS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratch",
        "scratchpad",
        "plan",
        "analysis",
        "analyze",
        "consider",
        "pondering",
        "deliberation",
    ]
    .iter()
    .filter_map(|tag| regex::Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag)).ok())
    .collect()
});

static CODE_FENCE: LazyLock<Option<regex::Regex>> =
    LazyLock::new(|| regex::Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").ok());

static ORPHAN_TAG: LazyLock<Option<regex::Regex>> =
    LazyLock::new(|| regex::Regex::new(r"</?[\w]+[^>]*>").ok());

static WHITESPACE: LazyLock<Option<regex::Regex>> =
    LazyLock::new(|| regex::Regex::new(r"\s+").ok());

/// Strip reasoning blocks like <thinking>...</thinking>.
fn strip_reasoning(response: &str) -> String {
    REASONING_TAGS
        .iter()
        .fold(response.to_string(), |acc, re| re.replace_all(&acc, "").to_string())
}

/// Unwrap a ```json fenced block if the whole payload is one.
fn strip_code_fences(response: &str) -> String {
    match CODE_FENCE.as_ref().and_then(|re| re.captures(response)) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
        None => response.to_string(),
    }
}

/// Clean a spoken line: no tags, no markdown emphasis, single spaces.
fn clean_spoken_text(text: &str) -> String {
    let mut result = strip_reasoning(text);

    if let Some(re) = ORPHAN_TAG.as_ref() {
        result = re.replace_all(&result, "").to_string();
    }

    result = result.replace('*', "");

    if let Some(re) = WHITESPACE.as_ref() {
        result = re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::resolve_figures;

    fn seated() -> Vec<HistoricalFigure> {
        resolve_figures(&["socrates", "marx", "ataturk"]).unwrap()
    }

    #[test]
    fn test_parse_wrapped_turns() {
        let raw = r#"{"turns": [
            {"speakerId": "socrates", "text": "What is work?", "mood": "thoughtful"},
            {"speakerId": "marx", "text": "Exploitation.", "mood": "angry", "relevantQuote": "Workers of the world, unite!"}
        ]}"#;
        let turns = parse_turns(raw, &seated()).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].mood, Mood::Thoughtful);
        assert_eq!(
            turns[1].relevant_quote.as_deref(),
            Some("Workers of the world, unite!")
        );
    }

    #[test]
    fn test_parse_bare_array_in_code_fence() {
        let raw = "<thinking>plan the turns</thinking>```json\n[{\"speakerId\": \"Marx\", \"text\": \"Hello\", \"mood\": \"amused\"}]\n```";
        let turns = parse_turns(raw, &seated()).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker_id, "marx");
    }

    #[test]
    fn test_parse_truncates_long_batches() {
        let raw = r#"[
            {"speakerId": "socrates", "text": "1", "mood": "neutral"},
            {"speakerId": "marx", "text": "2", "mood": "neutral"},
            {"speakerId": "ataturk", "text": "3", "mood": "neutral"},
            {"speakerId": "socrates", "text": "4", "mood": "neutral"}
        ]"#;
        let turns = parse_turns(raw, &seated()).unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2].text, "3");
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            parse_turns("not json", &seated()),
            Err(DebateError::Generation(_))
        ));
        assert!(parse_turns("[]", &seated()).is_err());
        assert!(parse_turns(r#"[{"speakerId": "marx"}]"#, &seated()).is_err());
        assert!(parse_turns(r#"[{"speakerId": "marx", "text": "  "}]"#, &seated()).is_err());
    }

    #[test]
    fn test_unknown_mood_is_neutral() {
        let raw = r#"[{"speakerId": "marx", "text": "Hm.", "mood": "furious"}]"#;
        let turns = parse_turns(raw, &seated()).unwrap();
        assert_eq!(turns[0].mood, Mood::Neutral);
    }

    #[test]
    fn test_user_turns_are_dropped() {
        let raw = r#"[
            {"speakerId": "user", "text": "I agree!", "mood": "neutral"},
            {"speakerId": "socrates", "text": "Do you?", "mood": "amused"}
        ]"#;
        let turns = parse_turns(raw, &seated()).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker_id, "socrates");
    }

    #[test]
    fn test_user_turns_are_dropped_in_any_case() {
        let raw = r#"[
            {"speakerId": "User", "text": "I agree!", "mood": "neutral"},
            {"speakerId": " USER ", "text": "Me too.", "mood": "neutral"},
            {"speakerId": "socrates", "text": "Do you?", "mood": "amused"}
        ]"#;
        let turns = parse_turns(raw, &seated()).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker_id, "socrates");
    }

    #[test]
    fn test_normalize_speaker_id() {
        let seated = seated();
        assert_eq!(normalize_speaker_id("marx", &seated), "marx");
        assert_eq!(normalize_speaker_id("SOCRATES", &seated), "socrates");
        assert_eq!(normalize_speaker_id("Atatürk", &seated), "ataturk");
        assert_eq!(normalize_speaker_id("Karl Marx", &seated), "marx");
        assert_eq!(normalize_speaker_id("socrates_of_athens", &seated), "socrates");
        assert_eq!(normalize_speaker_id("napoleon", &seated), "napoleon");
    }

    #[test]
    fn test_clean_spoken_text() {
        let input = "Hello <reflection>internal thought</reflection> *world*!\n\nAgain.";
        assert_eq!(clean_spoken_text(input), "Hello world! Again.");
    }

    #[test]
    fn test_strip_reasoning_multiline() {
        let input = "<thinking>\nMultiple\nlines\n</thinking>Final answer here.";
        assert_eq!(strip_reasoning(input), "Final answer here.");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let generator = OpenAiDialogueGenerator::new(
            "",
            GeneratorConfig::default(),
            PromptsConfig::default(),
        )
        .unwrap();
        let settings = DebateSettings::new(
            "Topic",
            crate::settings::AgeGroup::Adult,
            resolve_figures(&["socrates", "marx"]).unwrap(),
            crate::settings::UserVoice::Silent,
        )
        .unwrap();

        let err = generator
            .generate_turns(&settings, &Transcript::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::MissingApiKey));
    }
}
