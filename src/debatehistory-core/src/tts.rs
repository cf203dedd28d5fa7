//! Speech synthesis.
//!
//! Two backends: an OpenAI-compatible `/audio/speech` endpoint returning raw
//! 16-bit PCM, and the local kokoro-tiny engine.

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{SpeechConfig, VoicesConfig};
use crate::error::DebateError;
use crate::participant::USER_SPEAKER_ID;
use crate::settings::{DebateSettings, UserVoice};

/// Sample rate of both backends' output.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Decoded mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Turns text into audio for a voice.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, DebateError>;
}

/// Pick the voice for a speaker. `None` means the speaker stays silent.
pub fn select_voice(
    voices: &VoicesConfig,
    settings: &DebateSettings,
    speaker_id: &str,
) -> Option<String> {
    if speaker_id == USER_SPEAKER_ID {
        return match settings.user_voice {
            UserVoice::Male => Some(voices.user_male.clone()),
            UserVoice::Female => Some(voices.user_female.clone()),
            UserVoice::Silent => None,
        };
    }

    match settings.participant(speaker_id) {
        Some(figure) => Some(voices.voice_for_figure(&figure.id, figure.gender).to_string()),
        None => Some(voices.fallback_male.clone()),
    }
}

/// Decode little-endian signed 16-bit mono PCM into samples in [-1, 1].
/// A trailing odd byte is ignored.
pub fn decode_pcm16le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// OpenAI-compatible speech endpoint returning raw PCM.
pub struct RemoteSpeechSynthesizer {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    sample_rate: u32,
}

impl RemoteSpeechSynthesizer {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        speech: &SpeechConfig,
    ) -> Result<Self, DebateError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::TtsError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: speech.model.clone(),
            sample_rate: speech.sample_rate,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for RemoteSpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, DebateError> {
        if self.api_key.trim().is_empty() {
            return Err(DebateError::MissingApiKey);
        }

        let url = format!("{}/audio/speech", self.api_base);
        debug!(voice = voice_id, chars = text.len(), "requesting speech");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                input: text,
                voice: voice_id,
                response_format: "pcm",
            })
            .send()
            .await
            .map_err(|e| DebateError::TtsError(format!("Speech request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DebateError::TtsError(format!(
                "Speech endpoint returned {}: {}",
                status, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DebateError::TtsError(format!("Failed to read speech audio: {}", e)))?;

        let samples = decode_pcm16le(&bytes);
        if samples.is_empty() {
            return Err(DebateError::TtsError("Speech endpoint returned no audio".to_string()));
        }
        Ok(AudioClip::new(samples, self.sample_rate))
    }
}

/// Local synthesizer using kokoro-tiny.
pub struct KokoroSynthesizer {
    engine: Mutex<TtsEngine>,
    available_voices: Vec<String>,
}

impl KokoroSynthesizer {
    /// Initialize the TTS engine (downloads model on first run).
    pub async fn new() -> Result<Self, DebateError> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| DebateError::TtsError(format!("Failed to initialize TTS: {}", e)))?;

        let available_voices = engine.voices();

        Ok(Self {
            engine: Mutex::new(engine),
            available_voices,
        })
    }

    /// Get list of available voice IDs.
    pub fn available_voices(&self) -> &[String] {
        &self.available_voices
    }

    /// Validate that a voice ID exists.
    pub fn validate_voice(&self, voice_id: &str) -> Result<(), DebateError> {
        if voice_id.is_empty() {
            return Err(DebateError::TtsError(format!(
                "Voice ID cannot be empty. Available voices:\n{}",
                self.format_available_voices()
            )));
        }

        if !self.available_voices.iter().any(|v| v == voice_id) {
            return Err(DebateError::TtsError(format!(
                "Unknown voice '{}'. Available voices:\n{}",
                voice_id,
                self.format_available_voices()
            )));
        }

        Ok(())
    }

    /// Validate every voice a config could ask for.
    pub fn validate_voices(&self, voices: &VoicesConfig) -> Result<(), DebateError> {
        self.validate_voice(&voices.user_male)?;
        self.validate_voice(&voices.user_female)?;
        self.validate_voice(&voices.fallback_male)?;
        self.validate_voice(&voices.fallback_female)?;
        for voice in voices.figures.values() {
            self.validate_voice(voice)?;
        }
        Ok(())
    }

    fn format_available_voices(&self) -> String {
        let mut english_voices: Vec<&String> = self
            .available_voices
            .iter()
            .filter(|v| {
                v.starts_with("af_")
                    || v.starts_with("am_")
                    || v.starts_with("bf_")
                    || v.starts_with("bm_")
            })
            .collect();
        english_voices.sort();

        english_voices
            .iter()
            .map(|v| format!("  - {}", v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl SpeechSynthesizer for KokoroSynthesizer {
    /// Kokoro has a strict limit on text length, so text is split into
    /// small chunks with short pauses between them.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, DebateError> {
        self.validate_voice(voice_id)?;

        let chunks = split_into_chunks(text, 200);
        let mut all_samples = Vec::new();
        let mut engine = self.engine.lock().await;

        for chunk in chunks {
            if chunk.trim().is_empty() {
                continue;
            }

            let samples = engine
                .synthesize(&chunk, Some(voice_id))
                .map_err(|e| DebateError::TtsError(format!("Synthesis failed: {}", e)))?;

            all_samples.extend(samples);

            // 0.3 s between chunks
            all_samples.extend(vec![0.0; 7200]);
        }

        // 0.5 s tail so the last word is not clipped
        all_samples.extend(vec![0.0; 12000]);

        Ok(AudioClip::new(all_samples, DEFAULT_SAMPLE_RATE))
    }
}

/// Split text into chunks that are safe for TTS synthesis.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current_chunk.len() + sentence.len() > max_chars {
            if !current_chunk.is_empty() {
                chunks.push(current_chunk.trim().to_string());
                current_chunk = String::new();
            }

            // Over-long sentence: fall back to commas
            if sentence.len() > max_chars {
                for part in sentence.split_inclusive(',') {
                    if current_chunk.len() + part.len() > max_chars && !current_chunk.is_empty() {
                        chunks.push(current_chunk.trim().to_string());
                        current_chunk = String::new();
                    }
                    current_chunk.push_str(part);
                    current_chunk.push(' ');
                }
            } else {
                current_chunk.push_str(sentence);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(sentence);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

/// Adjust audio playback speed using linear interpolation.
/// Rate < 1.0 = slower (e.g., 0.75 = 75% speed), Rate > 1.0 = faster.
pub fn adjust_audio_speed(samples: Vec<f32>, rate: f32) -> Vec<f32> {
    if (rate - 1.0).abs() < 0.001 || rate <= 0.0 {
        return samples;
    }

    let new_len = (samples.len() as f32 / rate) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f32 * rate;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f32;

        if src_idx + 1 < samples.len() {
            let sample = samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac;
            result.push(sample);
        } else if src_idx < samples.len() {
            result.push(samples[src_idx]);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::resolve_figures;
    use crate::settings::AgeGroup;

    fn settings(user_voice: UserVoice) -> DebateSettings {
        DebateSettings::new(
            "Topic",
            AgeGroup::Adult,
            resolve_figures(&["socrates", "curie"]).unwrap(),
            user_voice,
        )
        .unwrap()
    }

    #[test]
    fn test_decode_pcm16le() {
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x00, 0x80, 0x01];
        let samples = decode_pcm16le(&bytes);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 32767.0 / 32768.0).abs() < f32::EPSILON);
        assert_eq!(samples[2], -1.0);
    }

    #[test]
    fn test_clip_duration() {
        let clip = AudioClip::new(vec![0.0; 12_000], DEFAULT_SAMPLE_RATE);
        assert_eq!(clip.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_select_voice() {
        let voices = VoicesConfig::remote_default();

        let silent = settings(UserVoice::Silent);
        assert_eq!(select_voice(&voices, &silent, USER_SPEAKER_ID), None);
        assert_eq!(select_voice(&voices, &silent, "curie").as_deref(), Some("nova"));
        assert_eq!(select_voice(&voices, &silent, "napoleon").as_deref(), Some("echo"));

        let female = settings(UserVoice::Female);
        assert_eq!(
            select_voice(&voices, &female, USER_SPEAKER_ID).as_deref(),
            Some("coral")
        );
    }

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 35);
        }
    }

    #[test]
    fn test_adjust_audio_speed() {
        let samples = vec![0.0, 1.0, 0.0, 1.0];
        assert_eq!(adjust_audio_speed(samples.clone(), 1.0), samples);
        assert_eq!(adjust_audio_speed(samples.clone(), 2.0).len(), 2);
        assert_eq!(adjust_audio_speed(samples, 0.5).len(), 8);
    }

    #[tokio::test]
    async fn test_remote_requires_api_key() {
        let synth =
            RemoteSpeechSynthesizer::new("http://localhost:1", "", &SpeechConfig::default()).unwrap();
        let err = synth.synthesize("Hello", "alloy").await.unwrap_err();
        assert!(matches!(err, DebateError::MissingApiKey));
    }
}
