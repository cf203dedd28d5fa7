//! Audio output.
//!
//! A sink plays one clip at a time; `play` resolves when the clip has
//! finished. Dropping the future halts the clip.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::config::VoicesConfig;
use crate::error::DebateError;
use crate::settings::DebateSettings;
use crate::transcript::Transcript;
use crate::tts::{AudioClip, DEFAULT_SAMPLE_RATE, SpeechSynthesizer, adjust_audio_speed, select_voice};

#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play a clip to completion. `label` names the clip (usually the
    /// message id).
    async fn play(&self, label: &str, clip: &AudioClip) -> Result<(), DebateError>;
}

/// Paces for the clip's duration without producing sound.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, _label: &str, clip: &AudioClip) -> Result<(), DebateError> {
        tokio::time::sleep(clip.duration()).await;
        Ok(())
    }
}

/// Renders each clip to a WAV file, then paces for its duration.
#[derive(Debug)]
pub struct WavSink {
    dir: PathBuf,
    counter: AtomicUsize,
}

impl WavSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, DebateError> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            counter: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AudioSink for WavSink {
    async fn play(&self, label: &str, clip: &AudioClip) -> Result<(), DebateError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("{:04}-{}.wav", n, sanitize_label(label)));
        write_wav(&path, clip)?;
        debug!(path = %path.display(), "clip rendered");

        tokio::time::sleep(clip.duration()).await;
        Ok(())
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .take(40)
        .collect()
}

/// Write a mono clip as 16-bit PCM WAV.
pub fn write_wav<P: AsRef<Path>>(path: P, clip: &AudioClip) -> Result<(), DebateError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let to_err = |e: hound::Error| DebateError::TtsError(format!("Failed to write WAV: {}", e));

    let mut writer = hound::WavWriter::create(path.as_ref(), spec).map_err(to_err)?;
    for &sample in &clip.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(to_err)?;
    }
    writer.finalize().map_err(to_err)
}

/// Combine multiple audio segments with silence gaps.
pub fn combine_audio_segments(
    segments: Vec<Vec<f32>>,
    gap_seconds: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let gap_samples = (gap_seconds * sample_rate as f32) as usize;
    let silence: Vec<f32> = vec![0.0; gap_samples];

    let mut combined = Vec::new();

    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            combined.extend(&silence);
        }
        combined.extend(segment);
    }

    combined
}

/// Render a whole transcript into one clip, in transcript order, with
/// silence between speakers. Silent user lines are left out.
pub async fn render_transcript_audio(
    settings: &DebateSettings,
    transcript: &Transcript,
    voices: &VoicesConfig,
    synthesizer: &dyn SpeechSynthesizer,
    gap_seconds: f32,
    speed: f32,
) -> Result<AudioClip, DebateError> {
    let mut segments = Vec::new();
    let mut sample_rate = None;

    for message in transcript.messages() {
        let Some(voice) = select_voice(voices, settings, message.speaker_id()) else {
            continue;
        };
        let clip = synthesizer.synthesize(message.text(), &voice).await?;
        sample_rate.get_or_insert(clip.sample_rate);
        segments.push(adjust_audio_speed(clip.samples, speed));
    }

    let sample_rate = sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    Ok(AudioClip::new(
        combine_audio_segments(segments, gap_seconds, sample_rate),
        sample_rate,
    ))
}

/// Generate filename for an exported debate.
pub fn generate_output_filename(topic: &str) -> String {
    let sanitized: String = topic
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect();

    format!("Debate with History - {}.wav", sanitized.trim())
}
