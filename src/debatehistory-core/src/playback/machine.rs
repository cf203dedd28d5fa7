//! Playback state machine.
//!
//! Pure and synchronous: every command or completion mutates the state and
//! returns the effects the driver must carry out. All asynchronous work is
//! tagged with the epoch it was issued under; anything reported back under
//! an older epoch is ignored.

use std::time::Duration;

use tracing::debug;

use crate::config::{PlaybackConfig, VoicesConfig};
use crate::settings::DebateSettings;
use crate::transcript::ChatMessage;
use crate::tts::{AudioClip, select_voice};

/// Observable playback state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    /// Message currently requested or audible.
    pub playing_id: Option<String>,
    /// Whether finishing a clip moves on to the next message.
    pub auto_playing: bool,
    /// Index of the last message played or playing; `None` is "before start".
    pub cursor: Option<usize>,
    /// Bumped by every stop; invalidates in-flight work.
    pub epoch: u64,
}

/// Synthesis the driver should start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub epoch: u64,
    pub message_id: String,
    pub text: String,
    pub voice: String,
    /// Chained requests continue the auto-play sequence when done.
    pub chained: bool,
}

/// Work requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Halt and release the active audio source.
    HaltAudio,
    Synthesize(SynthesisRequest),
    /// Start a clip on the (single) audio output.
    Play {
        epoch: u64,
        message_id: String,
        chained: bool,
        clip: AudioClip,
    },
    /// Report `advance_due(epoch)` after the delay.
    ScheduleAdvance { epoch: u64, delay: Duration },
}

/// The playback controller's state machine.
#[derive(Debug, Clone)]
pub struct PlaybackMachine {
    state: PlaybackState,
    messages: Vec<ChatMessage>,
    settings: DebateSettings,
    voices: VoicesConfig,
    timing: PlaybackConfig,
}

impl PlaybackMachine {
    pub fn new(settings: DebateSettings, voices: VoicesConfig, timing: PlaybackConfig) -> Self {
        Self {
            state: PlaybackState::default(),
            messages: Vec::new(),
            settings,
            voices,
            timing,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Replace the transcript view. Appended messages become reachable by
    /// later advances; nothing currently playing is interrupted.
    pub fn set_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
    }

    /// Switch to another session: stop, reset the cursor, swap the context.
    pub fn reset(&mut self, settings: DebateSettings, messages: Vec<ChatMessage>) -> Vec<Effect> {
        let effects = self.stop(true);
        self.settings = settings;
        self.messages = messages;
        effects
    }

    /// Halt playback and invalidate all pending work.
    pub fn stop(&mut self, reset_cursor: bool) -> Vec<Effect> {
        self.state.epoch += 1;
        self.state.playing_id = None;
        self.state.auto_playing = false;
        if reset_cursor {
            self.state.cursor = None;
        }
        debug!(epoch = self.state.epoch, reset_cursor, "playback stopped");
        vec![Effect::HaltAudio]
    }

    /// Play one message without chaining. Calling it on the message that is
    /// already playing stops playback instead.
    pub fn play_single(&mut self, index: usize) -> Vec<Effect> {
        let Some(message) = self.messages.get(index) else {
            return Vec::new();
        };

        if self.state.playing_id.as_deref() == Some(message.id.as_str()) {
            return self.stop(false);
        }

        let message_id = message.id.clone();
        let text = message.text().to_string();
        let voice = select_voice(&self.voices, &self.settings, message.speaker_id());

        let mut effects = self.stop(false);
        self.state.cursor = Some(index);

        if let Some(voice) = voice {
            self.state.playing_id = Some(message_id.clone());
            effects.push(Effect::Synthesize(SynthesisRequest {
                epoch: self.state.epoch,
                message_id,
                text,
                voice,
                chained: false,
            }));
        }
        effects
    }

    /// Pause in place when auto-playing, otherwise start advancing from the
    /// cursor.
    pub fn toggle_auto_play(&mut self) -> Vec<Effect> {
        if self.state.auto_playing {
            return self.stop(false);
        }
        self.state.auto_playing = true;
        self.advance()
    }

    /// Move to the next message and request it. Wraps to the start after
    /// the last message.
    pub fn advance(&mut self) -> Vec<Effect> {
        if !self.state.auto_playing {
            return Vec::new();
        }

        let len = self.messages.len();
        if matches!(self.state.cursor, Some(cursor) if cursor + 1 >= len) {
            self.state.cursor = None;
        }

        let next = self.state.cursor.map_or(0, |c| c + 1);
        if next >= len {
            return self.stop(false);
        }

        self.state.cursor = Some(next);
        let message = &self.messages[next];

        match select_voice(&self.voices, &self.settings, message.speaker_id()) {
            Some(voice) => {
                self.state.playing_id = Some(message.id.clone());
                vec![Effect::Synthesize(SynthesisRequest {
                    epoch: self.state.epoch,
                    message_id: message.id.clone(),
                    text: message.text().to_string(),
                    voice,
                    chained: true,
                })]
            }
            None => {
                debug!(index = next, "skipping silent message");
                self.state.playing_id = None;
                vec![Effect::ScheduleAdvance {
                    epoch: self.state.epoch,
                    delay: self.timing.skip_delay(),
                }]
            }
        }
    }

    /// A synthesis request finished. Results for an older epoch, or for a
    /// message that is no longer the one requested, are dropped.
    pub fn synthesis_finished(
        &mut self,
        request: &SynthesisRequest,
        result: Result<AudioClip, String>,
    ) -> Vec<Effect> {
        if request.epoch != self.state.epoch
            || self.state.playing_id.as_deref() != Some(request.message_id.as_str())
        {
            debug!(
                stale = request.epoch,
                current = self.state.epoch,
                message_id = %request.message_id,
                "discarding stale synthesis"
            );
            return Vec::new();
        }

        match result {
            Ok(clip) => vec![
                Effect::HaltAudio,
                Effect::Play {
                    epoch: request.epoch,
                    message_id: request.message_id.clone(),
                    chained: request.chained,
                    clip,
                },
            ],
            Err(error) => {
                debug!(message_id = %request.message_id, %error, "synthesis failed");
                self.state.playing_id = None;
                if request.chained && self.state.auto_playing {
                    vec![Effect::ScheduleAdvance {
                        epoch: request.epoch,
                        delay: self.timing.error_pause(),
                    }]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// A clip finished playing. Ignored unless it is the clip the state
    /// says is playing.
    pub fn playback_finished(&mut self, epoch: u64, message_id: &str, chained: bool) -> Vec<Effect> {
        if epoch != self.state.epoch || self.state.playing_id.as_deref() != Some(message_id) {
            return Vec::new();
        }
        self.state.playing_id = None;
        if chained && self.state.auto_playing {
            vec![Effect::ScheduleAdvance {
                epoch,
                delay: self.timing.completion_pause(),
            }]
        } else {
            Vec::new()
        }
    }

    /// A scheduled advance came due.
    pub fn advance_due(&mut self, epoch: u64) -> Vec<Effect> {
        if epoch != self.state.epoch || !self.state.auto_playing {
            return Vec::new();
        }
        self.advance()
    }
}
