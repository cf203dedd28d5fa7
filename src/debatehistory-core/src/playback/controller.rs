//! Async driver for the playback machine.
//!
//! The machine lives inside a single task that is its only mutator.
//! Commands arrive over a channel; synthesis, clip completion and delays run
//! in spawned tasks that report back over a second channel. State snapshots
//! are published through a `watch` channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::machine::{Effect, PlaybackMachine, PlaybackState, SynthesisRequest};
use crate::audio::AudioSink;
use crate::settings::DebateSettings;
use crate::transcript::ChatMessage;
use crate::tts::{AudioClip, SpeechSynthesizer, adjust_audio_speed};

enum Command {
    Stop { reset_cursor: bool },
    PlaySingle(usize),
    ToggleAutoPlay,
    SetMessages(Vec<ChatMessage>),
    Reset {
        settings: DebateSettings,
        messages: Vec<ChatMessage>,
    },
}

enum Event {
    Synthesized {
        request: SynthesisRequest,
        result: Result<AudioClip, String>,
    },
    Finished {
        epoch: u64,
        message_id: String,
        chained: bool,
    },
    AdvanceDue {
        epoch: u64,
    },
}

/// Handle to the playback task. Dropping it stops playback.
pub struct PlaybackController {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<PlaybackState>,
}

impl PlaybackController {
    /// Spawn the playback task on the current runtime.
    pub fn spawn(
        machine: PlaybackMachine,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        speed: f32,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(machine.state().clone());

        let actor = Actor {
            machine,
            synthesizer,
            sink,
            speed,
            events: events_tx,
            audio: None,
            state: state_tx,
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            state: state_rx,
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("playback task is gone, command dropped");
        }
    }

    pub fn stop(&self, reset_cursor: bool) {
        self.send(Command::Stop { reset_cursor });
    }

    pub fn play_single(&self, index: usize) {
        self.send(Command::PlaySingle(index));
    }

    pub fn toggle_auto_play(&self) {
        self.send(Command::ToggleAutoPlay);
    }

    /// Hand the controller the current transcript.
    pub fn set_messages(&self, messages: Vec<ChatMessage>) {
        self.send(Command::SetMessages(messages));
    }

    /// Stop with cursor reset and switch to another session.
    pub fn reset(&self, settings: DebateSettings, messages: Vec<ChatMessage>) {
        self.send(Command::Reset { settings, messages });
    }

    /// Latest published state.
    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }
}

struct Actor {
    machine: PlaybackMachine,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    speed: f32,
    events: mpsc::UnboundedSender<Event>,
    /// The one active audio source, if any.
    audio: Option<JoinHandle<()>>,
    state: watch::Sender<PlaybackState>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        loop {
            let effects = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            };

            for effect in effects {
                self.apply(effect);
            }
            self.state.send_replace(self.machine.state().clone());
        }

        self.halt_audio();
        debug!("playback task finished");
    }

    fn handle_command(&mut self, command: Command) -> Vec<Effect> {
        match command {
            Command::Stop { reset_cursor } => self.machine.stop(reset_cursor),
            Command::PlaySingle(index) => self.machine.play_single(index),
            Command::ToggleAutoPlay => self.machine.toggle_auto_play(),
            Command::SetMessages(messages) => {
                self.machine.set_messages(messages);
                Vec::new()
            }
            Command::Reset { settings, messages } => self.machine.reset(settings, messages),
        }
    }

    fn handle_event(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Synthesized { request, result } => {
                self.machine.synthesis_finished(&request, result)
            }
            Event::Finished {
                epoch,
                message_id,
                chained,
            } => self.machine.playback_finished(epoch, &message_id, chained),
            Event::AdvanceDue { epoch } => self.machine.advance_due(epoch),
        }
    }

    fn halt_audio(&mut self) {
        if let Some(handle) = self.audio.take() {
            handle.abort();
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::HaltAudio => self.halt_audio(),
            Effect::Synthesize(request) => {
                let synthesizer = self.synthesizer.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let result = synthesizer
                        .synthesize(&request.text, &request.voice)
                        .await
                        .map_err(|e| {
                            warn!(message_id = %request.message_id, error = %e, "speech synthesis failed");
                            e.to_string()
                        });
                    let _ = events.send(Event::Synthesized { request, result });
                });
            }
            Effect::Play {
                epoch,
                message_id,
                chained,
                clip,
            } => {
                self.halt_audio();
                let clip = AudioClip::new(adjust_audio_speed(clip.samples, self.speed), clip.sample_rate);
                let sink = self.sink.clone();
                let events = self.events.clone();
                self.audio = Some(tokio::spawn(async move {
                    if let Err(e) = sink.play(&message_id, &clip).await {
                        warn!(message_id = %message_id, error = %e, "audio output failed");
                    }
                    let _ = events.send(Event::Finished {
                        epoch,
                        message_id,
                        chained,
                    });
                }));
            }
            Effect::ScheduleAdvance { epoch, delay } => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::AdvanceDue { epoch });
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlaybackConfig, VoicesConfig};
    use crate::error::DebateError;
    use crate::participant::resolve_figures;
    use crate::settings::{AgeGroup, UserVoice};
    use crate::transcript::{DialogueTurn, Mood, Transcript};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// One second of audio per call, after an optional delay. Texts starting
    /// with "fail" error out.
    struct FakeSynth {
        delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynth {
        async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<AudioClip, DebateError> {
            self.calls.lock().unwrap().push(text.to_string());
            tokio::time::sleep(self.delay).await;
            if text.starts_with("fail") {
                return Err(DebateError::TtsError("synthetic failure".to_string()));
            }
            Ok(AudioClip::new(vec![0.0; 1000], 1000))
        }
    }

    /// Records the label of every clip that starts, then paces it.
    #[derive(Default)]
    struct RecordingSink {
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&self, label: &str, clip: &AudioClip) -> Result<(), DebateError> {
            self.started.lock().unwrap().push(label.to_string());
            tokio::time::sleep(clip.duration()).await;
            Ok(())
        }
    }

    struct Harness {
        controller: PlaybackController,
        synth: Arc<FakeSynth>,
        sink: Arc<RecordingSink>,
        messages: Vec<ChatMessage>,
    }

    impl Harness {
        fn new(lines: &[(&str, &str)], user_voice: UserVoice, synth_delay: Duration) -> Self {
            let settings = DebateSettings::new(
                "Topic",
                AgeGroup::Adult,
                resolve_figures(&["socrates", "marx"]).unwrap(),
                user_voice,
            )
            .unwrap();

            let mut transcript = Transcript::new();
            transcript.append_turns(
                lines
                    .iter()
                    .map(|(speaker, text)| DialogueTurn {
                        speaker_id: speaker.to_string(),
                        text: text.to_string(),
                        mood: Mood::Neutral,
                        relevant_quote: None,
                    })
                    .collect(),
            );
            let messages = transcript.messages().to_vec();

            let mut machine = PlaybackMachine::new(
                settings,
                VoicesConfig::remote_default(),
                PlaybackConfig::default(),
            );
            machine.set_messages(messages.clone());

            let synth = Arc::new(FakeSynth {
                delay: synth_delay,
                calls: Mutex::new(Vec::new()),
            });
            let sink = Arc::new(RecordingSink::default());
            let controller = PlaybackController::spawn(machine, synth.clone(), sink.clone(), 1.0);

            Self {
                controller,
                synth,
                sink,
                messages,
            }
        }

        fn started(&self) -> Vec<String> {
            self.sink.started.lock().unwrap().clone()
        }

        fn synthesized(&self) -> Vec<String> {
            self.synth.calls.lock().unwrap().clone()
        }

        fn id(&self, index: usize) -> String {
            self.messages[index].id.clone()
        }
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_play_runs_in_order_and_loops() {
        let h = Harness::new(
            &[("socrates", "a"), ("marx", "b"), ("socrates", "c")],
            UserVoice::Silent,
            Duration::ZERO,
        );

        h.controller.toggle_auto_play();
        // 3 clips of 1 s with 600 ms gaps, then the first again at 4.8 s.
        wait(5_500).await;

        assert_eq!(h.started(), vec![h.id(0), h.id(1), h.id(2), h.id(0)]);
        let state = h.controller.state();
        assert!(state.auto_playing);
        assert_eq!(state.cursor, Some(0));

        h.controller.stop(true);
        wait(10).await;
        let state = h.controller.state();
        assert!(!state.auto_playing);
        assert_eq!(state.playing_id, None);
        assert_eq!(state.cursor, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_pending_synthesis() {
        let h = Harness::new(
            &[("socrates", "a"), ("marx", "b")],
            UserVoice::Silent,
            Duration::from_millis(500),
        );

        h.controller.play_single(0);
        wait(100).await;
        h.controller.stop(false);
        wait(2_000).await;

        assert_eq!(h.synthesized(), vec!["a"]);
        assert!(h.started().is_empty());
        assert_eq!(h.controller.state().cursor, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_single_twice_stops() {
        let h = Harness::new(
            &[("socrates", "a"), ("marx", "b"), ("socrates", "c")],
            UserVoice::Silent,
            Duration::ZERO,
        );

        h.controller.play_single(1);
        wait(200).await;
        assert_eq!(h.controller.state().playing_id, Some(h.id(1)));
        assert_eq!(h.started(), vec![h.id(1)]);

        h.controller.play_single(1);
        wait(10).await;
        assert_eq!(h.controller.state().playing_id, None);

        // Single plays never chain.
        wait(3_000).await;
        assert_eq!(h.started(), vec![h.id(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_user_messages_are_skipped() {
        let h = Harness::new(
            &[("socrates", "a"), ("user", "mine"), ("marx", "b")],
            UserVoice::Silent,
            Duration::ZERO,
        );

        h.controller.toggle_auto_play();
        wait(3_000).await;
        h.controller.stop(false);
        wait(10).await;

        assert_eq!(h.synthesized(), vec!["a", "b"]);
        assert_eq!(h.started(), vec![h.id(0), h.id(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_error_does_not_stall_sequence() {
        let h = Harness::new(
            &[("socrates", "fail here"), ("marx", "b")],
            UserVoice::Silent,
            Duration::ZERO,
        );

        h.controller.toggle_auto_play();
        wait(1_500).await;

        assert_eq!(h.synthesized(), vec!["fail here", "b"]);
        assert_eq!(h.started(), vec![h.id(1)]);
        assert_eq!(h.controller.state().playing_id, Some(h.id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_appended_message_is_reached_later() {
        let h = Harness::new(&[("socrates", "a")], UserVoice::Silent, Duration::ZERO);

        h.controller.toggle_auto_play();
        wait(200).await;

        let mut transcript = Transcript::from_messages(h.messages.clone());
        transcript.append_turns(vec![DialogueTurn {
            speaker_id: "marx".to_string(),
            text: "late".to_string(),
            mood: Mood::Passionate,
            relevant_quote: None,
        }]);
        let appended_id = transcript.messages()[1].id.clone();
        h.controller.set_messages(transcript.messages().to_vec());

        wait(100).await;
        assert_eq!(h.started(), vec![h.id(0)]);

        wait(2_000).await;
        assert_eq!(h.started(), vec![h.id(0), appended_id]);
    }
}
