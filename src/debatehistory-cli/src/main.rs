//! Debate with History CLI
//!
//! Seat historical figures at a round table, let them argue a topic, join in,
//! and listen to the debate.

use clap::{Parser, Subcommand};
use colored::Colorize;
use debatehistory_core::audio::{generate_output_filename, render_transcript_audio, write_wav};
use debatehistory_core::config::{Config, SpeechBackend};
use debatehistory_core::participant::{catalogue, resolve_figures};
use debatehistory_core::prompt::speaker_label;
use debatehistory_core::settings::SUGGESTED_TOPICS;
use debatehistory_core::{
    AgeGroup, AudioSink, ChatMessage, DebateError, DebateSession, DebateSettings,
    DialogueGenerator, FileStore, KokoroSynthesizer, OpenAiDialogueGenerator,
    PlaybackController, PlaybackMachine, Reaction, RemoteSpeechSynthesizer, SessionHistory, SessionRecord,
    SpeechSynthesizer, UserVoice, WavSink,
};
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "debatehistory",
    version,
    about = "Debate with History - watch history's greatest minds argue modern topics",
    long_about = "Stage a round-table debate between historical figures using an OpenAI-compatible API, join the conversation, and listen to it with text-to-speech."
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the historical figures who can be invited
    Figures,

    /// List suggested topics
    Topics,

    /// Start a new debate
    Start {
        /// Topic to debate (defaults to the first suggested topic)
        #[arg(short, long, value_name = "TOPIC")]
        topic: Option<String>,

        /// Figure to invite (2-4, specify once per figure)
        #[arg(short = 'f', long = "figure", value_name = "ID")]
        figures: Vec<String>,

        /// Audience: child, teen or adult
        #[arg(short, long, default_value = "adult")]
        age: String,

        /// Your voice: male, female or silent
        #[arg(short, long, default_value = "silent")]
        voice: String,
    },

    /// Browse saved debates
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Render a saved debate to a single WAV file
    Export {
        /// Position in `history list` (1 = most recent)
        index: usize,

        /// Output file (defaults to a name derived from the topic)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Seconds of silence between speakers
        #[arg(long, default_value = "0.8")]
        gap: f32,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List saved debates, most recent first
    List,
    /// Continue a saved debate
    Resume { index: usize },
    /// Start a new debate with the same settings
    Clone { index: usize },
    /// Delete a saved debate
    Delete { index: usize },
}

/// Everything a session needs from the environment.
struct App {
    config: Config,
    generator: OpenAiDialogueGenerator,
    history: SessionHistory,
    api_base: String,
    api_key: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debatehistory=info,debatehistory_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Command::Figures => {
            print_figures();
            Ok(())
        }
        Command::Topics => {
            for (i, topic) in SUGGESTED_TOPICS.iter().enumerate() {
                println!("  {}. {}", i + 1, topic);
            }
            Ok(())
        }
        Command::Start {
            topic,
            figures,
            age,
            voice,
        } => {
            let mut app = App::new(config)?;
            let topic = topic.unwrap_or_else(|| SUGGESTED_TOPICS[0].to_string());
            let ids = if figures.is_empty() {
                vec!["ataturk".to_string(), "socrates".to_string(), "marx".to_string()]
            } else {
                figures
            };
            let settings = DebateSettings::new(
                topic,
                age.parse::<AgeGroup>()?,
                resolve_figures(&ids)?,
                voice.parse::<UserVoice>()?,
            )?;
            let session = DebateSession::start(settings, &mut app.history);
            run_session(&mut app, session).await
        }
        Command::History { action } => {
            let mut app = App::new(config)?;
            match action {
                HistoryAction::List => {
                    print_history(&app.history);
                    Ok(())
                }
                HistoryAction::Resume { index } => {
                    let record = app.record_at(index)?.clone();
                    let session = DebateSession::resume(&record);
                    run_session(&mut app, session).await
                }
                HistoryAction::Clone { index } => {
                    let record = app.record_at(index)?.clone();
                    let settings = DebateSession::clone_settings(&record);
                    let session = DebateSession::start(settings, &mut app.history);
                    run_session(&mut app, session).await
                }
                HistoryAction::Delete { index } => {
                    app.record_at(index)?;
                    if let Some(removed) = app.history.delete_at(index - 1) {
                        println!("{} {}", "Deleted:".yellow(), removed.topic);
                    }
                    Ok(())
                }
            }
        }
        Command::Export { index, output, gap } => {
            let app = App::new(config)?;
            let record = app.record_at(index)?.clone();
            let synthesizer = app
                .synthesizer()
                .await?
                .ok_or("Speech is disabled in the configuration")?;

            let settings = record.settings();
            println!(
                "{} {} ({} messages)",
                "Rendering".bold(),
                settings.topic.bright_white(),
                record.messages.len()
            );
            let clip = render_transcript_audio(
                &settings,
                &record.messages,
                &app.config.voices(),
                synthesizer.as_ref(),
                gap,
                app.config.playback.speed,
            )
            .await?;

            let path = output.unwrap_or_else(|| PathBuf::from(generate_output_filename(&settings.topic)));
            write_wav(&path, &clip)?;
            println!("{} {}", "Saved".bright_green().bold(), path.display());
            Ok(())
        }
    }
}

impl App {
    fn new(config: Config) -> Result<Self, DebateError> {
        let api_base = env::var("OPENAI_API_BASE")
            .or_else(|_| env::var("OPENAI_BASE_URL"))
            .unwrap_or_else(|_| config.generator.api_base.clone());

        let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
            eprintln!(
                "{}",
                "Warning: OPENAI_API_KEY not set. Generation and speech will fail.".yellow()
            );
            String::new()
        });

        let mut generator_config = config.generator.clone();
        generator_config.api_base = api_base.clone();
        let generator =
            OpenAiDialogueGenerator::new(&api_key, generator_config, config.prompts.clone())?;

        let store = FileStore::new(config.history.resolve_directory());
        let history = SessionHistory::open(Box::new(store), config.history.max_records);

        Ok(Self {
            config,
            generator,
            history,
            api_base,
            api_key,
        })
    }

    /// Look up a record by its 1-based position in the listing.
    fn record_at(&self, index: usize) -> Result<&SessionRecord, DebateError> {
        index
            .checked_sub(1)
            .and_then(|i| self.history.get_at(i))
            .ok_or_else(|| {
                DebateError::ConfigError(format!(
                    "No saved debate #{} ({} saved)",
                    index,
                    self.history.len()
                ))
            })
    }

    async fn synthesizer(&self) -> Result<Option<Arc<dyn SpeechSynthesizer>>, DebateError> {
        match self.config.speech.backend {
            SpeechBackend::None => Ok(None),
            SpeechBackend::Remote => Ok(Some(Arc::new(RemoteSpeechSynthesizer::new(
                &self.api_base,
                &self.api_key,
                &self.config.speech,
            )?))),
            SpeechBackend::Kokoro => {
                let kokoro = KokoroSynthesizer::new().await?;
                kokoro.validate_voices(&self.config.voices())?;
                Ok(Some(Arc::new(kokoro)))
            }
        }
    }

    async fn playback(
        &self,
        settings: &DebateSettings,
    ) -> Result<Option<PlaybackController>, DebateError> {
        let Some(synthesizer) = self.synthesizer().await? else {
            return Ok(None);
        };

        let dir = self
            .config
            .speech
            .output_dir
            .clone()
            .unwrap_or_else(|| self.config.history.resolve_directory().join("audio"));
        let sink: Arc<dyn AudioSink> = Arc::new(WavSink::new(dir)?);

        let machine = PlaybackMachine::new(
            settings.clone(),
            self.config.voices(),
            self.config.playback.clone(),
        );
        Ok(Some(PlaybackController::spawn(
            machine,
            synthesizer,
            sink,
            self.config.playback.speed,
        )))
    }
}

/// The live session and the playback mirror of its transcript. Every
/// mutation goes through here so playback always sees the current lines.
struct Stage {
    session: DebateSession,
    playback: Option<PlaybackController>,
}

impl Stage {
    fn sync_playback(&self) {
        if let Some(controller) = &self.playback {
            controller.set_messages(self.session.transcript().messages().to_vec());
        }
    }

    /// Stop any chained playback and append the user's line. Returns its index.
    fn say(&mut self, text: &str, history: &mut SessionHistory) -> Result<usize, DebateError> {
        if let Some(controller) = &self.playback {
            controller.stop(false);
        }
        self.session.add_user_message(text, history)?;
        self.sync_playback();
        Ok(self.session.transcript().len() - 1)
    }

    /// Request the next batch. Returns the index of the first new message.
    async fn next_turns(
        &mut self,
        generator: &dyn DialogueGenerator,
        history: &mut SessionHistory,
    ) -> Result<usize, DebateError> {
        let start = self.session.transcript().len();
        self.session.next_turns(generator, history).await?;
        self.sync_playback();
        Ok(start)
    }

    fn react(&mut self, index: usize, reaction: Option<Reaction>, history: &mut SessionHistory) -> bool {
        let updated = self.session.react(index, reaction, history);
        if updated {
            self.sync_playback();
        }
        updated
    }
}

/// Interactive loop for one session.
async fn run_session(app: &mut App, session: DebateSession) -> Result<(), Box<dyn std::error::Error>> {
    print_header(session.settings());

    let playback = match app.playback(session.settings()).await {
        Ok(playback) => playback,
        Err(e) => {
            eprintln!("{} {}", "Speech unavailable:".yellow(), e);
            None
        }
    };
    if let Some(controller) = &playback {
        controller.reset(session.settings().clone(), session.transcript().messages().to_vec());
        watch_playback(controller);
    }
    let mut stage = Stage { session, playback };

    if stage.session.transcript().is_empty() {
        println!("{}", "The chamber is silent. Press Enter to begin the debate.".dimmed());
    } else {
        print_transcript(stage.session.settings(), stage.session.transcript().messages(), 0);
    }
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".bright_blue().bold());
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        match command.to_lowercase().as_str() {
            "" | "next" | "n" => {
                generate(app, &mut stage).await;
            }
            "say" | "s" => match stage.say(rest, &mut app.history) {
                Ok(index) => {
                    if let Some(message) = stage.session.transcript().get(index) {
                        print_message(stage.session.settings(), message, index);
                    }
                    generate(app, &mut stage).await;
                }
                Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
            },
            "play" | "p" => match (&stage.playback, parse_index(rest, stage.session.transcript().len())) {
                (None, _) => eprintln!("{}", "Speech is disabled.".yellow()),
                (_, None) => eprintln!("{}", "Usage: play <message number>".yellow()),
                (Some(controller), Some(index)) => controller.play_single(index),
            },
            "listen" | "l" => match &stage.playback {
                Some(controller) => {
                    let was_playing = controller.state().auto_playing;
                    controller.toggle_auto_play();
                    let status = if was_playing { "paused" } else { "listening" };
                    println!("{}", status.bright_magenta());
                }
                None => eprintln!("{}", "Speech is disabled.".yellow()),
            },
            "stop" => {
                if let Some(controller) = &stage.playback {
                    controller.stop(true);
                }
            }
            "react" | "r" => {
                let (number, name) = rest.split_once(' ').unwrap_or((rest, ""));
                let reaction = match name.trim() {
                    "" | "none" | "clear" => Ok(None),
                    name => name.parse::<Reaction>().map(Some),
                };
                match (parse_index(number, stage.session.transcript().len()), reaction) {
                    (Some(index), Ok(reaction)) => {
                        if !stage.react(index, reaction, &mut app.history) {
                            eprintln!("{} no message #{}", "Error:".red().bold(), index + 1);
                        }
                    }
                    (_, Err(e)) => eprintln!("{} {}", "Error:".red().bold(), e),
                    (None, _) => eprintln!("{}", "Usage: react <message number> <agree|disagree|interesting>".yellow()),
                }
            }
            "summary" => {
                println!("{}", "Summarizing...".dimmed().italic());
                match stage.session.summarize(&app.generator).await {
                    Ok(summary) => {
                        println!();
                        println!("{}", summary);
                        println!();
                    }
                    Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
                }
            }
            "show" => print_transcript(stage.session.settings(), stage.session.transcript().messages(), 0),
            "help" | "?" => print_help(),
            "quit" | "exit" | "q" => break,
            other => eprintln!("{} '{}'. Type 'help'.", "Unknown command".yellow(), other),
        }
    }

    if let Some(controller) = &stage.playback {
        controller.stop(true);
    }
    println!("{}", "Session saved.".bright_green());
    Ok(())
}

/// Request the next batch and print it. Errors are reported, never fatal.
async fn generate(app: &mut App, stage: &mut Stage) {
    println!("{}", "Formulating arguments...".dimmed().italic());
    let generator: &dyn DialogueGenerator = &app.generator;

    match stage.next_turns(generator, &mut app.history).await {
        Ok(start) => {
            let messages = &stage.session.transcript().messages()[start..];
            print_transcript(stage.session.settings(), messages, start);
        }
        Err(e) => {
            eprintln!(
                "{} {}",
                "Failed to reach the history spirits:".red().bold(),
                e
            );
        }
    }
}

/// Print a marker whenever a new message starts speaking.
fn watch_playback(controller: &PlaybackController) {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        let mut last = None;
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if state.playing_id != last {
                if let (Some(_), Some(cursor)) = (&state.playing_id, state.cursor) {
                    println!("  {} #{}", "♪".bright_magenta(), cursor + 1);
                }
                last = state.playing_id;
            }
        }
    });
}

/// Parse a 1-based message number.
fn parse_index(text: &str, len: usize) -> Option<usize> {
    text.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n >= 1 && *n <= len)
        .map(|n| n - 1)
}

fn print_figures() {
    for figure in catalogue() {
        println!(
            "  {} {} - {}",
            figure.id.bright_cyan().bold(),
            figure.display_name_with_era(),
            figure.philosophy.dimmed()
        );
    }
}

fn print_history(history: &SessionHistory) {
    if history.is_empty() {
        println!("{}", "No saved debates.".dimmed());
        return;
    }
    for (i, record) in history.records().iter().enumerate() {
        let names: Vec<&str> = record.participants.iter().map(|p| p.short_name.as_str()).collect();
        let when = relative_time(record.timestamp);
        println!(
            "  {}. {} {} ({} messages, {})",
            i + 1,
            record.topic.bright_white(),
            format!("[{}]", names.join(", ")).cyan(),
            record.messages.len(),
            when.dimmed()
        );
    }
}

fn relative_time(timestamp_ms: i64) -> String {
    let ago = ((chrono::Utc::now().timestamp_millis() - timestamp_ms) / 1000).max(0);
    match ago {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{} min ago", ago / 60),
        3600..=86_399 => format!("{} h ago", ago / 3600),
        _ => format!("{} days ago", ago / 86_400),
    }
}

fn print_header(settings: &DebateSettings) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "Debate with History".bold(), settings.topic)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Audience:".bold(), settings.age_group);
    println!("{}", "At the table:".bold());
    for p in &settings.participants {
        println!(
            "  - {} ({}) {}",
            p.name.bright_cyan(),
            p.era.yellow(),
            p.philosophy.dimmed()
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

fn print_help() {
    println!(
        "{}",
        "Enter/next  continue | say <text>  speak | play <n>  listen to one | listen  auto-play on/off | stop | react <n> <agree|disagree|interesting> | summary | show | quit"
            .dimmed()
    );
}

fn print_transcript(settings: &DebateSettings, messages: &[ChatMessage], offset: usize) {
    for (i, message) in messages.iter().enumerate() {
        print_message(settings, message, offset + i);
    }
}

fn print_message(settings: &DebateSettings, message: &ChatMessage, index: usize) {
    let label = speaker_label(settings, message.speaker_id());
    let name = if message.is_user() {
        label.bright_green().bold()
    } else {
        label.bright_cyan().bold()
    };
    let reaction = message
        .user_reaction
        .map(|r| format!(" [{}]", r).yellow().to_string())
        .unwrap_or_default();

    println!(
        "{} {} {}{}",
        format!("#{}", index + 1).dimmed(),
        name,
        message.turn.mood.to_string().to_uppercase().dimmed(),
        reaction
    );
    for line in textwrap(message.text(), 66).lines() {
        println!("  {}", line);
    }
    if let Some(quote) = &message.turn.relevant_quote {
        println!("  {}", format!("\"{}\"", quote).italic().dimmed());
    }
    println!();
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_line_len + word_len + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word_len;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use debatehistory_core::config::{PlaybackConfig, VoicesConfig};
    use debatehistory_core::{AudioClip, DialogueTurn, MemoryStore, NullSink, Transcript};
    use std::sync::Mutex;
    use std::time::Duration;

    struct OfflineGenerator;

    #[async_trait]
    impl DialogueGenerator for OfflineGenerator {
        async fn generate_turns(
            &self,
            _settings: &DebateSettings,
            _transcript: &Transcript,
        ) -> Result<Vec<DialogueTurn>, DebateError> {
            Err(DebateError::Generation("offline".to_string()))
        }

        async fn summarize(
            &self,
            _settings: &DebateSettings,
            _transcript: &Transcript,
        ) -> Result<String, DebateError> {
            Err(DebateError::Generation("offline".to_string()))
        }
    }

    struct RecordingSynth {
        spoken: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for RecordingSynth {
        async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<AudioClip, DebateError> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(AudioClip::new(vec![0.0; 100], 1000))
        }
    }

    fn stage_with_playback(history: &mut SessionHistory) -> (Stage, Arc<Mutex<Vec<String>>>) {
        let settings = DebateSettings::new(
            "Universal Basic Income",
            AgeGroup::Adult,
            resolve_figures(&["socrates", "marx"]).unwrap(),
            UserVoice::Male,
        )
        .unwrap();
        let session = DebateSession::start(settings.clone(), history);

        let spoken = Arc::new(Mutex::new(Vec::new()));
        let machine = PlaybackMachine::new(
            settings,
            VoicesConfig::remote_default(),
            PlaybackConfig::default(),
        );
        let controller = PlaybackController::spawn(
            machine,
            Arc::new(RecordingSynth {
                spoken: spoken.clone(),
            }),
            Arc::new(NullSink),
            1.0,
        );
        (
            Stage {
                session,
                playback: Some(controller),
            },
            spoken,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_line_is_playable_when_generation_fails() {
        let mut history = SessionHistory::open(Box::new(MemoryStore::new()), 20);
        let (mut stage, spoken) = stage_with_playback(&mut history);

        let index = stage.say("What is justice?", &mut history).unwrap();
        assert!(stage.next_turns(&OfflineGenerator, &mut history).await.is_err());
        assert_eq!(stage.session.transcript().len(), 1);

        stage.playback.as_ref().unwrap().play_single(index);
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let done = !spoken.lock().unwrap().is_empty();
                if done {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*spoken.lock().unwrap(), vec!["What is justice?".to_string()]);
    }

    #[tokio::test]
    async fn test_react_reports_missing_message() {
        let mut history = SessionHistory::open(Box::new(MemoryStore::new()), 20);
        let (mut stage, _) = stage_with_playback(&mut history);

        assert!(!stage.react(0, Some(Reaction::Agree), &mut history));
        let index = stage.say("Hello", &mut history).unwrap();
        assert!(stage.react(index, Some(Reaction::Agree), &mut history));
        assert_eq!(
            history.records()[0].messages.messages()[0].user_reaction,
            Some(Reaction::Agree)
        );
    }

    #[test]
    fn test_relative_time() {
        let now = chrono::Utc::now().timestamp_millis();
        assert_eq!(relative_time(now), "just now");
        assert_eq!(relative_time(now - 5 * 60 * 1000), "5 min ago");
        assert_eq!(relative_time(now - 3 * 86_400 * 1000), "3 days ago");
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index("1", 3), Some(0));
        assert_eq!(parse_index(" 3 ", 3), Some(2));
        assert_eq!(parse_index("0", 3), None);
        assert_eq!(parse_index("4", 3), None);
        assert_eq!(parse_index("x", 3), None);
    }

    #[test]
    fn test_textwrap() {
        let wrapped = textwrap("one two three four", 9);
        assert_eq!(wrapped, "one two\nthree\nfour");
    }

    #[test]
    fn test_cli_parses_start() {
        let cli = Cli::try_parse_from([
            "debatehistory",
            "start",
            "-t",
            "Universal Basic Income",
            "-f",
            "socrates",
            "-f",
            "curie",
            "--age",
            "teen",
        ])
        .unwrap();
        match cli.command {
            Command::Start { topic, figures, age, voice } => {
                assert_eq!(topic.as_deref(), Some("Universal Basic Income"));
                assert_eq!(figures, vec!["socrates", "curie"]);
                assert_eq!(age, "teen");
                assert_eq!(voice, "silent");
            }
            _ => panic!("expected start"),
        }
    }
}
