use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use onair::announcer::Announcer;
use onair::clip::decode_refs;
use onair::config::RadioSettings;
use onair::llm::ChatClient;
use onair::orchestrator::{Orchestrator, OrchestratorHandle};
use onair::playback::{RodioOutput, decode_duration, play_clip_through};
use onair::playlist::Playlist;
use onair::proxy::{AudioFetcher, AudioProxy};
use onair::script::ScriptGenerator;
use onair::session::SessionMemory;
use onair::tts::{HttpSpeechBackend, SpeechSynthesizer};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "onair", about = "Music player with an AI radio host")]
struct Cli {
    /// Settings file (default: <config dir>/onair/radio.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play files or folders, with announcements between tracks
    Play {
        /// Audio files and/or folders, in play order
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Track number to start from (1-based)
        #[arg(short, long)]
        track: Option<usize>,
    },
    /// Inspect the announcement gate
    Gate {
        #[command(subcommand)]
        action: GateCmd,
    },
    /// Radio configuration
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
    /// Synthesize one line with the primary host's voice
    Say {
        text: String,
        /// Voice id (overrides the primary host's)
        #[arg(long)]
        voice: Option<String>,
        /// Play the clip after synthesizing it
        #[arg(long)]
        play: bool,
    },
    /// Play an audio reference, including `multi:` clip sequences
    Listen { audio_ref: String },
}

#[derive(Subcommand)]
enum GateCmd {
    /// Would the next boundary announce? Does not change the counter.
    Peek,
    /// Count one boundary and report whether it announces
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum HostSlot {
    Primary,
    Secondary,
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Show current configuration
    Show,
    /// Turn the radio host on
    Enable,
    /// Turn the radio host off
    Disable,
    /// Announce every N songs (0 = every song)
    Frequency { songs: i32 },
    /// Two hosts instead of one
    Dual {
        #[arg(action = ArgAction::Set)]
        on: bool,
    },
    /// Set a host's personality and/or voice
    Host {
        #[arg(value_enum)]
        which: HostSlot,
        #[arg(long)]
        personality: Option<String>,
        #[arg(long)]
        voice: Option<String>,
    },
    /// Listener name the hosts may use (omit to clear)
    Listener { name: Option<String> },
    /// Extra instructions for the hosts (omit to clear)
    Instructions { text: Option<String> },
    /// Music volume, 0.0-1.0
    Volume { level: f32 },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,onair=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_announcer(settings: &RadioSettings) -> Arc<Announcer> {
    let llm = ChatClient::from_settings(&settings.llm);
    let backend = HttpSpeechBackend::from_settings(&settings.tts);
    if !llm.has_credentials() || !backend.has_credentials() {
        info!("no API keys configured, announcements will be skipped");
    }
    let script = ScriptGenerator::new(Arc::new(llm), SessionMemory::shared());
    let synth = SpeechSynthesizer::new(Arc::new(backend));
    Arc::new(Announcer::new(script, synth, Arc::new(AudioProxy::default())))
}

fn save_or_exit(settings: &RadioSettings) {
    if let Err(e) = settings.save() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: {}", e),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let settings_path = cli.settings.unwrap_or_else(RadioSettings::default_path);
    let mut settings = RadioSettings::load_from(&settings_path);

    match cli.command {
        Commands::Play { paths, track } => {
            let mut playlist = Playlist::new("Session".to_string());
            for path in &paths {
                let added = if path.is_dir() {
                    playlist.add_folder(path)
                } else {
                    playlist.add_track(path).map(|_| 1)
                };
                if let Err(e) = added {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
            if playlist.tracks.is_empty() {
                eprintln!("Error: no playable tracks.");
                std::process::exit(1);
            }

            let start = match track {
                Some(n) if n >= 1 && n <= playlist.track_count() => n - 1,
                Some(n) => {
                    eprintln!(
                        "Error: track {} out of range (playlist has {} tracks)",
                        n,
                        playlist.track_count()
                    );
                    std::process::exit(1);
                }
                None => 0,
            };
            playlist.current_index = Some(start);

            let output = match RodioOutput::new() {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };

            println!(
                "Playing {} track(s) from track {} (radio: {}). Commands: n(ext), p(revious), on, off, reset, s(tatus), q(uit)",
                playlist.track_count(),
                start + 1,
                if settings.radio_enabled() { "on" } else { "off" }
            );

            let announcer = build_announcer(&settings);
            let (handle, commands) = OrchestratorHandle::channel();
            let mut orchestrator = Orchestrator::new(output, Box::new(playlist), announcer, settings);
            tokio::spawn(read_commands(handle, orchestrator.announcing_flag()));

            if let Err(e) = orchestrator.run(commands).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Gate { action } => match action {
            GateCmd::Peek => print_json(&settings.gate.peek_status()),
            GateCmd::Check => {
                let status = settings.gate.consume_status();
                save_or_exit(&settings);
                print_json(&status);
            }
        },
        Commands::Config { action } => {
            match action {
                ConfigCmd::Show => {
                    println!("Settings file: {}", settings_path.display());
                    let mut shown = settings.clone();
                    for key in [&mut shown.llm.api_key, &mut shown.tts.api_key] {
                        if key.is_some() {
                            *key = Some("********".to_string());
                        }
                    }
                    print_json(&shown);
                    return;
                }
                ConfigCmd::Enable => settings.gate.enabled = true,
                ConfigCmd::Disable => settings.gate.enabled = false,
                ConfigCmd::Frequency { songs } => {
                    settings.gate.frequency = songs;
                    settings.gate.reset_counter();
                }
                ConfigCmd::Dual { on } => settings.dual_mode = on,
                ConfigCmd::Host {
                    which,
                    personality,
                    voice,
                } => {
                    let host = match which {
                        HostSlot::Primary => &mut settings.primary_host,
                        HostSlot::Secondary => &mut settings.secondary_host,
                    };
                    if let Some(p) = personality {
                        host.personality = p;
                    }
                    if let Some(v) = voice {
                        host.voice = v;
                    }
                }
                ConfigCmd::Listener { name } => settings.listener_name = name,
                ConfigCmd::Instructions { text } => settings.custom_instructions = text,
                ConfigCmd::Volume { level } => {
                    if !(0.0..=1.0).contains(&level) {
                        eprintln!("Error: volume must be between 0.0 and 1.0");
                        std::process::exit(1);
                    }
                    settings.volume = level;
                }
            }
            save_or_exit(&settings);
            println!("Saved to {}", settings_path.display());
        }
        Commands::Say { text, voice, play } => {
            let voice = voice.unwrap_or_else(|| settings.primary_host.voice.clone());
            let synth = SpeechSynthesizer::new(Arc::new(HttpSpeechBackend::from_settings(&settings.tts)));
            let clip = match synth.synthesize(&text, &voice, settings.speech_speed).await {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            println!("{} ({:.1}s{})", clip.audio_ref, clip.duration.as_secs_f32(), if clip.estimated { ", estimated" } else { "" });

            if play {
                if let Err(e) = play_once(&clip.audio_ref, clip.duration).await {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Listen { audio_ref } => {
            let refs = decode_refs(&audio_ref);
            if refs.is_empty() {
                eprintln!("Error: empty audio reference");
                std::process::exit(1);
            }
            for (i, single) in refs.iter().enumerate() {
                println!("[{}/{}] {}", i + 1, refs.len(), single);
                let estimate = std::time::Duration::from_secs(30);
                if let Err(e) = play_once(single, estimate).await {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

async fn play_once(audio_ref: &str, estimate: std::time::Duration) -> onair::error::Result<()> {
    let bytes = AudioProxy::default().fetch(audio_ref).await?;
    let mut output = RodioOutput::new()?;
    let expected = decode_duration(&bytes).unwrap_or(estimate);
    play_clip_through(&mut output, &bytes, expected, |_| Ok(())).await
}

/// Map stdin lines to orchestrator commands. EOF leaves playback running.
async fn read_commands(handle: OrchestratorHandle, announcing: Arc<AtomicBool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "n" | "next" => handle.next(),
            "p" | "prev" | "previous" => handle.previous(),
            "on" => handle.set_radio_enabled(true),
            "off" => handle.set_radio_enabled(false),
            "reset" => handle.reset_session(),
            "s" | "status" => {
                if announcing.load(Ordering::SeqCst) {
                    println!("on air: host speaking");
                } else {
                    println!("music");
                }
            }
            "q" | "quit" => {
                handle.stop();
                return;
            }
            "" => {}
            other => eprintln!("Unknown command '{}'", other),
        }
    }
}
