use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use beacon_avatar::voice::{LocalAvatar, PacedSynthesizer, SpeechServiceSynthesizer};
use beacon_avatar::{
    AgentClient, Collaborators, Config, FileConfigProvider, Role, SessionEvent, SessionHandle,
    SpeechChunk, Synthesizer, segment,
};

/// Beacon Avatar - Talk to an AI assistant through a speaking avatar
#[derive(Parser)]
#[command(name = "beacon-avatar", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Pace replies silently instead of playing synthesized audio
    #[arg(long, env = "AVATAR_MUTE")]
    mute: bool,

    /// Start the session immediately
    #[arg(long)]
    autostart: bool,

    /// Print session events as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Speak a sentence through the speech service
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the avatar voice.")]
        text: String,
    },
    /// Show how a reply would be split for speech
    Segment {
        /// Reply text
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,beacon_avatar=info",
        1 => "info,beacon_avatar=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestTts { text } => test_tts(&text).await,
            Command::Segment { text } => {
                for (i, piece) in segment(&text).enumerate() {
                    println!("{:2}: {:?}", i + 1, piece.chunk.text);
                }
                Ok(())
            }
        };
    }

    let config = Config::load()?;
    tracing::debug!(
        agent = %config.agent.base_url,
        session_id = %config.agent.session_id,
        "loaded configuration"
    );

    let synthesizer: Arc<dyn Synthesizer> = if cli.mute {
        Arc::new(PacedSynthesizer)
    } else {
        Arc::new(SpeechServiceSynthesizer::new(
            &config.avatar,
            config.speech_endpoint.clone(),
        )?)
    };

    let collaborators = Collaborators {
        config: Arc::new(FileConfigProvider),
        sdk: Arc::new(LocalAvatar),
        synthesizer,
        chat: Arc::new(AgentClient::new(&config.agent)?),
    };

    let (handle, driver) = SessionHandle::spawn(collaborators, config.session);
    let renderer = tokio::spawn(render_events(handle.subscribe(), cli.json));

    if cli.autostart {
        handle.start()?;
    }
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => {}
            "/start" => handle.start()?,
            "/stop" => handle.stop()?,
            "/mic" => handle.toggle_microphone()?,
            "/hush" => handle.stop_speaking()?,
            "/status" => {
                let snapshot = handle.snapshot().await?;
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            "/transcript" => {
                for utterance in handle.snapshot().await?.transcript {
                    println!("{:?}: {}", utterance.role, utterance.content);
                }
            }
            "/help" => print_help(),
            "/quit" => break,
            text => handle.submit(text)?,
        }
    }

    handle.shutdown()?;
    driver.await?;
    renderer.abort();
    Ok(())
}

fn print_help() {
    println!("Commands: /start /stop /mic /hush /status /transcript /help /quit");
    println!("Anything else is sent to the assistant.");
}

/// Print session events until the driver goes away
async fn render_events(mut events: broadcast::Receiver<SessionEvent>, json: bool) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "event renderer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
            }
            continue;
        }

        match event {
            SessionEvent::StateChanged { state } => println!("[session {state}]"),
            SessionEvent::Transcript { utterance } => match utterance.role {
                Role::User => println!("you> {}", utterance.content),
                Role::Assistant => println!("avatar> {}", utterance.content),
                Role::System => {}
            },
            SessionEvent::System { message } => println!("* {message}"),
            SessionEvent::Alert { message } => eprintln!("!! {message}"),
            SessionEvent::Caption { .. } | SessionEvent::Controls { .. } => {}
        }
    }
}

/// Speak one sentence with the configured voice
async fn test_tts(text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let synthesizer = SpeechServiceSynthesizer::new(&config.avatar, config.speech_endpoint)?;

    println!("Speaking with {}: {text}", config.avatar.voice);
    synthesizer
        .speak(&SpeechChunk::new(text), tokio_util::sync::CancellationToken::new())
        .await?;
    println!("Done.");

    Ok(())
}
