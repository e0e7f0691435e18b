use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use loqa_voice::audio::{list_input_devices, AudioOutput, CpalMicrophone, RodioOutput, UnavailableOutput};
use loqa_voice::{
    Config, MessageKind, SessionController, SessionDeps, SessionEvent, SessionHandle, WsConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Talk to a voice assistant from the terminal
#[derive(Debug, Parser)]
#[command(name = "loqa-voice", version)]
struct Args {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/loqa-voice")]
    config: String,

    /// Origin of the assistant page, e.g. https://assistant.example.com
    #[arg(long)]
    origin: Option<String>,

    /// Explicit socket URL (overrides --origin)
    #[arg(long)]
    url: Option<String>,

    /// Input device name
    #[arg(long)]
    device: Option<String>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Start streaming immediately
    #[arg(long)]
    autostart: bool,

    /// Show a live input level bar
    #[arg(long)]
    meter: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.list_devices {
        for name in list_input_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut cfg = Config::load(&args.config)?;
    if let Some(origin) = args.origin {
        cfg.service.origin = origin;
    }
    if let Some(url) = args.url {
        cfg.service.url = Some(url);
    }
    if let Some(device) = args.device {
        cfg.audio.device = Some(device);
    }

    let session_config = cfg.session_config()?;
    info!("{} connecting to {}", cfg.service.name, session_config.endpoint);

    let output: Arc<dyn AudioOutput> = match RodioOutput::open() {
        Ok(output) => Arc::new(output),
        Err(e) => Arc::new(UnavailableOutput::new(e.to_string())),
    };

    let deps = SessionDeps {
        connector: Arc::new(WsConnector),
        capture: Arc::new(CpalMicrophone::new(cfg.audio.device.clone())),
        output,
    };

    let (handle, events, controller) = SessionController::spawn(session_config, deps);
    let presenter = tokio::spawn(present(events, args.meter));

    println!("Commands: start, stop, stats, quit");
    if args.autostart {
        handle.start();
    }

    read_commands(&handle).await?;

    handle.shutdown();
    if let Err(e) = controller.await {
        warn!("Session controller task failed: {}", e);
    }
    presenter.abort();

    Ok(())
}

async fn read_commands(handle: &SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "start" | "s" => {
                handle.start();
            }
            "stop" | "x" => {
                handle.stop();
            }
            "stats" => {
                if let Some(stats) = handle.stats().await {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
            }
            "quit" | "q" | "exit" => break,
            other => println!("Unknown command: {} (start, stop, stats, quit)", other),
        }
    }

    Ok(())
}

/// Render session notifications on the terminal.
async fn present(mut events: mpsc::UnboundedReceiver<SessionEvent>, meter: bool) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::StatusChanged(state) => println!("\n-- {} --", state),
            SessionEvent::Message { kind, text } => {
                let icon = match kind {
                    MessageKind::User => "[you]",
                    MessageKind::Assistant => "[assistant]",
                    MessageKind::System => "[system]",
                };
                println!("\n{} {}", icon, text);
            }
            SessionEvent::LatencyMeasured(secs) => println!("latency: {:.2}s", secs),
            SessionEvent::LevelChanged(percentage) => {
                if meter {
                    let filled = (percentage / 5.0).round().clamp(0.0, 20.0) as usize;
                    print!("\r[{:<20}] {:>5.1}%", "#".repeat(filled), percentage);
                    let _ = std::io::stdout().flush();
                }
            }
            SessionEvent::Fault(error) => {
                if !error.is_fatal() {
                    println!("\n(warning) {}", error);
                }
            }
        }
    }
}
