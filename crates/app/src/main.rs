use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pulse_monitor_core::{
    classify, simulator, AppConfig, Mode, Monitor, PresentationBinding, RenderParams,
    WebSocketTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> pulse_monitor_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor { url, config } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(url) = url {
                config.stream.url = url;
            }
            run_monitor(config).await
        }
        Commands::Simulate {
            bind,
            interval_ms,
            config,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(bind) = bind {
                config.simulator.bind = bind;
            }
            if let Some(interval_ms) = interval_ms {
                config.simulator.interval_ms = interval_ms;
            }
            simulator::serve(&config.simulator).await
        }
        Commands::Classify { value } => {
            let value = classify(value)?;
            println!("{} BPM: {} ({})", value.bpm(), value.band(), value.color());
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> pulse_monitor_core::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

async fn run_monitor(config: AppConfig) -> pulse_monitor_core::Result<()> {
    tracing::info!(url = %config.stream.url, "starting monitor");

    let transport = WebSocketTransport::new(config.stream.url);
    let mut binding = PresentationBinding::new(Monitor::new(transport));

    let mut changes = binding.changes();
    print_params(&binding.render()?);
    let renderer = tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let params = RenderParams::from_state(&changes.borrow_and_update());
            print_params(&params);
        }
    });

    println!("enter a heart rate, +N/-N to nudge, `stream`, `manual`, `toggle` or `quit`");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match ConsoleCommand::parse(&line) {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Mode(mode) => binding.request_mode(mode)?,
            ConsoleCommand::Toggle => {
                binding.request_mode_toggle()?;
            }
            ConsoleCommand::Nudge(delta) => {
                if let Err(err) = binding.nudge(delta) {
                    println!("{err}");
                }
            }
            ConsoleCommand::Value(text) => {
                binding.submit_text(&text)?;
            }
        }
    }

    binding.request_mode(Mode::Manual)?;
    renderer.abort();
    Ok(())
}

fn print_params(params: &RenderParams) {
    println!(
        "{} | {} | beat {:.3}s | fill {} | {}",
        params.value_label,
        params.status_label,
        params.beat_duration_seconds,
        params.fill_color,
        params.mode_label,
    );
    if let Some(error) = &params.error {
        println!("  ! {error}");
    }
}

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleCommand {
    Quit,
    Mode(Mode),
    Toggle,
    Nudge(i64),
    Value(String),
}

impl ConsoleCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "quit" | "exit" => return Self::Quit,
            "stream" => return Self::Mode(Mode::Streaming),
            "manual" => return Self::Mode(Mode::Manual),
            "toggle" => return Self::Toggle,
            _ => {}
        }

        if line.starts_with(['+', '-']) {
            if let Ok(delta) = line.parse::<i64>() {
                return Self::Nudge(delta);
            }
        }
        Self::Value(line.to_string())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Live heart-rate monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the interactive monitor console.
    Monitor {
        /// WebSocket feed used in streaming mode.
        #[arg(short, long)]
        url: Option<String>,
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Serve a simulated heart-rate feed over WebSocket.
    Simulate {
        /// Address to listen on.
        #[arg(short, long)]
        bind: Option<String>,
        /// Milliseconds between readings.
        #[arg(short, long)]
        interval_ms: Option<u64>,
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Classify a single heart rate and exit.
    Classify {
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
}
