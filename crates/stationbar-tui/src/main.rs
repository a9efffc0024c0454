mod action;
mod app;
mod app_state;
mod mpv;
mod pandora;
mod theme;
mod ui;
mod widgets;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use stationbar_core::{CatalogClient, StationController};
use stationbar_proto::config::Config;
use stationbar_proto::{platform, AudioFormat};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::app::App;
use crate::app_state::UiState;
use crate::mpv::MpvPlayer;
use crate::pandora::PandoraClient;

#[derive(Parser, Debug)]
#[command(name = "stationbar", version, about = "Pandora radio in your terminal")]
struct Cli {
    /// Pandora account email (overrides the config file)
    #[arg(short, long)]
    username: Option<String>,

    /// Pandora password; prompted for when not set here or in the config
    #[arg(short, long, env = "STATIONBAR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Stream encoding: aacplus, mp3 or mp3-hifi
    #[arg(short, long)]
    audio_format: Option<AudioFormat>,

    /// Station to start on, by name
    #[arg(long)]
    station: Option<String>,

    /// More log detail (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// A custom tracing layer that forwards WARN/ERROR lines to the log pane.
struct BroadcastLayer {
    sender: broadcast::Sender<String>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<String>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is fine (UI not up yet).
        let _ = self.sender.send(message);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info,stationbar_core=debug,stationbar_tui=debug,hyper_util=warn,reqwest=warn,hyper=warn",
        1 => "debug,hyper_util=warn,reqwest=warn,hyper=warn",
        _ => "trace",
    }
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Logging: file + log pane ──────────────────────────────────────────────
    let (log_tx, log_rx) = broadcast::channel::<String>(256);

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("stationbar.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(BroadcastLayer::new(log_tx))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter(cli.verbose))),
        )
        .init();

    eprintln!("stationbar log: {}", log_path.display());
    info!("stationbar starting…");

    // ── Config + CLI overrides ────────────────────────────────────────────────
    let mut config = Config::load().context("Failed to load config")?;
    info!("Config loaded from: {:?}", Config::config_path());
    if let Some(username) = cli.username {
        config.pandora.username = username;
    }
    if let Some(format) = cli.audio_format {
        config.pandora.audio_format = format;
    }
    let start_station = cli.station.or(config.pandora.default_station.clone());

    if config.pandora.username.is_empty() {
        config.pandora.username = prompt("Pandora username")?;
    }
    let password = match cli.password.or(config.pandora.password.clone()) {
        Some(p) => p,
        None => prompt("Pandora password")?,
    };

    // ── Catalog + player ──────────────────────────────────────────────────────
    let catalog = PandoraClient::new(config.pandora.audio_format)?;
    catalog
        .login(&config.pandora.username, &password)
        .await
        .context("Could not log in to Pandora")?;

    let player = Arc::new(
        MpvPlayer::spawn(config.player.volume)
            .await
            .context("Could not start mpv")?,
    );
    let controller = Arc::new(StationController::new(catalog, player.clone())?);

    // ── Run TUI ───────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let state = UiState::new(config.ui.history_len, start_station);
    let app = App::new(controller, state, cancel.clone());
    let result = app.run(log_rx).await;

    cancel.cancel();
    player.shutdown().await;

    match result {
        Ok(None) => {
            info!("stationbar exiting");
            Ok(())
        }
        Ok(Some(fatal)) => {
            error!("Play loop failed: {}", fatal);
            anyhow::bail!("playback stopped: {}", fatal)
        }
        Err(e) => {
            error!("UI failed: {:#}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_layer_forwards_warnings_only() {
        let (tx, mut rx) = broadcast::channel(16);
        let subscriber = tracing_subscriber::registry().with(BroadcastLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("not forwarded");
            tracing::warn!(track = "Song", "Track already rated");
            tracing::error!("Playback failed");
        });

        let warn = rx.try_recv().unwrap();
        assert!(warn.contains("[WARN] Track already rated"), "{}", warn);
        assert!(warn.contains("track=\"Song\""), "{}", warn);
        let err = rx.try_recv().unwrap();
        assert!(err.contains("[ERROR] Playback failed"), "{}", err);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "stationbar",
            "-u",
            "listener@example.com",
            "-a",
            "mp3-hifi",
            "--station",
            "Jazz Radio",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.username.as_deref(), Some("listener@example.com"));
        assert_eq!(cli.audio_format, Some(AudioFormat::PremiumMp3));
        assert_eq!(cli.station.as_deref(), Some("Jazz Radio"));
        assert_eq!(cli.verbose, 2);

        assert!(Cli::try_parse_from(["stationbar", "-a", "flac"]).is_err());
    }
}
