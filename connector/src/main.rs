use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use league_connector::config::{self, Config};
use league_connector::event::ConnectorEvent;
use league_connector::{lockfile, paths, request, status};
use league_connector::{Credentials, LeagueClient, LeagueSocket, RequestOptions};

#[derive(Parser)]
#[command(version, about = "Watches the local League client and logs its events")]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to LeagueClient.exe; skips process polling when valid.
    #[arg(long, global = true)]
    executable_path: Option<PathBuf>,

    /// Milliseconds between process-list polls.
    #[arg(long, global = true)]
    poll_interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Detect the client, subscribe to events and log them (default).
    Run,
    /// Convert a lockfile into a JSON credentials file.
    Extract { input: PathBuf, output: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => paths::config_file_path()?,
    };
    let (mut cfg, config_error) = match config::load_or_default(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (Config::default(), Some(e)),
    };
    if let Some(path) = cli.executable_path {
        cfg.detection.executable_path = Some(path);
    }
    if let Some(ms) = cli.poll_interval {
        cfg.detection.poll_interval_ms = ms;
    }

    // ── Logging ───────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(e) = config_error {
        tracing::error!(target: "config", "{e:#} (using defaults)");
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Extract { input, output } => {
            lockfile::extract(&input, &output)
                .await
                .with_context(|| format!("Failed to extract {}", input.display()))?;
            tracing::info!(target: "lockfile", "Wrote {}", output.display());
            Ok(())
        }
        Command::Run => run(cfg, paths::status_file_path(&config_path)).await,
    }
}

async fn run(cfg: Config, status_path: PathBuf) -> Result<()> {
    let mut current_status = status::ConnectorStatus::new();
    status::write_status(&status_path, &current_status);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ConnectorEvent>();

    // ── Detection ─────────────────────────────────────────────────────────────
    let mut client = LeagueClient::new(cfg.detection.client_options());
    {
        let tx = event_tx.clone();
        client.on_connected(move |creds, is_game| {
            let _ = tx.send(ConnectorEvent::Connected(creds.clone(), is_game));
        });
        let tx = event_tx.clone();
        client.on_disconnected(move || {
            let _ = tx.send(ConnectorEvent::Disconnected);
        });
        let tx = event_tx.clone();
        client.on_error(move |e| {
            let _ = tx.send(ConnectorEvent::LockfileError(e.to_string()));
        });
    }
    client.start();

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(ConnectorEvent::Shutdown);
            }
        });
    }

    tracing::info!("league-connector v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut active_socket: Option<LeagueSocket> = None;
    // Identifies the current socket so closes from replaced ones are ignored.
    let mut socket_generation: u64 = 0;

    while let Some(evt) = event_rx.recv().await {
        match evt {
            ConnectorEvent::Connected(creds, is_game) => {
                if let Some(mut s) = active_socket.take() {
                    let _ = s.close().await;
                }

                current_status.connected(&creds, is_game);
                status::write_status(&status_path, &current_status);

                socket_generation += 1;
                let opened = open_socket(
                    &creds,
                    &cfg.events.subscriptions,
                    socket_generation,
                    event_tx.clone(),
                )
                .await;
                match opened {
                    Ok(s) => active_socket = Some(s),
                    Err(e) => {
                        tracing::warn!(target: "socket", "Failed to open event socket: {e}");
                        current_status.error = Some(format!("Socket failed: {e}"));
                        status::write_status(&status_path, &current_status);
                    }
                }

                for path in &cfg.events.startup_requests {
                    let creds = creds.clone();
                    let path = path.clone();
                    tokio::spawn(async move {
                        match request(&creds, RequestOptions::get(path.as_str())).await {
                            Ok(body) => tracing::info!(target: "request", "{path}: {body}"),
                            Err(e) => tracing::warn!(target: "request", "{path}: {e}"),
                        }
                    });
                }
            }

            ConnectorEvent::Disconnected => {
                if let Some(mut s) = active_socket.take() {
                    let _ = s.close().await;
                }
                current_status.disconnected();
                status::write_status(&status_path, &current_status);
            }

            ConnectorEvent::LockfileError(message) => {
                current_status.error = Some(message);
                status::write_status(&status_path, &current_status);
            }

            ConnectorEvent::SocketClosed(generation) => {
                // The controller reports the matching disconnect, if any.
                if generation == socket_generation {
                    active_socket = None;
                }
            }

            ConnectorEvent::Shutdown => {
                tracing::info!("Shutting down");
                client.stop();
                if let Some(mut s) = active_socket.take() {
                    let _ = s.close().await;
                }
                current_status.disconnected();
                current_status.error = None;
                status::write_status(&status_path, &current_status);
                break;
            }
        }
    }

    Ok(())
}

/// Opens the event socket and logs every event on the configured topics.
async fn open_socket(
    creds: &Credentials,
    subscriptions: &[String],
    generation: u64,
    tx: mpsc::UnboundedSender<ConnectorEvent>,
) -> league_connector::Result<LeagueSocket> {
    let mut socket = LeagueSocket::new(creds);
    socket.on_socket_open(|| tracing::info!(target: "socket", "Event socket open"));
    socket.on_error(|e| tracing::warn!(target: "socket", "{e}"));
    socket.on_close(move || {
        let _ = tx.send(ConnectorEvent::SocketClosed(generation));
    });
    for topic in subscriptions {
        socket.subscribe(topic, |data, event| {
            tracing::info!(
                target: "event",
                uri = %event.uri,
                kind = event.event_type.as_deref().unwrap_or("-"),
                "{data}"
            );
        });
    }
    socket.open().await?;
    Ok(socket)
}
