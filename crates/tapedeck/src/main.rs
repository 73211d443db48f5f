mod console;
mod core;
mod http;
mod mpv;

use std::sync::Arc;

use anyhow::Context;
use tapedeck_core::ItunesSearch;
use tapedeck_proto::config::Config;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = tapedeck_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let log_path = data_dir.join("tapedeck.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; keep HTTP client internals quiet by default.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("tapedeck log: {}", log_path.display());
    tracing::info!("tapedeck starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let config = Config::load().context("loading config")?;

    // ── mpv ──────────────────────────────────────────────────────────────────
    let (mpv_event_tx, mpv_event_rx) = mpsc::channel(256);
    let mut driver = mpv::MpvDriver::new(config.mpv.default_volume);
    let handle = driver
        .spawn_and_connect(mpv_event_tx)
        .await
        .context("starting mpv")?;
    let port = mpv::MpvPlayback::new(handle);

    let (notice_tx, notice_rx) = mpsc::channel(16);
    port.forward_notices(mpv_event_rx, notice_tx);

    // ── Deck core ────────────────────────────────────────────────────────────
    let search = Arc::new(ItunesSearch::new(&config.search).context("building search client")?);
    let deck_core = core::DeckCore::new(config.clone(), port, search);
    let views = deck_core.views();
    let (command_tx, command_rx) = mpsc::channel(64);

    // ── HTTP server ──────────────────────────────────────────────────────────
    if config.http.enabled {
        http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            views.deck.clone(),
            command_tx.clone(),
        );
    }

    // ── Console ──────────────────────────────────────────────────────────────
    println!("{}", console::HELP);
    console::spawn_output(views);
    console::spawn_input(command_tx);

    deck_core.run(command_rx, notice_rx).await;

    driver.kill().await;
    tracing::info!("tapedeck stopped");
    Ok(())
}
