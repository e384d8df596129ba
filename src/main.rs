mod api;
mod config;
mod detector;
mod dispatch;
mod error;
mod scoreboard;
mod state;
mod supervisor;
mod telegram;
mod types;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::detector::DeltaEngine;
use crate::dispatch::{Dispatcher, MaintainerChannel};
use crate::error::Result;
use crate::scoreboard::HttpScoreboard;
use crate::state::{SqliteStateStore, StateStore};
use crate::supervisor::Supervisor;
use crate::telegram::{ChatTransport, Listener, TelegramClient};
use crate::types::Severity;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Transport + maintainer channel first, so later startup faults get reported ---
    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramClient::new(
        &cfg.telegram_api_url,
        &cfg.bot_token,
        cfg.send_timeout,
    )?);
    let maintainer = Arc::new(MaintainerChannel::new(
        Arc::clone(&transport),
        cfg.maintainer_chat_id,
    ));
    if !maintainer.is_enabled() {
        warn!("MAINTAINER_CHAT_ID not set, debug notifications disabled");
    }

    match start(&cfg, transport, Arc::clone(&maintainer)).await {
        Ok(()) => {
            maintainer.send(Severity::Debug, "Bot stopped").await;
            info!("Bot stopped");
            Ok(())
        }
        Err(e) => {
            maintainer
                .send(Severity::Error, format!("Startup failed: {e}"))
                .await;
            Err(e)
        }
    }
}

async fn start(
    cfg: &Config,
    transport: Arc<dyn ChatTransport>,
    maintainer: Arc<MaintainerChannel>,
) -> Result<()> {
    // --- Database setup ---
    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open(&cfg.db_path).await?);

    // --- Shared state restored from the store ---
    let dispatcher = Arc::new(
        Dispatcher::load(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::clone(&maintainer),
            cfg.send_delay,
        )
        .await?,
    );
    let engine = Arc::new(
        DeltaEngine::load(Arc::clone(&store), cfg.tracked_entity.clone(), cfg.numeric_ranks)
            .await?,
    );
    match &cfg.tracked_entity {
        Some(t) => info!("Tracking scoreboard row matching {:?}", t.matchers),
        None => info!("TRACKED_ENTITY not set, rank tracking disabled"),
    }
    let source = Arc::new(HttpScoreboard::new(cfg.scoreboard_url.clone(), cfg.send_timeout)?);
    let times_page = Arc::new(HttpScoreboard::new(
        cfg.scoreboard_html_url.clone(),
        cfg.send_timeout,
    )?);
    let health = Arc::new(HealthState::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // --- Spawn tasks ---

    // Inbound messages (onboarding, /status, /times, liveness replies)
    let listener = Listener::new(
        Arc::clone(&transport),
        Arc::clone(&dispatcher),
        Arc::clone(&engine),
        Arc::clone(&store),
        times_page,
        shutdown_rx.clone(),
    );
    let listener_task = tokio::spawn(async move { listener.run().await });

    // HTTP API server
    if cfg.api_port != 0 {
        let app = router(ApiState {
            health: Arc::clone(&health),
            dispatcher: Arc::clone(&dispatcher),
            engine: Arc::clone(&engine),
            store: Arc::clone(&store),
        });
        let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
        let tcp = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!("HTTP API listening on {bind_addr}");
        let mut api_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let serve = axum::serve(tcp, app).with_graceful_shutdown(async move {
                let _ = api_shutdown.changed().await;
            });
            if let Err(e) = serve.await {
                error!("HTTP API stopped: {e}");
            }
        });
    }

    // Operator interrupt
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => error!("Cannot listen for interrupt, shutting down: {e}"),
        }
        let _ = shutdown_tx.send(true);
    });

    maintainer.send(Severity::Debug, "Bot started").await;
    info!(
        subscribers = dispatcher.subscriber_count().await,
        interval_secs = cfg.poll_interval.as_secs(),
        "Bot started, polling {}",
        cfg.scoreboard_url
    );

    // Poll loop runs on this task until interrupted
    Supervisor::new(
        source,
        engine,
        dispatcher,
        maintainer,
        health,
        cfg.poll_interval,
        cfg.restart_cooldown,
        shutdown_rx,
    )
    .run()
    .await;

    if let Err(e) = listener_task.await {
        warn!("listener task ended abnormally: {e}");
    }
    Ok(())
}
