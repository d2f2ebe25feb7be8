//! Live-match server.
//!
//! Wires the live-match service to Postgres (or the in-memory store), starts
//! the timer queue, re-arms timers left over from the previous run and serves
//! the HTTP/WebSocket API.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Error};
use live_match::{
    LiveMatch,
    db::{Database, LiveStore, MemoryStore, PgStore},
    events::{InMemoryUserDirectory, PgUserDirectory, UserDirectory},
};
use lm_server::{
    api::{
        self,
        auth::{ClaimsGate, TokenVerifier},
    },
    config::{CliOverrides, ServerConfig},
    logging, metrics,
    storage::LocalPhotoStorage,
};
use pico_args::Arguments;
use tracing::{info, warn};

const HELP: &str = "\
Run the live-match server

USAGE:
  lm_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/live_match]

FLAGS:
  --in-memory              Use the in-memory store (no database, state lost on exit)
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               Access-token signing secret (required, >= 32 chars)
  LIVE_SCHEDULER_ENABLED   Run the timer queue [default: true]
  METRICS_BIND             Prometheus exporter address (disabled when unset)
  PHOTO_DIR                Photo storage directory [default: ./data/photos]
  (See .env.example for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = CliOverrides {
        bind: pargs.opt_value_from_str::<_, SocketAddr>("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        in_memory: pargs.contains("--in-memory"),
    };

    logging::init();

    let config = ServerConfig::from_env(overrides)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(anyhow::Error::msg)?;
        info!("Prometheus exporter listening on {}", addr);
    }

    let (store, directory): (Arc<dyn LiveStore>, Arc<dyn UserDirectory>) = if config.in_memory {
        warn!("Using the in-memory store; state is lost on exit");
        (
            Arc::new(MemoryStore::new()),
            Arc::new(InMemoryUserDirectory::new()),
        )
    } else {
        let db = Database::new(&config.database)
            .await
            .context("Failed to connect to database")?;
        db.ensure_schema().await?;
        info!("Database connected successfully");

        let pool = Arc::new(db.pool().clone());
        (
            Arc::new(PgStore::new(pool.clone())),
            Arc::new(PgUserDirectory::new(pool)),
        )
    };

    let photos = Arc::new(LocalPhotoStorage::new(&config.photos)?);
    photos
        .ensure_dir()
        .await
        .with_context(|| format!("Failed to create {}", config.photos.dir.display()))?;

    let builder = LiveMatch::builder(store, directory, photos.clone()).config(config.live.clone());
    let (live, timer) = if config.scheduler_enabled {
        let (live, timer) = builder.spawn();
        (live, Some(timer))
    } else {
        warn!("Scheduler disabled: sessions will not expire and matches will not auto-decline");
        (builder.build_degraded(), None)
    };

    let report = live.recover().await?;
    info!(
        "Recovered {} active session(s) and {} pending match(es)",
        report.sessions, report.pending_matches
    );

    metrics::spawn_event_metrics(live.events());

    let state = api::AppState {
        live,
        tokens: Arc::new(TokenVerifier::new(&config.security.jwt_secret)),
        gate: Arc::new(ClaimsGate),
        photos,
    };
    let app = api::create_router(state);

    info!("Starting HTTP/WebSocket server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    if let Some(timer) = timer {
        timer.shutdown().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
}
