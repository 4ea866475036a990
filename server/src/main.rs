use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;

use common::clock::Clock;
use common::logger::init_logger;
use engine::Engine;
use server::config::AppConfig;
use server::routes::{self, AppState};
use session::{SessionManager, password};
use store::{Config, Document, DocumentStore, FileStore, Role};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logger("gpu-auction");

    let cfg = AppConfig::from_env();
    if let Err(e) = run(cfg).await {
        tracing::error!(error = ?e, "fatal error");
        std::process::exit(1);
    }
}

async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&cfg.data_dir).await?;
    let store = Arc::new(FileStore::new(cfg.data_dir.join("state.json")));

    // A corrupt document is fatal; a missing one bootstraps.
    let doc = match store.load().await {
        Ok(Some(doc)) => {
            tracing::info!(
                version = doc.version,
                users = doc.users.len(),
                days = doc.days.len(),
                "state document loaded"
            );
            doc
        }
        Ok(None) => {
            tracing::info!("no state document found; bootstrapping a fresh one");
            Document::bootstrap(Config::default())
        }
        Err(e) => return Err(e.context("failed to load state document")),
    };

    let tz_name = cfg
        .timezone_override
        .clone()
        .unwrap_or_else(|| doc.config.timezone.clone());
    let tz = Tz::from_str(&tz_name)
        .map_err(|_| anyhow::anyhow!("invalid timezone {tz_name:?}"))?;
    let clock = Clock::system(tz, doc.config.transition_hour);

    let session_ttl = doc.config.session_ttl_seconds;
    let needs_admin = doc.users.is_empty();

    let engine = Arc::new(Engine::new(doc, store, clock));

    if needs_admin {
        let admin_password = password::generate_password();
        let salt = password::generate_salt();
        let hash = password::hash_password(&salt, &admin_password);
        engine
            .create_user("admin", &hash, &salt, Role::Admin, 10)
            .await?;
        tracing::warn!(
            username = "admin",
            password = %admin_password,
            "bootstrap admin created; change this password"
        );
    }

    // Catch up before accepting traffic.
    engine.tick().await?;

    let sessions = Arc::new(SessionManager::new(session_ttl));
    if cfg.monitor_token.is_none() {
        tracing::warn!("GPU_MONITOR_TOKEN unset; usage ingest is disabled");
    }

    spawn_lifecycle_timer(engine.clone());
    spawn_session_gc(sessions.clone());

    let state = AppState {
        engine,
        sessions,
        monitor_token: cfg.monitor_token.clone(),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port))
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind port {}: {e}", cfg.port))?;
    tracing::info!(port = cfg.port, timezone = %tz_name, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Drives the day state machine even when no requests arrive. Calls the
/// engine directly, never the HTTP layer.
fn spawn_lifecycle_timer(engine: Arc<Engine>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            if let Err(e) = engine.tick().await {
                tracing::error!(error = %e, "lifecycle tick failed");
            }
        }
    });
}

fn spawn_session_gc(sessions: Arc<SessionManager>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            sessions.gc(chrono::Utc::now()).await;
        }
    });
}
