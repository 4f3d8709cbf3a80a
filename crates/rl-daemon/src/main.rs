//! rl-daemon entry point.
//!
//! Thin on purpose: tracing, config, database, service start, HTTP server.
//! Route handlers live in `routes.rs`; lifecycle wiring in `service.rs`.

use std::net::SocketAddr;

use anyhow::Context;
use axum::http::Method;
use rl_config::{report_unused_keys, secrets::resolve_secrets, ListenerConfig, UnusedKeyPolicy};
use rl_daemon::service::{Backends, Service};
use rl_db::PgStore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = rl_config::load_from_env().context("config load failed")?;
    report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    let cfg = ListenerConfig::from_config_json(&loaded.config_json)?;
    info!(config_hash = %loaded.config_hash, service = %cfg.service.name, "config loaded");

    let secrets = resolve_secrets(&cfg)?;
    let pool = rl_db::connect(&secrets.database_url, cfg.database.max_connections).await?;
    rl_db::migrate(&pool).await?;

    let store = PgStore::new(pool, cfg.admission.quota_timeout);
    let service = Service::start(&cfg, Backends::postgres(store)).await?;

    let app = service
        .router()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        );

    let addr: SocketAddr = cfg
        .service
        .bind_addr
        .parse()
        .with_context(|| format!("invalid service.bind_addr '{}'", cfg.service.bind_addr))?;
    info!("rl-daemon listening on http://{}", addr);

    // Firing the service shutdown first closes feed sockets, which lets the
    // graceful drain finish instead of waiting on long-lived upgrades.
    let trigger = service.shutdown_trigger();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            info!("shutdown requested");
            trigger.fire();
        })
        .await
        .context("server crashed")?;

    service.stop().await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
