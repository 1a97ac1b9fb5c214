use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ballot=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let mut config = config::Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    ensure_database_dir(&config.database.url);

    let db = ballot_db::create_pool(&config.database.url, config.database.max_connections).await?;
    ballot_db::run_migrations(&db).await?;

    let state = ballot_core::AppState::new(db, config.app_config());

    let app = ballot_api::build_router()
        .merge(ballot_ws::gateway_router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(ballot_api::cors_layer(&config.server.client_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    print_startup_banner(&config);

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        println!();
        tracing::info!("Shutting down...");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Create the parent directory of a file-backed SQLite URL.
fn ensure_database_dir(database_url: &str) {
    let Some(db_path) = database_url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    else {
        return;
    };
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
            }
        }
    }
}

fn print_startup_banner(config: &config::Config) {
    println!();
    println!("  ballot");
    println!();
    println!("  Listening:   http://{}", config.server.bind_address);
    println!("  Gateway:     ws://{}/ws", config.server.bind_address);
    println!("  Client:      {}", config.server.client_origin);
    println!("  Database:    {}", config.database.url);
    if config.realtime.authoritative_broadcasts {
        println!("  Broadcasts:  server-authoritative");
    }
    println!();
}
