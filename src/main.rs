use burnafterread::{
    config::{AppConfig, CliArgs},
    db::{self, MessageStore},
    sweeper,
    web::{self, AppState, ClientIpResolver},
};
use clap::Parser;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = CliArgs::parse();

    // Configuration decides the log format, so it loads first
    let config = AppConfig::load(&args)?;
    init_logging(config.logging.json);

    info!("Starting BurnAfterRead v{}", env!("CARGO_PKG_VERSION"));

    // Reject bad proxy ranges before touching the database
    let client_ip = ClientIpResolver::from_config(&config.web)?;

    // Initialize database
    let options = SqliteConnectOptions::from_str(&config.database.url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(options)
        .await?;
    info!("Database connected: {}", config.database.url);

    // Run migrations
    db::init_db(&pool).await?;

    let store = MessageStore::new(pool.clone(), config.messages.default_ttl_secs);
    info!("{} messages waiting to be read", store.count().await?);

    // Reclaim expired, unread messages in the background
    let sweeper_handle = sweeper::spawn_sweeper(store.clone(), config.messages.sweep_interval());

    let app = web::create_router(AppState::new(store, client_ip), config.web.max_upload_size);

    let web_addr = config.web.bind_addr();
    let listener = TcpListener::bind(&web_addr).await?;
    info!("Web server listening on http://{}", web_addr);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    sweeper_handle.abort();
    pool.close().await;

    if let Err(e) = served {
        error!("Web server error: {}", e);
        return Err(e.into());
    }

    info!("Shut down cleanly");
    Ok(())
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "burnafterread=info,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
