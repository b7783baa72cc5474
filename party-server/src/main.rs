use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

use party_server::config::Config;
use party_server::session::session_sweep_loop;
use party_server::{
    app_router, AppState, Dispatcher, HttpNotifier, LogNotifier, Notifier, PartyService,
    RecordStore, SessionStore, SqliteRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting party finder v{}", party_server::version());

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let db_path = config.database_path();
    info!("Using record database: {}", db_path.display());
    let records: Arc<dyn RecordStore> = Arc::new(
        SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?,
    );

    let notifier: Arc<dyn Notifier> = match &config.relay_url {
        Some(url) => {
            info!("Delivering notifications through relay at {}", url);
            Arc::new(
                HttpNotifier::new(url.clone(), config.relay_token.clone())
                    .context("Failed to build relay client")?,
            )
        }
        None => {
            info!("NOTIFY_RELAY_URL not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    let app_state = Arc::new(AppState {
        service: Arc::new(PartyService::new(records.clone(), sessions.clone())),
        dispatcher: Arc::new(Dispatcher::new(notifier, records)),
        webhook_secret: config.webhook_secret.clone(),
    });

    let app = app_router(app_state);

    let sweep_interval = config.session_sweep_interval;
    tokio::spawn(async move {
        session_sweep_loop(sessions, sweep_interval).await;
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
