mod auth;
mod chat;
mod db;
mod directory;
mod error;
mod extract;
mod middleware;
mod routes;
mod state;
mod stats;
#[cfg(test)]
mod testing;
mod websocket;

use anyhow::Context;
use chat::{ChatService, PgChatRepository};
use db::{create_pool, run_migrations};
use directory::PgDirectoryRepository;
use routes::create_router;
use state::{AppState, Config};
use stats::{PgStatsRepository, StatsService};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clinic_chat=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    // Sanitize URL for logging (hide password)
    let url_for_logging = config
        .database_url
        .rsplit('@')
        .next()
        .map(|host| format!("<hidden>@{}", host))
        .unwrap_or_else(|| "<invalid format>".to_string());

    tracing::info!("Connecting to database at {}...", url_for_logging);
    let db = create_pool(&config.database_url, config.database_max_connections)
        .await
        .with_context(|| format!("failed to connect to database at {}", url_for_logging))?;

    tracing::info!("Running migrations...");
    run_migrations(&db).await?;

    let ws_connections = websocket::ConnectionManager::new();

    let directory = Arc::new(PgDirectoryRepository::new(db.clone()));
    let chat_repository = Arc::new(PgChatRepository::new(db.clone()));
    let stats_repository = Arc::new(PgStatsRepository::new(db.clone()));

    let chat_service = ChatService::new(chat_repository, directory.clone(), ws_connections.clone());
    let stats_service = StatsService::new(stats_repository);

    let state = AppState {
        config: config.clone(),
        ws_connections,
        directory,
        chat_service,
        stats_service,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
