use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use happybeauty_server::auth::TokenVerifier;
use happybeauty_server::config::Settings;
use happybeauty_server::config_store::{ConfigCache, ConfigStore};
use happybeauty_server::retry::RetryPolicy;
use happybeauty_server::store::PgStore;
use happybeauty_server::{create_router, db, AppState, Clock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("happybeauty_server=info,tower_http=info")),
        )
        .init();

    let pool = db::create_pool(&settings.database_url)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let store = Arc::new(PgStore::new(pool));
    let config = ConfigStore::new(
        store.clone(),
        settings.config_defaults.clone(),
        Arc::new(ConfigCache::new()),
    );
    let state = AppState::new(
        store,
        Arc::new(config),
        TokenVerifier::new(&settings.jwt_secret, &settings.jwt_audience),
        RetryPolicy::default(),
        Clock::System,
    );

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    tracing::info!(addr = %settings.bind_addr, "HappyBeauty server listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
