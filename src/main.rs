use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deni_export::config::{database::PgResource, Settings};
use deni_export::modules::migration::crud::PgChatStore;
use deni_export::services::auth::PgSessionResolver;
use deni_export::services::export::ExportService;
use deni_export::{modules, shutdown, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deni_export=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env().inspect_err(|e| tracing::error!("configuration error: {e}"))?;
    tracing::info!(
        addr = %settings.bind_addr(),
        max_connections = settings.max_connections,
        query_timeout_secs = settings.query_timeout_secs,
        normalize = settings.normalize,
        "starting export service"
    );

    let master = Arc::new(PgResource::master(&settings)?);
    let auth = Arc::new(PgResource::auth(&settings)?);

    let state = AppState {
        export: ExportService::new(
            Arc::new(PgChatStore::new(master.clone())),
            settings.query_timeout(),
            settings.normalize,
        ),
        sessions: Arc::new(PgSessionResolver::new(auth.clone())),
    };

    let app = Router::new()
        .merge(modules::migration::routes::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr()).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal())
        .await?;

    master.shutdown().await;
    auth.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}
