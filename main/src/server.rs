use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    error::AppError,
    utils::config::{get_config, AppConfig},
};
use generation::build_provider;
use retrieval_pipeline::build_retrieval_store;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let app = build_app(&config).await?;

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Resolves the configured backends once and mounts the API under `/api/v1`.
async fn build_app(config: &AppConfig) -> Result<Router, AppError> {
    let store = build_retrieval_store(config).await?;
    let provider = build_provider(config)?;
    info!(
        retrieval_backend = ?config.retrieval_backend,
        generation_provider = provider.provider_name(),
        "Backends initialized"
    );

    let api_state = ApiState::new(config, store, provider)?;

    Ok(Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state))
}
