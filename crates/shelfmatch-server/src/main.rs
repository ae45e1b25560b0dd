mod api;
mod middleware;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use shelfmatch_catalog::CatalogClient;
use shelfmatch_pipeline::MatchDeps;
use shelfmatch_vision::VisionClient;

use crate::api::{build_app, default_rate_limit_state, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = shelfmatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = shelfmatch_db::PoolConfig::from_app_config(&config);
    let pool = shelfmatch_db::connect_pool(&config.database_url, pool_config).await?;
    shelfmatch_db::run_migrations(&pool).await?;

    let retailers = shelfmatch_core::load_retailers(&config.retailers_path)?;
    let registry = Arc::new(shelfmatch_core::RetailerRegistry::from_file(&retailers));

    let catalog = Arc::new(CatalogClient::new(
        &config.catalog_base_url,
        config.catalog_api_key.as_deref(),
        config.catalog_timeout_secs,
        config.match_max_retries,
        config.match_retry_backoff_base_ms,
    )?);
    let vision = Arc::new(VisionClient::new(
        &config.vision_base_url,
        config.vision_api_key.as_deref(),
        config.vision_timeout_secs,
        config.match_max_retries,
        config.match_retry_backoff_base_ms,
    )?);

    let deps = Arc::new(MatchDeps {
        pool: pool.clone(),
        catalog,
        vision,
        strategy: config.match_strategy,
        search_limit: config.catalog_search_limit,
    });

    let state = AppState {
        pool,
        deps,
        registry,
        run_channels: Arc::new(Mutex::new(HashMap::new())),
        default_concurrency: config.match_max_concurrent_items,
    };
    let app = build_app(state, default_rate_limit_state());

    tracing::info!(addr = %config.bind_addr, "shelfmatch server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
