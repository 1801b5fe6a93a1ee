mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use flyerwise_core::ScoringConfig;
use flyerwise_db::{
    PgCatalogReader, PgSessionStore, PgShoppingListStore, PgSimilaritySearch, PgSnapshotStore,
};
use flyerwise_wizard::{Capabilities, SystemClock, WizardManager};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(flyerwise_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = flyerwise_db::PoolConfig::from_app_config(&config);
    let pool = flyerwise_db::connect_pool(&config.database_url, pool_config).await?;
    flyerwise_db::run_migrations(&pool).await?;

    let scoring = match &config.scoring_path {
        Some(path) => flyerwise_core::load_scoring(path)?,
        None => ScoringConfig::default(),
    };
    let session_ttl = chrono::Duration::seconds(i64::try_from(config.session_ttl_secs)?);
    let completed_retention =
        chrono::Duration::seconds(i64::try_from(config.completed_retention_secs)?);
    let wizard = Arc::new(
        WizardManager::new(pg_capabilities(&pool), Arc::new(scoring), session_ttl)
            .with_completed_retention(completed_retention),
    );

    let _scheduler = scheduler::build_scheduler(Arc::clone(&wizard), Arc::clone(&config)).await?;

    let auth = AuthState::from_env(matches!(
        config.env,
        flyerwise_core::Environment::Development
    ))?;
    let app = build_app(AppState { pool, wizard }, auth, default_rate_limit_state());

    tracing::info!(bind_addr = %config.bind_addr, env = %config.env, "flyerwise server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn pg_capabilities(pool: &PgPool) -> Capabilities {
    Capabilities {
        search: Arc::new(PgSimilaritySearch::new(pool.clone())),
        sessions: Arc::new(PgSessionStore::new(pool.clone())),
        lists: Arc::new(PgShoppingListStore::new(pool.clone())),
        catalog: Arc::new(PgCatalogReader::new(pool.clone())),
        snapshots: Arc::new(PgSnapshotStore::new(pool.clone())),
        clock: Arc::new(SystemClock),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
