use std::sync::Arc;

use lumina_api::{
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache, PgStore},
    routes::{cors_layer, create_router},
    services::{llm::build_llm_client, storage::build_file_store},
    AppState, Backends,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumina_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database connection pool created");

    let (cache, cache_writer) = match &config.redis_url {
        Some(url) => match Cache::connect(create_redis_client(url)?).await {
            Ok((cache, handle)) => {
                tracing::info!("Redis analysis cache enabled");
                (Some(cache), Some(handle))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis unreachable, analysis cache disabled");
                (None, None)
            }
        },
        None => {
            tracing::info!("REDIS_URL not set, analysis cache disabled");
            (None, None)
        }
    };

    let llm = build_llm_client(&config)?;
    tracing::info!(backend = llm.name(), model = %config.ollama_model, "LLM client ready");

    let store = Arc::new(PgStore::new(pool));
    let (state, task_worker) = AppState::assemble(
        Backends {
            books: store.clone(),
            borrows: store.clone(),
            reviews: store.clone(),
            preferences: store,
            files: build_file_store(&config),
            llm,
            cache,
        },
        &config,
    );

    let app = create_router(state).layer(cors_layer(&config.allowed_origins_list()));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    task_worker.shutdown().await;
    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
