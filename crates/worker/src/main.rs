use std::sync::Arc;

use atelier_engine::{GenerationPipeline, LocalImageStore, QueueWorker};
use atelier_genai::HttpGenerationService;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_worker=debug,atelier_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;

    let pool = atelier_db::create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    atelier_db::health_check(&pool).await?;
    atelier_db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let service = Arc::new(HttpGenerationService::new(
        config.genai_base_url.clone(),
        config.genai_api_key.clone(),
    ));
    let images = Arc::new(LocalImageStore::new(&config.image_store_root));
    let pipeline = Arc::new(GenerationPipeline::new(pool.clone(), service, images));

    let worker = QueueWorker::new(pool, pipeline);
    let cancel = CancellationToken::new();
    worker.start(cancel.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    cancel.cancel();

    Ok(())
}
