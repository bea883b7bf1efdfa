use std::sync::Arc;

use pantry_api::{
    api::{create_router, AppState},
    config::Config,
    db::{
        create_pool, create_redis_client, run_migrations, Cache, CacheWriterHandle, CachedCorpus,
        FavoritesStore, InventoryStore, MemoryStore, PgStore, RecipeCorpus,
    },
    models::sample_recipes,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Stores = (
    Arc<dyn InventoryStore>,
    Arc<dyn FavoritesStore>,
    Arc<dyn RecipeCorpus>,
);

async fn build_stores(config: &Config) -> anyhow::Result<Stores> {
    match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            let store = Arc::new(PgStore::new(pool));
            if config.seed_sample_recipes {
                let seeded = store.seed_recipes(&sample_recipes()).await?;
                if seeded > 0 {
                    tracing::info!(recipes = seeded, "Seeded sample recipes");
                }
            }
            tracing::info!("Using PostgreSQL stores");
            let inventory: Arc<dyn InventoryStore> = store.clone();
            let favorites: Arc<dyn FavoritesStore> = store.clone();
            let corpus: Arc<dyn RecipeCorpus> = store;
            Ok((inventory, favorites, corpus))
        }
        None => {
            let store = Arc::new(if config.seed_sample_recipes {
                MemoryStore::with_recipes(sample_recipes())
            } else {
                MemoryStore::new()
            });
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            let inventory: Arc<dyn InventoryStore> = store.clone();
            let favorites: Arc<dyn FavoritesStore> = store.clone();
            let corpus: Arc<dyn RecipeCorpus> = store;
            Ok((inventory, favorites, corpus))
        }
    }
}

fn wrap_with_cache(
    config: &Config,
    corpus: Arc<dyn RecipeCorpus>,
) -> anyhow::Result<(Arc<dyn RecipeCorpus>, Option<CacheWriterHandle>)> {
    match &config.redis_url {
        Some(url) => {
            let client = create_redis_client(url)?;
            let (cache, writer) = Cache::new(client);
            tracing::info!(ttl = config.corpus_cache_ttl, "Caching the recipe corpus in Redis");
            let cached: Arc<dyn RecipeCorpus> =
                Arc::new(CachedCorpus::new(corpus, cache, config.corpus_cache_ttl));
            Ok((cached, Some(writer)))
        }
        None => Ok((corpus, None)),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pantry_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let threshold = config.threshold()?;

    let (inventory, favorites, corpus) = build_stores(&config).await?;
    let (corpus, cache_writer) = wrap_with_cache(&config, corpus)?;

    let state = AppState::new(
        inventory,
        favorites,
        corpus,
        threshold,
        config.mutation_retries,
    );
    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, threshold = threshold.value(), "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(writer) = cache_writer {
        writer.shutdown().await;
    }

    Ok(())
}
