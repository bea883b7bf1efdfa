pub mod memory;
pub mod postgres;
pub mod redis;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::{create_pool, run_migrations, PgStore};
pub use redis::{create_redis_client, Cache, CacheKey, CacheWriterHandle, CachedCorpus};
pub use store::{
    CorpusSnapshot, FavoritesStore, InventorySnapshot, InventoryStore, RecipeCorpus,
    SkippedRecipe,
};
