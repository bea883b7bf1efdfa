use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{FavoriteEntry, Recipe, RecipeId, RecipeSummary, StoredIngredient, UserId},
};

/// A user's stored ingredients at a given revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorySnapshot {
    pub revision: u64,
    pub items: Vec<StoredIngredient>,
}

/// A recipe the corpus could not read, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecipe {
    pub recipe_id: Option<RecipeId>,
    pub reason: String,
}

/// Immutable view of the corpus at one version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub version: u64,
    pub recipes: Vec<Recipe>,
    pub skipped: Vec<SkippedRecipe>,
}

/// Owner of per-user ingredient lists
///
/// Writes are compare-and-swap on the inventory revision: `save` fails with
/// `AppError::Conflict` when `expected_revision` is no longer current.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Registers a user with an empty inventory
    async fn create_user(&self, user: &UserId) -> AppResult<()>;

    async fn load(&self, user: &UserId) -> AppResult<InventorySnapshot>;

    /// Replaces the inventory and returns the new revision
    async fn save(
        &self,
        user: &UserId,
        expected_revision: u64,
        items: Vec<StoredIngredient>,
    ) -> AppResult<u64>;
}

/// Read-only recipe catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipeCorpus: Send + Sync {
    /// Current corpus revision, cheap to query. Any write to the corpus changes it.
    async fn version(&self) -> AppResult<u64>;

    async fn snapshot(&self) -> AppResult<CorpusSnapshot>;

    async fn get(&self, id: RecipeId) -> AppResult<Option<Recipe>>;

    /// Recipes whose name or description contains `query`, case-insensitively
    async fn search(&self, query: &str) -> AppResult<Vec<RecipeSummary>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .recipes
            .iter()
            .filter(|r| r.matches_query(query))
            .map(Recipe::summary)
            .collect())
    }
}

/// Owner of (user, recipe) bookmarks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    async fn contains(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<bool>;

    /// Inserts the pair; inserting an existing pair is a no-op
    async fn insert(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<()>;

    /// Removes the pair; removing an absent pair is a no-op
    async fn remove(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<()>;

    /// Entries of one user in insertion order
    async fn list(&self, user: &UserId) -> AppResult<Vec<FavoriteEntry>>;
}
