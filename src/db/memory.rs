use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{FavoriteEntry, Recipe, RecipeId, StoredIngredient, UserId},
};

use super::store::{
    CorpusSnapshot, FavoritesStore, InventorySnapshot, InventoryStore,
    RecipeCorpus,
};

/// In-process store backing inventories, the corpus and favorites
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    inventories: HashMap<UserId, InventorySnapshot>,
    recipes: BTreeMap<RecipeId, Recipe>,
    /// Bumped on every corpus write
    corpus_revision: u64,
    favorites: Vec<FavoriteEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose corpus holds `recipes`
    pub fn with_recipes(recipes: Vec<Recipe>) -> Self {
        let inner = MemoryStoreInner {
            recipes: recipes.into_iter().map(|r| (r.id, r)).collect(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Adds or replaces a recipe in the corpus
    pub async fn insert_recipe(&self, recipe: Recipe) {
        let mut inner = self.inner.write().await;
        inner.recipes.insert(recipe.id, recipe);
        inner.corpus_revision += 1;
    }

    /// Removes a recipe from the corpus, leaving favorites that point at it
    pub async fn remove_recipe(&self, id: RecipeId) -> Option<Recipe> {
        let mut inner = self.inner.write().await;
        let removed = inner.recipes.remove(&id);
        if removed.is_some() {
            inner.corpus_revision += 1;
        }
        removed
    }
}

impl MemoryStoreInner {
    fn version(&self) -> u64 {
        self.corpus_revision
    }

    fn ensure_user(&self, user: &UserId) -> AppResult<()> {
        if self.inventories.contains_key(user) {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("user '{}'", user)))
        }
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn create_user(&self, user: &UserId) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if inner.inventories.contains_key(user) {
            return Err(AppError::Conflict(format!("user '{}' already exists", user)));
        }
        inner
            .inventories
            .insert(user.clone(), InventorySnapshot::default());
        Ok(())
    }

    async fn load(&self, user: &UserId) -> AppResult<InventorySnapshot> {
        let inner = self.inner.read().await;
        inner
            .inventories
            .get(user)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("user '{}'", user)))
    }

    async fn save(
        &self,
        user: &UserId,
        expected_revision: u64,
        items: Vec<StoredIngredient>,
    ) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        let snapshot = inner
            .inventories
            .get_mut(user)
            .ok_or_else(|| AppError::NotFound(format!("user '{}'", user)))?;

        if snapshot.revision != expected_revision {
            return Err(AppError::Conflict(format!(
                "inventory of '{}' is at revision {}, expected {}",
                user, snapshot.revision, expected_revision
            )));
        }

        snapshot.revision += 1;
        snapshot.items = items;
        Ok(snapshot.revision)
    }
}

#[async_trait]
impl RecipeCorpus for MemoryStore {
    async fn version(&self) -> AppResult<u64> {
        Ok(self.inner.read().await.version())
    }

    async fn snapshot(&self) -> AppResult<CorpusSnapshot> {
        let inner = self.inner.read().await;
        Ok(CorpusSnapshot {
            version: inner.version(),
            recipes: inner.recipes.values().cloned().collect(),
            skipped: Vec::new(),
        })
    }

    async fn get(&self, id: RecipeId) -> AppResult<Option<Recipe>> {
        Ok(self.inner.read().await.recipes.get(&id).cloned())
    }
}

#[async_trait]
impl FavoritesStore for MemoryStore {
    async fn contains(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<bool> {
        let inner = self.inner.read().await;
        inner.ensure_user(user)?;
        Ok(inner
            .favorites
            .iter()
            .any(|f| &f.user == user && f.recipe_id == recipe_id))
    }

    async fn insert(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_user(user)?;
        if !inner
            .favorites
            .iter()
            .any(|f| &f.user == user && f.recipe_id == recipe_id)
        {
            inner.favorites.push(FavoriteEntry {
                user: user.clone(),
                recipe_id,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn remove(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_user(user)?;
        inner
            .favorites
            .retain(|f| !(&f.user == user && f.recipe_id == recipe_id));
        Ok(())
    }

    async fn list(&self, user: &UserId) -> AppResult<Vec<FavoriteEntry>> {
        let inner = self.inner.read().await;
        inner.ensure_user(user)?;
        Ok(inner
            .favorites
            .iter()
            .filter(|f| &f.user == user)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_recipes;

    fn user(name: &str) -> UserId {
        UserId::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_create_user_twice_conflicts() {
        let store = MemoryStore::new();
        store.create_user(&user("alice")).await.unwrap();
        let result = store.create_user(&user("alice")).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_save_checks_revision() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).await.unwrap();

        let revision = store
            .save(&alice, 0, vec![StoredIngredient::Bare("egg".into())])
            .await
            .unwrap();
        assert_eq!(revision, 1);

        let stale = store.save(&alice, 0, vec![]).await;
        assert!(matches!(stale, Err(AppError::Conflict(_))));

        let snapshot = store.load(&alice).await.unwrap();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.items, vec![StoredIngredient::Bare("egg".into())]);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let store = MemoryStore::new();
        let ghost = user("ghost");
        assert!(matches!(store.load(&ghost).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            store.insert(&ghost, RecipeId(1)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corpus_version_tracks_changes() {
        let store = MemoryStore::with_recipes(sample_recipes());
        let before = store.version().await.unwrap();
        assert_eq!(store.snapshot().await.unwrap().version, before);

        let mut extra = sample_recipes().remove(0);
        extra.id = RecipeId(3);
        store.insert_recipe(extra).await;
        let added = store.version().await.unwrap();
        assert_ne!(added, before);

        let mut replaced = sample_recipes().remove(1);
        replaced.id = RecipeId(3);
        store.insert_recipe(replaced).await;
        assert_ne!(store.version().await.unwrap(), added);

        let unchanged = store.version().await.unwrap();
        assert!(store.remove_recipe(RecipeId(99)).await.is_none());
        assert_eq!(store.version().await.unwrap(), unchanged);
    }

    #[tokio::test]
    async fn test_default_search() {
        let store = MemoryStore::with_recipes(sample_recipes());
        let found = store.search("eggs").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Scrambled Eggs");
    }

    #[tokio::test]
    async fn test_favorites_keep_insertion_order() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).await.unwrap();

        store.insert(&alice, RecipeId(2)).await.unwrap();
        store.insert(&alice, RecipeId(1)).await.unwrap();
        store.insert(&alice, RecipeId(2)).await.unwrap();

        let ids: Vec<_> = store
            .list(&alice)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.recipe_id)
            .collect();
        assert_eq!(ids, vec![RecipeId(2), RecipeId(1)]);

        store.remove(&alice, RecipeId(2)).await.unwrap();
        assert!(!store.contains(&alice, RecipeId(2)).await.unwrap());
    }
}
