use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    db::store::{FavoritesStore, RecipeCorpus},
    error::{AppError, AppResult},
    models::{FavoriteState, Recipe, RecipeId, UserId},
    services::locks::KeyedLocks,
};

/// A recipe as shown in the detail view, with its favorite status
#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    pub recipe: Recipe,
    pub favorite: FavoriteState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Toggle and list bookmarks, joined against the corpus
pub struct FavoritesIndex {
    store: Arc<dyn FavoritesStore>,
    corpus: Arc<dyn RecipeCorpus>,
    locks: KeyedLocks<(UserId, RecipeId)>,
}

impl FavoritesIndex {
    pub fn new(store: Arc<dyn FavoritesStore>, corpus: Arc<dyn RecipeCorpus>) -> Self {
        Self {
            store,
            corpus,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn is_favorite(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<bool> {
        self.store.contains(user, recipe_id).await
    }

    /// Flips the favorite state of `recipe_id` for `user` and returns the new state
    pub async fn toggle(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<bool> {
        if self.corpus.get(recipe_id).await?.is_none() {
            return Err(AppError::NotFound(format!("recipe {}", recipe_id)));
        }

        let _guard = self.locks.lock(&(user.clone(), recipe_id)).await;

        let now_favorite = if self.store.contains(user, recipe_id).await? {
            self.store.remove(user, recipe_id).await?;
            false
        } else {
            self.store.insert(user, recipe_id).await?;
            true
        };

        tracing::info!(user = %user, recipe_id = %recipe_id, favorite = now_favorite, "Favorite toggled");
        Ok(now_favorite)
    }

    /// Favorite recipes of `user` in the order they were added.
    ///
    /// Bookmarks whose recipe has left the corpus are omitted.
    pub async fn list(&self, user: &UserId) -> AppResult<Vec<Recipe>> {
        let entries = self.store.list(user).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.corpus.snapshot().await?;
        let by_id: HashMap<RecipeId, &Recipe> =
            snapshot.recipes.iter().map(|r| (r.id, r)).collect();

        let recipes: Vec<Recipe> = entries
            .iter()
            .filter_map(|entry| by_id.get(&entry.recipe_id).map(|r| (*r).clone()))
            .collect();

        let omitted = entries.len() - recipes.len();
        if omitted > 0 {
            tracing::debug!(user = %user, omitted, "Favorites reference recipes missing from the corpus");
        }

        Ok(recipes)
    }

    /// Loads a recipe for the detail view and resolves its favorite state.
    ///
    /// Anonymous viewers see `NotFavorite`. A failing favorites lookup does not fail
    /// the view; it yields `NotFavorite` with a warning.
    pub async fn recipe_detail(
        &self,
        user: Option<&UserId>,
        recipe_id: RecipeId,
    ) -> AppResult<RecipeDetail> {
        let recipe = self
            .corpus
            .get(recipe_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("recipe {}", recipe_id)))?;

        let (favorite, warning) = match user {
            Some(user) => {
                FavoriteState::Unknown.resolve(self.is_favorite(user, recipe_id).await)
            }
            None => (FavoriteState::NotFavorite, None),
        };

        Ok(RecipeDetail {
            recipe,
            favorite,
            warning,
        })
    }

    /// Toggles the recipe shown in `detail`; on failure `detail` is left as it was
    pub async fn toggle_detail(
        &self,
        user: &UserId,
        detail: &mut RecipeDetail,
    ) -> AppResult<FavoriteState> {
        let outcome = self.toggle(user, detail.recipe.id).await;
        let next = detail.favorite.after_toggle(outcome)?;
        detail.favorite = next;
        detail.warning = None;
        Ok(next)
    }
}
