use std::sync::Arc;

use crate::{
    db::{FavoritesStore, InventoryStore, MemoryStore, RecipeCorpus},
    models::{sample_recipes, Threshold},
    services::{ChatService, FavoritesIndex, InventoryCoordinator, SuggestionService},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<InventoryCoordinator>,
    pub corpus: Arc<dyn RecipeCorpus>,
    pub favorites: Arc<FavoritesIndex>,
    pub suggestions: Arc<SuggestionService>,
    pub chat: Arc<ChatService>,
    pub default_threshold: Threshold,
}

impl AppState {
    /// Wires the services over the given stores
    pub fn new(
        inventory_store: Arc<dyn InventoryStore>,
        favorites_store: Arc<dyn FavoritesStore>,
        corpus: Arc<dyn RecipeCorpus>,
        default_threshold: Threshold,
        mutation_retries: u32,
    ) -> Self {
        let suggestions = Arc::new(SuggestionService::new(corpus.clone()));
        let inventory = Arc::new(InventoryCoordinator::new(inventory_store, mutation_retries));

        Self {
            favorites: Arc::new(FavoritesIndex::new(favorites_store, corpus.clone())),
            chat: Arc::new(ChatService::new(suggestions.clone(), inventory.clone())),
            inventory,
            suggestions,
            corpus,
            default_threshold,
        }
    }

    /// State backed by a single in-memory store holding the sample recipes
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::with_recipes(sample_recipes()));
        Self::new(store.clone(), store.clone(), store, Threshold::DEFAULT, 3)
    }
}
