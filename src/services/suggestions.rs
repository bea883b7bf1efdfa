use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{
    db::store::RecipeCorpus,
    error::{AppError, AppResult},
    models::{Inventory, Suggestion, SuggestionSet, Threshold},
    services::{
        chat::extract,
        matching::IndexedCorpus,
    },
};

/// Suggestions for a chat message, with the terms pulled out of it
#[derive(Debug, Clone, Serialize)]
pub struct ChatSuggestions {
    pub extracted: BTreeSet<String>,
    #[serde(flatten)]
    pub suggestions: SuggestionSet,
}

/// Ranks the corpus against ingredient sets
///
/// Keeps the inverted index of the latest corpus version and rebuilds it only when
/// the corpus reports a new version.
pub struct SuggestionService {
    corpus: Arc<dyn RecipeCorpus>,
    indexed: RwLock<Option<Arc<IndexedCorpus>>>,
}

impl SuggestionService {
    pub fn new(corpus: Arc<dyn RecipeCorpus>) -> Self {
        Self {
            corpus,
            indexed: RwLock::new(None),
        }
    }

    async fn indexed_corpus(&self) -> AppResult<Arc<IndexedCorpus>> {
        let version = self.corpus.version().await?;
        if let Some(indexed) = self.indexed.read().await.as_ref() {
            if indexed.version() == version {
                return Ok(indexed.clone());
            }
        }

        let mut slot = self.indexed.write().await;
        if let Some(indexed) = slot.as_ref() {
            if indexed.version() == version {
                return Ok(indexed.clone());
            }
        }

        let snapshot = self.corpus.snapshot().await?;
        if !snapshot.skipped.is_empty() {
            tracing::warn!(
                version = snapshot.version,
                skipped = snapshot.skipped.len(),
                "Corpus snapshot is missing unreadable recipes"
            );
        }
        let indexed = Arc::new(
            tokio::task::spawn_blocking(move || IndexedCorpus::new(snapshot))
                .await
                .map_err(|e| AppError::Internal(format!("index build failed: {}", e)))?,
        );
        *slot = Some(indexed.clone());
        Ok(indexed)
    }

    /// Ranked recipes for `inventory`, keeping those at or above `threshold`.
    ///
    /// Scoring runs off the async runtime. If the caller stops waiting, the scan is
    /// cancelled before the next recipe.
    pub async fn suggest(
        &self,
        inventory: &BTreeSet<String>,
        threshold: Threshold,
    ) -> AppResult<SuggestionSet> {
        self.suggest_cancellable(inventory, threshold, CancellationToken::new())
            .await
    }

    /// Same as [`suggest`](Self::suggest), scanning under the caller's `token`.
    ///
    /// `token` is cancelled when this future is dropped before it completes.
    pub async fn suggest_cancellable(
        &self,
        inventory: &BTreeSet<String>,
        threshold: Threshold,
        token: CancellationToken,
    ) -> AppResult<SuggestionSet> {
        let guard = token.clone().drop_guard();
        let started = Instant::now();
        let indexed = self.indexed_corpus().await?;
        let skipped_recipes = indexed.skipped().len();

        let inventory = inventory.clone();
        let scan = indexed.clone();
        let recipes = tokio::task::spawn_blocking(move || {
            scan.rank(&inventory, threshold, &token).map(|ranked| {
                ranked
                    .into_iter()
                    .map(|(result, recipe)| Suggestion {
                        recipe: recipe.summary(),
                        result,
                        instructions: recipe.instructions.clone(),
                    })
                    .collect::<Vec<_>>()
            })
        })
        .await
        .map_err(|e| AppError::Internal(format!("suggestion scan failed: {}", e)))??;
        guard.disarm();

        tracing::info!(
            version = indexed.version(),
            threshold = threshold.value(),
            results = recipes.len(),
            skipped = skipped_recipes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Suggestions computed"
        );

        Ok(SuggestionSet {
            recipes,
            threshold,
            skipped_recipes,
        })
    }

    /// Extracts ingredients from `text` and ranks recipes for them.
    ///
    /// When `inventory` is given its ingredients are matched together with the
    /// extracted ones.
    pub async fn chat_suggest(
        &self,
        text: &str,
        inventory: Option<&Inventory>,
        threshold: Threshold,
    ) -> AppResult<ChatSuggestions> {
        let extracted = extract(text);
        if extracted.is_empty() {
            return Err(AppError::Validation(
                "message contains no ingredients".to_string(),
            ));
        }

        let mut terms = extracted.clone();
        if let Some(inventory) = inventory {
            terms.extend(inventory.keys());
        }

        let suggestions = self.suggest(&terms, threshold).await?;
        Ok(ChatSuggestions {
            extracted,
            suggestions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{CorpusSnapshot, MockRecipeCorpus, SkippedRecipe};
    use crate::db::MemoryStore;
    use crate::models::{sample_recipes, Recipe, RecipeId, RequiredIngredient};
    use tokio_test::{assert_pending, task::spawn};

    fn recipe(id: i64, name: &str, required: &[&str]) -> Recipe {
        Recipe {
            id: RecipeId(id),
            name: name.to_string(),
            description: None,
            required: required.iter().map(|r| RequiredIngredient::named(*r)).collect(),
            instructions: vec!["Combine.".to_string()],
            prep_time: None,
            cook_time: None,
            servings: None,
            difficulty: None,
            image_url: None,
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn service(recipes: Vec<Recipe>) -> SuggestionService {
        SuggestionService::new(Arc::new(MemoryStore::with_recipes(recipes)))
    }

    #[tokio::test]
    async fn test_partial_match_carries_metadata() {
        let service = service(vec![recipe(1, "Egg Toast", &["egg", "bread", "avocado"])]);
        let result = service
            .suggest(&set(&["egg", "bread"]), Threshold::DEFAULT)
            .await
            .unwrap();

        assert_eq!(result.recipes.len(), 1);
        let suggestion = &result.recipes[0];
        assert_eq!(suggestion.recipe.name, "Egg Toast");
        assert!((suggestion.result.match_percentage - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(suggestion.result.missing, set(&["avocado"]));
        assert_eq!(suggestion.instructions, vec!["Combine."]);
    }

    #[tokio::test]
    async fn test_threshold_drops_low_scores() {
        let service = service(vec![
            recipe(1, "Third", &["a", "x", "y"]),
            recipe(2, "Three Fifths", &["a", "b", "c", "x", "y"]),
        ]);
        let result = service
            .suggest(&set(&["b", "c", "x"]), Threshold::new(0.5).unwrap())
            .await
            .unwrap();

        let names: Vec<_> = result.recipes.iter().map(|s| s.recipe.name.as_str()).collect();
        assert_eq!(names, vec!["Three Fifths"]);
    }

    #[tokio::test]
    async fn test_recipe_without_requirements_never_suggested() {
        let service = service(vec![recipe(1, "Water", &[])]);
        let result = service
            .suggest(&set(&["water"]), Threshold::new(0.01).unwrap())
            .await
            .unwrap();
        assert!(result.recipes.is_empty());
    }

    #[tokio::test]
    async fn test_index_reused_while_version_unchanged() {
        let mut corpus = MockRecipeCorpus::new();
        corpus.expect_version().times(2).returning(|| Ok(7));
        corpus.expect_snapshot().times(1).returning(|| {
            Ok(CorpusSnapshot {
                version: 7,
                recipes: sample_recipes(),
                skipped: vec![],
            })
        });

        let service = SuggestionService::new(Arc::new(corpus));
        let inventory = set(&["bread", "avocado"]);
        service.suggest(&inventory, Threshold::DEFAULT).await.unwrap();
        let second = service.suggest(&inventory, Threshold::DEFAULT).await.unwrap();
        assert_eq!(second.recipes[0].recipe.name, "Avocado Toast");
    }

    #[tokio::test]
    async fn test_replaced_recipe_is_rescored() {
        let store = Arc::new(MemoryStore::with_recipes(vec![recipe(1, "Rice Bowl", &["rice"])]));
        let service = SuggestionService::new(store.clone());
        let inventory = set(&["rice"]);

        let before = service.suggest(&inventory, Threshold::DEFAULT).await.unwrap();
        assert_eq!(before.recipes.len(), 1);

        store.insert_recipe(recipe(1, "Toast", &["bread"])).await;
        let after = service.suggest(&inventory, Threshold::DEFAULT).await.unwrap();
        assert!(after.recipes.is_empty());

        let bread = service.suggest(&set(&["bread"]), Threshold::DEFAULT).await.unwrap();
        assert_eq!(bread.recipes[0].recipe.name, "Toast");
    }

    #[tokio::test]
    async fn test_dropped_request_cancels_scan() {
        let recipes: Vec<_> = (1..=20_000)
            .map(|i| {
                let unique = format!("spice-{}", i);
                recipe(i, &format!("Dish {}", i), &["salt", unique.as_str()])
            })
            .collect();
        let service = service(recipes);
        let inventory = set(&["salt"]);
        let token = CancellationToken::new();

        let mut request = spawn(service.suggest_cancellable(
            &inventory,
            Threshold::DEFAULT,
            token.clone(),
        ));
        assert_pending!(request.poll());
        assert!(!token.is_cancelled());

        drop(request);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_completed_request_leaves_token_alone() {
        let service = service(sample_recipes());
        let token = CancellationToken::new();
        service
            .suggest_cancellable(&set(&["bread"]), Threshold::DEFAULT, token.clone())
            .await
            .unwrap();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_index_rebuilt_after_corpus_change() {
        let store = Arc::new(MemoryStore::with_recipes(sample_recipes()));
        let service = SuggestionService::new(store.clone());
        let inventory = set(&["rice"]);

        let before = service.suggest(&inventory, Threshold::DEFAULT).await.unwrap();
        assert!(before.recipes.is_empty());

        store.insert_recipe(recipe(3, "Plain Rice", &["rice"])).await;
        let after = service.suggest(&inventory, Threshold::DEFAULT).await.unwrap();
        assert_eq!(after.recipes.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_corpus_reports_skipped_count() {
        let mut corpus = MockRecipeCorpus::new();
        corpus.expect_version().returning(|| Ok(1));
        corpus.expect_snapshot().returning(|| {
            Ok(CorpusSnapshot {
                version: 1,
                recipes: vec![recipe(1, "Plain Toast", &["bread"])],
                skipped: vec![SkippedRecipe {
                    recipe_id: Some(RecipeId(2)),
                    reason: "ingredients column is not valid".to_string(),
                }],
            })
        });

        let service = SuggestionService::new(Arc::new(corpus));
        let result = service
            .suggest(&set(&["bread"]), Threshold::DEFAULT)
            .await
            .unwrap();
        assert_eq!(result.recipes.len(), 1);
        assert_eq!(result.skipped_recipes, 1);
    }

    #[tokio::test]
    async fn test_unavailable_corpus_is_upstream_error() {
        let mut corpus = MockRecipeCorpus::new();
        corpus
            .expect_version()
            .returning(|| Err(AppError::Upstream("corpus offline".into())));
        corpus.expect_snapshot().never();

        let service = SuggestionService::new(Arc::new(corpus));
        let result = service.suggest(&set(&["bread"]), Threshold::DEFAULT).await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_chat_suggest_extracts_terms() {
        let service = service(sample_recipes());
        let result = service
            .chat_suggest("avocado, bread, , Avocado, salt", None, Threshold::DEFAULT)
            .await
            .unwrap();

        assert_eq!(result.extracted, set(&["avocado", "bread", "salt"]));
        assert_eq!(result.suggestions.recipes.len(), 1);
        assert_eq!(result.suggestions.recipes[0].recipe.name, "Avocado Toast");
    }

    #[tokio::test]
    async fn test_chat_suggest_merges_inventory() {
        let service = service(sample_recipes());
        let mut inventory = Inventory::default();
        inventory.add("salt").unwrap();
        inventory.add("pepper").unwrap();

        let without = service
            .chat_suggest("eggs", None, Threshold::DEFAULT)
            .await
            .unwrap();
        assert!(without.suggestions.recipes.is_empty());

        let with = service
            .chat_suggest("eggs", Some(&inventory), Threshold::DEFAULT)
            .await
            .unwrap();
        assert_eq!(with.extracted, set(&["eggs"]));
        assert_eq!(with.suggestions.recipes[0].recipe.name, "Scrambled Eggs");
    }

    #[tokio::test]
    async fn test_chat_suggest_rejects_blank_input() {
        let service = service(sample_recipes());
        let result = service.chat_suggest(" , ,", None, Threshold::DEFAULT).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
