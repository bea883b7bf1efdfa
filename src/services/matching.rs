use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;

use crate::{
    db::store::{CorpusSnapshot, SkippedRecipe},
    error::{AppError, AppResult},
    models::{normalize_name, MatchResult, Recipe, Threshold},
};

/// Normalizes caller-supplied ingredient names into the matching key space
pub fn normalize_inventory<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| normalize_name(n.as_ref()))
        .filter(|n| !n.is_empty())
        .collect()
}

/// Scores one recipe against a normalized inventory.
///
/// A recipe without requirements scores 0: it is never a perfect match.
/// Inventory entries the recipe does not need have no effect on the score.
pub fn score(recipe: &Recipe, inventory: &BTreeSet<String>) -> MatchResult {
    let required = recipe.required_keys();
    let total = required.len();
    let (matching, missing): (BTreeSet<String>, BTreeSet<String>) =
        required.into_iter().partition(|key| inventory.contains(key));

    let match_percentage = if total == 0 {
        0.0
    } else {
        matching.len() as f64 / total as f64
    };

    MatchResult {
        recipe_id: recipe.id,
        match_percentage,
        matching,
        missing,
    }
}

/// Descending score, then recipe name, then id
fn rank_order(a: &(MatchResult, &Recipe), b: &(MatchResult, &Recipe)) -> Ordering {
    b.0.match_percentage
        .partial_cmp(&a.0.match_percentage)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.1.name.cmp(&b.1.name))
        .then_with(|| a.1.id.cmp(&b.1.id))
}

fn filter_and_rank<'a>(
    candidates: impl Iterator<Item = &'a Recipe>,
    inventory: &BTreeSet<String>,
    threshold: Threshold,
    cancel: &CancellationToken,
) -> AppResult<Vec<(MatchResult, &'a Recipe)>> {
    let mut admitted = Vec::new();
    for recipe in candidates {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let result = score(recipe, inventory);
        if threshold.admits(result.match_percentage) {
            admitted.push((result, recipe));
        }
    }
    admitted.sort_by(rank_order);
    Ok(admitted)
}

/// Scores every recipe, drops those under `threshold`, and ranks the rest.
///
/// `threshold` is validated before any recipe is looked at.
pub fn match_recipes(
    inventory: &BTreeSet<String>,
    corpus: &[Recipe],
    threshold: f64,
) -> AppResult<Vec<MatchResult>> {
    let threshold = Threshold::new(threshold)?;
    let inventory = normalize_inventory(inventory);
    let ranked = filter_and_rank(corpus.iter(), &inventory, threshold, &CancellationToken::new())?;
    Ok(ranked.into_iter().map(|(result, _)| result).collect())
}

/// A corpus snapshot with an ingredient → recipe inverted index
///
/// Built once per corpus version. Only recipes sharing at least one ingredient with
/// the inventory are scored; the rest would score 0 and fall under any threshold.
#[derive(Debug)]
pub struct IndexedCorpus {
    snapshot: CorpusSnapshot,
    index: HashMap<String, Vec<usize>>,
}

impl IndexedCorpus {
    pub fn new(snapshot: CorpusSnapshot) -> Self {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, recipe) in snapshot.recipes.iter().enumerate() {
            for key in recipe.required_keys() {
                index.entry(key).or_default().push(position);
            }
        }

        tracing::debug!(
            version = snapshot.version,
            recipes = snapshot.recipes.len(),
            ingredients = index.len(),
            "Built recipe index"
        );

        Self { snapshot, index }
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.snapshot.recipes
    }

    pub fn skipped(&self) -> &[SkippedRecipe] {
        &self.snapshot.skipped
    }

    /// Positions of recipes that need at least one inventory ingredient
    pub fn candidates(&self, inventory: &BTreeSet<String>) -> BTreeSet<usize> {
        inventory
            .iter()
            .filter_map(|key| self.index.get(key))
            .flatten()
            .copied()
            .collect()
    }

    /// Ranked matches of `inventory` against this corpus
    pub fn rank(
        &self,
        inventory: &BTreeSet<String>,
        threshold: Threshold,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<(MatchResult, &Recipe)>> {
        let inventory = normalize_inventory(inventory);
        let candidates = self.candidates(&inventory);
        tracing::debug!(
            candidates = candidates.len(),
            corpus = self.snapshot.recipes.len(),
            threshold = threshold.value(),
            "Scoring candidate recipes"
        );
        filter_and_rank(
            candidates.into_iter().map(|i| &self.snapshot.recipes[i]),
            &inventory,
            threshold,
            cancel,
        )
    }
}
