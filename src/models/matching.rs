use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{AppError, AppResult};

use super::{RecipeId, RecipeSummary};

/// Minimum match percentage for a recipe to be suggested, restricted to `(0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Threshold(f64);

impl Threshold {
    pub const DEFAULT: Threshold = Threshold(0.5);

    pub fn new(value: f64) -> AppResult<Self> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(AppError::Validation(format!(
                "threshold must be in (0, 1], got {}",
                value
            )))
        }
    }

    /// Validates an optional caller-supplied value, falling back to `default`
    pub fn or_default(value: Option<f64>, default: Threshold) -> AppResult<Self> {
        value.map_or(Ok(default), Self::new)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn admits(&self, match_percentage: f64) -> bool {
        match_percentage >= self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Overlap between one recipe and an inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub recipe_id: RecipeId,
    pub match_percentage: f64,
    #[serde(rename = "matching_ingredients")]
    pub matching: BTreeSet<String>,
    #[serde(rename = "missing_ingredients")]
    pub missing: BTreeSet<String>,
}

/// A ranked match together with the recipe it refers to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    #[serde(flatten)]
    pub recipe: RecipeSummary,
    #[serde(flatten)]
    pub result: MatchResult,
    pub instructions: Vec<String>,
}

/// Ranked suggestions plus the number of recipes the corpus could not provide
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionSet {
    pub recipes: Vec<Suggestion>,
    pub threshold: Threshold,
    pub skipped_recipes: usize,
}
