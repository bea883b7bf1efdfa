use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt::Display, str::FromStr};

use crate::error::AppError;

use super::normalize_name;

/// Identifier of a recipe in the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeId(pub i64);

impl Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecipeId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(RecipeId(id)),
            _ => Err(AppError::Validation(format!("malformed recipe id '{}'", s))),
        }
    }
}

/// One line of a recipe's ingredient list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredIngredient {
    #[serde(rename = "ingredient")]
    pub name: String,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl RequiredIngredient {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: None,
            unit: None,
        }
    }
}

/// A recipe as held by the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "ingredients")]
    pub required: Vec<RequiredIngredient>,
    pub instructions: Vec<String>,
    #[serde(default, rename = "preparation_time")]
    pub prep_time: Option<u32>,
    #[serde(default, rename = "cooking_time")]
    pub cook_time: Option<u32>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Recipe {
    /// Normalized, de-duplicated required ingredient names
    pub fn required_keys(&self) -> BTreeSet<String> {
        self.required
            .iter()
            .map(|r| normalize_name(&r.name))
            .filter(|key| !key.is_empty())
            .collect()
    }

    pub fn summary(&self) -> RecipeSummary {
        RecipeSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            prep_time: self.prep_time,
            cook_time: self.cook_time,
            servings: self.servings,
            difficulty: self.difficulty.clone(),
            image_url: self.image_url.clone(),
        }
    }

    /// Case-insensitive substring match on name or description
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    }
}

/// Recipe metadata without ingredients or steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: RecipeId,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "preparation_time")]
    pub prep_time: Option<u32>,
    #[serde(rename = "cooking_time")]
    pub cook_time: Option<u32>,
    pub servings: Option<u32>,
    pub difficulty: Option<String>,
    pub image_url: Option<String>,
}

/// Splits newline-separated instruction text into steps, dropping blank lines
pub fn split_instructions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// The recipes shipped with a fresh installation
pub fn sample_recipes() -> Vec<Recipe> {
    let recipe = |id: i64, name: &str, description: &str, steps: &str, ingredients: &[&str]| Recipe {
        id: RecipeId(id),
        name: name.to_string(),
        description: Some(description.to_string()),
        required: ingredients.iter().map(|i| RequiredIngredient::named(*i)).collect(),
        instructions: split_instructions(steps),
        prep_time: None,
        cook_time: None,
        servings: None,
        difficulty: None,
        image_url: None,
    };

    vec![
        recipe(
            1,
            "Avocado Toast",
            "Simple and delicious avocado on toast",
            "1. Toast the bread\n2. Mash the avocado with a fork\n3. Spread avocado on toast\n4. Add salt and pepper to taste",
            &["bread", "avocado", "salt", "pepper"],
        ),
        recipe(
            2,
            "Scrambled Eggs",
            "Classic fluffy scrambled eggs",
            "1. Beat eggs in a bowl\n2. Heat butter in a pan\n3. Pour eggs into pan\n4. Stir gently until cooked",
            &["eggs", "butter", "salt", "pepper"],
        ),
    ]
}
