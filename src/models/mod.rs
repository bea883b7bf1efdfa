pub mod chat;
pub mod favorite;
pub mod ingredient;
pub mod matching;
pub mod recipe;

pub use chat::{ChatMessage, Sender};
pub use favorite::{FavoriteEntry, FavoriteState};
pub use ingredient::{normalize_name, Ingredient, Inventory, StoredIngredient, UserId};
pub use matching::{MatchResult, Suggestion, SuggestionSet, Threshold};
pub use recipe::{
    sample_recipes, split_instructions, Recipe, RecipeId, RecipeSummary, RequiredIngredient,
};
