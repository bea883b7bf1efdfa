pub mod chat;
pub mod favorites;
pub mod inventory;
pub mod locks;
pub mod matching;
pub mod suggestions;

pub use chat::{extract, ChatReply, ChatService};
pub use favorites::{FavoritesIndex, RecipeDetail};
pub use inventory::InventoryCoordinator;
pub use locks::KeyedLocks;
pub use matching::{match_recipes, IndexedCorpus};
pub use suggestions::{ChatSuggestions, SuggestionService};
