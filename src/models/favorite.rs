use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

use super::{RecipeId, UserId};

/// A bookmark of one recipe by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub user: UserId,
    pub recipe_id: RecipeId,
    pub created_at: DateTime<Utc>,
}

/// Favorite status of the recipe shown in a detail view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavoriteState {
    /// Lookup has not resolved yet
    Unknown,
    Favorite,
    NotFavorite,
}

impl From<bool> for FavoriteState {
    fn from(is_favorite: bool) -> Self {
        if is_favorite {
            FavoriteState::Favorite
        } else {
            FavoriteState::NotFavorite
        }
    }
}

impl FavoriteState {
    /// Applies the outcome of the initial favorites lookup.
    ///
    /// A failed lookup resolves to `NotFavorite` and yields a warning for display;
    /// it never blocks rendering.
    pub fn resolve(self, lookup: AppResult<bool>) -> (FavoriteState, Option<String>) {
        match lookup {
            Ok(is_favorite) => (is_favorite.into(), None),
            Err(e) => {
                tracing::warn!(error = %e, "Favorite lookup failed, assuming not favorite");
                (
                    FavoriteState::NotFavorite,
                    Some(format!("Could not load favorite status: {}", e)),
                )
            }
        }
    }

    /// Applies the outcome of a toggle call. On failure the state is left unchanged
    /// and the error is handed back to the caller.
    pub fn after_toggle(self, outcome: AppResult<bool>) -> Result<FavoriteState, AppError> {
        let next = outcome.map(FavoriteState::from)?;
        tracing::debug!(from = ?self, to = ?next, "Favorite state toggled");
        Ok(next)
    }

    pub fn is_favorite(&self) -> bool {
        matches!(self, FavoriteState::Favorite)
    }
}
