use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    PgPool, Row,
};
use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    models::{
        split_instructions, FavoriteEntry, Recipe, RecipeId, RecipeSummary, RequiredIngredient,
        StoredIngredient, UserId,
    },
};

use super::store::{
    CorpusSnapshot, FavoritesStore, InventorySnapshot, InventoryStore,
    RecipeCorpus, SkippedRecipe,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const RECIPE_COLUMNS: &str = "id, name, description, preparation_time, cooking_time, servings, difficulty, image_url, instructions";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the schema in `migrations/`
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

fn is_violation(error: &sqlx::Error, code: &str) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some(code))
}

fn non_negative(value: Option<i32>, field: &str) -> Result<Option<u32>, String> {
    value
        .map(|v| u32::try_from(v).map_err(|_| format!("{} is negative ({})", field, v)))
        .transpose()
}

/// Decodes a `recipes` row without its ingredient list
fn decode_recipe(row: &PgRow) -> Result<Recipe, String> {
    let field = |e: sqlx::Error| e.to_string();
    let instructions: String = row.try_get("instructions").map_err(field)?;

    Ok(Recipe {
        id: RecipeId(row.try_get("id").map_err(field)?),
        name: row.try_get("name").map_err(field)?,
        description: row.try_get("description").map_err(field)?,
        required: Vec::new(),
        instructions: split_instructions(&instructions),
        prep_time: non_negative(row.try_get("preparation_time").map_err(field)?, "preparation_time")?,
        cook_time: non_negative(row.try_get("cooking_time").map_err(field)?, "cooking_time")?,
        servings: non_negative(row.try_get("servings").map_err(field)?, "servings")?,
        difficulty: row.try_get("difficulty").map_err(field)?,
        image_url: row.try_get("image_url").map_err(field)?,
    })
}

/// Converts an optional count into its `INTEGER` column value
fn integer_column(value: Option<u32>, field: &str) -> AppResult<Option<i32>> {
    value
        .map(|v| {
            i32::try_from(v)
                .map_err(|_| AppError::Validation(format!("{} is out of range ({})", field, v)))
        })
        .transpose()
}

fn decode_ingredient(row: &PgRow) -> Result<RequiredIngredient, sqlx::Error> {
    Ok(RequiredIngredient {
        name: row.try_get("ingredient")?,
        quantity: row.try_get("quantity")?,
        unit: row.try_get("unit")?,
    })
}

/// Postgres-backed implementation of every store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn user_exists(&self, user: &UserId) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
                .bind(user.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn ensure_user(&self, user: &UserId) -> AppResult<()> {
        if self.user_exists(user).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("user '{}'", user)))
        }
    }

    /// Inserts `recipes` when the corpus is empty; returns how many were inserted
    pub async fn seed_recipes(&self, recipes: &[Recipe]) -> AppResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipes")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for recipe in recipes {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO recipes (name, description, preparation_time, cooking_time, servings, difficulty, image_url, instructions)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
            )
            .bind(&recipe.name)
            .bind(&recipe.description)
            .bind(integer_column(recipe.prep_time, "preparation_time")?)
            .bind(integer_column(recipe.cook_time, "cooking_time")?)
            .bind(integer_column(recipe.servings, "servings")?)
            .bind(&recipe.difficulty)
            .bind(&recipe.image_url)
            .bind(recipe.instructions.join("\n"))
            .fetch_one(&mut *tx)
            .await?;

            for ingredient in &recipe.required {
                sqlx::query(
                    "INSERT INTO recipe_ingredients (recipe_id, ingredient, quantity, unit) VALUES ($1, $2, $3, $4)",
                )
                .bind(id)
                .bind(&ingredient.name)
                .bind(&ingredient.quantity)
                .bind(&ingredient.unit)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        tracing::info!(count = recipes.len(), "Seeded sample recipes");
        Ok(recipes.len())
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn create_user(&self, user: &UserId) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (username) VALUES ($1)")
            .bind(user.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_violation(&e, UNIQUE_VIOLATION) {
                    AppError::Conflict(format!("user '{}' already exists", user))
                } else {
                    AppError::Database(e)
                }
            })?;

        sqlx::query("INSERT INTO inventories (username) VALUES ($1)")
            .bind(user.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, user: &UserId) -> AppResult<InventorySnapshot> {
        let row = sqlx::query("SELECT revision, items FROM inventories WHERE username = $1")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user '{}'", user)))?;

        let revision: i64 = row.try_get("revision")?;
        let Json(items): Json<Vec<StoredIngredient>> = row.try_get("items")?;

        Ok(InventorySnapshot {
            revision: revision as u64,
            items,
        })
    }

    async fn save(
        &self,
        user: &UserId,
        expected_revision: u64,
        items: Vec<StoredIngredient>,
    ) -> AppResult<u64> {
        let revision: Option<i64> = sqlx::query_scalar(
            "UPDATE inventories SET items = $3, revision = revision + 1
             WHERE username = $1 AND revision = $2
             RETURNING revision",
        )
        .bind(user.as_str())
        .bind(expected_revision as i64)
        .bind(Json(items))
        .fetch_optional(&self.pool)
        .await?;

        match revision {
            Some(revision) => Ok(revision as u64),
            None => {
                self.ensure_user(user).await?;
                Err(AppError::Conflict(format!(
                    "inventory of '{}' moved past revision {}",
                    user, expected_revision
                )))
            }
        }
    }
}

#[async_trait]
impl RecipeCorpus for PgStore {
    async fn version(&self) -> AppResult<u64> {
        let revision: i64 = sqlx::query_scalar("SELECT revision FROM corpus_revision")
            .fetch_one(&self.pool)
            .await?;
        Ok(revision as u64)
    }

    async fn snapshot(&self) -> AppResult<CorpusSnapshot> {
        let version = self.version().await?;

        let recipe_rows = sqlx::query(&format!("SELECT {} FROM recipes ORDER BY id", RECIPE_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        let ingredient_rows = sqlx::query(
            "SELECT recipe_id, ingredient, quantity, unit FROM recipe_ingredients ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut ingredients: HashMap<i64, Result<Vec<RequiredIngredient>, String>> = HashMap::new();
        for row in &ingredient_rows {
            let recipe_id: i64 = row.try_get("recipe_id")?;
            let entry = ingredients.entry(recipe_id).or_insert_with(|| Ok(Vec::new()));
            match decode_ingredient(row) {
                Ok(ingredient) => {
                    if let Ok(list) = entry {
                        list.push(ingredient);
                    }
                }
                Err(e) => {
                    if entry.is_ok() {
                        *entry = Err(format!("ingredient row: {}", e));
                    }
                }
            }
        }

        let mut recipes = Vec::with_capacity(recipe_rows.len());
        let mut skipped = Vec::new();
        for row in &recipe_rows {
            let decoded = decode_recipe(row).and_then(|mut recipe| {
                match ingredients.remove(&recipe.id.0) {
                    Some(Ok(required)) => recipe.required = required,
                    Some(Err(reason)) => return Err(reason),
                    None => {}
                }
                Ok(recipe)
            });

            match decoded {
                Ok(recipe) => recipes.push(recipe),
                Err(reason) => {
                    let recipe_id = row.try_get::<i64, _>("id").ok().map(RecipeId);
                    tracing::warn!(recipe_id = ?recipe_id, reason = %reason, "Skipping unreadable recipe");
                    skipped.push(SkippedRecipe { recipe_id, reason });
                }
            }
        }

        Ok(CorpusSnapshot {
            version,
            recipes,
            skipped,
        })
    }

    async fn get(&self, id: RecipeId) -> AppResult<Option<Recipe>> {
        let Some(row) = sqlx::query(&format!("SELECT {} FROM recipes WHERE id = $1", RECIPE_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut recipe = decode_recipe(&row)
            .map_err(|reason| AppError::Upstream(format!("recipe {}: {}", id, reason)))?;

        let ingredient_rows = sqlx::query(
            "SELECT ingredient, quantity, unit FROM recipe_ingredients WHERE recipe_id = $1 ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        recipe.required = ingredient_rows
            .iter()
            .map(decode_ingredient)
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::Upstream(format!("recipe {}: ingredient row: {}", id, e)))?;

        Ok(Some(recipe))
    }

    async fn search(&self, query: &str) -> AppResult<Vec<RecipeSummary>> {
        let escaped = query
            .trim()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let rows = sqlx::query(&format!(
            "SELECT {} FROM recipes WHERE name ILIKE $1 OR description ILIKE $1 ORDER BY id",
            RECIPE_COLUMNS
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| match decode_recipe(row) {
                Ok(recipe) => Some(recipe.summary()),
                Err(reason) => {
                    tracing::warn!(reason = %reason, "Skipping unreadable recipe in search");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl FavoritesStore for PgStore {
    async fn contains(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<bool> {
        self.ensure_user(user).await?;
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_favorite_recipes WHERE username = $1 AND recipe_id = $2)",
        )
        .bind(user.as_str())
        .bind(recipe_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO user_favorite_recipes (username, recipe_id) VALUES ($1, $2)
             ON CONFLICT (username, recipe_id) DO NOTHING",
        )
        .bind(user.as_str())
        .bind(recipe_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, FOREIGN_KEY_VIOLATION) {
                AppError::NotFound(format!("user '{}'", user))
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn remove(&self, user: &UserId, recipe_id: RecipeId) -> AppResult<()> {
        self.ensure_user(user).await?;
        sqlx::query("DELETE FROM user_favorite_recipes WHERE username = $1 AND recipe_id = $2")
            .bind(user.as_str())
            .bind(recipe_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, user: &UserId) -> AppResult<Vec<FavoriteEntry>> {
        self.ensure_user(user).await?;
        let rows = sqlx::query(
            "SELECT recipe_id, created_at FROM user_favorite_recipes
             WHERE username = $1 ORDER BY created_at, recipe_id",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> AppResult<FavoriteEntry> {
                Ok(FavoriteEntry {
                    user: user.clone(),
                    recipe_id: RecipeId(row.try_get("recipe_id")?),
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_negative() {
        assert_eq!(non_negative(Some(15), "servings").unwrap(), Some(15));
        assert_eq!(non_negative(None, "servings").unwrap(), None);
        let error = non_negative(Some(-1), "cooking_time").unwrap_err();
        assert!(error.contains("cooking_time"));
    }

    #[test]
    fn test_integer_column_rejects_overflow() {
        assert_eq!(integer_column(Some(45), "cooking_time").unwrap(), Some(45));
        assert_eq!(integer_column(None, "servings").unwrap(), None);
        let error = integer_column(Some(u32::MAX), "servings").unwrap_err();
        assert!(matches!(error, AppError::Validation(ref message) if message.contains("servings")));
    }
}
