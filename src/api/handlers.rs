use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{ChatMessage, Inventory, Recipe, RecipeId, RecipeSummary, SuggestionSet, Threshold, UserId},
    services::{ChatReply, RecipeDetail},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct OptionalUserQuery {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub username: String,
    pub threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct IngredientRequest {
    pub username: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetCheckedRequest {
    pub username: String,
    pub checked: bool,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub username: String,
    pub recipe_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub username: Option<String>,
    pub message: String,
    #[serde(default)]
    pub include_inventory: bool,
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct IngredientsResponse {
    pub ingredients: Inventory,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub recipe_id: RecipeId,
    pub is_favorite: bool,
}

fn optional_user(username: Option<&str>) -> AppResult<Option<UserId>> {
    username.map(UserId::parse).transpose()
}

fn parse_recipe_id(raw: i64) -> AppResult<RecipeId> {
    if raw > 0 {
        Ok(RecipeId(raw))
    } else {
        Err(AppError::Validation(format!("malformed recipe id '{}'", raw)))
    }
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = UserId::parse(&request.username)?;
    state.inventory.create_user(&user).await?;
    Ok((StatusCode::CREATED, Json(json!({ "username": user }))))
}

pub async fn list_ingredients(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> AppResult<Json<IngredientsResponse>> {
    let user = UserId::parse(&params.username)?;
    let ingredients = state.inventory.list(&user).await?;
    Ok(Json(IngredientsResponse { ingredients }))
}

pub async fn add_ingredient(
    State(state): State<AppState>,
    Json(request): Json<IngredientRequest>,
) -> AppResult<Json<IngredientsResponse>> {
    let user = UserId::parse(&request.username)?;
    let ingredients = state.inventory.add(&user, &request.name).await?;
    Ok(Json(IngredientsResponse { ingredients }))
}

pub async fn remove_ingredient(
    State(state): State<AppState>,
    Json(request): Json<IngredientRequest>,
) -> AppResult<Json<IngredientsResponse>> {
    let user = UserId::parse(&request.username)?;
    let ingredients = state.inventory.remove(&user, &request.name).await?;
    Ok(Json(IngredientsResponse { ingredients }))
}

pub async fn set_checked(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(request): Json<SetCheckedRequest>,
) -> AppResult<Json<IngredientsResponse>> {
    let user = UserId::parse(&request.username)?;
    let ingredients = state
        .inventory
        .set_checked(&user, index, request.checked)
        .await?;
    Ok(Json(IngredientsResponse { ingredients }))
}

/// Recipes the user can make with their current inventory
pub async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionsQuery>,
) -> AppResult<Json<SuggestionSet>> {
    let threshold = Threshold::or_default(params.threshold, state.default_threshold)?;
    let user = UserId::parse(&params.username)?;
    let inventory = state.inventory.list(&user).await?;
    let suggestions = state.suggestions.suggest(&inventory.keys(), threshold).await?;
    Ok(Json(suggestions))
}

pub async fn search_recipes(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<RecipeSummary>>> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(AppError::Validation("search query is empty".to_string()));
    }
    let recipes = state.corpus.search(query).await?;
    Ok(Json(recipes))
}

/// Full recipe with the favorite state of the viewing user
pub async fn recipe_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<OptionalUserQuery>,
) -> AppResult<Json<RecipeDetail>> {
    let id: RecipeId = id.parse()?;
    let user = optional_user(params.username.as_deref())?;
    let detail = state.favorites.recipe_detail(user.as_ref(), id).await?;
    Ok(Json(detail))
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    Json(request): Json<FavoriteRequest>,
) -> AppResult<Json<FavoriteResponse>> {
    let recipe_id = parse_recipe_id(request.recipe_id)?;
    let user = UserId::parse(&request.username)?;
    let is_favorite = state.favorites.toggle(&user, recipe_id).await?;
    Ok(Json(FavoriteResponse {
        recipe_id,
        is_favorite,
    }))
}

pub async fn list_favorites(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> AppResult<Json<Vec<Recipe>>> {
    let user = UserId::parse(&params.username)?;
    let recipes = state.favorites.list(&user).await?;
    Ok(Json(recipes))
}

/// Suggestions for ingredients typed into the chat
pub async fn chat_recipes(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatReply>> {
    let threshold = Threshold::or_default(request.threshold, state.default_threshold)?;
    let user = optional_user(request.username.as_deref())?;
    let reply = state
        .chat
        .ask(
            user.as_ref(),
            &request.message,
            request.include_inventory,
            threshold,
        )
        .await?;
    Ok(Json(reply))
}

pub async fn chat_history(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    let user = UserId::parse(&params.username)?;
    let history = state.chat.transcript(&user).await?;
    Ok(Json(history))
}
