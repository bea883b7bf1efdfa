use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
}

/// API routes under /api
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(handlers::create_user))
        // Inventory
        .route(
            "/ingredients",
            get(handlers::list_ingredients)
                .post(handlers::add_ingredient)
                .delete(handlers::remove_ingredient),
        )
        .route("/ingredients/:index/checked", put(handlers::set_checked))
        // Recipes
        .route("/recipes/suggestions", get(handlers::suggestions))
        .route("/recipes/search", get(handlers::search_recipes))
        .route("/recipes/favorite", post(handlers::toggle_favorite))
        .route("/recipes/favorites", get(handlers::list_favorites))
        .route("/recipes/:id", get(handlers::recipe_detail))
        // Chat
        .route("/chat/recipes", post(handlers::chat_recipes))
        .route("/chat/history", get(handlers::chat_history))
}
