use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::TokenService;
use crate::config::Config;
use crate::store::Store;

pub mod auth;
pub mod clients;
mod error;
mod validation;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub store: Store,

    pub tokens: TokenService,
}

#[must_use]
pub fn create_app_state(config: Config) -> Arc<AppState> {
    let store = Store::new(&config.storage.data_path);
    let tokens = TokenService::new(&config.auth.token_secret, config.auth.token_ttl_hours);

    Arc::new(AppState {
        config: Arc::new(config),
        store,
        tokens,
    })
}

#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    let uploads_path = state.config.storage.uploads_path.clone();
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    // Multipart bodies carry the photo plus framing overhead, so the body
    // limit sits above the configured photo size; the handler enforces the
    // exact cap.
    let body_limit = usize::try_from(state.config.storage.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(64 * 1024);

    let protected_routes = Router::new()
        .route("/clients", get(clients::list_clients))
        .route("/clients", post(clients::create_client))
        .route("/clients/{id}/photo", post(clients::upload_photo))
        .route("/clients/{id}", put(clients::update_client))
        .route("/clients/{id}", delete(clients::delete_client))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .nest_service(
            "/uploads",
            tower_http::services::ServeDir::new(uploads_path),
        )
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}
