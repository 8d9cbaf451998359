mod handlers;
mod middleware;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::ApiKeyConfig;

use crate::flags::FlagService;

pub fn create_router(service: FlagService) -> Router {
    create_router_with_auth(service, ApiKeyConfig::from_env())
}

pub fn create_router_with_auth(service: FlagService, auth: ApiKeyConfig) -> Router {
    let mut api = Router::new()
        // Flags
        .route("/flags", get(handlers::list_flags))
        .route("/flags", post(handlers::create_flag))
        .route("/flags/{name}", get(handlers::get_flag))
        .route("/flags/{name}", put(handlers::update_flag))
        .route("/flags/{name}", delete(handlers::delete_flag))
        .route("/flags/{name}/toggle", post(handlers::toggle_flag))
        .route("/flags/{name}/audit", get(handlers::flag_audit))
        // Audit log
        .route("/audit", get(handlers::list_audit))
        // Health
        .route("/health", get(handlers::health));

    if auth.api_key.is_some() {
        api = api.route_layer(axum::middleware::from_fn_with_state(
            auth,
            middleware::require_api_key,
        ));
    }

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}
