//! Route modules for the Braid mock server

pub mod resource;

use axum::{http::HeaderValue, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::state::AppState;

/// Build the application router
///
/// Resource IDs are arbitrary paths, so every request falls through to
/// the resource handler.
pub fn router(state: AppState) -> Router {
    let cors = state.config().cors.clone();

    let router = Router::new()
        .fallback(resource::serve_resource)
        .layer(TraceLayer::new_for_http());

    let router = if cors.enabled {
        router.layer(cors_layer(&cors))
    } else {
        router
    };

    router.with_state(state)
}

/// Build the CORS layer
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = if config.allow_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            config
                .allow_origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                }),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}
