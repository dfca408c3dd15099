use crate::{
    controller::{health_check_controller, home_controller},
    middleware::dynamic_notification::inject_notification,
    AppState,
};
use axum::{
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use log::warn;
use service::config::Config;
use tower_http::cors::CorsLayer;

/// Builds the application route table: the demo pages plus the health
/// probe, with the notification middleware layered over every response and
/// CORS restricted to the configured origins.
pub fn define_routes(app_state: AppState, config: &Config) -> Router {
    Router::new()
        .merge(page_routes())
        .merge(health_routes())
        .layer(from_fn_with_state(app_state, inject_notification))
        .layer(cors_layer(config))
}

fn page_routes() -> Router {
    Router::new()
        .route("/", get(home_controller::index))
        .route("/about", get(home_controller::about))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring malformed allowed origin: {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
}
