use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET the router's health status
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}
