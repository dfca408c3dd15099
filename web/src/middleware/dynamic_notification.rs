use crate::AppState;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use domain::notification::{InjectionOutcome, RequestKind, RequestSnapshot};
use log::{debug, error, info};
use std::net::SocketAddr;

/// Request extension marking an internally dispatched request.
///
/// Code that re-enters the router while composing another response inserts
/// this marker so the notification hook leaves the nested response alone.
/// Top-level client requests never carry it.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubRequest;

/// Span name reported to the timing sink for each evaluation.
const PROCESS_SPAN: &str = "dynamic_notification_process";

/// Response middleware that fills the notification placeholder on eligible
/// HTML pages.
///
/// The request facts are captured before the inner service consumes the
/// request; the injection decision itself lives in `domain` and runs
/// against the finished response.
pub async fn inject_notification(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let snapshot = snapshot_request(&request);
    let response = next.run(request).await;
    process_response(&state, &snapshot, response).await
}

/// Captures the facts the injection rules evaluate.
fn snapshot_request(request: &Request) -> RequestSnapshot {
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();
    let kind = if request.extensions().get::<SubRequest>().is_some() {
        RequestKind::Sub
    } else {
        RequestKind::Main
    };

    RequestSnapshot {
        client_ip,
        user_agent,
        path: request.uri().path().to_string(),
        kind,
    }
}

fn is_html_response(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("text/html"))
}

/// Runs the injection decision against the response and rewrites the body
/// when the notification belongs in it. The timing span covers the whole
/// decision and closes on every exit path.
async fn process_response(
    state: &AppState,
    snapshot: &RequestSnapshot,
    response: Response,
) -> Response {
    let _span = state.stopwatch.start(PROCESS_SPAN);
    let now = Utc::now();

    // Only buffer bodies that could be rewritten: a top-level request with
    // an HTML response. Everything else streams through untouched, though
    // the decision still runs so the skip shows up in the logs.
    if !snapshot.kind.is_main() || !is_html_response(response.headers()) {
        if let InjectionOutcome::Skipped(reason) = state.injector.process(snapshot, None, now) {
            debug!("Notification skipped for {}: {reason:?}", snapshot.path);
        }
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Failed to read response body for {}: {err}", snapshot.path);
            return (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response();
        }
    };

    match state
        .injector
        .process(snapshot, std::str::from_utf8(&bytes).ok(), now)
    {
        InjectionOutcome::Injected { body } => {
            info!("Notification injected into response for {}", snapshot.path);
            // The rewritten page has a different length; drop the stale
            // header and let it be derived from the new body.
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(body))
        }
        InjectionOutcome::Skipped(reason) => {
            debug!("Notification skipped for {}: {reason:?}", snapshot.path);
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::HeaderValue,
        middleware::from_fn_with_state,
        response::Html,
        routing::get,
        Router,
    };
    use chrono::{Duration, Utc};
    use domain::notification::{NotificationInjector, NotificationRules};
    use domain::stopwatch::Stopwatch;
    use std::sync::Arc;
    use tower::ServiceExt;

    const PLACEHOLDER_PAGE: &str =
        r#"<html><body><h1>Demo Home</h1><div id="dynamic_notification"></div></body></html>"#;
    const BARE_PAGE: &str = "<html><body><h1>Bare</h1></body></html>";
    const INJECTED_DIV: &str = concat!(
        r#"<div id="dynamic_notification">"#,
        "This is a notification message inserted by NotificationInjector",
        "</div>"
    );

    async fn placeholder_page() -> Html<&'static str> {
        Html(PLACEHOLDER_PAGE)
    }

    async fn bare_page() -> Html<&'static str> {
        Html(BARE_PAGE)
    }

    async fn plain_text() -> &'static str {
        "no html here"
    }

    /// Page that advertises its own length, the way a response that went
    /// through an upstream cache or fixed-body layer would.
    async fn sized_page() -> impl IntoResponse {
        (
            [(CONTENT_LENGTH, HeaderValue::from(PLACEHOLDER_PAGE.len()))],
            Html(PLACEHOLDER_PAGE),
        )
    }

    /// A rules window that is open right now, so tests exercise the other
    /// rules without depending on the wall clock date.
    fn open_rules() -> NotificationRules {
        NotificationRules {
            target_element_id: "dynamic_notification".to_string(),
            period_start: Utc::now() - Duration::days(1),
            period_end: Utc::now() + Duration::days(1),
        }
    }

    fn closed_rules() -> NotificationRules {
        NotificationRules {
            period_start: Utc::now() - Duration::days(10),
            period_end: Utc::now() - Duration::days(5),
            ..open_rules()
        }
    }

    fn test_app(rules: NotificationRules) -> Router {
        let app_state = AppState::new(
            Arc::new(NotificationInjector::new(rules)),
            Stopwatch::disabled(),
        );

        Router::new()
            .route("/home", get(placeholder_page))
            .route("/about", get(placeholder_page))
            .route("/bare", get(bare_page))
            .route("/plain", get(plain_text))
            .route("/sized", get(sized_page))
            .layer(from_fn_with_state(app_state, inject_notification))
    }

    fn loopback() -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 51234)))
    }

    fn eligible_request(uri: &str) -> Request {
        Request::builder()
            .uri(uri)
            .header(USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)")
            .extension(loopback())
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_injects_for_eligible_browser_request() {
        let app = test_app(open_rules());

        let response = app.oneshot(eligible_request("/home")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains(INJECTED_DIV), "body was: {body}");
        assert!(!body.contains(r#"<div id="dynamic_notification"></div>"#));
    }

    #[tokio::test]
    async fn test_injects_when_user_agent_header_is_absent() {
        let app = test_app(open_rules());
        let request = Request::builder()
            .uri("/home")
            .extension(loopback())
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert!(body_string(response).await.contains(INJECTED_DIV));
    }

    #[tokio::test]
    async fn test_skips_curl_user_agent() {
        let app = test_app(open_rules());
        let request = Request::builder()
            .uri("/home")
            .header(USER_AGENT, "curl/7.68.0")
            .extension(loopback())
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(body_string(response).await, PLACEHOLDER_PAGE);
    }

    #[tokio::test]
    async fn test_skips_non_loopback_client() {
        let app = test_app(open_rules());
        let request = Request::builder()
            .uri("/home")
            .header(USER_AGENT, "Mozilla/5.0")
            .extension(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 443))))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(body_string(response).await, PLACEHOLDER_PAGE);
    }

    #[tokio::test]
    async fn test_skips_request_without_peer_address() {
        let app = test_app(open_rules());
        let request = Request::builder()
            .uri("/home")
            .header(USER_AGENT, "Mozilla/5.0")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(body_string(response).await, PLACEHOLDER_PAGE);
    }

    #[tokio::test]
    async fn test_skips_outside_the_notification_period() {
        let app = test_app(closed_rules());

        let response = app.oneshot(eligible_request("/home")).await.unwrap();

        assert_eq!(body_string(response).await, PLACEHOLDER_PAGE);
    }

    #[tokio::test]
    async fn test_skips_excluded_path() {
        let app = test_app(open_rules());

        let response = app.oneshot(eligible_request("/about")).await.unwrap();

        assert_eq!(body_string(response).await, PLACEHOLDER_PAGE);
    }

    #[tokio::test]
    async fn test_skips_marked_sub_request() {
        let app = test_app(open_rules());
        let request = Request::builder()
            .uri("/home")
            .header(USER_AGENT, "Mozilla/5.0")
            .extension(loopback())
            .extension(SubRequest)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(body_string(response).await, PLACEHOLDER_PAGE);
    }

    #[tokio::test]
    async fn test_leaves_pages_without_placeholder_untouched() {
        let app = test_app(open_rules());

        let response = app.oneshot(eligible_request("/bare")).await.unwrap();

        assert_eq!(body_string(response).await, BARE_PAGE);
    }

    #[tokio::test]
    async fn test_leaves_non_html_responses_untouched() {
        let app = test_app(open_rules());

        let response = app.oneshot(eligible_request("/plain")).await.unwrap();

        assert_eq!(body_string(response).await, "no html here");
    }

    #[tokio::test]
    async fn test_stale_content_length_is_dropped_on_injection() {
        let app = test_app(open_rules());

        let response = app.oneshot(eligible_request("/sized")).await.unwrap();

        // The advertised length no longer matches the rewritten page. The
        // header is dropped so the served length is derived from the new
        // body instead of lying to the client.
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
        let body = body_string(response).await;
        assert!(body.contains(INJECTED_DIV));
        assert_ne!(body.len(), PLACEHOLDER_PAGE.len());
    }

    #[tokio::test]
    async fn test_content_length_survives_a_skipped_response() {
        let app = test_app(open_rules());
        let request = Request::builder()
            .uri("/sized")
            .header(USER_AGENT, "curl/7.68.0")
            .extension(loopback())
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        let advertised = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        assert_eq!(advertised, Some(PLACEHOLDER_PAGE.len()));
        assert_eq!(body_string(response).await, PLACEHOLDER_PAGE);
    }
}
