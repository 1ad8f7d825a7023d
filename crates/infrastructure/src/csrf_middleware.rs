use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tessera_application::CsrfService;

/// Header carrying the anti-forgery token.
pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";

/// Header carrying the session the token was issued for.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// JSON body returned when a request is rejected.
#[derive(Debug, Serialize)]
pub struct CsrfErrorResponse {
    /// Rejection reason.
    pub message: String,
}

/// Rejects state-changing requests without a valid CSRF token.
///
/// Install with `axum::middleware::from_fn_with_state(csrf, require_csrf_token)`.
pub async fn require_csrf_token(
    State(csrf): State<CsrfService>,
    request: Request,
    next: Next,
) -> Response {
    let token = header_value(request.headers(), CSRF_TOKEN_HEADER);
    let session_id = header_value(request.headers(), SESSION_ID_HEADER);
    let method = request.method().clone();

    let decision = csrf
        .protect_request(&method, token.as_deref(), session_id.as_deref())
        .await;
    if decision.granted {
        return next.run(request).await;
    }

    let message = decision
        .reason
        .unwrap_or_else(|| "CSRF validation failed".to_owned());
    (StatusCode::FORBIDDEN, Json(CsrfErrorResponse { message })).into_response()
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::Method;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use chrono::{Duration, Utc};
    use tessera_core::ManualClock;
    use tower::ServiceExt;

    use super::*;

    fn app(clock: Arc<ManualClock>) -> (Router, CsrfService) {
        let csrf = CsrfService::new(clock, Duration::minutes(60));
        let router = Router::new()
            .route("/profile", get(|| async { "read" }).post(|| async { "saved" }))
            .layer(from_fn_with_state(csrf.clone(), require_csrf_token));

        (router, csrf)
    }

    fn request(method: Method, headers: &[(&str, &str)]) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().method(method).uri("/profile");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        builder.body(Body::empty()).unwrap_or_else(|_| unreachable!())
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|_| unreachable!());
        String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn safe_methods_pass_without_token() {
        let (router, _) = app(Arc::new(ManualClock::new(Utc::now())));

        let response = router
            .oneshot(request(Method::GET, &[]))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn post_without_token_is_forbidden() {
        let (router, _) = app(Arc::new(ManualClock::new(Utc::now())));

        let response = router
            .oneshot(request(Method::POST, &[]))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_text(response).await.contains("missing CSRF token"));
    }

    #[tokio::test]
    async fn post_with_session_token_passes() {
        let (router, csrf) = app(Arc::new(ManualClock::new(Utc::now())));
        let token = csrf
            .generate_token(Some("sess-1"))
            .await
            .unwrap_or_else(|_| unreachable!());

        let response = router
            .oneshot(request(
                Method::POST,
                &[
                    (CSRF_TOKEN_HEADER, token.token.as_str()),
                    (SESSION_ID_HEADER, "sess-1"),
                ],
            ))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "saved");
    }

    #[tokio::test]
    async fn token_for_another_session_is_rejected() {
        let (router, csrf) = app(Arc::new(ManualClock::new(Utc::now())));
        let token = csrf
            .generate_token(Some("sess-1"))
            .await
            .unwrap_or_else(|_| unreachable!());

        let response = router
            .oneshot(request(
                Method::DELETE,
                &[
                    (CSRF_TOKEN_HEADER, token.token.as_str()),
                    (SESSION_ID_HEADER, "sess-2"),
                ],
            ))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (router, csrf) = app(clock.clone());
        let token = csrf
            .generate_token(None)
            .await
            .unwrap_or_else(|_| unreachable!());

        clock.advance(Duration::minutes(61));

        let response = router
            .oneshot(request(
                Method::POST,
                &[(CSRF_TOKEN_HEADER, token.token.as_str())],
            ))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(
            body_text(response)
                .await
                .contains("invalid or expired CSRF token")
        );
    }
}
