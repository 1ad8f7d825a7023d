use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tessera_application::{AuthApi, AuthResponse, RefreshResponse};
use tessera_core::{AppError, AppResult, Clock};
use tessera_domain::{AuthTokens, AuthUser, DEFAULT_TOKEN_TYPE, LoginCredentials, RegistrationData};
use tracing::debug;
use url::Url;

/// Token lifetime assumed when the API reports no expiry.
const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3_600;

/// Remote authentication API over HTTP with JSON bodies.
pub struct HttpAuthApi {
    http_client: reqwest::Client,
    base_url: Url,
    clock: Arc<dyn Clock>,
}

impl HttpAuthApi {
    /// Creates an API client rooted at `base_url`.
    ///
    /// The base path always gains a trailing slash so endpoint joins
    /// append to it instead of replacing its last segment.
    #[must_use]
    pub fn new(http_client: reqwest::Client, mut base_url: Url, clock: Arc<dyn Clock>) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            http_client,
            base_url,
            clock,
        }
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url.join(path).map_err(|error| {
            AppError::Internal(format!("invalid auth endpoint '{path}': {error}"))
        })
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> AppResult<reqwest::Response> {
        let response = request.send().await.map_err(|error| {
            AppError::Network(format!("{operation} request failed: {error}"))
        })?;

        let status = response.status();
        debug!(operation, status = status.as_u16(), "auth api responded");
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .map(|body| body.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_owned()
            });

        Err(error_for_status(status, message))
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> AppResult<T> {
        self.execute(request, operation)
            .await?
            .json::<T>()
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to decode {operation} response: {error}"))
            })
    }

    async fn authenticate<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        operation: &str,
    ) -> AppResult<AuthResponse> {
        let request = self.http_client.post(self.endpoint(path)?).json(body);
        let response: AuthResponseBody = self.execute_json(request, operation).await?;
        let refresh_token = response.tokens.refresh_token.clone().ok_or_else(|| {
            AppError::Internal(format!("{operation} response is missing a refresh token"))
        })?;

        Ok(AuthResponse {
            user: response.user,
            tokens: response.tokens.into_tokens(self.clock.now(), refresh_token),
        })
    }
}

fn error_for_status(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
        StatusCode::FORBIDDEN => AppError::Forbidden(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::Validation(message)
        }
        _ => AppError::Internal(format!("auth api returned {status}: {message}")),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct AuthResponseBody {
    user: AuthUser,
    tokens: TokensBody,
}

#[derive(Debug, Deserialize)]
struct RefreshResponseBody {
    #[serde(default)]
    user: Option<AuthUser>,
    tokens: TokensBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokensBody {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl std::fmt::Debug for TokensBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokensBody")
            .field("expires_at", &self.expires_at)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl TokensBody {
    fn into_tokens(self, now: DateTime<Utc>, refresh_token: String) -> AuthTokens {
        let expires_at = self
            .expires_at
            .or_else(|| {
                self.expires_in
                    .and_then(Duration::try_seconds)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
            })
            .unwrap_or_else(|| now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECONDS));

        AuthTokens {
            access_token: self.access_token,
            refresh_token,
            expires_at,
            token_type: self
                .token_type
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_owned()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct ResetPasswordRequest<'a> {
    token: &'a str,
    password: &'a str,
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &LoginCredentials) -> AppResult<AuthResponse> {
        self.authenticate("auth/login", credentials, "login").await
    }

    async fn register(&self, data: &RegistrationData) -> AppResult<AuthResponse> {
        self.authenticate("auth/register", data, "register").await
    }

    async fn logout(&self, tokens: &AuthTokens) -> AppResult<()> {
        let request = self
            .http_client
            .post(self.endpoint("auth/logout")?)
            .header(AUTHORIZATION, tokens.authorization_header());

        self.execute(request, "logout").await.map(|_| ())
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<RefreshResponse> {
        let request = self
            .http_client
            .post(self.endpoint("auth/refresh")?)
            .json(&RefreshRequest { refresh_token });
        let response: RefreshResponseBody = self.execute_json(request, "refresh").await?;

        // Servers without rotation omit the refresh token; the current one stays valid.
        let rotated = response
            .tokens
            .refresh_token
            .clone()
            .unwrap_or_else(|| refresh_token.to_owned());

        Ok(RefreshResponse {
            user: response.user,
            tokens: response.tokens.into_tokens(self.clock.now(), rotated),
        })
    }

    async fn forgot_password(&self, email: &str) -> AppResult<()> {
        let request = self
            .http_client
            .post(self.endpoint("auth/forgot-password")?)
            .json(&ForgotPasswordRequest { email });

        self.execute(request, "forgot password").await.map(|_| ())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> AppResult<()> {
        let request = self
            .http_client
            .post(self.endpoint("auth/reset-password")?)
            .json(&ResetPasswordRequest {
                token,
                password: new_password,
            });

        self.execute(request, "reset password").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use tessera_core::ManualClock;
    use tessera_domain::RoleRef;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(|_| unreachable!())
    }

    fn user_json() -> Value {
        json!({
            "id": "u-1",
            "email": "ada@example.com",
            "firstName": "Ada",
            "roles": ["admin", {"name": "auditor", "permissions": ["audit.read"]}],
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z"
        })
    }

    fn error(status: StatusCode, message: &str) -> Response {
        (status, Json(json!({ "message": message }))).into_response()
    }

    async fn login(Json(body): Json<Value>) -> Response {
        if body["password"] != "Correct#Horse9" {
            return error(StatusCode::UNAUTHORIZED, "bad credentials");
        }

        Json(json!({
            "user": user_json(),
            "tokens": {
                "accessToken": "access-1",
                "refreshToken": "refresh-1",
                "expiresIn": 900
            }
        }))
        .into_response()
    }

    async fn register(Json(body): Json<Value>) -> Response {
        if body.get("confirmPassword").is_some() {
            return error(StatusCode::BAD_REQUEST, "unexpected field");
        }
        if body["email"] == "taken@example.com" {
            return error(StatusCode::CONFLICT, "email already registered");
        }

        Json(json!({
            "user": user_json(),
            "tokens": { "accessToken": "access-1", "refreshToken": "refresh-1" }
        }))
        .into_response()
    }

    async fn logout(headers: HeaderMap) -> StatusCode {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if authorization == Some("Bearer access-1") {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::UNAUTHORIZED
        }
    }

    async fn refresh(Json(body): Json<Value>) -> Response {
        if body["refreshToken"] != "refresh-1" {
            return error(StatusCode::UNAUTHORIZED, "refresh token revoked");
        }

        Json(json!({
            "tokens": {
                "accessToken": "access-2",
                "expiresAt": "2026-03-01T13:00:00Z",
                "tokenType": "Bearer"
            }
        }))
        .into_response()
    }

    async fn forgot_password() -> StatusCode {
        StatusCode::ACCEPTED
    }

    async fn reset_password(Json(body): Json<Value>) -> Response {
        match body["token"].as_str() {
            Some("stale") => error(StatusCode::UNPROCESSABLE_ENTITY, "reset link expired"),
            Some("boom") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            _ => StatusCode::NO_CONTENT.into_response(),
        }
    }

    async fn spawn_api() -> HttpAuthApi {
        let router = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/register", post(register))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/forgot-password", post(forgot_password))
            .route("/api/auth/reset-password", post(reset_password));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|_| unreachable!());
        let address = listener.local_addr().unwrap_or_else(|_| unreachable!());
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let base_url =
            Url::parse(&format!("http://{address}/api")).unwrap_or_else(|_| unreachable!());
        HttpAuthApi::new(
            reqwest::Client::new(),
            base_url,
            Arc::new(ManualClock::new(fixed_now())),
        )
    }

    fn credentials(password: &str) -> LoginCredentials {
        LoginCredentials {
            email: "ada@example.com".to_owned(),
            password: password.to_owned(),
            remember_me: false,
        }
    }

    #[tokio::test]
    async fn login_derives_expiry_from_expires_in() -> AppResult<()> {
        let api = spawn_api().await;

        let response = api.login(&credentials("Correct#Horse9")).await?;

        assert_eq!(response.user.id, "u-1");
        assert_eq!(response.user.roles[0], RoleRef::Id("admin".to_owned()));
        assert_eq!(response.tokens.access_token, "access-1");
        assert_eq!(response.tokens.expires_at, fixed_now() + Duration::minutes(15));
        assert_eq!(response.tokens.token_type, "Bearer");
        Ok(())
    }

    #[tokio::test]
    async fn login_rejection_maps_to_unauthorized() {
        let api = spawn_api().await;

        let result = api.login(&credentials("wrong")).await;

        assert!(
            matches!(result, Err(AppError::Unauthorized(message)) if message == "bad credentials")
        );
    }

    #[tokio::test]
    async fn register_defaults_expiry_to_one_hour() -> AppResult<()> {
        let api = spawn_api().await;
        let data = RegistrationData {
            email: "ada@example.com".to_owned(),
            password: "Correct#Horse9".to_owned(),
            confirm_password: "Correct#Horse9".to_owned(),
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
        };

        let response = api.register(&data).await?;
        assert_eq!(response.tokens.expires_at, fixed_now() + Duration::hours(1));

        let conflict = api
            .register(&RegistrationData {
                email: "taken@example.com".to_owned(),
                ..data
            })
            .await;
        assert!(matches!(conflict, Err(AppError::Conflict(_))));
        Ok(())
    }

    #[tokio::test]
    async fn logout_sends_bearer_token() -> AppResult<()> {
        let api = spawn_api().await;
        let tokens = api.login(&credentials("Correct#Horse9")).await?.tokens;

        api.logout(&tokens).await?;

        let stale = AuthTokens {
            access_token: "other".to_owned(),
            ..tokens
        };
        assert!(matches!(
            api.logout(&stale).await,
            Err(AppError::Unauthorized(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_when_not_rotated() -> AppResult<()> {
        let api = spawn_api().await;

        let response = api.refresh("refresh-1").await?;

        assert_eq!(response.user, None);
        assert_eq!(response.tokens.access_token, "access-2");
        assert_eq!(response.tokens.refresh_token, "refresh-1");
        assert_eq!(response.tokens.expires_at, fixed_now() + Duration::hours(1));

        assert!(matches!(
            api.refresh("revoked").await,
            Err(AppError::Unauthorized(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn password_endpoints_map_statuses() -> AppResult<()> {
        let api = spawn_api().await;

        api.forgot_password("ada@example.com").await?;
        api.reset_password("fresh", "Correct#Horse9").await?;
        assert!(matches!(
            api.reset_password("stale", "Correct#Horse9").await,
            Err(AppError::Validation(message)) if message == "reset link expired"
        ));
        assert!(matches!(
            api.reset_password("boom", "Correct#Horse9").await,
            Err(AppError::Internal(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|_| unreachable!());
        let address = listener.local_addr().unwrap_or_else(|_| unreachable!());
        drop(listener);

        let api = HttpAuthApi::new(
            reqwest::Client::new(),
            Url::parse(&format!("http://{address}/")).unwrap_or_else(|_| unreachable!()),
            Arc::new(ManualClock::new(fixed_now())),
        );

        assert!(matches!(
            api.login(&credentials("Correct#Horse9")).await,
            Err(AppError::Network(_))
        ));
    }
}
