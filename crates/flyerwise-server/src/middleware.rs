use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

const API_KEYS_VAR: &str = "FLYERWISE_API_KEYS";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Key shared by every caller that presents no bearer token (auth disabled).
const ANONYMOUS_CLIENT: &str = "";

/// Request id, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Static bearer tokens accepted by the session API.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Reads `FLYERWISE_API_KEYS`. See [`Self::from_keys`].
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var(API_KEYS_VAR).unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// Parses a comma-separated token list. An empty list turns auth off in
    /// development and is a startup error everywhere else.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut api_keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        api_keys.sort();
        api_keys.dedup();

        if api_keys.is_empty() && !is_development {
            anyhow::bail!("{API_KEYS_VAR} must list at least one bearer token outside development");
        }
        if api_keys.is_empty() {
            tracing::warn!("{API_KEYS_VAR} is empty; session API is unauthenticated");
        }

        Ok(Self {
            enabled: !api_keys.is_empty(),
            api_keys: Arc::new(api_keys),
        })
    }

    /// Checks every configured key so timing does not reveal which one (if
    /// any) matched.
    fn allows(&self, token: &str) -> bool {
        self.api_keys.iter().fold(false, |found, key| {
            found | bool::from(key.as_bytes().ct_eq(token.as_bytes()))
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    opened_at: Instant,
    used: usize,
}

/// Fixed-window request limit, counted separately for each bearer token.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    clients: Arc<Mutex<HashMap<String, ClientWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counts one request for `client` at `now`; false once the client has
    /// used up its current window. Windows that have run out are dropped
    /// on the way.
    async fn admit(&self, client: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock().await;
        clients.retain(|_, w| now.saturating_duration_since(w.opened_at) < self.window);

        let window = clients.entry(client.to_owned()).or_insert(ClientWindow {
            opened_at: now,
            used: 0,
        });
        if window.used >= self.max_requests {
            return false;
        }
        window.used += 1;
        true
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

#[derive(Debug, Serialize)]
struct RejectionBody {
    error: Rejection,
}

#[derive(Debug, Serialize)]
struct Rejection {
    code: &'static str,
    message: &'static str,
}

fn reject(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(RejectionBody {
            error: Rejection { code, message },
        }),
    )
        .into_response()
}

/// Reuses the caller's `x-request-id` or mints a `UUIDv4`, exposes it as a
/// [`RequestId`] extension and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }
    let token = bearer_token(req.headers());
    match token {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

/// Runs after [`require_bearer_auth`], so the token used as the client key
/// is already known to be valid.
pub async fn enforce_rate_limit(
    State(limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let client = bearer_token(req.headers()).unwrap_or(ANONYMOUS_CLIENT);
    if !limit.admit(client, Instant::now()).await {
        tracing::warn!(limit = limit.max_requests, "client exceeded its request window");
        return reject(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded",
        );
    }
    next.run(req).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    use super::*;

    fn headers_with(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_token_is_read_from_authorization() {
        assert_eq!(bearer_token(&headers_with("Bearer test-token")), Some("test-token"));
        assert_eq!(bearer_token(&headers_with("Basic abc123")), None);
        assert_eq!(bearer_token(&headers_with("Bearer  ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn empty_key_list_disables_auth_only_in_development() {
        let dev = AuthState::from_keys("", true).expect("dev should allow missing keys");
        assert!(!dev.enabled);
        assert!(AuthState::from_keys(" , ", false).is_err());
    }

    #[test]
    fn only_exact_tokens_are_allowed() {
        let state = AuthState::from_keys("alpha, beta", false).expect("keys");
        assert!(state.enabled);
        assert!(state.allows("alpha"));
        assert!(state.allows("beta"));
        assert!(!state.allows("alph"));
        assert!(!state.allows("alphabet"));
        assert!(!state.allows(""));
    }

    #[tokio::test]
    async fn each_client_gets_its_own_window() {
        let limit = RateLimitState::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limit.admit("alpha", now).await);
        assert!(limit.admit("alpha", now).await);
        assert!(!limit.admit("alpha", now).await);
        assert!(limit.admit("beta", now).await);
    }

    #[tokio::test]
    async fn elapsed_windows_reset_and_are_dropped() {
        let limit = RateLimitState::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limit.admit("alpha", start).await);
        assert!(limit.admit("beta", start).await);
        assert!(!limit.admit("alpha", start + Duration::from_secs(59)).await);

        let later = start + Duration::from_secs(60);
        assert!(limit.admit("alpha", later).await);
        assert_eq!(limit.tracked_clients().await, 1);
    }

    #[tokio::test]
    async fn one_token_exhausting_its_limit_does_not_block_another() {
        let limit = RateLimitState::new(1, Duration::from_secs(60));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(limit, enforce_rate_limit));
        let call = |token: &'static str| {
            axum::http::Request::builder()
                .uri("/")
                .header(AUTHORIZATION, token)
                .body(Body::empty())
                .expect("request")
        };

        let first = app.clone().oneshot(call("Bearer alpha")).await.expect("response");
        assert_eq!(first.status(), StatusCode::OK);
        let throttled = app.clone().oneshot(call("Bearer alpha")).await.expect("response");
        assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
        let other = app.oneshot(call("Bearer beta")).await.expect("response");
        assert_eq!(other.status(), StatusCode::OK);
    }
}
