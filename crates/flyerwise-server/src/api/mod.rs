mod sessions;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use flyerwise_wizard::{WizardError, WizardManager};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub wizard: Arc<WizardManager>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

fn status_for_code(code: &str) -> StatusCode {
    match code {
        "session_not_found" | "not_found" => StatusCode::NOT_FOUND,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "bad_request" => StatusCode::BAD_REQUEST,
        "session_busy" | "session_terminal" => StatusCode::CONFLICT,
        "session_expired" => StatusCode::GONE,
        "invalid_decision" | "no_product_master" => StatusCode::UNPROCESSABLE_ENTITY,
        "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
        "search_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for_code(&self.error.code);
        (status, Json(self)).into_response()
    }
}

/// Maps a wizard failure onto the error envelope. Storage details are logged
/// and replaced by a generic message.
pub(super) fn map_wizard_error(request_id: String, error: &WizardError) -> ApiError {
    match error {
        WizardError::Store(e) => {
            tracing::error!(error = %e, "wizard storage failure");
            ApiError::new(request_id, error.code(), "storage failure")
        }
        WizardError::SearchUnavailable(reason) => {
            tracing::warn!(reason = %reason, "similarity search unavailable");
            ApiError::new(request_id, error.code(), error.to_string())
        }
        _ => ApiError::new(request_id, error.code(), error.to_string()),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("idempotency-key"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/lists/{list_id}/migration-sessions",
            post(sessions::start_session),
        )
        .route("/api/v1/migration-sessions/{id}", get(sessions::get_session))
        .route(
            "/api/v1/migration-sessions/{id}/suggestions",
            get(sessions::get_suggestions),
        )
        .route(
            "/api/v1/migration-sessions/{id}/decisions",
            post(sessions::record_decision),
        )
        .route(
            "/api/v1/migration-sessions/{id}/bulk",
            post(sessions::apply_bulk),
        )
        .route(
            "/api/v1/migration-sessions/{id}/complete",
            post(sessions::complete_session),
        )
        .route(
            "/api/v1/migration-sessions/{id}/cancel",
            post(sessions::cancel_session),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match flyerwise_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory wizard wiring for handler and scheduler tests.

    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use flyerwise_core::{CanonicalProduct, FlyerOffer, ListItem, OfferOrigin, ScoringConfig};
    use flyerwise_matching::InMemorySearch;
    use flyerwise_wizard::memory::{
        InMemoryCatalog, InMemorySessionStore, InMemoryShoppingList, InMemorySnapshotStore,
    };
    use flyerwise_wizard::{Capabilities, ManualClock, WizardManager};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    /// One expired milk item (Brand A, store-x) and two live milk offers.
    pub(crate) struct Fixture {
        pub list_id: Uuid,
        pub items: Vec<ListItem>,
        pub offers: Vec<FlyerOffer>,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            let list_id = Uuid::new_v4();
            let now = Utc::now();
            let offer = |brand: &str, store: &str, cents: i64| FlyerOffer {
                id: Uuid::new_v4(),
                canonical_product_id: None,
                name: "Whole Milk".to_string(),
                brand: Some(brand.to_string()),
                category: Some("dairy".to_string()),
                store_id: store.to_string(),
                price: Decimal::new(cents, 2),
                package: None,
                valid_from: now - Duration::days(1),
                valid_until: now + Duration::days(6),
            };
            let item = ListItem {
                id: Uuid::new_v4(),
                list_id,
                text: "Brand A whole milk".to_string(),
                offer_id: None,
                product: Some(CanonicalProduct::new(
                    Uuid::new_v4(),
                    "Whole Milk",
                    Some("Brand A"),
                    Some("dairy"),
                    None,
                )),
                origin: Some(OfferOrigin {
                    offer_id: Uuid::new_v4(),
                    store_id: "store-x".to_string(),
                    price: Decimal::new(150, 2),
                    package: None,
                }),
            };
            Self {
                list_id,
                items: vec![item],
                offers: vec![offer("Brand A", "store-x", 160), offer("Brand B", "store-y", 110)],
            }
        }
    }

    pub(crate) fn in_memory_wizard(fixture: &Fixture) -> (WizardManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = WizardManager::new(
            Capabilities {
                search: Arc::new(InMemorySearch::new(fixture.offers.clone())),
                sessions: Arc::new(InMemorySessionStore::default()),
                lists: Arc::new(InMemoryShoppingList::new(fixture.items.clone())),
                catalog: Arc::new(InMemoryCatalog::new(1, fixture.offers.clone())),
                snapshots: Arc::new(InMemorySnapshotStore::default()),
                clock: clock.clone(),
            },
            Arc::new(ScoringConfig::default()),
            Duration::minutes(30),
        );
        (manager, clock)
    }
}
