//! JSON Web Token issuance and validation demonstration API.

#![forbid(unsafe_code)]
pub mod clock;
pub mod config;
pub mod error;
mod middleware;
pub mod refresh;
mod router;
pub mod telemetry;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

use clock::{Clock, SystemClock};
use config::{Configuration, Variant};
use refresh::RefreshTokens;
use token::TokenService;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    bearer: Option<&str>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub clock: Arc<dyn Clock>,
    pub token: TokenService,
    pub refresh: RefreshTokens,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Build state around an in-memory refresh token store.
    pub fn new(
        config: Arc<Configuration>,
        clock: Arc<dyn Clock>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config,
            token: TokenService::new(Arc::clone(&clock)),
            clock,
            refresh: RefreshTokens::in_memory(),
            metrics,
        }
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let auth = match state.config.variant {
        Variant::Beginner => router::beginner::router(state.clone()),
        Variant::Intermediate => router::intermediate::router(state.clone()),
    };

    Router::new()
        .nest("/api/auth", auth)
        // `GET /metrics` goes to `render`.
        .route("/metrics", get(telemetry::render))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub fn initialize_state(
    config: Arc<Configuration>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let metrics = if config.metrics {
        Some(telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    if config.jwt_settings.is_none() {
        tracing::warn!("missing `jwt_settings` entry on `config.yaml` file");
    }

    Ok(AppState::new(config, Arc::new(SystemClock), metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_disabled() {
        let state = router::tests::state(Variant::Beginner);
        let response = make_request(app(state), Method::GET, "/metrics", String::default(), None).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = router::tests::state(Variant::Intermediate);
        let response =
            make_request(app(state), Method::GET, "/api/auth/nothing", String::default(), None).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
