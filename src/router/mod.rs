//! HTTP API under `/api/auth`.
pub mod beginner;
pub mod intermediate;

use axum::extract::{FromRequest, State};
use axum::routing::get;
use axum::{Extension, Json, Router, middleware};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::error::{Result, ServerError};
use crate::token::{Claims, SigningParameters};
use crate::{AppState, middleware as auth};

const SECURE_MESSAGE: &str = "This is a secure endpoint. You have a valid token!";
const PUBLIC_MESSAGE: &str = "This is a public endpoint. No token required!";

/// JSON body whose rejection is turned into a [`ServerError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct JsonBody<T>(pub T);

/// Demonstration endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// JWT settings, or a 500 if absent.
pub fn signing_parameters(config: &Configuration) -> Result<&SigningParameters> {
    config
        .jwt_settings
        .as_ref()
        .ok_or(ServerError::MissingConfiguration("jwt_settings"))
}

/// Public and secured endpoints shared by both variants.
pub fn demo(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /secure-endpoint` goes to `secure_endpoint`. Authorization required.
        .route("/secure-endpoint", get(secure_endpoint))
        .route_layer(middleware::from_fn_with_state(state, auth::authenticate))
        // `GET /public-endpoint` goes to `public_endpoint`.
        .route("/public-endpoint", get(public_endpoint))
}

async fn secure_endpoint(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Json<Message> {
    tracing::debug!(subject = claims.get("sub"), issuer = %claims.iss, "secure endpoint accessed");

    Json(Message {
        message: SECURE_MESSAGE.to_owned(),
        timestamp: state.clock.now(),
    })
}

async fn public_endpoint(State(state): State<AppState>) -> Json<Message> {
    Json(Message {
        message: PUBLIC_MESSAGE.to_owned(),
        timestamp: state.clock.now(),
    })
}
