//! Beginner controller: plain tokens without claims.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub token: String,
}

/// Handler to issue a token.
pub async fn generate_token(State(state): State<AppState>) -> Result<Json<Response>> {
    let settings = super::signing_parameters(&state.config)?;
    let token = state.token.generate_token(
        &settings.secret_key,
        &settings.issuer,
        &settings.audience,
        settings.expiration_minutes,
    )?;

    tracing::info!(issuer = %settings.issuer, "token generated");

    Ok(Json(Response { token }))
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `POST /generate-token` goes to `generate_token`.
        .route("/generate-token", post(generate_token))
        .merge(super::demo(state))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;

    use super::*;
    use crate::config::Variant;
    use crate::router::tests::{AUDIENCE, ISSUER, settings, state, state_with};
    use crate::token::SigningParameters;
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_generate_token_handler() {
        let state = state(Variant::Beginner);
        let before = Utc::now().timestamp() as u64;

        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/api/auth/generate-token",
            String::default(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("refreshToken").is_none());

        let body: Response = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.token.matches('.').count(), 2);

        let claims = state.token.validate(&body.token, &settings()).unwrap();
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, AUDIENCE);
        assert!(claims.extra.is_empty());
        assert!(claims.iat.abs_diff(before) <= 1);
        assert_eq!(claims.exp, claims.iat + 30 * 60);
    }

    #[tokio::test]
    async fn test_generate_token_with_short_key() {
        let short = SigningParameters {
            secret_key: "short".into(),
            ..settings()
        };
        let response = make_request(
            app(state_with(Variant::Beginner, Some(short))),
            Method::POST,
            "/api/auth/generate-token",
            String::default(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_token_without_configuration() {
        let response = make_request(
            app(state_with(Variant::Beginner, None)),
            Method::POST,
            "/api/auth/generate-token",
            String::default(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_refresh_is_not_mounted() {
        let response = make_request(
            app(state(Variant::Beginner)),
            Method::POST,
            "/api/auth/refresh-token",
            r#"{"refreshToken":"anything"}"#.to_owned(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
