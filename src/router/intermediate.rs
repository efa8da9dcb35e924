//! Intermediate controller: tokens with claims and refresh token exchange.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::router::JsonBody;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    pub refresh_token: String,
}

/// Sign a token carrying the configured claims.
fn mint(state: &AppState) -> Result<String> {
    let settings = super::signing_parameters(&state.config)?;
    Ok(state.token.generate(settings, &state.config.claims())?)
}

/// Handler to issue a token and its refresh token.
pub async fn generate_token(State(state): State<AppState>) -> Result<Json<Response>> {
    let token = mint(&state)?;
    let refresh_token = state.refresh.issue(token.clone());

    tracing::info!("token generated with refresh token");

    Ok(Json(Response {
        token,
        refresh_token,
    }))
}

/// Handler to trade a refresh token for a new pair.
pub async fn refresh_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Body>,
) -> Result<Json<Response>> {
    let (token, refresh_token) = state
        .refresh
        .exchange(&body.refresh_token, || mint(&state))
        .inspect_err(|err| tracing::warn!(error = %err, "refresh token exchange refused"))?;

    tracing::info!("refresh token exchanged");

    Ok(Json(Response {
        token,
        refresh_token,
    }))
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `POST /generate-token` goes to `generate_token`.
        .route("/generate-token", post(generate_token))
        // `POST /refresh-token` goes to `refresh_token`.
        .route("/refresh-token", post(refresh_token))
        .merge(super::demo(state))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::config::Variant;
    use crate::router::tests::{AUDIENCE, ISSUER, settings, state};
    use crate::{app, make_request};

    async fn generate(state: &AppState) -> Response {
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
        serde_json::from_slice(&body).unwrap()
    }

    async fn refresh(state: &AppState, refresh_token: &str) -> axum::response::Response {
        make_request(
            app(state.clone()),
            Method::POST,
            "/api/auth/refresh-token",
            json!({ "refreshToken": refresh_token }).to_string(),
            None,
        )
        .await
    }

    #[tokio::test]
    async fn test_generate_token_handler() {
        let state = state(Variant::Intermediate);
        let body = generate(&state).await;

        let claims = state.token.validate(&body.token, &settings()).unwrap();
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, AUDIENCE);
        assert_eq!(claims.get("sub"), Some("123456"));
        assert_eq!(claims.get("email"), Some("user@example.com"));
        assert_eq!(claims.get("Role"), Some("Admin"));
        assert_eq!(claims.get("Department"), Some("IT"));

        assert_eq!(
            state.refresh.store().get(&body.refresh_token),
            Some(body.token)
        );
    }

    #[tokio::test]
    async fn test_refresh_token_handler() {
        let state = state(Variant::Intermediate);
        let first = generate(&state).await;

        let response = refresh(&state, &first.refresh_token).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let second: Response = serde_json::from_slice(&body).unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let claims = state.token.validate(&second.token, &settings()).unwrap();
        assert_eq!(claims.get("Role"), Some("Admin"));

        let store = state.refresh.store();
        assert_eq!(store.get(&first.refresh_token), None);
        assert_eq!(store.get(&second.refresh_token), Some(second.token));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_token_replay() {
        let state = state(Variant::Intermediate);
        let first = generate(&state).await;

        assert_eq!(
            refresh(&state, &first.refresh_token).await.status(),
            StatusCode::OK
        );

        let response = refresh(&state, &first.refresh_token).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "message": "Invalid refresh token." }));
    }

    #[tokio::test]
    async fn test_refresh_token_unknown() {
        let state = state(Variant::Intermediate);

        let response = refresh(&state, "never-issued").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(state.refresh.store().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_token_malformed_body() {
        let response = make_request(
            app(state(Variant::Intermediate)),
            Method::POST,
            "/api/auth/refresh-token",
            r#"{"refresh_token": 12}"#.to_owned(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refreshed_token_opens_secure_endpoint() {
        let state = state(Variant::Intermediate);
        let first = generate(&state).await;

        let response = refresh(&state, &first.refresh_token).await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let second: Response = serde_json::from_slice(&body).unwrap();

        let response = make_request(
            app(state),
            Method::GET,
            "/api/auth/secure-endpoint",
            String::default(),
            Some(&second.token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
