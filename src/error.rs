//! Error handler for the API.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::refresh::StoreError;
use crate::token::TokenError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("invalid 'Authorization' header")]
    Unauthorized,

    #[error("missing `{0}` entry in configuration")]
    MissingConfiguration(&'static str),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::InvalidRefreshToken,
        }
    }
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip)]
    status: StatusCode,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Update `message` field.
    pub fn message(mut self, message: &str) -> Self {
        self.message = message.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = Some(description.into());
        self
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            message: "Internal server error.".to_owned(),
            detail: None,
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            ServerError::Json(err) => ResponseError::default()
                .message("Request body is invalid.")
                .details(&err.body_text())
                .status(StatusCode::BAD_REQUEST)
                .into_response(),

            ServerError::Token(TokenError::InvalidKeyLength { .. }) => {
                tracing::error!(error = %self, "configured secret key is too short");

                ResponseError::default()
                    .message("Signing key is too short.")
                    .details(&self.to_string())
                    .status(StatusCode::BAD_REQUEST)
                    .into_response()
            },

            ServerError::InvalidRefreshToken => ResponseError::default()
                .message("Invalid refresh token.")
                .status(StatusCode::UNAUTHORIZED)
                .into_response(),

            ServerError::Unauthorized => (
                [(header::WWW_AUTHENTICATE, "Bearer")],
                ResponseError::default()
                    .message("Missing or invalid 'Authorization' header.")
                    .status(StatusCode::UNAUTHORIZED),
            )
                .into_response(),

            ServerError::Token(_) | ServerError::MissingConfiguration(_) => {
                tracing::error!(error = %self, "server returned 500 status");

                ResponseError::default().into_response()
            },
        }
    }
}
