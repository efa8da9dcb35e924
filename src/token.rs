//! Manage json web tokens.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::Clock;

/// Minimum number of characters of the shared secret.
pub const MINIMUM_KEY_LENGTH: usize = 32;
const ALGORITHM: Algorithm = Algorithm::HS256;
const DEFAULT_EXPIRATION_MINUTES: u32 = 30;
/// Claims written by [`TokenService`] itself.
const REGISTERED_CLAIMS: [&str; 4] = ["iss", "aud", "exp", "iat"];

/// Errors raised while signing or validating a token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("secret key must be at least {minimum} characters long")]
    InvalidKeyLength { minimum: usize },

    #[error("signature validation failed")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token issuer is not accepted")]
    InvalidIssuer,

    #[error("token audience is not accepted")]
    InvalidAudience,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("cannot sign token")]
    Encoding(#[source] jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Everything needed to sign or check a token.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SigningParameters {
    /// Shared HMAC secret.
    pub secret_key: String,
    /// Identifies the organization that issues the JWT.
    pub issuer: String,
    /// Recipients that the JWT is intended for.
    pub audience: String,
    /// Lifetime of issued tokens.
    pub expiration_minutes: u32,
}

impl Default for SigningParameters {
    fn default() -> Self {
        Self {
            secret_key: String::default(),
            issuer: String::default(),
            audience: String::default(),
            expiration_minutes: DEFAULT_EXPIRATION_MINUTES,
        }
    }
}

impl fmt::Debug for SigningParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningParameters")
            .field("secret_key", &"[redacted]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration_minutes", &self.expiration_minutes)
            .finish()
    }
}

/// A custom claim embedded on a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    pub name: String,
    pub value: String,
}

impl Claim {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Any other claim, such as `sub` or `email`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Claims {
    /// Look up a textual claim by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}

fn check_key_length(secret_key: &str) -> Result<(), TokenError> {
    if secret_key.chars().count() < MINIMUM_KEY_LENGTH {
        return Err(TokenError::InvalidKeyLength {
            minimum: MINIMUM_KEY_LENGTH,
        });
    }
    Ok(())
}

/// Sign and check HS256 tokens.
#[derive(Clone)]
pub struct TokenService {
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a new [`TokenService`] stamping tokens with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Create a token carrying only registered claims.
    pub fn generate_token(
        &self,
        secret_key: &str,
        issuer: &str,
        audience: &str,
        expiration_minutes: u32,
    ) -> Result<String, TokenError> {
        self.generate_token_with_claims(secret_key, issuer, audience, expiration_minutes, &[])
    }

    /// Create a token embedding `claims` next to the registered ones.
    ///
    /// Issuer, audience and expiration are written as given. A claim named
    /// after a registered one is ignored.
    pub fn generate_token_with_claims(
        &self,
        secret_key: &str,
        issuer: &str,
        audience: &str,
        expiration_minutes: u32,
        claims: &[Claim],
    ) -> Result<String, TokenError> {
        check_key_length(secret_key)?;

        let mut extra = BTreeMap::new();
        for claim in claims {
            if REGISTERED_CLAIMS.contains(&claim.name.as_str()) {
                tracing::warn!(claim = %claim.name, "registered claim cannot be overridden");
                continue;
            }
            extra.insert(claim.name.clone(), Value::String(claim.value.clone()));
        }

        let iat = self.clock.timestamp();
        let payload = Claims {
            iss: issuer.to_owned(),
            aud: audience.to_owned(),
            exp: iat + u64::from(expiration_minutes) * 60,
            iat,
            extra,
        };

        let key = EncodingKey::from_secret(secret_key.as_bytes());
        encode(&Header::new(ALGORITHM), &payload, &key).map_err(TokenError::Encoding)
    }

    /// Create a token from configured parameters.
    pub fn generate(
        &self,
        parameters: &SigningParameters,
        claims: &[Claim],
    ) -> Result<String, TokenError> {
        self.generate_token_with_claims(
            &parameters.secret_key,
            &parameters.issuer,
            &parameters.audience,
            parameters.expiration_minutes,
            claims,
        )
    }

    /// Decode and check a token against signature, lifetime, issuer and
    /// audience.
    ///
    /// A secret shorter than [`MINIMUM_KEY_LENGTH`] accepts no token.
    pub fn validate(
        &self,
        token: &str,
        parameters: &SigningParameters,
    ) -> Result<Claims, TokenError> {
        check_key_length(&parameters.secret_key)?;

        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&parameters.issuer]);
        validation.set_audience(&[&parameters.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let key = DecodingKey::from_secret(parameters.secret_key.as_bytes());
        Ok(decode::<Claims>(token, &key, &validation)?.claims)
    }
}
