//! Configuration manager.

use std::collections::BTreeMap;
use std::fs::File;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::token::{Claim, SigningParameters};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for `{name}` environment variable")]
    InvalidVariable { name: &'static str, value: String },
}

/// Which authentication controller is mounted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Plain tokens, no refresh.
    Beginner,
    /// Tokens with claims and refresh token exchange.
    #[default]
    Intermediate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Listening socket.
    pub address: SocketAddr,
    pub variant: Variant,
    /// Install the Prometheus recorder and expose `/metrics`.
    pub metrics: bool,
    /// Related to JsonWebToken configuration.
    pub jwt_settings: Option<SigningParameters>,
    /// Claims embedded on intermediate tokens.
    ///
    /// Every caller receives the same identity: this is a placeholder until
    /// real users exist.
    pub claims: BTreeMap<String, String>,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            variant: Variant::default(),
            metrics: false,
            jwt_settings: None,
            claims: BTreeMap::from([
                ("sub".to_owned(), "123456".to_owned()),
                ("email".to_owned(), "user@example.com".to_owned()),
                ("Role".to_owned(), "Admin".to_owned()),
                ("Department".to_owned(), "IT".to_owned()),
            ]),
            path: PathBuf::default(),
        }
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Claims to embed on intermediate tokens.
    pub fn claims(&self) -> Vec<Claim> {
        self.claims
            .iter()
            .map(|(name, value)| Claim::new(name, value))
            .collect()
    }

    /// Reads the file at the specified path, or `config.yaml` when no path
    /// was given, then applies environment overrides.
    ///
    /// A missing or invalid file yields the default configuration.
    pub fn read(self) -> Result<Arc<Self>, ConfigError> {
        self.read_with(|name| std::env::var(name).ok())
    }

    fn read_with<F>(self, lookup: F) -> Result<Arc<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_path = if self.path.as_os_str().is_empty() {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        } else {
            self.path.clone()
        };

        let mut config = match File::open(&file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(config) => config,
                Err(err) => Self::fallback(&file_path, err),
            },
            Err(err) => Self::fallback(&file_path, err),
        };
        config.path = file_path;
        config.apply_overrides(lookup)?;

        Ok(Arc::new(config))
    }

    /// Override settings with values returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ADDRESS") {
            self.address = value.parse().map_err(|_| ConfigError::InvalidVariable {
                name: "ADDRESS",
                value,
            })?;
        }

        let secret_key = lookup("JWT_SECRET_KEY");
        let issuer = lookup("JWT_ISSUER");
        let audience = lookup("JWT_AUDIENCE");
        let expiration = lookup("JWT_EXPIRATION_MINUTES");

        if secret_key.is_none() && issuer.is_none() && audience.is_none() && expiration.is_none() {
            return Ok(());
        }

        let settings = self.jwt_settings.get_or_insert_with(SigningParameters::default);
        if let Some(secret_key) = secret_key {
            settings.secret_key = secret_key;
        }
        if let Some(issuer) = issuer {
            settings.issuer = issuer;
        }
        if let Some(audience) = audience {
            settings.audience = audience;
        }
        if let Some(value) = expiration {
            settings.expiration_minutes =
                value.parse().map_err(|_| ConfigError::InvalidVariable {
                    name: "JWT_EXPIRATION_MINUTES",
                    value,
                })?;
        }

        Ok(())
    }

    /// Return a default configuration as fallback.
    fn fallback(path: &Path, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, path = %path.display(), "configuration file not found or invalid");
        Self::default()
    }
}
