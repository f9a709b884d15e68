use std::env;

use config::{Config, ConfigError, File};
use serde::Deserialize;

pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

#[derive(Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub backend: Backend,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
}

#[derive(Deserialize)]
pub struct Auth {
    /// Only ever populated from the `JWT_SECRET` environment variable.
    #[serde(default)]
    pub jwt_secret: String,
    pub bcrypt_cost: u32,
    pub enforce_ownership: bool,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("jwt_secret", &"<redacted>")
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("enforce_ownership", &self.enforce_ownership)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Accounts {
    pub allow_negative_bonus: bool,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub storage: Storage,
    pub postgres: Postgres,
    pub auth: Auth,
    pub accounts: Accounts,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.listen", "0.0.0.0:3000")?
            .set_default("storage.backend", "postgres")?
            .set_default("postgres.max_connections", 5)?
            .set_default("auth.bcrypt_cost", i64::from(bcrypt::DEFAULT_COST))?
            .set_default("auth.enforce_ownership", true)?
            .set_default("accounts.allow_negative_bonus", true)?
            .add_source(File::with_name(path).required(false))
            .set_override_option("auth.jwt_secret", env::var("JWT_SECRET").ok())?
            .set_override_option("postgres.url", env::var("DATABASE_URL").ok())?
            .build()?;

        config.try_deserialize()
    }

    /// Checks everything that must be right before the process starts serving.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Message("JWT_SECRET not set".to_string()));
        }

        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.auth.bcrypt_cost) {
            return Err(ConfigError::Message(format!(
                "auth.bcrypt_cost must be between {} and {}",
                MIN_BCRYPT_COST, MAX_BCRYPT_COST
            )));
        }

        if self.storage.backend == Backend::Postgres && self.postgres.url.is_empty() {
            return Err(ConfigError::Message(
                "postgres.url (or DATABASE_URL) must be set for the postgres backend".to_string(),
            ));
        }

        Ok(())
    }
}
