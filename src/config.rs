//! Process configuration read from the environment.
//!
//! Each module parses its own keys through [`env_parse`]; this file holds
//! the server-level settings consumed by `main`.

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STORAGE_DIR: &str = "./storage";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_ENTITLEMENT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_AI_MAX_TOKENS: u32 = 4096;

/// Parse `key` as `T`, falling back to `default` when unset or malformed.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Server-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub storage_dir: String,
    /// Request body cap applied to every route, uploads included.
    pub max_upload_bytes: usize,
    pub entitlement_cache_ttl_secs: u64,
    pub ai_max_tokens: u32,
}

impl ServerConfig {
    /// Load from `DATABASE_URL` (required), `PORT`, `DB_MAX_CONNECTIONS`,
    /// `STORAGE_DIR`, `MAX_UPLOAD_BYTES`, `ENTITLEMENT_CACHE_TTL_SECS` and
    /// `AI_MAX_TOKENS`.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        Ok(Self {
            database_url,
            port: env_parse("PORT", DEFAULT_PORT),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            storage_dir: std::env::var("STORAGE_DIR").unwrap_or_else(|_| DEFAULT_STORAGE_DIR.to_string()),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            entitlement_cache_ttl_secs: env_parse("ENTITLEMENT_CACHE_TTL_SECS", DEFAULT_ENTITLEMENT_CACHE_TTL_SECS),
            ai_max_tokens: env_parse("AI_MAX_TOKENS", DEFAULT_AI_MAX_TOKENS),
        })
    }
}
