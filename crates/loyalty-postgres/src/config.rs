//! Connection configuration for the PostgreSQL store.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub const ENV_DATABASE_URL: &str = "LOYALTY_DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "LOYALTY_DB_MAX_CONNECTIONS";
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "LOYALTY_DB_ACQUIRE_TIMEOUT_MS";

/// PostgreSQL pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PgStoreConfig {
    /// PostgreSQL connection URI.
    pub url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long an operation waits for a free connection before failing.
    pub acquire_timeout_ms: u64,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/loyalty".to_string(),
            max_connections: 10,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl PgStoreConfig {
    /// Defaults overridden by `LOYALTY_DATABASE_URL`, `LOYALTY_DB_MAX_CONNECTIONS`
    /// and `LOYALTY_DB_ACQUIRE_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_DATABASE_URL) {
            config.url = url;
        }
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_CONNECTIONS} is not a number: {raw:?}"))?;
        }
        if let Some(raw) = lookup(ENV_ACQUIRE_TIMEOUT_MS) {
            config.acquire_timeout_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_ACQUIRE_TIMEOUT_MS} is not a number: {raw:?}"))?;
        }

        Ok(config)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub async fn connect(&self) -> Result<PgPool> {
        info!(
            max_connections = self.max_connections,
            acquire_timeout_ms = self.acquire_timeout_ms,
            "connecting to PostgreSQL"
        );

        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout())
            .connect(&self.url)
            .await
            .context("failed to connect to PostgreSQL")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_variables() {
        assert_eq!(
            PgStoreConfig::from_lookup(lookup(&[])).unwrap(),
            PgStoreConfig::default()
        );
    }

    #[test]
    fn variables_override_defaults() {
        let config = PgStoreConfig::from_lookup(lookup(&[
            (ENV_DATABASE_URL, "postgres://db:5432/points"),
            (ENV_MAX_CONNECTIONS, " 4 "),
            (ENV_ACQUIRE_TIMEOUT_MS, "250"),
        ]))
        .unwrap();

        assert_eq!(config.url, "postgres://db:5432/points");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.acquire_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn unparsable_number_is_an_error() {
        let err = PgStoreConfig::from_lookup(lookup(&[(ENV_MAX_CONNECTIONS, "many")])).unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_CONNECTIONS));
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: PgStoreConfig =
            serde_json::from_str(r#"{ "url": "postgres://x/y" }"#).unwrap();
        assert_eq!(config.url, "postgres://x/y");
        assert_eq!(config.max_connections, 10);
    }
}
