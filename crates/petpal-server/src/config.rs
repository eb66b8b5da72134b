//! Server configuration from environment variables.
//!
//!   PETPAL_BIND_ADDR            listen address (default: 0.0.0.0:4200)
//!   PETPAL_DATABASE_URL         Postgres connection string (optional)
//!   PETPAL_SEED_DIR             directory with templates/*.yaml and directory.yaml
//!   PETPAL_SIGNING_BASE_URL     prefix of issued signing links
//!   PETPAL_SIGNING_WINDOW_DAYS  days a sent contract waits for signatures

use anyhow::{bail, Context, Result};
use chrono::Duration;
use petpal_contracts::{LifecycleConfig, DEFAULT_SIGNING_BASE_URL};
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4200";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub seed_dir: Option<PathBuf>,
    pub signing_base_url: String,
    pub signing_window_days: Option<i64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            seed_dir: None,
            signing_base_url: DEFAULT_SIGNING_BASE_URL.to_string(),
            signing_window_days: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let signing_window_days = match get("PETPAL_SIGNING_WINDOW_DAYS") {
            Some(raw) => {
                let days: i64 = raw
                    .parse()
                    .with_context(|| format!("PETPAL_SIGNING_WINDOW_DAYS is not a number: {raw}"))?;
                if days <= 0 {
                    bail!("PETPAL_SIGNING_WINDOW_DAYS must be positive, got {days}");
                }
                Some(days)
            }
            None => None,
        };

        Ok(Self {
            bind_addr: get("PETPAL_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: get("PETPAL_DATABASE_URL"),
            seed_dir: get("PETPAL_SEED_DIR").map(PathBuf::from),
            signing_base_url: get("PETPAL_SIGNING_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SIGNING_BASE_URL.to_string()),
            signing_window_days,
        })
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            signing_base_url: self.signing_base_url.clone(),
            signing_window: self.signing_window_days.map(Duration::days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert!(cfg.lifecycle_config().signing_window.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("PETPAL_BIND_ADDR", "127.0.0.1:9000"),
            ("PETPAL_SIGNING_BASE_URL", "https://petpal.app/assinar"),
            ("PETPAL_SIGNING_WINDOW_DAYS", "15"),
            ("PETPAL_DATABASE_URL", "  "),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert!(cfg.database_url.is_none());
        assert_eq!(
            cfg.lifecycle_config().signing_window,
            Some(Duration::days(15))
        );
    }

    #[test]
    fn test_bad_window_fails() {
        assert!(config(&[("PETPAL_SIGNING_WINDOW_DAYS", "soon")]).is_err());
        assert!(config(&[("PETPAL_SIGNING_WINDOW_DAYS", "0")]).is_err());
    }
}
