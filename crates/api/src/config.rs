//! Server-level settings read from the environment.
//!
//! Token settings live in [`helpdesk_auth::JwtConfig`]; this covers only what
//! the binary needs to wire backends and serve HTTP.

use std::time::Duration;

use helpdesk_auth::ConfigError;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 3600;

#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Postgres backends when set; in-memory otherwise.
    pub database_url: Option<String>,
    /// Redis blacklist when set; in-memory otherwise.
    pub redis_url: Option<String>,
    /// Adds `Secure` to the refresh-token cookie.
    pub cookie_secure: bool,
    pub sweep_interval: Duration,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            redis_url: None,
            cookie_secure: false,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
            bootstrap_admin: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.database_url = get("DATABASE_URL");
        config.redis_url = get("REDIS_URL");

        if let Some(value) = get("COOKIE_SECURE") {
            config.cookie_secure = parse_bool("COOKIE_SECURE", &value)?;
        }

        if let Some(value) = get("REFRESH_SWEEP_INTERVAL_SECONDS") {
            let secs: u64 = value.parse().map_err(|_| ConfigError::Invalid {
                key: "REFRESH_SWEEP_INTERVAL_SECONDS",
                value: value.clone(),
            })?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "REFRESH_SWEEP_INTERVAL_SECONDS",
                    value,
                });
            }
            config.sweep_interval = Duration::from_secs(secs);
        }

        config.bootstrap_admin = match (get("BOOTSTRAP_ADMIN_EMAIL"), get("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (Some(_), None) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_EMAIL")),
            (None, None) => None,
        };

        Ok(config)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_in_memory_backends() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.database_url.is_none());
        assert!(!config.cookie_secure);
    }

    #[test]
    fn reads_every_setting() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/helpdesk"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("COOKIE_SECURE", "TRUE"),
            ("REFRESH_SWEEP_INTERVAL_SECONDS", "60"),
            ("BOOTSTRAP_ADMIN_EMAIL", "root@example.com"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert!(config.cookie_secure);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(
            config.bootstrap_admin.map(|a| a.email),
            Some("root@example.com".to_string())
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("COOKIE_SECURE", "maybe")])),
            Err(ConfigError::Invalid { key: "COOKIE_SECURE", .. })
        ));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("REFRESH_SWEEP_INTERVAL_SECONDS", "0")])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("BOOTSTRAP_ADMIN_EMAIL", "a@b.c")])),
            Err(ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD"))
        ));
    }
}
