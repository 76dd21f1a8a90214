use std::time::Duration;

use crate::dispatcher::{DispatchSettings, DEFAULT_MAX_CONCURRENCY};
use crate::error::ConfigError;
use crate::payload::DEFAULT_ICON;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub api_bind: String,
    pub min_send_interval_ms: u64,
    pub max_concurrency: usize,
    pub skip_inactive_users: bool,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    pub push_ttl_secs: u32,
    pub push_timeout_secs: u64,
    pub icon_path: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = var("VIGIL_DATABASE_URL")
            .or_else(|| var("DATABASE_URL"))
            .ok_or(ConfigError::Missing("VIGIL_DATABASE_URL"))?;
        let redis_url = var("VIGIL_REDIS_URL");
        let api_bind = var("VIGIL_API_BIND").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let min_send_interval_ms = parse_or(&var, "VIGIL_MIN_SEND_INTERVAL_MS", 5000)?;
        let max_concurrency = parse_or(&var, "VIGIL_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?;
        let skip_inactive_users = match var("VIGIL_SKIP_INACTIVE_USERS") {
            Some(raw) => parse_bool("VIGIL_SKIP_INACTIVE_USERS", &raw)?,
            None => false,
        };
        let push_ttl_secs = parse_or(&var, "VIGIL_PUSH_TTL_SECS", 86_400)?;
        let push_timeout_secs = parse_or(&var, "VIGIL_PUSH_TIMEOUT_SECS", 30)?;
        let icon_path = var("VIGIL_ICON_PATH").unwrap_or_else(|| DEFAULT_ICON.to_string());

        Ok(Self {
            database_url,
            redis_url,
            api_bind,
            min_send_interval_ms,
            max_concurrency,
            skip_inactive_users,
            vapid_private_key: var("VIGIL_VAPID_PRIVATE_KEY"),
            vapid_public_key: var("VIGIL_VAPID_PUBLIC_KEY"),
            vapid_subject: var("VIGIL_VAPID_SUBJECT"),
            push_ttl_secs,
            push_timeout_secs,
            icon_path,
        })
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            min_interval: Duration::from_millis(self.min_send_interval_ms),
            max_concurrency: self.max_concurrency.max(1),
            skip_inactive_users: self.skip_inactive_users,
            icon: self.icon_path.clone(),
        }
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[("DATABASE_URL", "postgres://localhost/vigil")]).unwrap();

        assert_eq!(settings.database_url, "postgres://localhost/vigil");
        assert_eq!(settings.api_bind, "0.0.0.0:3000");
        assert_eq!(settings.min_send_interval_ms, 5000);
        assert_eq!(settings.max_concurrency, 16);
        assert!(!settings.skip_inactive_users);
        assert_eq!(settings.push_ttl_secs, 86_400);
        assert!(settings.redis_url.is_none());
        assert!(settings.vapid_private_key.is_none());
        assert_eq!(
            settings.dispatch_settings().min_interval,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_prefixed_database_url_wins() {
        let settings = settings(&[
            ("DATABASE_URL", "postgres://fallback"),
            ("VIGIL_DATABASE_URL", "postgres://primary"),
        ])
        .unwrap();
        assert_eq!(settings.database_url, "postgres://primary");
    }

    #[test]
    fn test_missing_database_url() {
        assert_eq!(
            settings(&[]).unwrap_err(),
            ConfigError::Missing("VIGIL_DATABASE_URL")
        );
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("DATABASE_URL", "postgres://localhost/vigil"),
            ("VIGIL_MIN_SEND_INTERVAL_MS", "10000"),
            ("VIGIL_MAX_CONCURRENCY", "0"),
            ("VIGIL_SKIP_INACTIVE_USERS", "true"),
            ("VIGIL_REDIS_URL", "redis://localhost"),
        ])
        .unwrap();

        let dispatch = settings.dispatch_settings();
        assert_eq!(dispatch.min_interval, Duration::from_secs(10));
        assert_eq!(dispatch.max_concurrency, 1);
        assert!(dispatch.skip_inactive_users);
        assert_eq!(settings.redis_url.as_deref(), Some("redis://localhost"));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = settings(&[
            ("DATABASE_URL", "postgres://localhost/vigil"),
            ("VIGIL_PUSH_TTL_SECS", "forever"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "VIGIL_PUSH_TTL_SECS",
                value: "forever".to_string()
            }
        );
    }
}
