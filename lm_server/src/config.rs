//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use live_match::{LiveMatchConfig, db::DatabaseConfig, scheduler::RetryPolicy};
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Use the in-memory store instead of Postgres
    pub in_memory: bool,
    /// Security configuration
    pub security: SecurityConfig,
    /// Live-mode timings and limits
    pub live: LiveMatchConfig,
    /// Run the timer queue; `false` starts in degraded mode
    pub scheduler_enabled: bool,
    /// Photo storage configuration
    pub photos: PhotoStorageConfig,
    /// Prometheus exporter address, if metrics are enabled
    pub metrics_bind: Option<SocketAddr>,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Secret used to verify access tokens (required)
    pub jwt_secret: String,
}

/// Local photo storage
#[derive(Debug, Clone)]
pub struct PhotoStorageConfig {
    /// Directory photos are written to
    pub dir: PathBuf,
    /// Prefix for generated photo URLs
    pub public_base_url: String,
    /// Key used to sign photo URLs
    pub url_secret: String,
    /// Lifetime of a signed photo URL
    pub url_ttl: Duration,
}

/// Overrides taken from the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<SocketAddr>,
    pub database_url: Option<String>,
    pub in_memory: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `overrides` - Values given on the command line, which win over the environment
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let bind = match overrides.bind {
            Some(bind) => bind,
            None => parse_env_required_or(
                "SERVER_BIND",
                SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            )?,
        };

        // Database configuration
        let database_url = overrides
            .database_url
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| DatabaseConfig::default().database_url);

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 2),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT_SECS", 5),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", 1800),
        };
        let in_memory = overrides.in_memory || parse_env_or("LIVE_IN_MEMORY", false);

        // Security configuration (REQUIRED)
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use the platform's access-token signing secret".to_string(),
        })?;
        let security = SecurityConfig { jwt_secret };

        let defaults = LiveMatchConfig::default();
        let live = LiveMatchConfig {
            fuzz_radius_km: parse_env_or("LIVE_FUZZ_RADIUS_KM", defaults.fuzz_radius_km),
            min_session_minutes: parse_env_or(
                "LIVE_MIN_SESSION_MINUTES",
                defaults.min_session_minutes,
            ),
            max_session_minutes: parse_env_or(
                "LIVE_MAX_SESSION_MINUTES",
                defaults.max_session_minutes,
            ),
            max_extend_minutes: parse_env_or("LIVE_MAX_EXTEND_MINUTES", defaults.max_extend_minutes),
            settle_delay: env_millis_or("LIVE_SETTLE_DELAY_MS", defaults.settle_delay),
            decline_cooldown: env_millis_or("LIVE_DECLINE_COOLDOWN_MS", defaults.decline_cooldown),
            release_delay: env_millis_or("LIVE_RELEASE_DELAY_MS", defaults.release_delay),
            match_ttl: Duration::from_secs(parse_env_or(
                "LIVE_MATCH_TTL_SECS",
                defaults.match_ttl.as_secs(),
            )),
            max_photo_bytes: parse_env_or("LIVE_MAX_PHOTO_BYTES", defaults.max_photo_bytes),
            retry: RetryPolicy {
                max_attempts: parse_env_or("LIVE_TASK_MAX_ATTEMPTS", defaults.retry.max_attempts),
                ..defaults.retry
            },
        };
        let scheduler_enabled = parse_env_or("LIVE_SCHEDULER_ENABLED", true);

        let photos = PhotoStorageConfig {
            dir: std::env::var("PHOTO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/photos")),
            public_base_url: std::env::var("PHOTO_BASE_URL").unwrap_or_default(),
            url_secret: std::env::var("PHOTO_URL_SECRET")
                .unwrap_or_else(|_| security.jwt_secret.clone()),
            url_ttl: Duration::from_secs(parse_env_or("PHOTO_URL_TTL_SECS", 900)),
        };

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(raw) if !raw.is_empty() => {
                Some(raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{raw}' is not a socket address"),
                })?)
            }
            _ => None,
        };

        Ok(ServerConfig {
            bind,
            database,
            in_memory,
            security,
            live,
            scheduler_enabled,
            photos,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.photos.url_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "PHOTO_URL_SECRET".to_string(),
                reason: "Must be at least 32 characters".to_string(),
            });
        }

        if self.photos.url_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                var: "PHOTO_URL_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if !self.in_memory && self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        self.live
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "LIVE_*".to_string(),
                reason,
            })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like `parse_env_or`, but a present and unparsable value is an error
fn parse_env_required_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            var: key.to_string(),
            reason: format!("'{raw}' could not be parsed"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_millis_or(key: &str, default: Duration) -> Duration {
    Duration::from_millis(parse_env_or(key, default.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn clear_env() {
        for key in [
            "SERVER_BIND",
            "JWT_SECRET",
            "PHOTO_URL_SECRET",
            "METRICS_BIND",
            "LIVE_SETTLE_DELAY_MS",
            "LIVE_DECLINE_COOLDOWN_MS",
            "LIVE_MATCH_TTL_SECS",
            "LIVE_SCHEDULER_ENABLED",
        ] {
            // SAFETY: tests touching the environment run serially
            unsafe { std::env::remove_var(key) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: tests touching the environment run serially
        unsafe { std::env::set_var(key, value) };
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use the signing secret".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_SECRET"));
        assert!(msg.contains("Use the signing secret"));
    }

    #[test]
    #[serial]
    fn test_missing_jwt_secret_is_reported() {
        clear_env();
        let err = ServerConfig::from_env(CliOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref var, .. } if var == "JWT_SECRET"));
    }

    #[test]
    #[serial]
    fn test_defaults_load_and_validate() {
        clear_env();
        set_env("JWT_SECRET", SECRET);

        let config = ServerConfig::from_env(CliOverrides::default()).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert!(config.scheduler_enabled);
        assert!(config.metrics_bind.is_none());
        assert_eq!(config.live.settle_delay, Duration::from_secs(15));
        assert_eq!(config.photos.url_secret, SECRET);
        assert!(config.validate().is_ok());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_live_timings_from_env() {
        clear_env();
        set_env("JWT_SECRET", SECRET);
        set_env("LIVE_SETTLE_DELAY_MS", "2000");
        set_env("LIVE_DECLINE_COOLDOWN_MS", "4000");
        set_env("LIVE_MATCH_TTL_SECS", "60");
        set_env("LIVE_SCHEDULER_ENABLED", "false");

        let config = ServerConfig::from_env(CliOverrides {
            in_memory: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.live.settle_delay, Duration::from_millis(2000));
        assert_eq!(config.live.decline_cooldown, Duration::from_millis(4000));
        assert_eq!(config.live.match_ttl, Duration::from_secs(60));
        assert!(!config.scheduler_enabled);
        assert!(config.in_memory);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_cooldown_shorter_than_settle_is_rejected() {
        clear_env();
        set_env("JWT_SECRET", SECRET);
        set_env("LIVE_SETTLE_DELAY_MS", "20000");
        set_env("LIVE_DECLINE_COOLDOWN_MS", "10000");

        let config = ServerConfig::from_env(CliOverrides::default()).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_short_secret_and_bad_metrics_bind() {
        clear_env();
        set_env("JWT_SECRET", "short");
        let config = ServerConfig::from_env(CliOverrides::default()).unwrap();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { ref var, .. } if var == "JWT_SECRET"
        ));

        set_env("METRICS_BIND", "not-an-address");
        let err = ServerConfig::from_env(CliOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "METRICS_BIND"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_cli_overrides_win() {
        clear_env();
        set_env("JWT_SECRET", SECRET);
        set_env("SERVER_BIND", "0.0.0.0:9000");

        let config = ServerConfig::from_env(CliOverrides {
            bind: Some("127.0.0.1:7000".parse().unwrap()),
            database_url: Some("postgres://override".to_string()),
            in_memory: false,
        })
        .unwrap();
        assert_eq!(config.bind.port(), 7000);
        assert_eq!(config.database.database_url, "postgres://override");
        clear_env();
    }
}
