//! Configuration management
//!
//! Configuration is loaded from a `config.yml` file and may be overridden by
//! `GATEHOUSE_*` environment variables. Missing values fall back to defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session and credential configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/gatehouse.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Longest accepted `auth.session_length_secs` (ten years)
pub const MAX_SESSION_LENGTH_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Session and credential configuration.
///
/// `session_length_secs` is the single source for both the cookie max-age and
/// the server-side idle cutoff, so client and server expiry never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Permitted inactivity before a session expires, in seconds
    #[serde(default = "default_session_length_secs")]
    pub session_length_secs: u64,
    /// Public route unauthenticated clients are redirected to
    #[serde(default = "default_landing_route")]
    pub landing_route: String,
    /// Route failed logins are redirected to
    #[serde(default = "default_login_route")]
    pub login_route: String,
    /// Password hashing work factor
    #[serde(default)]
    pub hash: HashConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_length_secs: default_session_length_secs(),
            landing_route: default_landing_route(),
            login_route: default_login_route(),
            hash: HashConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Session length as a chrono duration, clamped to `MAX_SESSION_LENGTH_SECS`
    pub fn session_length(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_length_secs.min(MAX_SESSION_LENGTH_SECS) as i64)
    }
}

fn default_session_length_secs() -> u64 {
    3600
}

fn default_landing_route() -> String {
    "/".to_string()
}

fn default_login_route() -> String {
    "/login".to_string()
}

/// Argon2id work factor.
///
/// Defaults match the argon2 crate's recommended parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashConfig {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    /// Number of passes
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Degree of parallelism
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

fn default_memory_kib() -> u32 {
    19 * 1024
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - GATEHOUSE_SERVER_HOST
    /// - GATEHOUSE_SERVER_PORT
    /// - GATEHOUSE_DATABASE_DRIVER
    /// - GATEHOUSE_DATABASE_URL
    /// - GATEHOUSE_AUTH_SESSION_LENGTH_SECS
    /// - GATEHOUSE_AUTH_LANDING_ROUTE
    /// - GATEHOUSE_AUTH_HASH_MEMORY_KIB
    /// - GATEHOUSE_AUTH_HASH_ITERATIONS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the auth layer cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.session_length_secs == 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_length_secs must be greater than zero".to_string(),
            ));
        }
        if self.auth.session_length_secs > MAX_SESSION_LENGTH_SECS {
            return Err(ConfigError::ValidationError(format!(
                "auth.session_length_secs must be at most {}",
                MAX_SESSION_LENGTH_SECS
            )));
        }
        if !self.auth.landing_route.starts_with('/') || !self.auth.login_route.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "auth routes must be absolute paths".to_string(),
            ));
        }
        let hash = &self.auth.hash;
        argon2::Params::new(hash.memory_kib, hash.iterations, hash.parallelism, None)
            .map_err(|e| ConfigError::ValidationError(format!("auth.hash: {}", e)))?;
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("GATEHOUSE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("GATEHOUSE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(driver) = std::env::var("GATEHOUSE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("GATEHOUSE_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(secs) = std::env::var("GATEHOUSE_AUTH_SESSION_LENGTH_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.auth.session_length_secs = secs;
            }
        }
        if let Ok(route) = std::env::var("GATEHOUSE_AUTH_LANDING_ROUTE") {
            self.auth.landing_route = route;
        }
        if let Ok(kib) = std::env::var("GATEHOUSE_AUTH_HASH_MEMORY_KIB") {
            if let Ok(kib) = kib.parse::<u32>() {
                self.auth.hash.memory_kib = kib;
            }
        }
        if let Ok(iterations) = std::env::var("GATEHOUSE_AUTH_HASH_ITERATIONS") {
            if let Ok(iterations) = iterations.parse::<u32>() {
                self.auth.hash.iterations = iterations;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_KEYS: &[&str] = &[
        "GATEHOUSE_SERVER_HOST",
        "GATEHOUSE_SERVER_PORT",
        "GATEHOUSE_DATABASE_DRIVER",
        "GATEHOUSE_DATABASE_URL",
        "GATEHOUSE_AUTH_SESSION_LENGTH_SECS",
        "GATEHOUSE_AUTH_LANDING_ROUTE",
        "GATEHOUSE_AUTH_HASH_MEMORY_KIB",
        "GATEHOUSE_AUTH_HASH_ITERATIONS",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
        guard
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_gatehouse_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.url, "data/gatehouse.db");
        assert_eq!(config.auth.session_length_secs, 3600);
        assert_eq!(config.auth.landing_route, "/");
        assert_eq!(config.auth.hash, HashConfig::default());
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "   \n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.session_length_secs, 3600);
    }

    #[test]
    fn test_load_partial_auth_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "auth:\n  session_length_secs: 900\n  hash:\n    iterations: 3\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.auth.session_length_secs, 900);
        assert_eq!(config.auth.session_length(), chrono::Duration::seconds(900));
        assert_eq!(config.auth.hash.iterations, 3);
        assert_eq!(config.auth.hash.memory_kib, 19 * 1024);
        assert_eq!(config.auth.login_route, "/login");
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "auth:\n  session_length_secs: forever\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_validate_rejects_zero_session_length() {
        let mut config = Config::default();
        config.auth.session_length_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_rejects_unusable_work_factor() {
        let mut config = Config::default();
        config.auth.hash.iterations = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.hash.memory_kib = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_routes() {
        let mut config = Config::default();
        config.auth.landing_route = "home".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_auth_config() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "auth:\n  session_length_secs: 60\n").unwrap();

        std::env::set_var("GATEHOUSE_AUTH_SESSION_LENGTH_SECS", "7200");
        std::env::set_var("GATEHOUSE_AUTH_LANDING_ROUTE", "/welcome");
        std::env::set_var("GATEHOUSE_AUTH_HASH_ITERATIONS", "4");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.auth.session_length_secs, 7200);
        assert_eq!(config.auth.landing_route, "/welcome");
        assert_eq!(config.auth.hash.iterations, 4);

        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 9000\ndatabase:\n  driver: sqlite\n").unwrap();

        std::env::set_var("GATEHOUSE_SERVER_PORT", "not_a_number");
        std::env::set_var("GATEHOUSE_DATABASE_DRIVER", "postgres");
        std::env::set_var("GATEHOUSE_AUTH_SESSION_LENGTH_SECS", "-5");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.auth.session_length_secs, 3600);

        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_load_with_env_validates() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "auth:\n  session_length_secs: 0\n").unwrap();

        assert!(Config::load_with_env(file.path()).is_err());
    }

    #[test]
    fn test_validate_caps_session_length() {
        let mut config = Config::default();

        config.auth.session_length_secs = MAX_SESSION_LENGTH_SECS;
        assert!(config.validate().is_ok());

        config.auth.session_length_secs = 9_000_000_000_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        config.auth.session_length_secs = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(
            config.auth.session_length(),
            chrono::Duration::seconds(MAX_SESSION_LENGTH_SECS as i64)
        );
    }
}
