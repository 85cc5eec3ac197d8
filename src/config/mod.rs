//! Configuration management
//!
//! This module handles loading and parsing configuration for Rollcall.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

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
    /// Login session configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Attendance sessions and the expiry sweeper
    #[serde(default)]
    pub attendance: AttendanceConfig,
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
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
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
    "data/rollcall.db".to_string()
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

impl std::fmt::Display for DatabaseDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseDriver::Sqlite => write!(f, "sqlite"),
            DatabaseDriver::Mysql => write!(f, "mysql"),
        }
    }
}

/// Login session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How long a login token stays valid, in days
    #[serde(default = "default_session_expiration_days")]
    pub session_expiration_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_expiration_days: default_session_expiration_days(),
        }
    }
}

fn default_session_expiration_days() -> i64 {
    7
}

/// Attendance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceConfig {
    /// Delay between two sweeper passes, in seconds
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    /// Whether the expiry sweeper is started at boot
    #[serde(default = "default_sweeper_enabled")]
    pub sweeper_enabled: bool,
    /// Check-ins later than this many minutes after a session opens are
    /// recorded as late. 0 disables late marking.
    #[serde(default)]
    pub late_after_minutes: i64,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval_seconds(),
            sweeper_enabled: default_sweeper_enabled(),
            late_after_minutes: 0,
        }
    }
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_sweeper_enabled() -> bool {
    true
}

/// Longest login session lifetime accepted (ten years)
pub const MAX_SESSION_EXPIRATION_DAYS: i64 = 3650;

/// Longest late threshold accepted; matches the longest session window
pub const MAX_LATE_AFTER_MINUTES: i64 = 24 * 60;

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
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

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - ROLLCALL_SERVER_HOST
    /// - ROLLCALL_SERVER_PORT
    /// - ROLLCALL_SERVER_CORS_ORIGIN
    /// - ROLLCALL_DATABASE_DRIVER
    /// - ROLLCALL_DATABASE_URL
    /// - ROLLCALL_AUTH_SESSION_EXPIRATION_DAYS
    /// - ROLLCALL_ATTENDANCE_SWEEP_INTERVAL_SECONDS
    /// - ROLLCALL_ATTENDANCE_SWEEPER_ENABLED
    /// - ROLLCALL_ATTENDANCE_LATE_AFTER_MINUTES
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the services cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attendance.sweep_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "attendance.sweep_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.auth.session_expiration_days < 1 {
            return Err(ConfigError::ValidationError(
                "auth.session_expiration_days must be at least 1".to_string(),
            ));
        }
        if self.auth.session_expiration_days > MAX_SESSION_EXPIRATION_DAYS {
            return Err(ConfigError::ValidationError(format!(
                "auth.session_expiration_days cannot exceed {}",
                MAX_SESSION_EXPIRATION_DAYS
            )));
        }
        if !(0..=MAX_LATE_AFTER_MINUTES).contains(&self.attendance.late_after_minutes) {
            return Err(ConfigError::ValidationError(format!(
                "attendance.late_after_minutes must be between 0 and {}",
                MAX_LATE_AFTER_MINUTES
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("ROLLCALL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ROLLCALL_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("ROLLCALL_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("ROLLCALL_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("ROLLCALL_DATABASE_URL") {
            self.database.url = url;
        }

        // Auth configuration
        if let Ok(days) = std::env::var("ROLLCALL_AUTH_SESSION_EXPIRATION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.auth.session_expiration_days = days;
            }
        }

        // Attendance configuration
        if let Ok(secs) = std::env::var("ROLLCALL_ATTENDANCE_SWEEP_INTERVAL_SECONDS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.attendance.sweep_interval_seconds = secs;
            }
        }
        if let Ok(enabled) = std::env::var("ROLLCALL_ATTENDANCE_SWEEPER_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.attendance.sweeper_enabled = true,
                "false" | "0" | "no" => self.attendance.sweeper_enabled = false,
                _ => {}
            }
        }
        if let Ok(minutes) = std::env::var("ROLLCALL_ATTENDANCE_LATE_AFTER_MINUTES") {
            if let Ok(minutes) = minutes.parse::<i64>() {
                self.attendance.late_after_minutes = minutes;
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

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "ROLLCALL_SERVER_HOST",
    "ROLLCALL_SERVER_PORT",
    "ROLLCALL_SERVER_CORS_ORIGIN",
    "ROLLCALL_DATABASE_DRIVER",
    "ROLLCALL_DATABASE_URL",
    "ROLLCALL_AUTH_SESSION_EXPIRATION_DAYS",
    "ROLLCALL_ATTENDANCE_SWEEP_INTERVAL_SECONDS",
    "ROLLCALL_ATTENDANCE_SWEEPER_ENABLED",
    "ROLLCALL_ATTENDANCE_LATE_AFTER_MINUTES",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


/// Property-based tests for configuration parsing
#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_host_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)
                .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
            Just("localhost".to_string()),
            Just("0.0.0.0".to_string()),
            "[a-z][a-z0-9]{0,10}",
        ]
    }

    fn valid_database_config_strategy() -> impl Strategy<Value = DatabaseConfig> {
        let driver = prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)];
        let url = prop_oneof![
            "[a-z][a-z0-9_/]{0,20}\\.db",
            Just(":memory:".to_string()),
            Just("mysql://root@127.0.0.1:3306/rollcall".to_string()),
        ];
        (driver, url).prop_map(|(driver, url)| DatabaseConfig { driver, url })
    }

    fn valid_attendance_config_strategy() -> impl Strategy<Value = AttendanceConfig> {
        (1u64..=3600, any::<bool>(), 0i64..=240).prop_map(
            |(sweep_interval_seconds, sweeper_enabled, late_after_minutes)| AttendanceConfig {
                sweep_interval_seconds,
                sweeper_enabled,
                late_after_minutes,
            },
        )
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            valid_host_strategy(),
            1u16..=65535,
            valid_database_config_strategy(),
            1i64..=90,
            valid_attendance_config_strategy(),
        )
            .prop_map(|(host, port, database, days, attendance)| Config {
                server: ServerConfig {
                    host,
                    port,
                    cors_origin: "http://localhost:3000".to_string(),
                },
                database,
                auth: AuthConfig {
                    session_expiration_days: days,
                },
                attendance,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serializing any valid config to YAML and loading it back yields the same values.
        #[test]
        fn config_yaml_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(config.server.host, parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.database.driver, parsed.database.driver);
            prop_assert_eq!(config.database.url, parsed.database.url);
            prop_assert_eq!(config.auth.session_expiration_days, parsed.auth.session_expiration_days);
            prop_assert_eq!(config.attendance.sweep_interval_seconds, parsed.attendance.sweep_interval_seconds);
            prop_assert_eq!(config.attendance.sweeper_enabled, parsed.attendance.sweeper_enabled);
            prop_assert_eq!(config.attendance.late_after_minutes, parsed.attendance.late_after_minutes);
        }

        /// A file that only sets the port keeps every other default.
        #[test]
        fn config_defaults_fill_missing_sections(port in 1u16..=65535) {
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "server:\n  port: {}\n", port).expect("Failed to write config");

            let config = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(config.server.port, port);
            prop_assert_eq!(config.server.host, "0.0.0.0");
            prop_assert_eq!(config.attendance.sweep_interval_seconds, 60);
            prop_assert_eq!(config.auth.session_expiration_days, 7);
        }
    }
}
