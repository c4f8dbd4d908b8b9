//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `API_KEY`: When set, the upload and signed-URL routes require it via the
//!   `X-API-Key` header. When unset, those routes are served without
//!   authentication (intended for trusted-network deployments).
//! - `ALLOWED_IPS`: Comma-separated list of client IPs or CIDR blocks. When
//!   non-empty, requests from other addresses are rejected.
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins
//!   (default: `*` for dev).
//!
//! # Storage Configuration
//!
//! - `GCS_BUCKET_NAME`: Primary upload bucket (required).
//! - `GCS_BUCKET_NAME_DEV`: Optional second bucket served on the `-dev` routes.
//! - `GCS_SERVICE_ACCOUNT`: Path to the service account key JSON file.

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Application configuration loaded from environment variables.
///
/// The security-related fields (`api_key`, `allowed_ips`, `cors_allowed_origins`)
/// form the access policy; it is read once at startup and never mutated while
/// the server is running.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Upper bound on how long a single request may take end to end,
    /// including the storage call (default: 15 seconds)
    pub request_timeout: Duration,

    /// How long shutdown waits for in-flight requests before aborting them
    /// (default: 10 seconds)
    pub shutdown_grace: Duration,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Primary GCS bucket served on `/upload` and `/signedurl` (required)
    pub bucket_name: String,

    /// Optional dev bucket served on `/upload-dev` and `/signedurl-dev`.
    /// When unset, the `-dev` routes are not registered.
    pub dev_bucket_name: Option<String>,

    /// Path to the GCS service account key JSON file
    pub service_account_path: String,

    /// Maximum accepted upload size in bytes (default: 10 MB)
    pub max_file_size: u64,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Shared secret for the upload routes (optional - when unset, the
    /// protected routes are served without authentication)
    pub api_key: Option<String>,

    /// Client IP allowlist entries: literal IPs or CIDR blocks.
    /// Empty = all client IPs are allowed.
    pub allowed_ips: Vec<String>,

    /// Comma-separated list of allowed CORS origins.
    /// A single `*` entry allows any origin (not recommended for production).
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any required configuration is missing
    /// or invalid (e.g., empty `GCS_BUCKET_NAME`, non-numeric `PORT`).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let max_file_size_mb: u64 = Self::parse_env("MAX_FILE_SIZE_MB", 10)?;

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,
            request_timeout: Duration::from_secs(Self::parse_env("REQUEST_TIMEOUT_SECS", 15)?),
            shutdown_grace: Duration::from_secs(Self::parse_env("SHUTDOWN_GRACE_SECS", 10)?),

            // Storage
            bucket_name: env::var("GCS_BUCKET_NAME").unwrap_or_default(),
            dev_bucket_name: env::var("GCS_BUCKET_NAME_DEV")
                .ok()
                .filter(|b| !b.is_empty()),
            service_account_path: env::var("GCS_SERVICE_ACCOUNT")
                .unwrap_or_else(|_| "./service-account-key.json".to_string()),
            max_file_size: max_file_size_mb * 1024 * 1024,

            // Security
            api_key: env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            allowed_ips: Self::parse_list("ALLOWED_IPS", ""),
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if self.bucket_name.is_empty() {
            return Err(AppError::ConfigError(
                "GCS_BUCKET_NAME environment variable is required".to_string(),
            ));
        }

        if self.max_file_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_FILE_SIZE_MB must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if API key authentication is enabled.
    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Check if IP allowlisting is enabled.
    pub fn ip_allowlist_enabled(&self) -> bool {
        !self.allowed_ips.is_empty()
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated environment variable into a trimmed list.
    ///
    /// Empty entries are filtered out, so `ALLOWED_IPS=""` yields an empty
    /// list (allow all) rather than a list containing one empty entry.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_else(|_| default.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(15),
            shutdown_grace: Duration::from_secs(10),
            // Storage
            bucket_name: "upload-bucket".to_string(),
            dev_bucket_name: None,
            service_account_path: "./service-account-key.json".to_string(),
            max_file_size: 10 * 1024 * 1024, // 10MB
            // Security
            api_key: None,
            allowed_ips: vec![],
            cors_allowed_origins: vec!["*".to_string()],
            // Observability
            log_level: "info".to_string(),
        }
    }
}
