/// Configuration management for the reporter API
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub authentication: AuthConfig,
    pub storage: StorageConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Database pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: PathBuf,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds to wait for a pooled connection
    pub acquire_timeout: u64,
    /// Seconds an idle connection is kept
    pub idle_timeout: u64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub token_ttl: i64,
    /// Usernames treated as administrators regardless of their stored role
    pub admin_usernames: Vec<String>,
}

/// Upload storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_directory: PathBuf,
    pub max_upload_bytes: usize,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; empty means any origin
    pub allowed_origins: Vec<String>,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("REPORTER_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("REPORTER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| ApiError::Validation("Invalid port number".to_string()))?;
        let version =
            env::var("REPORTER_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("REPORTER_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let db_path = env::var("REPORTER_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("reporter.sqlite"));

        let jwt_secret = env::var("REPORTER_JWT_SECRET")
            .map_err(|_| ApiError::Validation("JWT secret required".to_string()))?;

        let upload_directory = env::var("REPORTER_UPLOAD_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("uploads"));

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            database: DatabaseConfig {
                path: db_path,
                max_connections: env_or("REPORTER_DB_MAX_CONNECTIONS", 10),
                min_connections: env_or("REPORTER_DB_MIN_CONNECTIONS", 1),
                acquire_timeout: env_or("REPORTER_DB_ACQUIRE_TIMEOUT", 5),
                idle_timeout: env_or("REPORTER_DB_IDLE_TIMEOUT", 600),
            },
            authentication: AuthConfig {
                jwt_secret,
                token_ttl: env_or("REPORTER_TOKEN_TTL", 86_400),
                admin_usernames: env_list("REPORTER_ADMIN_USERNAMES"),
            },
            storage: StorageConfig {
                upload_directory,
                // 16MB, matching the historical upload limit
                max_upload_bytes: env_or("REPORTER_MAX_UPLOAD_BYTES", 16 * 1024 * 1024),
            },
            cors: CorsConfig {
                allowed_origins: env_list("REPORTER_CORS_ORIGINS"),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("REPORTER_RATE_LIMITS_ENABLED", true),
                requests_per_second: env_or("REPORTER_RATE_LIMIT_RPS", 100),
                burst_size: env_or("REPORTER_RATE_LIMIT_BURST", 50),
            },
            logging: LoggingConfig {
                level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ApiError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.token_ttl <= 0 {
            return Err(ApiError::Validation("Token TTL must be positive".to_string()));
        }

        if self.database.max_connections == 0
            || self.database.min_connections > self.database.max_connections
        {
            return Err(ApiError::Validation(
                "Database pool bounds are inconsistent".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration suitable for tests: in-memory friendly values, no rate limit
    pub fn for_tests(upload_directory: PathBuf) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from(":memory:"),
                max_connections: 1,
                min_connections: 1,
                acquire_timeout: 5,
                idle_timeout: 600,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-test-secret-test-secret".to_string(),
                token_ttl: 3600,
                admin_usernames: vec!["root".to_string()],
            },
            storage: StorageConfig {
                upload_directory,
                max_upload_bytes: 1024 * 1024,
            },
            cors: CorsConfig {
                allowed_origins: Vec::new(),
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                requests_per_second: 100,
                burst_size: 50,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "text".to_string(),
            },
        }
    }
}
