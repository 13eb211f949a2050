/// Database layer for the reporter API
///
/// Manages the connection pool, embedded migrations, timestamp encoding and
/// the translation of constraint failures into domain errors.

pub mod update;

#[cfg(test)]
pub(crate) mod fixtures;

pub use update::UpdateBuilder;

use crate::config::DatabaseConfig;
use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{Sqlite, Transaction};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Storage format for every timestamp column (UTC).
///
/// Plain `YYYY-MM-DD HH:MM:SS` text sorts lexicographically and is understood
/// by SQLite's `strftime`, which the analytics bucketing relies on.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Create the SQLite connection pool described by the configuration
pub async fn create_pool(config: &DatabaseConfig) -> ApiResult<SqlitePool> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    info!("Opening database at {:?}", config.path);
    info!("  Max connections: {}", config.max_connections);

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout)))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create a single-connection in-memory database with the schema applied.
///
/// The connection is never recycled, since closing it would drop the database.
pub async fn create_memory_pool() -> ApiResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run migrations embedded at compile time from ./migrations
pub async fn run_migrations(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ApiError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Begin a transaction that takes the write lock up front.
///
/// A deferred transaction that reads before writing cannot upgrade its lock
/// once another connection has committed, and fails with SQLITE_BUSY without
/// waiting. `BEGIN IMMEDIATE` waits on the busy timeout instead.
pub async fn begin_write(pool: &SqlitePool) -> ApiResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Encode a timestamp for storage
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Current time, encoded for storage
pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}

/// Decode a stored timestamp
pub fn parse_timestamp(value: &str) -> ApiResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ApiError::Internal(format!("Invalid timestamp {:?}: {}", value, e)))
}

/// Parse a `YYYY-MM-DD` or RFC 3339 query bound.
///
/// A date-only upper bound covers the whole day.
pub fn parse_date_bound(value: &str, upper: bool) -> ApiResult<DateTime<Utc>> {
    let invalid = || {
        ApiError::Validation(format!(
            "Invalid date '{}', expected YYYY-MM-DD or RFC 3339",
            value
        ))
    };

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let naive = if upper {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        return naive.map(|n| n.and_utc()).ok_or_else(invalid);
    }

    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| invalid())
}

/// Kind of integrity constraint a statement tripped over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    Unique,
    ForeignKey,
}

/// Classify a database error as a constraint violation, if it is one
pub fn constraint_violation(err: &sqlx::Error) -> Option<ConstraintViolation> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(ConstraintViolation::Unique)
        }
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            Some(ConstraintViolation::ForeignKey)
        }
        _ => None,
    }
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%term%` pattern for substring matching
pub fn contains_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}
