/// Civic Reporter - citizen incident reporting backend
///
/// Users file reports against a category and a location, attach images and
/// vote on each other's reports. Administrators moderate and read dashboard
/// analytics aggregated from the same database.

pub mod account;
pub mod analytics;
pub mod api;
pub mod auth;
pub mod categories;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod images;
pub mod locations;
pub mod metrics;
pub mod rate_limit;
pub mod reports;
pub mod server;
pub mod votes;

pub use context::AppContext;
pub use error::{ApiError, ApiResult};
