/// API routes and handlers
pub mod account;
pub mod analytics;
pub mod category;
pub mod extract;
pub mod health;
pub mod image;
pub mod location;
pub mod report;
pub mod vote;

use crate::context::AppContext;
use axum::Router;
use serde::Serialize;

/// Plain acknowledgement body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(account::routes())
        .merge(report::routes())
        .merge(category::routes())
        .merge(location::routes())
        .merge(image::routes())
        .merge(vote::routes())
        .merge(analytics::routes())
}
