/// Account management
///
/// Registration, credential checks, profiles and administrator role changes.

mod manager;

pub use manager::AccountManager;

use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Account roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Regular,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Regular => "Regular",
            Role::Administrator => "Administrator",
        }
    }

    pub fn from_str(s: &str) -> ApiResult<Self> {
        match s {
            "Regular" => Ok(Role::Regular),
            "Administrator" => Ok(Role::Administrator),
            _ => Err(ApiError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

/// Contact numbers are 10 to 12 digits with an optional leading `+`
pub fn validate_contact_number(value: &str) -> Result<(), ValidationError> {
    let digits = value.strip_prefix('+').unwrap_or(value);

    if (10..=12).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("contact_number")
            .with_message("must be 10 to 12 digits, optionally prefixed with +".into()))
    }
}

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 32, message = "must be 1 to 32 characters"))]
    pub username: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 32, message = "must be 1 to 32 characters"))]
    pub first_name: String,
    #[validate(length(max = 32, message = "must be at most 32 characters"))]
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 32, message = "must be 1 to 32 characters"))]
    pub last_name: String,
    #[validate(email(message = "is not a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_contact_number"))]
    pub contact_number: String,
}

/// Login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Minimal identity of an account, as carried by tokens and extractors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

/// Full account view with contact details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: String,
    pub contact_number: String,
    pub created_at: DateTime<Utc>,
}

/// Partial profile update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 32, message = "must be 1 to 32 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 32, message = "must be at most 32 characters"))]
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 32, message = "must be 1 to 32 characters"))]
    pub last_name: Option<String>,
    #[validate(email(message = "is not a valid email address"))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_contact_number"))]
    pub contact_number: Option<String>,
}
