/// Authentication: password hashing, bearer tokens and request extractors
///
/// Every protected handler names the capability it needs in its signature:
/// `AuthUser` for any logged-in account, `AdminUser` for administrators.
/// An `AdminUser` value can only be produced for an administrator.
use crate::{
    account::{Role, UserIdentity},
    context::AppContext,
    error::{ApiError, ApiResult},
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Hash a password into a PHC string (argon2id, random salt)
pub fn hash_password(password: &str) -> ApiResult<String> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| ApiError::Internal(format!("Salt encoding failed: {}", e)))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string
pub fn verify_password(password: &str, stored_hash: &str) -> ApiResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ApiError::Internal(format!("Stored password hash is malformed: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// JWT claims carried by access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 access tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }

    /// Issue an access token for a user
    pub fn issue(&self, user: &UserIdentity) -> ApiResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            iat: now,
            exp: now + self.ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Jwt(format!("Failed to sign token: {}", e)))
    }

    /// Verify a token's signature and expiry
    pub fn verify(&self, token: &str) -> ApiResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Allow some clock skew
        validation.leeway = 30;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT verification failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        ApiError::Authentication("Token has expired".to_string())
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        ApiError::Authentication("Invalid token signature".to_string())
                    }
                    _ => ApiError::Authentication("Invalid token".to_string()),
                }
            })
    }
}

/// Authenticated account making the request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }

    /// Owners may modify their own rows; administrators may modify any
    pub fn can_modify(&self, owner_id: i64) -> bool {
        self.id == owner_id || self.is_admin()
    }

    /// Fail with 403 unless `can_modify` holds
    pub fn ensure_can_modify(&self, owner_id: i64, what: &str) -> ApiResult<()> {
        if self.can_modify(owner_id) {
            Ok(())
        } else {
            Err(ApiError::Authorization(format!(
                "Only the owner or an administrator may modify this {}",
                what
            )))
        }
    }
}

async fn authenticate(parts: &mut Parts, state: &AppContext) -> ApiResult<AuthUser> {
    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|_| ApiError::Authentication("Missing authorization header".to_string()))?;

    let claims = state.tokens.verify(bearer.token())?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| ApiError::Authentication("Invalid token subject".to_string()))?;

    // Role comes from the database so demotions take effect immediately
    let identity = state
        .accounts
        .find_identity(user_id)
        .await?
        .ok_or_else(|| ApiError::Authentication("Account no longer exists".to_string()))?;

    let role = if state
        .config
        .authentication
        .admin_usernames
        .contains(&identity.username)
    {
        Role::Administrator
    } else {
        identity.role
    };

    Ok(AuthUser {
        id: identity.id,
        username: identity.username,
        role,
    })
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthUser(authenticate(parts, state).await.ok()))
    }
}

/// Administrator making the request
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let user = authenticate(parts, state).await?;

        if !user.is_admin() {
            tracing::warn!("AdminUser: User {} is not an administrator", user.username);
            return Err(ApiError::Authorization(
                "Administrator role required".to_string(),
            ));
        }

        tracing::debug!("AdminUser: {} authorized", user.username);

        Ok(AdminUser {
            id: user.id,
            username: user.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> UserIdentity {
        UserIdentity {
            id: 7,
            username: "alice".to_string(),
            role: Role::Regular,
        }
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_roundtrip() {
        let issuer = TokenIssuer::new("0123456789abcdef0123456789abcdef", 3600);
        let token = issuer.issue(&identity()).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Regular);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let issuer = TokenIssuer::new("0123456789abcdef0123456789abcdef", 3600);
        let other = TokenIssuer::new("fedcba9876543210fedcba9876543210", 3600);
        let token = other.issue(&identity()).unwrap();

        assert!(matches!(
            issuer.verify(&token),
            Err(ApiError::Authentication(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let issuer = TokenIssuer::new("0123456789abcdef0123456789abcdef", -3600);
        let token = issuer.issue(&identity()).unwrap();
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn test_can_modify() {
        let owner = AuthUser {
            id: 1,
            username: "owner".into(),
            role: Role::Regular,
        };
        let admin = AuthUser {
            id: 2,
            username: "admin".into(),
            role: Role::Administrator,
        };

        assert!(owner.can_modify(1));
        assert!(!owner.can_modify(3));
        assert!(admin.can_modify(3));
        assert!(owner.ensure_can_modify(3, "report").is_err());
    }
}
