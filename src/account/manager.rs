/// Account manager backed by runtime-built sqlx queries
use crate::{
    account::{LoginRequest, ProfileUpdate, RegisterRequest, Role, UserIdentity, UserProfile},
    auth::{hash_password, verify_password},
    db::{constraint_violation, now_timestamp, parse_timestamp, ConstraintViolation, UpdateBuilder},
    error::{ApiError, ApiResult},
};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use validator::Validate;

const PROFILE_COLUMNS: &str = r#"
    u.id, u.username, u.role, u.created_at,
    i.first_name, i.middle_name, i.last_name, i.email, i.contact_number
"#;

/// Account manager service
#[derive(Clone)]
pub struct AccountManager {
    db: SqlitePool,
}

impl AccountManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Register a new account, returning its id.
    ///
    /// The duplicate check and both inserts share one transaction, so a
    /// rejected registration leaves no rows behind.
    pub async fn register(&self, request: RegisterRequest) -> ApiResult<i64> {
        request.validate()?;

        // Argon2 is CPU bound, keep it off the async workers
        let password = request.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {}", e)))??;

        let mut tx = crate::db::begin_write(&self.db).await?;

        let taken: i64 = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM users WHERE username = ?)
                 + (SELECT COUNT(*) FROM user_info WHERE email = ? OR contact_number = ?)
            "#,
        )
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.contact_number)
        .fetch_one(&mut *tx)
        .await?;

        if taken > 0 {
            return Err(ApiError::Validation(
                "Username, email or contact number already exists".to_string(),
            ));
        }

        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, role, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&request.username)
        .bind(&password_hash)
        .bind(Role::Regular.as_str())
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await
        .map_err(duplicate_registration)?;

        let user_id = result.last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO user_info (user_id, first_name, middle_name, last_name, email, contact_number)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&request.first_name)
        .bind(&request.middle_name)
        .bind(&request.last_name)
        .bind(&request.email)
        .bind(&request.contact_number)
        .execute(&mut *tx)
        .await
        .map_err(duplicate_registration)?;

        tx.commit().await?;

        tracing::info!("Registered user {} ({})", request.username, user_id);

        Ok(user_id)
    }

    /// Check credentials, returning the account identity
    pub async fn authenticate(&self, request: &LoginRequest) -> ApiResult<UserIdentity> {
        let row = sqlx::query("SELECT id, username, password_hash, role FROM users WHERE username = ?")
            .bind(&request.username)
            .fetch_optional(&self.db)
            .await?;

        let invalid = || ApiError::Authentication("Invalid username or password".to_string());

        let row = row.ok_or_else(invalid)?;
        let stored_hash: String = row.get("password_hash");

        let password = request.password.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
            .await
            .map_err(|e| ApiError::Internal(format!("Password check task failed: {}", e)))??;

        if !matches {
            tracing::warn!("Failed login for {}", request.username);
            return Err(invalid());
        }

        parse_identity(&row)
    }

    /// Look up the identity of an account, if it still exists
    pub async fn find_identity(&self, id: i64) -> ApiResult<Option<UserIdentity>> {
        let row = sqlx::query("SELECT id, username, role FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(parse_identity).transpose()
    }

    /// Get an account's profile
    pub async fn get_profile(&self, id: i64) -> ApiResult<UserProfile> {
        let sql = format!(
            "SELECT {} FROM users u JOIN user_info i ON i.user_id = u.id WHERE u.id = ?",
            PROFILE_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;

        parse_profile(&row)
    }

    /// List every account, oldest first
    pub async fn list_profiles(&self) -> ApiResult<Vec<UserProfile>> {
        let sql = format!(
            "SELECT {} FROM users u JOIN user_info i ON i.user_id = u.id ORDER BY u.id",
            PROFILE_COLUMNS
        );

        let rows = sqlx::query(&sql).fetch_all(&self.db).await?;
        rows.iter().map(parse_profile).collect()
    }

    /// Apply a partial profile update and return the stored profile
    pub async fn update_profile(&self, id: i64, update: ProfileUpdate) -> ApiResult<UserProfile> {
        update.validate()?;

        // 404 even for an empty patch
        self.get_profile(id).await?;

        let mut builder = UpdateBuilder::new("user_info");
        builder
            .set("first_name", update.first_name)
            .set("middle_name", update.middle_name)
            .set("last_name", update.last_name)
            .set("email", update.email)
            .set("contact_number", update.contact_number);

        builder
            .execute_where("user_id", id, &self.db)
            .await
            .map_err(|e| match e {
                ApiError::Database(ref db_err)
                    if constraint_violation(db_err) == Some(ConstraintViolation::Unique) =>
                {
                    ApiError::Conflict("Email or contact number already in use".to_string())
                }
                other => other,
            })?;

        self.get_profile(id).await
    }

    /// Change an account's stored role
    pub async fn set_role(&self, id: i64, role: Role) -> ApiResult<()> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("User {} not found", id)));
        }

        tracing::info!("User {} role set to {}", id, role.as_str());

        Ok(())
    }
}

fn duplicate_registration(err: sqlx::Error) -> ApiError {
    match constraint_violation(&err) {
        Some(ConstraintViolation::Unique) => ApiError::Validation(
            "Username, email or contact number already exists".to_string(),
        ),
        _ => ApiError::Database(err),
    }
}

fn parse_identity(row: &SqliteRow) -> ApiResult<UserIdentity> {
    let role: String = row.get("role");
    Ok(UserIdentity {
        id: row.get("id"),
        username: row.get("username"),
        role: Role::from_str(&role)?,
    })
}

fn parse_profile(row: &SqliteRow) -> ApiResult<UserProfile> {
    let role: String = row.get("role");
    let created_at: String = row.get("created_at");

    Ok(UserProfile {
        id: row.get("id"),
        username: row.get("username"),
        role: Role::from_str(&role)?,
        first_name: row.get("first_name"),
        middle_name: row.get("middle_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        contact_number: row.get("contact_number"),
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn request(username: &str, email: &str, contact: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: "secret1".to_string(),
            first_name: "Test".to_string(),
            middle_name: None,
            last_name: "User".to_string(),
            email: email.to_string(),
            contact_number: contact.to_string(),
        }
    }

    async fn manager() -> AccountManager {
        AccountManager::new(create_memory_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let accounts = manager().await;
        let id = accounts
            .register(request("alice", "alice@example.com", "09170000001"))
            .await
            .unwrap();

        let identity = accounts
            .authenticate(&LoginRequest {
                username: "alice".to_string(),
                password: "secret1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.role, Role::Regular);

        let wrong = accounts
            .authenticate(&LoginRequest {
                username: "alice".to_string(),
                password: "wrong-password".to_string(),
            })
            .await;
        assert!(matches!(wrong, Err(ApiError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_duplicate_registration_inserts_nothing() {
        let accounts = manager().await;
        accounts
            .register(request("alice", "alice@example.com", "09170000001"))
            .await
            .unwrap();

        let same_username = accounts
            .register(request("alice", "other@example.com", "09170000002"))
            .await;
        assert!(matches!(same_username, Err(ApiError::Validation(_))));

        let same_email = accounts
            .register(request("bob", "alice@example.com", "09170000003"))
            .await;
        assert!(matches!(same_email, Err(ApiError::Validation(_))));

        assert_eq!(accounts.list_profiles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_partial_update() {
        let accounts = manager().await;
        let id = accounts
            .register(request("carol", "carol@example.com", "09170000004"))
            .await
            .unwrap();

        let updated = accounts
            .update_profile(
                id,
                ProfileUpdate {
                    first_name: Some("Caroline".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Caroline");
        assert_eq!(updated.last_name, "User");
        assert_eq!(updated.email, "carol@example.com");

        let missing = accounts.update_profile(999, ProfileUpdate::default()).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_profile_update_conflict() {
        let accounts = manager().await;
        accounts
            .register(request("dave", "dave@example.com", "09170000005"))
            .await
            .unwrap();
        let erin = accounts
            .register(request("erin", "erin@example.com", "09170000006"))
            .await
            .unwrap();

        let result = accounts
            .update_profile(
                erin,
                ProfileUpdate {
                    email: Some("dave@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_set_role() {
        let accounts = manager().await;
        let id = accounts
            .register(request("frank", "frank@example.com", "09170000007"))
            .await
            .unwrap();

        accounts.set_role(id, Role::Administrator).await.unwrap();
        let identity = accounts.find_identity(id).await.unwrap().unwrap();
        assert_eq!(identity.role, Role::Administrator);

        assert!(matches!(
            accounts.set_role(404, Role::Regular).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
