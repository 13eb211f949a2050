/// Registration, login and user profile endpoints
use crate::{
    account::{LoginRequest, ProfileUpdate, RegisterRequest, Role, UserIdentity, UserProfile},
    api::extract::{ApiJson, ApiPath},
    auth::{AdminUser, AuthUser},
    context::AppContext,
    error::ApiResult,
    metrics,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/user", get(list_users))
        .route("/api/user/profile", get(get_profile).put(update_profile))
        .route("/api/user/:id", get(get_user))
        .route("/api/user/:id/role", put(set_role))
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub message: String,
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: UserIdentity,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

/// Register a new account
async fn register(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    tracing::info!("register: Creating account for {}", req.username);

    let id = ctx.accounts.register(req).await?;
    metrics::REGISTRATIONS_TOTAL.inc();

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "User registered successfully".to_string(),
            id,
        }),
    ))
}

/// Exchange credentials for an access token
async fn login(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = ctx.accounts.authenticate(&req).await?;
    let token = ctx.tokens.issue(&user)?;

    tracing::info!("login: {} signed in", user.username);

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        token,
        user,
    }))
}

async fn get_profile(State(ctx): State<AppContext>, user: AuthUser) -> ApiResult<Json<UserProfile>> {
    Ok(Json(ctx.accounts.get_profile(user.id).await?))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    user: AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<UserProfile>> {
    tracing::debug!("update_profile: {} updating profile", user.username);
    Ok(Json(ctx.accounts.update_profile(user.id, update).await?))
}

async fn list_users(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<UserProfile>>> {
    Ok(Json(ctx.accounts.list_profiles().await?))
}

async fn get_user(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(ctx.accounts.get_profile(id).await?))
}

/// Promote or demote an account
async fn set_role(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> ApiResult<Json<UserProfile>> {
    let role = Role::from_str(&req.role)?;
    ctx.accounts.set_role(id, role).await?;

    tracing::info!("set_role: {} set user {} to {}", admin.username, id, role.as_str());

    Ok(Json(ctx.accounts.get_profile(id).await?))
}
