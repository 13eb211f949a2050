/// Category endpoints
use crate::{
    api::{
        account::CreatedResponse,
        extract::{ApiJson, ApiPath},
        MessageResponse,
    },
    auth::AdminUser,
    categories::{Category, CategoryUpdate, NewCategory},
    context::AppContext,
    error::ApiResult,
};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

/// Build category routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/category", get(list_categories).post(create_category))
        .route(
            "/api/category/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
}

async fn list_categories(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(ctx.categories.list().await?))
}

async fn get_category(
    State(ctx): State<AppContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Category>> {
    Ok(Json(ctx.categories.get(id).await?))
}

async fn create_category(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    ApiJson(req): ApiJson<NewCategory>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let id = ctx.categories.create(req).await?;
    tracing::info!("create_category: {} created category {}", admin.username, id);

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Category created successfully".to_string(),
            id,
        }),
    ))
}

async fn update_category(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<CategoryUpdate>,
) -> ApiResult<Json<Category>> {
    Ok(Json(ctx.categories.update(id, update).await?))
}

async fn delete_category(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.categories.delete(id).await?;
    tracing::info!("delete_category: {} deleted category {}", admin.username, id);

    Ok(Json(MessageResponse::new("Category deleted successfully")))
}
