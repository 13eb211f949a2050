/// Location endpoints
use crate::{
    api::{
        account::CreatedResponse,
        extract::{ApiJson, ApiPath},
        MessageResponse,
    },
    auth::{AdminUser, AuthUser},
    context::AppContext,
    error::ApiResult,
    locations::{Location, LocationUpdate, NewLocation},
};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

/// Build location routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/location", get(list_locations).post(create_location))
        .route(
            "/api/location/:id",
            get(get_location).put(update_location).delete(delete_location),
        )
}

async fn list_locations(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<Location>>> {
    Ok(Json(ctx.locations.list().await?))
}

async fn get_location(
    State(ctx): State<AppContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Location>> {
    Ok(Json(ctx.locations.get(id).await?))
}

/// Any signed-in user may add a location to file a report against
async fn create_location(
    State(ctx): State<AppContext>,
    user: AuthUser,
    ApiJson(req): ApiJson<NewLocation>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let id = ctx.locations.create(req).await?;
    tracing::debug!("create_location: {} added location {}", user.username, id);

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Location created successfully".to_string(),
            id,
        }),
    ))
}

async fn update_location(
    State(ctx): State<AppContext>,
    _user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<LocationUpdate>,
) -> ApiResult<Json<Location>> {
    Ok(Json(ctx.locations.update(id, update).await?))
}

async fn delete_location(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.locations.delete(id).await?;
    tracing::info!("delete_location: {} deleted location {}", admin.username, id);

    Ok(Json(MessageResponse::new("Location deleted successfully")))
}
