/// Report endpoints
use crate::{
    api::{
        account::CreatedResponse,
        extract::{ApiJson, ApiPath, ApiQuery},
        MessageResponse,
    },
    auth::{AdminUser, AuthUser},
    context::AppContext,
    error::ApiResult,
    images::{is_default_image, is_local_image, Image},
    metrics,
    reports::{NewReport, Report, ReportDetails, ReportStatus, ReportUpdate, SearchPage, SearchQuery, StatusUpdate},
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};

/// Build report routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/report", post(create_report))
        .route("/api/report/search", get(search_reports))
        .route(
            "/api/report/:id",
            get(get_report).put(update_report).delete(delete_report),
        )
        .route("/api/report/:id/details", get(get_report_details))
        .route("/api/report/:id/status", put(update_status))
}

async fn search_reports(
    State(ctx): State<AppContext>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<SearchPage>> {
    Ok(Json(ctx.reports.search(&query).await?))
}

async fn create_report(
    State(ctx): State<AppContext>,
    user: AuthUser,
    ApiJson(req): ApiJson<NewReport>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let id = ctx.reports.create(user.id, req).await?;
    metrics::REPORTS_CREATED_TOTAL.inc();

    tracing::info!("create_report: {} filed report {}", user.username, id);

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Report created successfully".to_string(),
            id,
        }),
    ))
}

async fn get_report(
    State(ctx): State<AppContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Report>> {
    Ok(Json(ctx.reports.get(id).await?))
}

async fn get_report_details(
    State(ctx): State<AppContext>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ReportDetails>> {
    Ok(Json(ctx.reports.details(id).await?))
}

/// Edit a report (owner or administrator)
async fn update_report(
    State(ctx): State<AppContext>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<ReportUpdate>,
) -> ApiResult<Json<Report>> {
    let report = ctx.reports.get(id).await?;
    user.ensure_can_modify(report.user_id, "report")?;

    Ok(Json(ctx.reports.update(id, update).await?))
}

/// Delete a report with its votes and images
async fn delete_report(
    State(ctx): State<AppContext>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let report = ctx.reports.get(id).await?;
    user.ensure_can_modify(report.user_id, "report")?;

    let images = ctx.reports.delete(id).await?;
    remove_uploaded_files(&ctx, &images).await;

    tracing::info!("delete_report: {} deleted report {}", user.username, id);

    Ok(Json(MessageResponse::new("Report deleted successfully")))
}

/// Moderation status change
async fn update_status(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<StatusUpdate>,
) -> ApiResult<Json<Report>> {
    let status = ReportStatus::from_str(&req.status)?;
    let report = ctx.reports.update_status(id, status).await?;

    tracing::info!(
        "update_status: {} moved report {} to {}",
        admin.username,
        id,
        status.as_str()
    );

    Ok(Json(report))
}

/// Remove the stored files of deleted image rows.
///
/// Placeholders are shared between reports and remote URLs are not ours, so
/// only local user uploads are removed. Failures are logged, the rows are
/// already gone.
pub(crate) async fn remove_uploaded_files(ctx: &AppContext, images: &[Image]) {
    for image in images {
        if image.is_default || is_default_image(&image.image_url) || !is_local_image(&image.image_url) {
            continue;
        }

        if let Err(e) = ctx.image_store.remove(&image.image_url).await {
            tracing::warn!("Failed to remove upload {}: {}", image.image_url, e);
        }
    }
}
