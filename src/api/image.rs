/// Report image endpoints: listing, fallback resolution, upload and delete
use crate::{
    api::{extract::ApiPath, report::remove_uploaded_files, MessageResponse},
    auth::AuthUser,
    context::AppContext,
    error::{ApiError, ApiResult},
    images::Image,
    metrics,
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

/// Multipart field carrying the file
const UPLOAD_FIELD: &str = "file";

/// Build image routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        // GET and POST take a report id, DELETE an image id
        .route(
            "/api/image/:id",
            get(list_images).post(upload_image).delete(delete_image),
        )
        .route("/api/image/:id/resolved", get(resolved_images))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub id: i64,
    pub image_url: String,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::Validation(e.body_text())
    }
}

/// Every image row linked to the report
async fn list_images(
    State(ctx): State<AppContext>,
    ApiPath(report_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<Image>>> {
    ctx.reports.get(report_id).await?;
    Ok(Json(ctx.images.list_for_report(report_id).await?))
}

/// Images to display for the report, falling back to placeholders
async fn resolved_images(
    State(ctx): State<AppContext>,
    ApiPath(report_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<Image>>> {
    Ok(Json(ctx.images.resolve_for_report(report_id).await?))
}

/// Upload an image for a report (owner or administrator)
async fn upload_image(
    State(ctx): State<AppContext>,
    user: AuthUser,
    ApiPath(report_id): ApiPath<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let report = ctx.reports.get(report_id).await?;
    user.ensure_can_modify(report.user_id, "report")?;

    let mut multipart = multipart.map_err(|e| ApiError::Validation(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Validation("Upload has no file name".to_string()))?;
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) = upload.ok_or_else(|| {
        ApiError::Validation(format!("Missing multipart field '{}'", UPLOAD_FIELD))
    })?;

    let stored_name = ctx
        .image_store
        .save(&file_name, &data, user.is_admin())
        .await?;

    let id = match ctx.images.insert(report_id, &stored_name).await {
        Ok(id) => id,
        Err(e) => {
            if let Err(cleanup) = ctx.image_store.remove(&stored_name).await {
                tracing::warn!("Failed to remove orphaned upload {}: {}", stored_name, cleanup);
            }
            return Err(e);
        }
    };
    metrics::IMAGE_UPLOADS_TOTAL.inc();

    tracing::info!(
        "upload_image: {} attached {} to report {}",
        user.username,
        stored_name,
        report_id
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Image uploaded successfully".to_string(),
            id,
            image_url: stored_name,
        }),
    ))
}

/// Delete an image row and its file (report owner or administrator)
async fn delete_image(
    State(ctx): State<AppContext>,
    user: AuthUser,
    ApiPath(image_id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let image = ctx.images.get(image_id).await?;
    let report = ctx.reports.get(image.report_id).await?;
    user.ensure_can_modify(report.user_id, "image")?;

    let image = ctx.images.delete(image_id).await?;
    remove_uploaded_files(&ctx, std::slice::from_ref(&image)).await;

    Ok(Json(MessageResponse::new("Image deleted successfully")))
}
