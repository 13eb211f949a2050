/// Administrator analytics endpoints
use crate::{
    analytics::{
        categories::CategoryAnalysis,
        locations::{trend_state_limit, FilteredHeatmap, HeatmapFilter, LocationInsights, LocationTrends},
        reports::ReportAnalytics,
        system::SystemPerformance,
        users::UserAnalytics,
        AnalyticsQuery,
    },
    api::extract::ApiQuery,
    auth::AdminUser,
    context::AppContext,
    error::ApiResult,
};
use axum::{extract::State, routing::get, Json, Router};

/// Build analytics routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/analytics/reports", get(report_analytics))
        .route("/api/analytics/users", get(user_analytics))
        .route("/api/analytics/location-insights", get(location_insights))
        .route("/api/analytics/filtered-heatmap", get(filtered_heatmap))
        .route("/api/analytics/location-trends", get(location_trends))
        .route("/api/analytics/category-analysis", get(category_analysis))
        .route("/api/analytics/system-performance", get(system_performance))
}

async fn report_analytics(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<Json<ReportAnalytics>> {
    let params = query.params()?;
    Ok(Json(ctx.analytics.reports(&params).await?))
}

async fn user_analytics(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<Json<UserAnalytics>> {
    let params = query.params()?;
    Ok(Json(ctx.analytics.users(&params).await?))
}

async fn location_insights(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<Json<LocationInsights>> {
    let params = query.params()?;
    Ok(Json(ctx.analytics.location_insights(&params).await?))
}

async fn filtered_heatmap(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<Json<FilteredHeatmap>> {
    let params = query.params()?;
    let filter = HeatmapFilter::parse(query.category.as_deref(), query.status.as_deref())?;
    Ok(Json(ctx.analytics.filtered_heatmap(&params, &filter).await?))
}

async fn location_trends(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<Json<LocationTrends>> {
    let params = query.params()?;
    let limit = trend_state_limit(query.limit)?;
    Ok(Json(ctx.analytics.location_trends(&params, limit).await?))
}

async fn category_analysis(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<Json<CategoryAnalysis>> {
    let params = query.params()?;
    Ok(Json(ctx.analytics.category_analysis(&params).await?))
}

async fn system_performance(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<Json<SystemPerformance>> {
    let params = query.params()?;
    tracing::debug!("system_performance: requested by {}", admin.username);
    Ok(Json(ctx.analytics.system_performance(params.now).await?))
}
