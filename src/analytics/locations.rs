/// Geographic analytics: state and city breakdowns, heat maps, per-state trends
use super::{AnalyticsParams, AnalyticsService, DateRange, Period, TrendSeries};
use crate::{
    error::{ApiError, ApiResult},
    reports::ReportStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;

const TOP_CITIES: i64 = 20;
const DEFAULT_TREND_STATES: i64 = 5;
const MAX_TREND_STATES: i64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateCount {
    pub state: String,
    pub count: i64,
    /// Mean coordinate of the state's reported locations
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityCount {
    pub city: String,
    pub state: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub weight: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationInsights {
    pub reports_by_state: Vec<StateCount>,
    pub top_cities: Vec<CityCount>,
    pub heat_map_data: Vec<HeatPoint>,
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilteredHeatmap {
    pub category: Option<String>,
    pub status: Option<ReportStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub points: Vec<HeatPoint>,
    pub total_weight: i64,
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateTrend {
    pub state: String,
    pub total: i64,
    pub series: TrendSeries,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationTrends {
    pub period: Period,
    pub states: Vec<StateTrend>,
    pub has_data: bool,
}

/// Heat map filters beyond the date range
#[derive(Debug, Clone, Default)]
pub struct HeatmapFilter {
    pub category: Option<String>,
    pub status: Option<ReportStatus>,
}

impl HeatmapFilter {
    pub fn parse(category: Option<&str>, status: Option<&str>) -> ApiResult<Self> {
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let status = status
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ReportStatus::from_str)
            .transpose()?;

        Ok(Self { category, status })
    }
}

/// Validate the requested number of states for location trends
pub fn trend_state_limit(limit: Option<i64>) -> ApiResult<i64> {
    match limit {
        None => Ok(DEFAULT_TREND_STATES),
        Some(n) if (1..=MAX_TREND_STATES).contains(&n) => Ok(n),
        Some(_) => Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_TREND_STATES
        ))),
    }
}

impl AnalyticsService {
    pub async fn location_insights(&self, params: &AnalyticsParams) -> ApiResult<LocationInsights> {
        let range = &params.range;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT l.state, COUNT(r.id) AS total, AVG(l.latitude), AVG(l.longitude) \
             FROM reports r JOIN locations l ON l.id = r.location_id WHERE 1 = 1",
        );
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY l.state ORDER BY total DESC, l.state");
        let by_state: Vec<(String, i64, f64, f64)> =
            qb.build_query_as().fetch_all(&self.db).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT l.city, l.state, COUNT(r.id) AS total \
             FROM reports r JOIN locations l ON l.id = r.location_id WHERE 1 = 1",
        );
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY l.city, l.state ORDER BY total DESC, l.city LIMIT ")
            .push_bind(TOP_CITIES);
        let cities: Vec<(String, String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;

        let heat_map = self.heat_points(range, &HeatmapFilter::default()).await?;

        Ok(LocationInsights {
            has_data: !by_state.is_empty(),
            reports_by_state: by_state
                .into_iter()
                .map(|(state, count, latitude, longitude)| StateCount {
                    state,
                    count,
                    latitude,
                    longitude,
                })
                .collect(),
            top_cities: cities
                .into_iter()
                .map(|(city, state, count)| CityCount { city, state, count })
                .collect(),
            heat_map_data: heat_map,
        })
    }

    pub async fn filtered_heatmap(
        &self,
        params: &AnalyticsParams,
        filter: &HeatmapFilter,
    ) -> ApiResult<FilteredHeatmap> {
        let points = self.heat_points(&params.range, filter).await?;
        let total_weight = points.iter().map(|p| p.weight).sum();

        Ok(FilteredHeatmap {
            category: filter.category.clone(),
            status: filter.status,
            start_date: params.range.start,
            end_date: params.range.end,
            has_data: !points.is_empty(),
            points,
            total_weight,
        })
    }

    pub async fn location_trends(
        &self,
        params: &AnalyticsParams,
        limit: i64,
    ) -> ApiResult<LocationTrends> {
        let window = params.range.trend_window(params.period, params.now);

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT l.state, COUNT(r.id) AS total \
             FROM reports r JOIN locations l ON l.id = r.location_id WHERE 1 = 1",
        );
        window.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY l.state ORDER BY total DESC, l.state LIMIT ")
            .push_bind(limit);
        let top: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;

        if top.is_empty() {
            return Ok(LocationTrends {
                period: params.period,
                states: Vec::new(),
                has_data: false,
            });
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT l.state, ");
        qb.push(params.period.bucket_sql("r.created_at"))
            .push(
                " AS bucket, COUNT(r.id) FROM reports r \
                 JOIN locations l ON l.id = r.location_id WHERE l.state IN (",
            );
        let mut states = qb.separated(", ");
        for (state, _) in &top {
            states.push_bind(state.clone());
        }
        states.push_unseparated(")");
        window.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY l.state, bucket ORDER BY l.state, bucket");

        let rows: Vec<(String, String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;

        let mut buckets: HashMap<String, Vec<(String, i64)>> = HashMap::new();
        for (state, bucket, count) in rows {
            buckets.entry(state).or_default().push((bucket, count));
        }

        let states = top
            .into_iter()
            .map(|(state, total)| StateTrend {
                series: TrendSeries::from_buckets(buckets.remove(&state).unwrap_or_default()),
                state,
                total,
            })
            .collect();

        Ok(LocationTrends {
            period: params.period,
            states,
            has_data: true,
        })
    }

    async fn heat_points(
        &self,
        range: &DateRange,
        filter: &HeatmapFilter,
    ) -> ApiResult<Vec<HeatPoint>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT l.latitude, l.longitude, COUNT(r.id) AS weight
            FROM reports r
            JOIN locations l ON l.id = r.location_id
            JOIN categories c ON c.id = r.category_id
            WHERE 1 = 1"#,
        );
        if let Some(category) = &filter.category {
            qb.push(" AND c.name = ").push_bind(category.clone());
        }
        if let Some(status) = filter.status {
            qb.push(" AND r.status = ").push_bind(status.as_str());
        }
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY l.latitude, l.longitude ORDER BY weight DESC, l.latitude, l.longitude");

        let rows: Vec<(f64, f64, i64)> = qb.build_query_as().fetch_all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|(latitude, longitude, weight)| HeatPoint {
                latitude,
                longitude,
                weight,
            })
            .collect())
    }
}
