/// Report volume analytics
use super::{AnalyticsParams, AnalyticsService, NamedCount, Period, TrendSeries};
use crate::{db::parse_timestamp, error::ApiResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite};

const RECENT_REPORTS: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct RecentReport {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub username: String,
    pub category_name: String,
    pub city: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportAnalytics {
    pub period: Period,
    pub reports_by_category: Vec<NamedCount>,
    /// Keyed `city, state`
    pub reports_by_location: Vec<NamedCount>,
    pub reports_trend: TrendSeries,
    pub recent_reports: Vec<RecentReport>,
    pub has_data: bool,
}

impl AnalyticsService {
    pub async fn reports(&self, params: &AnalyticsParams) -> ApiResult<ReportAnalytics> {
        let range = &params.range;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT c.name, COUNT(r.id) AS total FROM reports r \
             JOIN categories c ON c.id = r.category_id WHERE 1 = 1",
        );
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY c.id, c.name ORDER BY total DESC, c.name");
        let by_category: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT l.city || ', ' || l.state AS place, COUNT(r.id) AS total FROM reports r \
             JOIN locations l ON l.id = r.location_id WHERE 1 = 1",
        );
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY l.city, l.state ORDER BY total DESC, place");
        let by_location: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;

        let trend = self
            .bucket_counts(
                "reports",
                "created_at",
                params.period,
                &range.trend_window(params.period, params.now),
            )
            .await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT r.id, r.title, r.status, r.created_at, u.username,
                   c.name AS category_name, l.city, l.state
            FROM reports r
            JOIN users u ON u.id = r.user_id
            JOIN categories c ON c.id = r.category_id
            JOIN locations l ON l.id = r.location_id
            WHERE 1 = 1"#,
        );
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
            .push_bind(RECENT_REPORTS);

        let recent = qb
            .build()
            .fetch_all(&self.db)
            .await?
            .iter()
            .map(|row| {
                Ok(RecentReport {
                    id: row.get("id"),
                    title: row.get("title"),
                    status: row.get("status"),
                    username: row.get("username"),
                    category_name: row.get("category_name"),
                    city: row.get("city"),
                    state: row.get("state"),
                    created_at: parse_timestamp(row.get("created_at"))?,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;

        Ok(ReportAnalytics {
            period: params.period,
            has_data: !by_category.is_empty(),
            reports_by_category: by_category.into_iter().map(NamedCount::from).collect(),
            reports_by_location: by_location.into_iter().map(NamedCount::from).collect(),
            reports_trend: trend,
            recent_reports: recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::DateRange;
    use crate::db::{create_memory_pool, fixtures};
    use chrono::TimeZone;

    fn params(period: Period, range: DateRange) -> AnalyticsParams {
        AnalyticsParams {
            period,
            range,
            now: Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_report_analytics() {
        let pool = create_memory_pool().await.unwrap();
        let user = fixtures::user(&pool, "reporter").await;
        let traffic = fixtures::category(&pool, "Traffic").await;
        let safety = fixtures::category(&pool, "Public Safety").await;
        let manila = fixtures::location(&pool, "Manila", "Metro Manila").await;
        let cebu = fixtures::location(&pool, "Cebu City", "Cebu").await;

        fixtures::report(&pool, user, traffic, manila, "2024-04-02 10:00:00").await;
        fixtures::report(&pool, user, traffic, cebu, "2024-05-03 10:00:00").await;
        fixtures::report(&pool, user, traffic, manila, "2024-05-04 10:00:00").await;
        fixtures::report(&pool, user, safety, manila, "2024-05-05 10:00:00").await;
        // Outside the default monthly window
        fixtures::report(&pool, user, safety, cebu, "2022-01-01 10:00:00").await;

        let service = AnalyticsService::new(pool);
        let analytics = service
            .reports(&params(Period::Monthly, DateRange::default()))
            .await
            .unwrap();

        assert!(analytics.has_data);
        assert_eq!(
            analytics.reports_by_category,
            vec![
                NamedCount { name: "Traffic".to_string(), count: 3 },
                NamedCount { name: "Public Safety".to_string(), count: 2 },
            ]
        );
        assert_eq!(analytics.reports_by_location[0].name, "Manila, Metro Manila");
        assert_eq!(analytics.reports_by_location[0].count, 3);

        let trend: Vec<_> = analytics
            .reports_trend
            .points
            .iter()
            .map(|p| (p.period.as_str(), p.count, p.growth_rate))
            .collect();
        assert_eq!(trend, vec![("2024-04", 1, 100.0), ("2024-05", 3, 200.0)]);

        assert_eq!(analytics.recent_reports.len(), 5);
        assert_eq!(analytics.recent_reports[0].category_name, "Public Safety");
        assert_eq!(analytics.recent_reports[0].username, "reporter");
    }

    #[tokio::test]
    async fn test_report_analytics_range_and_empty() {
        let pool = create_memory_pool().await.unwrap();
        let service = AnalyticsService::new(pool.clone());

        let empty = service
            .reports(&params(Period::Daily, DateRange::default()))
            .await
            .unwrap();
        assert!(!empty.has_data);
        assert!(!empty.reports_trend.has_data);
        assert!(empty.recent_reports.is_empty());

        let user = fixtures::user(&pool, "reporter").await;
        let category = fixtures::category(&pool, "Traffic").await;
        let location = fixtures::location(&pool, "Manila", "Metro Manila").await;
        fixtures::report(&pool, user, category, location, "2024-03-01 10:00:00").await;
        fixtures::report(&pool, user, category, location, "2024-03-31 22:00:00").await;
        fixtures::report(&pool, user, category, location, "2024-04-01 00:00:00").await;

        let march = DateRange::parse(Some("2024-03-01"), Some("2024-03-31")).unwrap();
        let analytics = service
            .reports(&params(Period::Daily, march))
            .await
            .unwrap();
        assert_eq!(analytics.reports_by_category[0].count, 2);
        assert_eq!(analytics.reports_trend.points.len(), 2);
        assert_eq!(analytics.recent_reports.len(), 2);
    }
}
