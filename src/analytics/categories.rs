/// Category breakdowns over time and space
use super::{AnalyticsParams, AnalyticsService, NamedCount, Period};
use crate::error::ApiResult;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTrendPoint {
    pub period: String,
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStateCount {
    pub category: String,
    pub state: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryAnalysis {
    pub period: Period,
    pub most_reported_categories: Vec<NamedCount>,
    pub category_trends: Vec<CategoryTrendPoint>,
    pub category_by_location: Vec<CategoryStateCount>,
    pub has_data: bool,
}

impl AnalyticsService {
    pub async fn category_analysis(&self, params: &AnalyticsParams) -> ApiResult<CategoryAnalysis> {
        let range = &params.range;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT c.name, COUNT(r.id) AS total FROM reports r \
             JOIN categories c ON c.id = r.category_id WHERE 1 = 1",
        );
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY c.id, c.name ORDER BY total DESC, c.name");
        let most_reported: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(params.period.bucket_sql("r.created_at")).push(
            " AS bucket, c.name, COUNT(r.id) FROM reports r \
             JOIN categories c ON c.id = r.category_id WHERE 1 = 1",
        );
        range
            .trend_window(params.period, params.now)
            .push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY bucket, c.id, c.name ORDER BY bucket, c.name");
        let trends: Vec<(String, String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT c.name, l.state, COUNT(r.id) AS total
            FROM reports r
            JOIN categories c ON c.id = r.category_id
            JOIN locations l ON l.id = r.location_id
            WHERE 1 = 1"#,
        );
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY c.id, c.name, l.state ORDER BY c.name, total DESC, l.state");
        let by_location: Vec<(String, String, i64)> =
            qb.build_query_as().fetch_all(&self.db).await?;

        Ok(CategoryAnalysis {
            period: params.period,
            has_data: !most_reported.is_empty(),
            most_reported_categories: most_reported.into_iter().map(NamedCount::from).collect(),
            category_trends: trends
                .into_iter()
                .map(|(period, category, count)| CategoryTrendPoint {
                    period,
                    category,
                    count,
                })
                .collect(),
            category_by_location: by_location
                .into_iter()
                .map(|(category, state, count)| CategoryStateCount {
                    category,
                    state,
                    count,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::DateRange;
    use crate::db::{create_memory_pool, fixtures};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_category_analysis() {
        let pool = create_memory_pool().await.unwrap();
        let user = fixtures::user(&pool, "reporter").await;
        let traffic = fixtures::category(&pool, "Traffic").await;
        let environment = fixtures::category(&pool, "Environment").await;
        fixtures::category(&pool, "Unused").await;
        let manila = fixtures::location(&pool, "Manila", "Metro Manila").await;
        let cebu = fixtures::location(&pool, "Cebu City", "Cebu").await;

        fixtures::report(&pool, user, traffic, manila, "2024-01-15 10:00:00").await;
        fixtures::report(&pool, user, traffic, cebu, "2024-02-15 10:00:00").await;
        fixtures::report(&pool, user, environment, cebu, "2024-05-15 10:00:00").await;

        let service = AnalyticsService::new(pool);
        let analysis = service
            .category_analysis(&AnalyticsParams {
                period: Period::Quarterly,
                range: DateRange::default(),
                now: Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap(),
            })
            .await
            .unwrap();

        assert!(analysis.has_data);
        assert_eq!(analysis.most_reported_categories.len(), 2);
        assert_eq!(analysis.most_reported_categories[0].name, "Traffic");

        assert_eq!(
            analysis.category_trends,
            vec![
                CategoryTrendPoint {
                    period: "2024-Q1".to_string(),
                    category: "Traffic".to_string(),
                    count: 2,
                },
                CategoryTrendPoint {
                    period: "2024-Q2".to_string(),
                    category: "Environment".to_string(),
                    count: 1,
                },
            ]
        );

        assert_eq!(
            analysis.category_by_location,
            vec![
                CategoryStateCount {
                    category: "Environment".to_string(),
                    state: "Cebu".to_string(),
                    count: 1,
                },
                CategoryStateCount {
                    category: "Traffic".to_string(),
                    state: "Cebu".to_string(),
                    count: 1,
                },
                CategoryStateCount {
                    category: "Traffic".to_string(),
                    state: "Metro Manila".to_string(),
                    count: 1,
                },
            ]
        );
    }
}
