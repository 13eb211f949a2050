/// User activity analytics
use super::{AnalyticsParams, AnalyticsService, NamedCount, Period, TrendSeries};
use crate::error::ApiResult;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

const MOST_ACTIVE_USERS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveUser {
    pub user_id: i64,
    pub username: String,
    pub report_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserAnalytics {
    pub period: Period,
    pub registrations_trend: TrendSeries,
    /// Distinct reporters per state of the locations they reported from
    pub users_by_location: Vec<NamedCount>,
    pub users_by_role: Vec<NamedCount>,
    pub most_active_users: Vec<ActiveUser>,
    pub has_data: bool,
}

impl AnalyticsService {
    pub async fn users(&self, params: &AnalyticsParams) -> ApiResult<UserAnalytics> {
        let range = &params.range;

        let registrations = self
            .bucket_counts(
                "users",
                "created_at",
                params.period,
                &range.trend_window(params.period, params.now),
            )
            .await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT l.state, COUNT(DISTINCT r.user_id) AS total FROM reports r \
             JOIN locations l ON l.id = r.location_id WHERE 1 = 1",
        );
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY l.state ORDER BY total DESC, l.state");
        let by_location: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;

        let by_role: Vec<(String, i64)> =
            sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role ORDER BY role")
                .fetch_all(&self.db)
                .await?;

        // Range bounds extend the join condition
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT u.id, u.username, COUNT(r.id) AS report_count FROM users u \
             JOIN reports r ON r.user_id = u.id",
        );
        range.push_conditions(&mut qb, "r.created_at");
        qb.push(" GROUP BY u.id, u.username ORDER BY report_count DESC, u.username LIMIT ")
            .push_bind(MOST_ACTIVE_USERS);
        let most_active: Vec<(i64, String, i64)> =
            qb.build_query_as().fetch_all(&self.db).await?;

        Ok(UserAnalytics {
            period: params.period,
            has_data: !by_role.is_empty(),
            registrations_trend: registrations,
            users_by_location: by_location.into_iter().map(NamedCount::from).collect(),
            users_by_role: by_role.into_iter().map(NamedCount::from).collect(),
            most_active_users: most_active
                .into_iter()
                .map(|(user_id, username, report_count)| ActiveUser {
                    user_id,
                    username,
                    report_count,
                })
                .collect(),
        })
    }
}
