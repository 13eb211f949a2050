/// System-wide figures: table sizes, engagement, activity and API traffic
use super::{AnalyticsService, DateRange, NamedCount, Period, TrendSeries};
use crate::{
    db::format_timestamp,
    error::ApiResult,
    metrics::{self, RouteUsage},
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

const HOURLY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserEngagement {
    pub total_users: i64,
    pub total_reports: i64,
    pub total_votes: i64,
    pub active_reporters: i64,
    pub avg_reports_per_user: f64,
    pub avg_votes_per_report: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyActivity {
    pub hour: u32,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiUsage {
    /// Start of the observation window
    pub since: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub routes: Vec<RouteUsage>,
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRates {
    pub since: DateTime<Utc>,
    pub total_requests: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    /// Percentages of all requests
    pub client_error_rate: f64,
    pub server_error_rate: f64,
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemPerformance {
    pub record_counts: Vec<NamedCount>,
    pub user_engagement: UserEngagement,
    pub hourly_activity: Vec<HourlyActivity>,
    pub monthly_growth: TrendSeries,
    pub api_usage: ApiUsage,
    pub error_rates: ErrorRates,
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 100.0).round() / 100.0
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

impl AnalyticsService {
    pub async fn system_performance(&self, now: DateTime<Utc>) -> ApiResult<SystemPerformance> {
        let (users, reports, votes, images, categories, locations): (i64, i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM reports),
                    (SELECT COUNT(*) FROM votes),
                    (SELECT COUNT(*) FROM images),
                    (SELECT COUNT(*) FROM categories),
                    (SELECT COUNT(*) FROM locations)
                "#,
            )
            .fetch_one(&self.db)
            .await?;

        let active_reporters: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM reports")
            .fetch_one(&self.db)
            .await?;

        let hourly_since = now - Duration::days(HOURLY_WINDOW_DAYS);
        let hourly_rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT CAST(strftime('%H', created_at) AS INTEGER) AS hour, COUNT(*)
            FROM reports
            WHERE created_at >= ? AND created_at <= ?
            GROUP BY hour
            "#,
        )
        .bind(format_timestamp(&hourly_since))
        .bind(format_timestamp(&now))
        .fetch_all(&self.db)
        .await?;

        let mut hourly: Vec<HourlyActivity> = (0..24)
            .map(|hour| HourlyActivity { hour, count: 0 })
            .collect();
        for (hour, count) in hourly_rows {
            if let Some(slot) = usize::try_from(hour).ok().and_then(|h| hourly.get_mut(h)) {
                slot.count = count;
            }
        }

        let monthly_window = DateRange {
            start: Some(Period::Monthly.default_window_start(now)),
            end: Some(now),
        };
        let monthly_growth = self
            .bucket_counts("reports", "created_at", Period::Monthly, &monthly_window)
            .await?;

        let since = *metrics::STARTED_AT;
        let routes = metrics::route_usage();
        let totals = metrics::status_totals();

        Ok(SystemPerformance {
            record_counts: vec![
                NamedCount::from(("users".to_string(), users)),
                NamedCount::from(("reports".to_string(), reports)),
                NamedCount::from(("votes".to_string(), votes)),
                NamedCount::from(("images".to_string(), images)),
                NamedCount::from(("categories".to_string(), categories)),
                NamedCount::from(("locations".to_string(), locations)),
            ],
            user_engagement: UserEngagement {
                total_users: users,
                total_reports: reports,
                total_votes: votes,
                active_reporters,
                avg_reports_per_user: ratio(reports, users),
                avg_votes_per_report: ratio(votes, reports),
            },
            hourly_activity: hourly,
            monthly_growth,
            api_usage: ApiUsage {
                since,
                uptime_seconds: metrics::uptime_seconds(),
                total_requests: totals.requests,
                has_data: !routes.is_empty(),
                routes,
            },
            error_rates: ErrorRates {
                since,
                total_requests: totals.requests,
                client_errors: totals.client_errors,
                server_errors: totals.server_errors,
                client_error_rate: percentage(totals.client_errors, totals.requests),
                server_error_rate: percentage(totals.server_errors, totals.requests),
                has_data: totals.requests > 0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, fixtures};
    use chrono::TimeZone;

    #[test]
    fn test_rates() {
        assert_eq!(ratio(5, 2), 2.5);
        assert_eq!(ratio(1, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[tokio::test]
    async fn test_system_performance() {
        let pool = create_memory_pool().await.unwrap();
        let alice = fixtures::user(&pool, "alice").await;
        fixtures::user(&pool, "bob").await;
        let category = fixtures::category(&pool, "Traffic").await;
        let location = fixtures::location(&pool, "Manila", "Metro Manila").await;

        let first = fixtures::report(&pool, alice, category, location, "2024-06-20 08:15:00").await;
        fixtures::report(&pool, alice, category, location, "2024-06-21 08:45:00").await;
        fixtures::report(&pool, alice, category, location, "2024-06-22 17:00:00").await;
        // Outside the hourly window, inside the monthly one
        fixtures::report(&pool, alice, category, location, "2024-03-01 17:00:00").await;
        fixtures::vote(&pool, first, alice, "upvote").await;

        let service = AnalyticsService::new(pool);
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap();
        let performance = service.system_performance(now).await.unwrap();

        let counts: Vec<_> = performance
            .record_counts
            .iter()
            .map(|c| (c.name.as_str(), c.count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("users", 2),
                ("reports", 4),
                ("votes", 1),
                ("images", 0),
                ("categories", 1),
                ("locations", 1),
            ]
        );

        assert_eq!(performance.user_engagement.active_reporters, 1);
        assert_eq!(performance.user_engagement.avg_reports_per_user, 2.0);
        assert_eq!(performance.user_engagement.avg_votes_per_report, 0.25);

        assert_eq!(performance.hourly_activity.len(), 24);
        assert_eq!(performance.hourly_activity[8].count, 2);
        assert_eq!(performance.hourly_activity[17].count, 1);

        let months: Vec<_> = performance
            .monthly_growth
            .points
            .iter()
            .map(|p| (p.period.as_str(), p.count))
            .collect();
        assert_eq!(months, vec![("2024-03", 1), ("2024-06", 3)]);

        assert!(performance.api_usage.since <= Utc::now());
    }
}
