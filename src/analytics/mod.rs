/// Administrator dashboard analytics
///
/// Every figure is computed from stored rows or from the in-process request
/// metrics. Series without data are returned empty with `has_data: false`;
/// nothing is estimated or synthesized.

pub mod categories;
pub mod locations;
pub mod reports;
pub mod system;
pub mod users;

use crate::{
    db::{format_timestamp, parse_date_bound},
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// Time bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Quarterly => "quarterly",
            Period::Yearly => "yearly",
        }
    }

    pub fn from_str(s: &str) -> ApiResult<Self> {
        match s {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            "quarterly" => Ok(Period::Quarterly),
            "yearly" => Ok(Period::Yearly),
            _ => Err(ApiError::Validation(format!(
                "Invalid period '{}', expected daily, weekly, monthly, quarterly or yearly",
                s
            ))),
        }
    }

    /// SQL expression mapping a timestamp column to its bucket key.
    ///
    /// Keys sort chronologically: `2024-03-15`, `2024-W11`, `2024-03`,
    /// `2024-Q1`, `2024`. Weeks start on Monday.
    pub fn bucket_sql(&self, column: &str) -> String {
        match self {
            Period::Daily => format!("strftime('%Y-%m-%d', {})", column),
            Period::Weekly => format!("strftime('%Y-W%W', {})", column),
            Period::Monthly => format!("strftime('%Y-%m', {})", column),
            Period::Quarterly => format!(
                "strftime('%Y', {col}) || '-Q' || ((CAST(strftime('%m', {col}) AS INTEGER) + 2) / 3)",
                col = column
            ),
            Period::Yearly => format!("strftime('%Y', {})", column),
        }
    }

    /// Start of the default trend window ending at `now`
    pub fn default_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            Period::Daily => now.checked_sub_signed(Duration::days(30)),
            Period::Weekly => now.checked_sub_signed(Duration::weeks(12)),
            Period::Monthly => now.checked_sub_months(Months::new(12)),
            Period::Quarterly => now.checked_sub_months(Months::new(24)),
            Period::Yearly => now.checked_sub_months(Months::new(60)),
        };
        start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Optional inclusive bounds on a timestamp column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Parse `start_date` / `end_date` query values
    pub fn parse(start: Option<&str>, end: Option<&str>) -> ApiResult<Self> {
        let start = start
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_date_bound(s.trim(), false))
            .transpose()?;
        let end = end
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_date_bound(s.trim(), true))
            .transpose()?;

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ApiError::Validation(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        Ok(Self { start, end })
    }

    /// Range used for trend series: the default window fills a missing start.
    ///
    /// The window ends at `end_date` when one is given, never later than `now`.
    pub fn trend_window(&self, period: Period, now: DateTime<Utc>) -> DateRange {
        let anchor = self.end.map_or(now, |end| end.min(now));
        DateRange {
            start: Some(
                self.start
                    .unwrap_or_else(|| period.default_window_start(anchor)),
            ),
            end: self.end,
        }
    }

    /// Append ` AND column >= ? AND column <= ?` for the bounds that are set
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>, column: &str) {
        if let Some(start) = &self.start {
            qb.push(" AND ")
                .push(column)
                .push(" >= ")
                .push_bind(format_timestamp(start));
        }
        if let Some(end) = &self.end {
            qb.push(" AND ")
                .push(column)
                .push(" <= ")
                .push_bind(format_timestamp(end));
        }
    }
}

/// Query string accepted by the analytics endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Category name (filtered heat map)
    pub category: Option<String>,
    /// Report status (filtered heat map)
    pub status: Option<String>,
    /// Number of states (location trends)
    pub limit: Option<i64>,
}

/// Parsed common analytics parameters
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsParams {
    pub period: Period,
    pub range: DateRange,
    /// Reference time for default windows
    pub now: DateTime<Utc>,
}

impl AnalyticsQuery {
    pub fn params(&self) -> ApiResult<AnalyticsParams> {
        let period = match self.period.as_deref() {
            Some(p) if !p.trim().is_empty() => Period::from_str(p.trim())?,
            _ => Period::default(),
        };

        Ok(AnalyticsParams {
            period,
            range: DateRange::parse(self.start_date.as_deref(), self.end_date.as_deref())?,
            now: Utc::now(),
        })
    }
}

/// Percentage change from `previous` to `current`.
///
/// Growth from zero is 100% when anything appeared, otherwise 0%.
pub fn growth_rate(previous: i64, current: i64) -> f64 {
    let rate = if previous > 0 {
        (current - previous) as f64 / previous as f64 * 100.0
    } else if current > 0 {
        100.0
    } else {
        0.0
    };
    (rate * 100.0).round() / 100.0
}

/// Growth of each bucket over the one before; the first is compared with zero
pub fn growth_rates(counts: &[i64]) -> Vec<f64> {
    let mut previous = 0;
    counts
        .iter()
        .map(|&current| {
            let rate = growth_rate(previous, current);
            previous = current;
            rate
        })
        .collect()
}

/// Named count, the basic distribution entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

impl From<(String, i64)> for NamedCount {
    fn from((name, count): (String, i64)) -> Self {
        Self { name, count }
    }
}

/// One bucket of a time series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period: String,
    pub count: i64,
    pub previous_count: i64,
    pub growth_rate: f64,
}

/// Bucketed counts with period-over-period growth
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub points: Vec<TrendPoint>,
    pub has_data: bool,
}

impl TrendSeries {
    /// Build from `(bucket, count)` rows in chronological order
    pub fn from_buckets(rows: Vec<(String, i64)>) -> Self {
        let counts: Vec<i64> = rows.iter().map(|(_, count)| *count).collect();
        let rates = growth_rates(&counts);

        let mut previous = 0;
        let points: Vec<TrendPoint> = rows
            .into_iter()
            .zip(rates)
            .map(|((period, count), growth_rate)| {
                let point = TrendPoint {
                    period,
                    count,
                    previous_count: previous,
                    growth_rate,
                };
                previous = count;
                point
            })
            .collect();

        Self {
            has_data: !points.is_empty(),
            points,
        }
    }
}

/// Analytics queries over the shared pool
#[derive(Clone)]
pub struct AnalyticsService {
    db: SqlitePool,
}

impl AnalyticsService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Bucketed counts of `table` rows by `column` within `range`
    async fn bucket_counts(
        &self,
        table: &str,
        column: &str,
        period: Period,
        range: &DateRange,
    ) -> ApiResult<TrendSeries> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(period.bucket_sql(column))
            .push(" AS bucket, COUNT(*) FROM ")
            .push(table)
            .push(" WHERE 1 = 1");
        range.push_conditions(&mut qb, column);
        qb.push(" GROUP BY bucket ORDER BY bucket");

        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;
        Ok(TrendSeries::from_buckets(rows))
    }
}
