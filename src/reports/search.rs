/// Paginated report search
use crate::{
    db::{contains_pattern, format_timestamp, parse_date_bound, parse_timestamp},
    error::{ApiError, ApiResult},
    reports::{ReportManager, ReportStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Search query string parameters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Matches title or description
    pub query: Option<String>,
    /// Exact category name
    pub category: Option<String>,
    /// Matches street, city, state or country
    pub location: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    UpvotesDesc,
    UpvotesAsc,
}

impl SortOrder {
    pub fn from_str(s: &str) -> ApiResult<Self> {
        match s {
            "createdAt_desc" => Ok(SortOrder::CreatedAtDesc),
            "createdAt_asc" => Ok(SortOrder::CreatedAtAsc),
            "upvotes_desc" => Ok(SortOrder::UpvotesDesc),
            "upvotes_asc" => Ok(SortOrder::UpvotesAsc),
            _ => Err(ApiError::Validation(format!(
                "Invalid sortBy '{}', expected createdAt_desc, createdAt_asc, upvotes_desc or upvotes_asc",
                s
            ))),
        }
    }

    fn order_by(&self) -> &'static str {
        // Ties fall back to id so pages never overlap
        match self {
            SortOrder::CreatedAtDesc => " ORDER BY r.created_at DESC, r.id DESC",
            SortOrder::CreatedAtAsc => " ORDER BY r.created_at ASC, r.id ASC",
            SortOrder::UpvotesDesc => " ORDER BY upvotes DESC, r.created_at DESC, r.id DESC",
            SortOrder::UpvotesAsc => " ORDER BY upvotes ASC, r.created_at ASC, r.id ASC",
        }
    }
}

/// Validated search parameters
#[derive(Debug, Clone)]
struct SearchFilters {
    text: Option<String>,
    category: Option<String>,
    location: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    page: i64,
    limit: i64,
    offset: i64,
    sort: SortOrder,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl SearchFilters {
    fn from_query(query: &SearchQuery) -> ApiResult<Self> {
        let page = query.page.unwrap_or(1);
        if page < 1 {
            return Err(ApiError::Validation("page must be at least 1".to_string()));
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ApiError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| ApiError::Validation(format!("page {} is out of range", page)))?;

        let sort = match query.sort_by.as_deref() {
            Some(s) => SortOrder::from_str(s)?,
            None => SortOrder::default(),
        };

        let from = non_blank(&query.date_from)
            .map(|v| parse_date_bound(&v, false))
            .transpose()?;
        let to = non_blank(&query.date_to)
            .map(|v| parse_date_bound(&v, true))
            .transpose()?;

        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ApiError::Validation(
                    "dateFrom must not be after dateTo".to_string(),
                ));
            }
        }

        Ok(Self {
            text: non_blank(&query.query),
            category: non_blank(&query.category),
            location: non_blank(&query.location),
            from,
            to,
            page,
            limit,
            offset,
            sort,
        })
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");

        if let Some(text) = &self.text {
            let pattern = contains_pattern(text);
            qb.push(" AND (r.title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR r.description LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }

        if let Some(category) = &self.category {
            qb.push(" AND c.name = ").push_bind(category.clone());
        }

        if let Some(location) = &self.location {
            let pattern = contains_pattern(location);
            qb.push(" AND (");
            for (i, column) in ["l.street", "l.city", "l.state", "l.country"].iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(*column)
                    .push(" LIKE ")
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\'");
            }
            qb.push(")");
        }

        if let Some(from) = &self.from {
            qb.push(" AND r.created_at >= ").push_bind(format_timestamp(from));
        }

        if let Some(to) = &self.to {
            qb.push(" AND r.created_at <= ").push_bind(format_timestamp(to));
        }
    }
}

/// Number of pages needed for `total` items
pub fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

/// Search result row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: ReportStatus,
    pub category_name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub username: String,
    pub image_count: i64,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of search results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub reports: Vec<ReportListItem>,
    pub total_pages: i64,
    pub current_page: i64,
    pub total_reports: i64,
}

const FROM_JOINS: &str = r#"
    FROM reports r
    JOIN categories c ON c.id = r.category_id
    JOIN locations l ON l.id = r.location_id
    JOIN users u ON u.id = r.user_id"#;

impl ReportManager {
    /// Filtered, sorted, paginated report listing
    pub async fn search(&self, query: &SearchQuery) -> ApiResult<SearchPage> {
        let filters = SearchFilters::from_query(query)?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        count.push(FROM_JOINS);
        filters.push_where(&mut count);

        let total: i64 = count.build_query_scalar().fetch_one(&self.db).await?;

        let mut select = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT r.id, r.title, r.description, r.status, r.created_at, r.updated_at,
                   c.name AS category_name, l.street, l.city, l.state, u.username,
                   (SELECT COUNT(*) FROM images i WHERE i.report_id = r.id) AS image_count,
                   (SELECT COUNT(*) FROM votes v WHERE v.report_id = r.id AND v.vote_type = 'upvote') AS upvotes,
                   (SELECT COUNT(*) FROM votes v WHERE v.report_id = r.id AND v.vote_type = 'downvote') AS downvotes"#,
        );
        select.push(FROM_JOINS);
        filters.push_where(&mut select);
        select.push(filters.sort.order_by());
        select
            .push(" LIMIT ")
            .push_bind(filters.limit)
            .push(" OFFSET ")
            .push_bind(filters.offset);

        let rows = select.build().fetch_all(&self.db).await?;
        let reports = rows.iter().map(parse_list_item).collect::<ApiResult<Vec<_>>>()?;

        tracing::debug!(
            "Report search matched {} (page {} of {})",
            total,
            filters.page,
            total_pages(total, filters.limit)
        );

        Ok(SearchPage {
            reports,
            total_pages: total_pages(total, filters.limit),
            current_page: filters.page,
            total_reports: total,
        })
    }
}

fn parse_list_item(row: &SqliteRow) -> ApiResult<ReportListItem> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ReportListItem {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status: ReportStatus::from_str(&status)?,
        category_name: row.get("category_name"),
        street: row.get("street"),
        city: row.get("city"),
        state: row.get("state"),
        username: row.get("username"),
        image_count: row.get("image_count"),
        upvotes: row.get("upvotes"),
        downvotes: row.get("downvotes"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
