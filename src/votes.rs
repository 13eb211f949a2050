/// Report voting
///
/// Each (report, user) pair is in one of three states: no vote, upvoted or
/// downvoted. Submitting the vote already held withdraws it, submitting the
/// opposite vote switches it.
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Vote direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Upvote => "upvote",
            VoteType::Downvote => "downvote",
        }
    }

    pub fn from_str(s: &str) -> ApiResult<Self> {
        match s.trim() {
            v if v.eq_ignore_ascii_case("upvote") => Ok(VoteType::Upvote),
            v if v.eq_ignore_ascii_case("downvote") => Ok(VoteType::Downvote),
            _ => Err(ApiError::Validation(format!(
                "Invalid vote type '{}', expected upvote or downvote",
                s
            ))),
        }
    }
}

/// Storage action needed to move from one vote state to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAction {
    Insert(VoteType),
    Delete,
    Update(VoteType),
}

/// Apply a submitted vote to the current state, returning the storage
/// action and the resulting state
pub fn transition(current: Option<VoteType>, submitted: VoteType) -> (VoteAction, Option<VoteType>) {
    match current {
        None => (VoteAction::Insert(submitted), Some(submitted)),
        Some(held) if held == submitted => (VoteAction::Delete, None),
        Some(_) => (VoteAction::Update(submitted), Some(submitted)),
    }
}

/// Vote request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub vote_type: String,
}

/// Result of casting a vote
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub current_vote: Option<VoteType>,
    pub upvotes: i64,
    pub downvotes: i64,
}

/// Vote tallies for a report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCounts {
    pub upvotes: i64,
    pub downvotes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_vote: Option<VoteType>,
}

/// Vote manager
#[derive(Clone)]
pub struct VoteManager {
    db: SqlitePool,
}

impl VoteManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Cast (or toggle) a user's vote on a report
    pub async fn cast(
        &self,
        report_id: i64,
        user_id: i64,
        submitted: VoteType,
    ) -> ApiResult<VoteOutcome> {
        let mut tx = crate::db::begin_write(&self.db).await?;

        ensure_report_exists(&mut tx, report_id).await?;

        let held: Option<String> =
            sqlx::query_scalar("SELECT vote_type FROM votes WHERE report_id = ? AND user_id = ?")
                .bind(report_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = held.as_deref().map(VoteType::from_str).transpose()?;

        let (action, next) = transition(current, submitted);

        match action {
            VoteAction::Insert(vote_type) => {
                sqlx::query(
                    "INSERT INTO votes (report_id, user_id, vote_type, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(report_id)
                .bind(user_id)
                .bind(vote_type.as_str())
                .bind(crate::db::now_timestamp())
                .execute(&mut *tx)
                .await?;
            }
            VoteAction::Delete => {
                sqlx::query("DELETE FROM votes WHERE report_id = ? AND user_id = ?")
                    .bind(report_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
            VoteAction::Update(vote_type) => {
                sqlx::query("UPDATE votes SET vote_type = ? WHERE report_id = ? AND user_id = ?")
                    .bind(vote_type.as_str())
                    .bind(report_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let (upvotes, downvotes) = tally(&mut tx, report_id).await?;
        tx.commit().await?;

        tracing::debug!(
            "User {} vote on report {}: {:?} -> {:?}",
            user_id,
            report_id,
            current,
            next
        );

        Ok(VoteOutcome {
            current_vote: next,
            upvotes,
            downvotes,
        })
    }

    /// Withdraw a user's vote
    pub async fn remove(&self, report_id: i64, user_id: i64) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM votes WHERE report_id = ? AND user_id = ?")
            .bind(report_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!(
                "No vote on report {} to remove",
                report_id
            )));
        }

        Ok(())
    }

    /// Vote tallies, plus the caller's own vote when known
    pub async fn counts(&self, report_id: i64, user_id: Option<i64>) -> ApiResult<VoteCounts> {
        let mut tx = self.db.begin().await?;

        ensure_report_exists(&mut tx, report_id).await?;
        let (upvotes, downvotes) = tally(&mut tx, report_id).await?;

        let user_vote = match user_id {
            Some(user_id) => {
                let held: Option<String> = sqlx::query_scalar(
                    "SELECT vote_type FROM votes WHERE report_id = ? AND user_id = ?",
                )
                .bind(report_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
                held.as_deref().map(VoteType::from_str).transpose()?
            }
            None => None,
        };

        tx.commit().await?;

        Ok(VoteCounts {
            upvotes,
            downvotes,
            user_vote,
        })
    }
}

async fn ensure_report_exists(tx: &mut Transaction<'_, Sqlite>, report_id: i64) -> ApiResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM reports WHERE id = ?")
        .bind(report_id)
        .fetch_optional(&mut **tx)
        .await?;

    exists
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound(format!("Report {} not found", report_id)))
}

async fn tally(tx: &mut Transaction<'_, Sqlite>, report_id: i64) -> ApiResult<(i64, i64)> {
    let counts: (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN vote_type = 'upvote' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN vote_type = 'downvote' THEN 1 ELSE 0 END), 0)
        FROM votes WHERE report_id = ?
        "#,
    )
    .bind(report_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, fixtures};

    async fn setup() -> (VoteManager, SqlitePool, i64, i64) {
        let pool = create_memory_pool().await.unwrap();
        let user = fixtures::user(&pool, "voter").await;
        let category = fixtures::category(&pool, "Traffic").await;
        let location = fixtures::location(&pool, "Manila", "Metro Manila").await;
        let report = fixtures::report(&pool, user, category, location, "2024-02-01 10:00:00").await;
        (VoteManager::new(pool.clone()), pool, report, user)
    }

    async fn rows(pool: &SqlitePool, report: i64) -> Vec<String> {
        sqlx::query_scalar("SELECT vote_type FROM votes WHERE report_id = ?")
            .bind(report)
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_transition_table() {
        use VoteType::*;

        assert_eq!(transition(None, Upvote), (VoteAction::Insert(Upvote), Some(Upvote)));
        assert_eq!(transition(Some(Upvote), Upvote), (VoteAction::Delete, None));
        assert_eq!(
            transition(Some(Upvote), Downvote),
            (VoteAction::Update(Downvote), Some(Downvote))
        );
        assert_eq!(transition(Some(Downvote), Downvote), (VoteAction::Delete, None));
    }

    #[test]
    fn test_vote_type_parse() {
        assert_eq!(VoteType::from_str("downvote").unwrap(), VoteType::Downvote);
        assert_eq!(VoteType::from_str("Upvote").unwrap(), VoteType::Upvote);
        assert_eq!(VoteType::from_str("DOWNVOTE").unwrap(), VoteType::Downvote);
        assert!(matches!(
            VoteType::from_str("sidevote"),
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_same_vote_twice_withdraws() {
        let (votes, pool, report, user) = setup().await;

        let first = votes.cast(report, user, VoteType::Upvote).await.unwrap();
        assert_eq!(first.current_vote, Some(VoteType::Upvote));
        assert_eq!(first.upvotes, 1);

        let second = votes.cast(report, user, VoteType::Upvote).await.unwrap();
        assert_eq!(second.current_vote, None);
        assert_eq!(second.upvotes, 0);
        assert!(rows(&pool, report).await.is_empty());
    }

    #[tokio::test]
    async fn test_opposite_vote_switches() {
        let (votes, pool, report, user) = setup().await;

        votes.cast(report, user, VoteType::Upvote).await.unwrap();
        let outcome = votes.cast(report, user, VoteType::Downvote).await.unwrap();

        assert_eq!(outcome.current_vote, Some(VoteType::Downvote));
        assert_eq!((outcome.upvotes, outcome.downvotes), (0, 1));
        assert_eq!(rows(&pool, report).await, vec!["downvote".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_casts_on_shared_pool() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(&crate::config::DatabaseConfig {
            path: dir.path().join("votes.db"),
            max_connections: 8,
            min_connections: 2,
            acquire_timeout: 5,
            idle_timeout: 60,
        })
        .await
        .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let user = fixtures::user(&pool, "clicker").await;
        let category = fixtures::category(&pool, "Traffic").await;
        let location = fixtures::location(&pool, "Manila", "Metro Manila").await;
        let report = fixtures::report(&pool, user, category, location, "2024-02-01 10:00:00").await;
        let votes = VoteManager::new(pool.clone());

        for _ in 0..20 {
            let (a, b) = tokio::join!(
                votes.cast(report, user, VoteType::Upvote),
                votes.cast(report, user, VoteType::Upvote)
            );
            a.unwrap();
            b.unwrap();
            // Two identical casts always cancel out
            assert!(rows(&pool, report).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_vote_on_missing_report() {
        let (votes, _pool, _report, user) = setup().await;
        assert!(matches!(
            votes.cast(999, user, VoteType::Upvote).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_counts_and_remove() {
        let (votes, pool, report, user) = setup().await;
        let other = fixtures::user(&pool, "other").await;

        votes.cast(report, user, VoteType::Downvote).await.unwrap();
        votes.cast(report, other, VoteType::Upvote).await.unwrap();

        let counts = votes.counts(report, Some(user)).await.unwrap();
        assert_eq!((counts.upvotes, counts.downvotes), (1, 1));
        assert_eq!(counts.user_vote, Some(VoteType::Downvote));

        votes.remove(report, user).await.unwrap();
        let counts = votes.counts(report, None).await.unwrap();
        assert_eq!((counts.upvotes, counts.downvotes), (1, 0));
        assert_eq!(counts.user_vote, None);

        assert!(matches!(
            votes.remove(report, user).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
