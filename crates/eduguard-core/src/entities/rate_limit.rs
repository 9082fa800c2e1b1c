use std::future::Future;

use chrono::{DateTime, Utc};

use crate::entities::SqliteStore;
use crate::rate_limit::{RateLimitPolicy, RateLimitRecord};

pub trait RateLimitStore: Send + Sync + 'static {
    /// Count one request against `user_id`'s window. Returns `false` when the
    /// ceiling is reached; a denied request leaves the record unchanged.
    ///
    /// Implementations must be atomic: two concurrent calls for the same user
    /// may never both pass the ceiling check.
    fn try_acquire(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        policy: &RateLimitPolicy,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    fn rate_limit_record(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<RateLimitRecord>, sqlx::Error>> + Send;
}

impl RateLimitStore for SqliteStore {
    async fn try_acquire(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        policy: &RateLimitPolicy,
    ) -> Result<bool, sqlx::Error> {
        // One statement, so SQLite applies the read-modify-write atomically.
        // SET expressions see the pre-update row; a false upsert WHERE skips
        // the update and RETURNING yields no row.
        let row: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO edu_rate_limits (user_id, window_start_ms, count) VALUES (?1, ?2, 1) \
             ON CONFLICT(user_id) DO UPDATE SET \
                 count = CASE WHEN ?2 - edu_rate_limits.window_start_ms >= ?3 \
                              THEN 1 ELSE edu_rate_limits.count + 1 END, \
                 window_start_ms = CASE WHEN ?2 - edu_rate_limits.window_start_ms >= ?3 \
                              THEN ?2 ELSE edu_rate_limits.window_start_ms END \
             WHERE ?2 - edu_rate_limits.window_start_ms >= ?3 \
                OR edu_rate_limits.count < ?4 \
             RETURNING count",
        )
        .bind(user_id)
        .bind(now.timestamp_millis())
        .bind(policy.window_ms())
        .bind(i64::from(policy.max_requests))
        .fetch_optional(&self.pool)
        .await?;

        if let Some((count,)) = row {
            tracing::debug!(user_id, count, "rate limit slot acquired");
            Ok(true)
        } else {
            tracing::debug!(user_id, "rate limit ceiling reached");
            Ok(false)
        }
    }

    async fn rate_limit_record(&self, user_id: &str) -> Result<Option<RateLimitRecord>, sqlx::Error> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT window_start_ms, count FROM edu_rate_limits WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(window_start_ms, count)| -> Result<RateLimitRecord, sqlx::Error> {
            let window_start = DateTime::from_timestamp_millis(window_start_ms).ok_or_else(|| {
                sqlx::Error::Decode(format!("window_start_ms {window_start_ms} out of range").into())
            })?;
            Ok(RateLimitRecord {
                window_start,
                count: u32::try_from(count).unwrap_or(0),
            })
        })
        .transpose()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::Arc;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.expect("in-memory store")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn first_request_opens_window() {
        let store = store().await;
        let policy = RateLimitPolicy::default();
        assert!(store.try_acquire("u1", at(0), &policy).await.unwrap());

        let record = store.rate_limit_record("u1").await.unwrap().expect("record");
        assert_eq!(record, RateLimitRecord { window_start: at(0), count: 1 });
    }

    #[tokio::test]
    async fn twenty_first_request_is_denied_without_mutation() {
        let store = store().await;
        let policy = RateLimitPolicy::default();
        for i in 0..20 {
            assert!(store.try_acquire("u1", at(i), &policy).await.unwrap(), "request {i}");
        }

        assert!(!store.try_acquire("u1", at(25), &policy).await.unwrap());
        assert!(!store.try_acquire("u1", at(299), &policy).await.unwrap());

        let record = store.rate_limit_record("u1").await.unwrap().unwrap();
        assert_eq!(record, RateLimitRecord { window_start: at(0), count: 20 });
    }

    #[tokio::test]
    async fn window_expiry_resets_count() {
        let store = store().await;
        let policy = RateLimitPolicy::default();
        for i in 0..20 {
            store.try_acquire("u1", at(i), &policy).await.unwrap();
        }
        let later = at(0) + TimeDelta::minutes(5);

        assert!(store.try_acquire("u1", later, &policy).await.unwrap());

        let record = store.rate_limit_record("u1").await.unwrap().unwrap();
        assert_eq!(record, RateLimitRecord { window_start: later, count: 1 });
    }

    #[tokio::test]
    async fn users_have_independent_windows() {
        let store = store().await;
        let policy = RateLimitPolicy::new(std::time::Duration::from_secs(60), 1);
        assert!(store.try_acquire("alice", at(0), &policy).await.unwrap());
        assert!(!store.try_acquire("alice", at(1), &policy).await.unwrap());
        assert!(store.try_acquire("bob", at(1), &policy).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_requests_never_exceed_ceiling() {
        let store = Arc::new(store().await);
        let policy = RateLimitPolicy::default();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.try_acquire("u1", at(10), &policy).await })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.expect("task").expect("store") {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 20);
        assert_eq!(store.rate_limit_record("u1").await.unwrap().unwrap().count, 20);
    }
}
