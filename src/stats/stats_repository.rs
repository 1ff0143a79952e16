use crate::error::Result;
use axum::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::stats_models::{BucketCount, Collection, OverviewStats, Period, StatusCount};

#[async_trait]
pub trait StatsRepository: Send + Sync + 'static {
    async fn overview(&self) -> Result<OverviewStats>;

    /// Non-empty buckets of `period` starting at or after `since`, oldest first.
    async fn bucket_counts(
        &self,
        collection: Collection,
        period: Period,
        since: DateTime<Utc>,
    ) -> Result<Vec<BucketCount>>;
}

#[derive(Clone)]
pub struct PgStatsRepository {
    pool: PgPool,
}

impl PgStatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[async_trait]
impl StatsRepository for PgStatsRepository {
    async fn overview(&self) -> Result<OverviewStats> {
        let appointments_by_status = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM appointments GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(OverviewStats {
            total_users: self.count("SELECT COUNT(*) FROM users").await?,
            total_doctors: self
                .count("SELECT COUNT(*) FROM users WHERE LOWER(TRIM(role)) = 'doctor'")
                .await?,
            total_patients: self
                .count(
                    "SELECT COUNT(*) FROM users
                     WHERE LOWER(TRIM(role)) NOT IN ('doctor', 'admin', 'superadmin', 'super_admin')",
                )
                .await?,
            total_appointments: self.count("SELECT COUNT(*) FROM appointments").await?,
            appointments_by_status,
            active_conversations: self
                .count("SELECT COUNT(*) FROM conversations WHERE is_active")
                .await?,
            messages_last_24h: self
                .count("SELECT COUNT(*) FROM messages WHERE created_at >= NOW() - INTERVAL '24 hours'")
                .await?,
        })
    }

    async fn bucket_counts(
        &self,
        collection: Collection,
        period: Period,
        since: DateTime<Utc>,
    ) -> Result<Vec<BucketCount>> {
        // the table name comes from a closed enum, never from the request
        let sql = format!(
            "SELECT date_trunc($1, created_at AT TIME ZONE 'UTC') AT TIME ZONE 'UTC' AS bucket,
                    COUNT(*) AS count
             FROM {}
             WHERE created_at >= $2
             GROUP BY 1
             ORDER BY 1",
            collection.table()
        );

        let buckets = sqlx::query_as::<_, BucketCount>(&sql)
            .bind(period.as_str())
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        Ok(buckets)
    }
}
