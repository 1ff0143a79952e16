use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::error::Result;

use super::stats_dto::{TimelineQuery, TimelineResponse, DEFAULT_TIMELINE_RANGE};
use super::stats_models::{BucketCount, OverviewStats, Period};
use super::stats_repository::StatsRepository;

#[derive(Clone)]
pub struct StatsService {
    repo: Arc<dyn StatsRepository>,
}

impl StatsService {
    pub fn new(repo: Arc<dyn StatsRepository>) -> Self {
        Self { repo }
    }

    pub async fn overview(&self) -> Result<OverviewStats> {
        self.repo.overview().await
    }

    pub async fn timeline(&self, query: TimelineQuery) -> Result<TimelineResponse> {
        query.validate()?;

        let period = query.period.unwrap_or_default();
        let range = query.range.unwrap_or(DEFAULT_TIMELINE_RANGE);
        let now = Utc::now();
        let from = period.step_back(period.truncate(now), range - 1);

        let counts = self
            .repo
            .bucket_counts(query.collection, period, from)
            .await?;

        Ok(TimelineResponse {
            collection: query.collection,
            period,
            from,
            buckets: fill_buckets(period, from, range, &counts),
        })
    }
}

/// Lays `counts` onto `range` consecutive buckets starting at `from`,
/// oldest first, with zero for buckets that have no rows.
pub fn fill_buckets(
    period: Period,
    from: DateTime<Utc>,
    range: u32,
    counts: &[BucketCount],
) -> Vec<BucketCount> {
    let by_bucket: HashMap<DateTime<Utc>, i64> =
        counts.iter().map(|c| (c.bucket, c.count)).collect();

    let mut buckets = Vec::with_capacity(range as usize);
    let mut bucket = from;
    for _ in 0..range {
        buckets.push(BucketCount {
            bucket,
            count: by_bucket.get(&bucket).copied().unwrap_or(0),
        });
        bucket = period.next(bucket);
    }
    buckets
}
