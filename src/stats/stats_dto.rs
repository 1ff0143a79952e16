use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::stats_models::{BucketCount, Collection, Period};

pub const DEFAULT_TIMELINE_RANGE: u32 = 7;

#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TimelineQuery {
    pub collection: Collection,
    #[serde(default)]
    pub period: Option<Period>,
    /// Number of buckets, counting the current one.
    #[validate(range(min = 1, max = 366))]
    pub range: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineResponse {
    pub collection: Collection,
    pub period: Period,
    pub from: DateTime<Utc>,
    pub buckets: Vec<BucketCount>,
}
