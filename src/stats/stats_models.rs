use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
}

impl Period {
    /// Unit name understood by Postgres `date_trunc`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        }
    }

    /// Start of the bucket containing `at`. Weeks start on Monday, matching
    /// `date_trunc('week', ..)`.
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let start = match self {
            Period::Day => date,
            Period::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            Period::Month => date.with_day(1).unwrap_or(date),
        };
        Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN))
    }

    pub fn step_back(&self, bucket: DateTime<Utc>, steps: u32) -> DateTime<Utc> {
        match self {
            Period::Day => bucket - Duration::days(steps as i64),
            Period::Week => bucket - Duration::weeks(steps as i64),
            Period::Month => bucket
                .checked_sub_months(Months::new(steps))
                .unwrap_or(bucket),
        }
    }

    pub fn next(&self, bucket: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Period::Day => bucket + Duration::days(1),
            Period::Week => bucket + Duration::weeks(1),
            Period::Month => bucket.checked_add_months(Months::new(1)).unwrap_or(bucket),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Appointments,
    Users,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Appointments => "appointments",
            Collection::Users => "users",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BucketCount {
    pub bucket: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub total_users: i64,
    pub total_doctors: i64,
    pub total_patients: i64,
    pub total_appointments: i64,
    pub appointments_by_status: Vec<StatusCount>,
    pub active_conversations: i64,
    pub messages_last_24h: i64,
}
