//! Domain records shared by the fetch, sync and storage layers

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A repository owned by the configured account.
///
/// Sourced fresh on every sync and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    /// `owner/slug`, used to address the upstream API
    pub full_name: String,
}

/// A single commit observed upstream.
///
/// `hash` is the natural primary key. Once written a commit row is never
/// mutated; later observations of the same hash are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub hash: String,
    pub author_date: DateTime<Utc>,
    pub repo_full_name: String,
}

/// Rolling lookback boundary, recomputed at the start of every sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub since: DateTime<Utc>,
}

impl SyncWindow {
    /// Window covering `weeks` weeks before `now`
    pub fn ending_at(now: DateTime<Utc>, weeks: u32) -> Self {
        Self {
            since: now - Duration::weeks(i64::from(weeks)),
        }
    }

    /// Window covering `weeks` weeks before the current time
    pub fn lookback(weeks: u32) -> Self {
        Self::ending_at(Utc::now(), weeks)
    }

    /// Calendar day (UTC) of the window start.
    pub fn since_day(&self) -> NaiveDate {
        self.since.date_naive()
    }
}

/// Number of distinct commits authored on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCount {
    pub date: NaiveDate,
    pub commit_count: u32,
}

impl DayCount {
    pub fn new(date: NaiveDate, commit_count: u32) -> Self {
        Self { date, commit_count }
    }
}
