//! Sync Service - The two operations exposed to callers
//!
//! `trigger_sync` runs the whole pipeline (list, fetch, persist) and blocks
//! until it finishes. `get_rollup` reads per-day counts for the lookback
//! window. Transports (HTTP, CLI) sit on top of this and add nothing.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::github::GitHubClient;
use crate::models::{DayCount, SyncWindow};
use crate::store::CommitStore;
use crate::sync::SyncCoordinator;

/// Outcome of one successful sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub repositories: usize,
    pub commits_fetched: usize,
    pub commits_inserted: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

pub struct SyncService {
    coordinator: SyncCoordinator,
    store: Arc<CommitStore>,
    lookback_weeks: u32,
}

impl SyncService {
    pub fn new(coordinator: SyncCoordinator, store: Arc<CommitStore>, lookback_weeks: u32) -> Self {
        Self {
            coordinator,
            store,
            lookback_weeks,
        }
    }

    /// Wire up the GitHub client, coordinator and on-disk store from config
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Arc::new(GitHubClient::new(config).await?);
        let coordinator =
            SyncCoordinator::new(client.clone(), client, config.sync.worker_limit());

        let db_path = config.database_path();
        let store = CommitStore::open(&db_path)
            .with_context(|| format!("Failed to open commit database at {:?}", db_path))?;

        Ok(Self::new(
            coordinator,
            Arc::new(store),
            config.sync.lookback_weeks,
        ))
    }

    pub fn store(&self) -> &Arc<CommitStore> {
        &self.store
    }

    /// Run a full sync now.
    ///
    /// Nothing is written unless every repository was fetched successfully.
    pub async fn trigger_sync(&self) -> Result<SyncReport> {
        let start_time = Instant::now();
        let window = SyncWindow::lookback(self.lookback_weeks);

        let store = self.store.clone();
        run_blocking(move || store.ensure_schema()).await?;

        let collection = self.coordinator.collect(window).await?;
        let commits_fetched = collection.commits.len();

        let store = self.store.clone();
        let commits = collection.commits;
        let commits_inserted = run_blocking(move || store.persist(&commits)).await?;

        let report = SyncReport {
            repositories: collection.repositories,
            commits_fetched,
            commits_inserted,
            elapsed: start_time.elapsed(),
        };

        info!(
            "Sync complete: {} repositories, {} commits fetched, {} new",
            report.repositories, report.commits_fetched, report.commits_inserted
        );

        Ok(report)
    }

    /// Per-day counts for the lookback window ending now, sorted by day
    pub async fn get_rollup(&self) -> Result<Vec<DayCount>> {
        self.get_rollup_at(Utc::now()).await
    }

    /// Per-day counts for the lookback window ending at `now`, sorted by day
    pub async fn get_rollup_at(&self, now: DateTime<Utc>) -> Result<Vec<DayCount>> {
        let since = SyncWindow::ending_at(now, self.lookback_weeks).since_day();

        let store = self.store.clone();
        let mut counts = run_blocking(move || store.rollup(since)).await?;
        counts.sort_by_key(|count| count.date);

        Ok(counts)
    }
}

/// Run a synchronous store call off the async worker threads
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Store(format!("store task failed: {}", e)))?
}
