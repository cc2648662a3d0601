//! Sync Coordinator - Concurrent commit collection across repositories
//!
//! Lists the account's repositories, then fetches each repository's commits
//! on a bounded worker pool. The result is all-or-nothing: either every
//! repository's commits, or the first error encountered. On that first error
//! the remaining fetches are cancelled instead of being waited on.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::{Commit, SyncWindow};
use crate::source::{CommitFetcher, RepositoryLister};

/// Commits collected by one coordinator run
#[derive(Debug, Clone)]
pub struct Collection {
    pub repositories: usize,
    pub commits: Vec<Commit>,
    pub duration: Duration,
}

/// Fans commit fetches out across every repository of the account
#[derive(Clone)]
pub struct SyncCoordinator {
    lister: Arc<dyn RepositoryLister>,
    fetcher: Arc<dyn CommitFetcher>,
    max_parallel: usize,
}

impl SyncCoordinator {
    pub fn new(
        lister: Arc<dyn RepositoryLister>,
        fetcher: Arc<dyn CommitFetcher>,
        max_parallel: usize,
    ) -> Self {
        Self {
            lister,
            fetcher,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Collect commits inside `window` from every repository.
    pub async fn collect(&self, window: SyncWindow) -> Result<Collection> {
        let start_time = Instant::now();

        let repositories = self.lister.list_repositories().await?;
        let repository_count = repositories.len();

        info!(
            "Fetching commits since {} from {} repositories (max {} in flight)",
            window.since.to_rfc3339(),
            repository_count,
            self.max_parallel
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let cancel = CancellationToken::new();
        let collected: Arc<Mutex<Vec<Commit>>> = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = JoinSet::new();

        for repo in repositories {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let collected = collected.clone();
            let fetcher = self.fetcher.clone();

            tasks.spawn(async move {
                let fetch = async {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| Error::upstream("worker pool closed"))?;
                    fetcher.fetch_commits(&repo.full_name, &window).await
                };

                let commits = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Fetch cancelled for {}", repo.full_name);
                        return Ok(());
                    }
                    result = fetch => result.map_err(|e| {
                        error!("Fetching commits from {} failed: {}", repo.full_name, e);
                        e
                    })?,
                };

                debug!("Collected {} commits from {}", commits.len(), repo.full_name);
                collected.lock().await.extend(commits);
                Ok::<(), Error>(())
            });
        }

        let mut first_error: Option<Error> = None;

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) if join_error.is_cancelled() => continue,
                Err(join_error) => Err(Error::upstream(format!(
                    "commit fetch task panicked: {}",
                    join_error
                ))),
            };

            if let Err(err) = outcome {
                if first_error.is_none() {
                    warn!("Cancelling outstanding fetches after {} error", err.kind());
                    cancel.cancel();
                    first_error = Some(err);
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        let commits = std::mem::take(&mut *collected.lock().await);
        let duration = start_time.elapsed();

        info!(
            "Collected {} commits from {} repositories in {:.2}s",
            commits.len(),
            repository_count,
            duration.as_secs_f64()
        );

        Ok(Collection {
            repositories: repository_count,
            commits,
            duration,
        })
    }
}
