//! Upstream source abstraction
//!
//! The sync coordinator only sees these two traits, so any hosting provider
//! (or a test double) can feed it. `GitHubClient` implements both.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Commit, Repository, SyncWindow};

/// Lists the repositories owned by the configured account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryLister: Send + Sync {
    async fn list_repositories(&self) -> Result<Vec<Repository>>;
}

/// Fetches the account owner's commits for one repository.
///
/// Implementations keep full timestamp precision; day bucketing happens at
/// rollup time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommitFetcher: Send + Sync {
    async fn fetch_commits(&self, repo_full_name: &str, window: &SyncWindow) -> Result<Vec<Commit>>;
}
