//! commitpulse - Commit activity collector for a GitHub account
//!
//! Walks every repository the account owns, collects the account's commits
//! over a rolling lookback window, stores them once per hash in SQLite and
//! serves per-day commit counts.
//!
//! ## Core Features
//!
//! - **Concurrent Collection**: Bounded fan-out across repositories with first-error cancellation
//! - **Idempotent Storage**: Commits keyed by hash, first write wins
//! - **Daily Rollup**: Distinct commits per UTC day over the lookback window
//! - **Authentication**: GitHub CLI and token-based authentication support
//! - **Configuration Management**: YAML-based configuration with XDG compliance
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`github`]: GitHub API integration and authentication
//! - [`sync`]: Concurrent commit collection
//! - [`store`]: SQLite commit store and rollup
//! - [`service`]: Trigger-sync and rollup operations
//! - [`server`]: HTTP transport

pub mod config;
pub mod error;
pub mod github;
pub mod models;
pub mod server;
pub mod service;
pub mod source;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use github::GitHubClient;
pub use models::{Commit, DayCount, Repository, SyncWindow};
pub use service::{SyncReport, SyncService};
pub use source::{CommitFetcher, RepositoryLister};
pub use store::CommitStore;
pub use sync::{Collection, SyncCoordinator};
