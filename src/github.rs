use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER, USER_AGENT,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Commit, Repository, SyncWindow};
use crate::source::{CommitFetcher, RepositoryLister};

/// Longest server-requested wait honoured before a retry
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// GitHub REST client for listing repositories and fetching commits
pub struct GitHubClient {
    http: Client,
    api_url: String,
    username: String,
    repo_type: String,
    per_page: u32,
    max_pages: u32,
    max_retries: u32,
    retry_backoff: Duration,
}

/// GitHub authentication strategies
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    /// Use GitHub CLI authentication
    GitHubCLI,
    /// Use environment variable token
    EnvironmentToken,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryRecord {
    id: u64,
    name: String,
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct CommitRecord {
    sha: Option<String>,
    commit: Option<CommitDetail>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: Option<Signature>,
}

#[derive(Debug, Deserialize)]
struct Signature {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl From<RepositoryRecord> for Repository {
    fn from(record: RepositoryRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            full_name: record.full_name,
        }
    }
}

impl CommitRecord {
    /// Validate one upstream record; a missing hash or author date is an error,
    /// never a defaulted commit.
    fn into_commit(self, repo_full_name: &str, index: usize) -> Result<Commit> {
        let context = format!("commit record {} of {}", index, repo_full_name);

        let hash = self
            .sha
            .filter(|sha| !sha.is_empty())
            .ok_or_else(|| Error::parse(&context, "missing `sha`"))?;

        let raw_date = self
            .commit
            .and_then(|commit| commit.author)
            .and_then(|author| author.date)
            .ok_or_else(|| {
                Error::parse(&context, format!("commit {} is missing `commit.author.date`", hash))
            })?;

        let author_date = DateTime::parse_from_rfc3339(&raw_date)
            .map_err(|e| {
                Error::parse(&context, format!("invalid author date {:?}: {}", raw_date, e))
            })?
            .with_timezone(&Utc);

        Ok(Commit {
            hash,
            author_date,
            repo_full_name: repo_full_name.to_string(),
        })
    }
}

impl GitHubClient {
    /// Create a new GitHub client with automatic authentication
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let (auth_strategy, token) = Self::detect_authentication(config)?;

        info!("Using authentication strategy: {:?}", auth_strategy);

        let client = Self::with_token(config, &token)
            .await
            .context("Failed to connect to GitHub. Check your authentication.")?;

        info!("Collecting commits for GitHub user: {}", client.username);

        Ok(client)
    }

    /// Create a client from an explicit token.
    ///
    /// The committer filter comes from `github.username`, or from the
    /// authenticated user when that is unset.
    pub async fn with_token(config: &Config, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            Error::Auth {
                message: "token contains characters not allowed in an HTTP header".to_string(),
            }
        })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_str(&config.github.api_version)
                .map_err(|_| Error::upstream("invalid api_version header value"))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("commitpulse/", env!("CARGO_PKG_VERSION"))),
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.sync.request_timeout())
            .build()?;

        let mut client = Self {
            http,
            api_url: config.github.api_url.trim_end_matches('/').to_string(),
            username: String::new(),
            repo_type: config.github.repo_type.clone(),
            per_page: config.github.page_size(),
            max_pages: config.github.max_pages.max(1),
            max_retries: config.sync.max_retries,
            retry_backoff: config.sync.retry_backoff(),
        };

        client.username = match &config.github.username {
            Some(username) => username.clone(),
            None => client.current_user_login().await?,
        };

        Ok(client)
    }

    /// Detect and obtain GitHub authentication
    fn detect_authentication(config: &Config) -> anyhow::Result<(AuthStrategy, String)> {
        match config.github.auth_method.as_str() {
            "auto" => {
                // Try GitHub CLI first, then environment token
                if let Ok(token) = Self::try_github_cli() {
                    Ok((AuthStrategy::GitHubCLI, token))
                } else if let Ok(token) = Self::try_environment_token() {
                    Ok((AuthStrategy::EnvironmentToken, token))
                } else {
                    Err(anyhow!(
                        "No GitHub authentication found. Please either:\n\
                         1. Install and authenticate GitHub CLI: gh auth login\n\
                         2. Set GITHUB_API_TOKEN (or GITHUB_TOKEN) environment variable"
                    ))
                }
            }
            "gh_cli" => {
                let token = Self::try_github_cli()
                    .context("GitHub CLI authentication failed. Run: gh auth login")?;
                Ok((AuthStrategy::GitHubCLI, token))
            }
            "token" => {
                let token = Self::try_environment_token()
                    .context("GITHUB_API_TOKEN / GITHUB_TOKEN environment variable not found or invalid")?;
                Ok((AuthStrategy::EnvironmentToken, token))
            }
            other => Err(anyhow!("Unknown auth method: {}", other)),
        }
    }

    /// Try to get token from GitHub CLI
    fn try_github_cli() -> anyhow::Result<String> {
        debug!("Attempting GitHub CLI authentication");

        if !Self::is_command_available("gh") {
            return Err(anyhow!("GitHub CLI (gh) is not installed"));
        }

        let token_output = Command::new("gh")
            .args(["auth", "token"])
            .output()
            .context("Failed to get GitHub CLI token")?;

        if !token_output.status.success() {
            return Err(anyhow!(
                "Failed to retrieve token from GitHub CLI: {}",
                String::from_utf8_lossy(&token_output.stderr)
            ));
        }

        let token = String::from_utf8(token_output.stdout)
            .context("GitHub CLI token is not valid UTF-8")?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(anyhow!("GitHub CLI returned empty token"));
        }

        debug!("Successfully obtained token from GitHub CLI");
        Ok(token)
    }

    /// Try to get token from environment variables
    fn try_environment_token() -> anyhow::Result<String> {
        debug!("Attempting environment variable authentication");

        let token = ["GITHUB_API_TOKEN", "GITHUB_TOKEN"]
            .iter()
            .find_map(|name| env::var(name).ok().filter(|token| !token.trim().is_empty()))
            .context("Neither GITHUB_API_TOKEN nor GITHUB_TOKEN is set to a non-empty value")?;

        if !["ghp_", "gho_", "ghs_", "github_pat_"]
            .iter()
            .any(|prefix| token.starts_with(prefix))
        {
            warn!("GitHub token doesn't look like a valid GitHub token (should start with ghp_, gho_, ghs_ or github_pat_)");
        }

        Ok(token)
    }

    /// Check if a command is available in PATH
    fn is_command_available(command: &str) -> bool {
        Command::new("which")
            .arg(command)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Account used as the committer filter
    pub fn username(&self) -> &str {
        &self.username
    }

    async fn current_user_login(&self) -> Result<String> {
        let url = format!("{}/user", self.api_url);
        let user: UserRecord = self.get_json(&url, &[], "authenticated user").await?;
        Ok(user.login)
    }

    /// GET a JSON document, retrying rate-limited and timed-out requests
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<T> {
        let (body, _) = self.get_page(url, query, context).await?;
        Ok(body)
    }

    /// Like `get_json`, also reporting whether a `rel="next"` link was sent
    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<(T, bool)> {
        let mut attempt = 0;

        loop {
            match self.get_json_once(url, query, context).await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay(&err, attempt);
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retrying in {:?} (attempt {}/{})",
                        context, err, delay, attempt, self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<(T, bool)> {
        debug!("GET {} ({})", url, context);

        let response = self.http.get(url).query(query).send().await?;
        let response = check_status(response, context).await?;
        let has_next = has_next_page(response.headers());
        let body = response.bytes().await?;

        let parsed =
            serde_json::from_slice(&body).map_err(|e| Error::parse(context, e.to_string()))?;
        Ok((parsed, has_next))
    }

    /// Follow `page=1,2,..` while the response links a next page.
    ///
    /// Running past `max_pages` is an error; a truncated listing would
    /// undercount silently.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut page_query = query.to_vec();
            page_query.push(("per_page", self.per_page.to_string()));
            page_query.push(("page", page.to_string()));

            let page_context = format!("{} page {}", context, page);
            let (batch, has_next): (Vec<T>, bool) =
                self.get_page(url, &page_query, &page_context).await?;
            items.extend(batch);

            if !has_next {
                return Ok(items);
            }

            if page >= self.max_pages {
                warn!("{} has more than {} pages", context, self.max_pages);
                return Err(Error::upstream(format!(
                    "pagination limit exceeded: {} has more than {} pages of {}",
                    context, self.max_pages, self.per_page
                )));
            }

            page += 1;
        }
    }

    fn retry_delay(&self, err: &Error, attempt: u32) -> Duration {
        match err {
            Error::RateLimit {
                retry_after: Some(after),
                ..
            } => (*after).min(MAX_RETRY_AFTER),
            _ => self
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt)),
        }
    }
}

#[async_trait]
impl RepositoryLister for GitHubClient {
    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        debug!("Fetching repositories for: {}", self.username);

        let url = format!("{}/user/repos", self.api_url);
        let records: Vec<RepositoryRecord> = self
            .get_paginated(&url, &[("type", self.repo_type.clone())], "repository list")
            .await?;

        let repositories: Vec<Repository> = records.into_iter().map(Repository::from).collect();

        info!("Found {} repositories", repositories.len());
        Ok(repositories)
    }
}

#[async_trait]
impl CommitFetcher for GitHubClient {
    async fn fetch_commits(&self, repo_full_name: &str, window: &SyncWindow) -> Result<Vec<Commit>> {
        let url = format!("{}/repos/{}/commits", self.api_url, repo_full_name);
        let query = [
            ("committer", self.username.clone()),
            ("since", window.since.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ];

        let records: Vec<CommitRecord> = self
            .get_paginated(&url, &query, &format!("commits of {}", repo_full_name))
            .await?;

        let commits = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| record.into_commit(repo_full_name, index))
            .collect::<Result<Vec<_>>>()?;

        debug!("Fetched {} commits from {}", commits.len(), repo_full_name);
        Ok(commits)
    }
}

/// Map a non-success response onto the error taxonomy
async fn check_status(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let headers = response.headers();
    let quota_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    // Secondary limits keep quota but send Retry-After or say so in the body
    let throttle_hint = headers.contains_key(RETRY_AFTER);
    let retry_after = retry_after(headers);

    let body = response.text().await.unwrap_or_default();
    let api_message = api_message(&body);
    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (quota_exhausted
                || throttle_hint
                || api_message.to_lowercase().contains("rate limit")));
    let message = format!("{} returned {}: {}", context, status, api_message);

    Err(if rate_limited {
        Error::RateLimit {
            retry_after,
            message,
        }
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Error::Auth { message }
    } else {
        Error::Upstream {
            status: Some(status.as_u16()),
            message,
        }
    })
}

/// Wait requested by `Retry-After`, or derived from `x-ratelimit-reset`
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    if let Some(seconds) = header_u64(RETRY_AFTER.as_str()) {
        return Some(Duration::from_secs(seconds));
    }

    header_u64("x-ratelimit-reset").map(|reset| {
        let now = Utc::now().timestamp().max(0) as u64;
        Duration::from_secs(reset.saturating_sub(now))
    })
}

/// Whether a `Link` header advertises a `rel="next"` page
fn has_next_page(headers: &HeaderMap) -> bool {
    headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .map(|link| link.split(',').any(|part| part.contains("rel=\"next\"")))
        .unwrap_or(false)
}

fn api_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => body.trim().chars().take(200).collect(),
    }
}
