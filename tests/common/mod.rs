//! Common test utilities and helpers for commitpulse tests

#![allow(dead_code)]

use commitpulse::Config;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Temp directory plus a config pointed at a mock GitHub API
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config: Config,
}

impl TestEnvironment {
    pub fn new(api_url: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.github.api_url = api_url.to_string();
        config.github.username = Some("octocat".to_string());
        config.sync.max_retries = 0;
        config.sync.request_timeout = 5;
        config.storage.database_path = temp_dir
            .path()
            .join("data")
            .join("commits.db")
            .to_string_lossy()
            .into_owned();

        Self { temp_dir, config }
    }

    pub fn database_path(&self) -> PathBuf {
        self.config.database_path()
    }

    /// Write the config to disk for CLI tests
    pub fn write_config(&self) -> PathBuf {
        let config_path = self.temp_dir.path().join("config.yml");
        self.config
            .save(&config_path)
            .expect("Failed to write test config");
        config_path
    }
}

pub fn repo_json(id: u64, full_name: &str) -> Value {
    let name = full_name.rsplit('/').next().unwrap_or(full_name);
    json!({
        "id": id,
        "name": name,
        "full_name": full_name,
        "private": false,
        "html_url": format!("https://github.com/{}", full_name)
    })
}

pub fn commit_json(sha: &str, date: &str) -> Value {
    json!({
        "sha": sha,
        "commit": {
            "author": { "name": "The Octocat", "email": "octocat@github.com", "date": date },
            "committer": { "name": "GitHub", "email": "noreply@github.com", "date": date },
            "message": "Update README"
        }
    })
}

/// Serve a single page of repositories from `/user/repos`
pub async fn mount_repositories(server: &MockServer, full_names: &[&str]) {
    let body: Vec<Value> = full_names
        .iter()
        .enumerate()
        .map(|(i, name)| repo_json(i as u64 + 1, name))
        .collect();

    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serve a single page of commits for one repository
pub async fn mount_commits(server: &MockServer, full_name: &str, commits: &[(&str, String)]) {
    let body: Vec<Value> = commits
        .iter()
        .map(|(sha, date)| commit_json(sha, date))
        .collect();

    Mock::given(method("GET"))
        .and(path(format!("/repos/{}/commits", full_name)))
        .and(query_param("committer", "octocat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Make one repository's commit listing fail with `status`
pub async fn mount_commit_failure(server: &MockServer, full_name: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{}/commits", full_name)))
        .respond_with(
            ResponseTemplate::new(status).set_body_json(json!({ "message": "Server Error" })),
        )
        .mount(server)
        .await;
}
