//! HTTP transport for the sync service
//!
//! `/sync` runs a sync and answers `Success` or the error message.
//! `/counts` answers the per-day rollup as JSON.

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::service::SyncService;

pub type AppState = Arc<SyncService>;

/// Build the API router
pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/sync", any(sync_handler))
        .route("/sync/", any(sync_handler))
        .route("/counts", get(counts_handler))
        .route("/counts/", get(counts_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn sync_handler(State(service): State<AppState>) -> Response {
    match service.trigger_sync().await {
        Ok(report) => {
            info!(
                "Sync request finished in {:.2}s ({} new commits)",
                report.elapsed.as_secs_f64(),
                report.commits_inserted
            );
            (StatusCode::OK, "Success").into_response()
        }
        Err(err) => failure(err),
    }
}

async fn counts_handler(State(service): State<AppState>) -> Response {
    match service.get_rollup().await {
        Ok(counts) => Json(counts).into_response(),
        Err(err) => failure(err),
    }
}

fn failure(err: Error) -> Response {
    warn!("Request failed ({}): {}", err.kind(), err);
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

/// Serve until Ctrl+C or SIGTERM
pub async fn serve(config: &ServerConfig, service: AppState) -> anyhow::Result<()> {
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received terminate signal, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Commit, Repository};
    use crate::source::{MockCommitFetcher, MockRepositoryLister};
    use crate::store::CommitStore;
    use crate::sync::SyncCoordinator;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use chrono::{DateTime, Duration, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(fetcher: MockCommitFetcher) -> (Router, AppState) {
        let mut lister = MockRepositoryLister::new();
        lister.expect_list_repositories().returning(|| {
            Ok(vec![Repository {
                id: 7,
                name: "a".to_string(),
                full_name: "me/a".to_string(),
            }])
        });

        let coordinator = SyncCoordinator::new(Arc::new(lister), Arc::new(fetcher), 2);
        let store = Arc::new(CommitStore::open_in_memory().unwrap());
        let service = Arc::new(SyncService::new(coordinator, store, 52));

        (router(service.clone()), service)
    }

    async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn recent_commit(hash: &str, now: DateTime<Utc>, days_ago: i64) -> Commit {
        Commit {
            hash: hash.to_string(),
            author_date: now - Duration::days(days_ago),
            repo_full_name: "me/a".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sync_reports_success() {
        let mut fetcher = MockCommitFetcher::new();
        fetcher
            .expect_fetch_commits()
            .returning(|_, _| Ok(vec![recent_commit("h1", Utc::now(), 3)]));
        let (app, service) = app(fetcher);

        let (status, body) = send(app, Method::GET, "/sync").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Success");
        assert_eq!(service.store().commit_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_accepts_any_method() {
        let mut fetcher = MockCommitFetcher::new();
        fetcher.expect_fetch_commits().returning(|_, _| Ok(vec![]));
        let (app, _) = app(fetcher);

        let (status, _) = send(app, Method::POST, "/sync/").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sync_failure_returns_500_with_message() {
        let mut fetcher = MockCommitFetcher::new();
        fetcher.expect_fetch_commits().returning(|_, _| {
            Err(Error::Auth {
                message: "Bad credentials".to_string(),
            })
        });
        let (app, service) = app(fetcher);

        let (status, body) = send(app, Method::POST, "/sync").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("Bad credentials"), "body was {:?}", body);
        assert_eq!(service.store().commit_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counts_returns_sorted_json() {
        let now = Utc::now();
        let mut fetcher = MockCommitFetcher::new();
        fetcher.expect_fetch_commits().returning(move |_, _| {
            Ok(vec![
                recent_commit("h1", now, 2),
                recent_commit("h2", now, 10),
                recent_commit("h3", now, 10),
                recent_commit("old", now, 400),
            ])
        });
        let (app, service) = app(fetcher);
        service.trigger_sync().await.unwrap();

        let (status, body) = send(app, Method::GET, "/counts").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);

        let first_day = (now - Duration::days(10)).date_naive().to_string();
        assert_eq!(entries[0]["date"], first_day.as_str());
        assert_eq!(entries[0]["commitCount"], 2);
        assert_eq!(entries[1]["commitCount"], 1);
    }

    #[tokio::test]
    async fn test_counts_on_empty_store_is_empty_array() {
        let (app, _) = app(MockCommitFetcher::new());

        let (status, body) = send(app, Method::GET, "/counts").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }
}
