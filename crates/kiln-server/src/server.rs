//! Static file server for the destination tree.

use std::future::Future;
use std::path::{Path, PathBuf};

use axum::handler::HandlerWithoutStateExt;
use axum::http::StatusCode;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::watcher::WatcherError;

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(String, String),

    #[error("File watch error: {0}")]
    WatchError(#[from] WatcherError),

    #[error("Server error: {0}")]
    ServeError(String),
}

/// Serves the current contents of a directory over HTTP.
///
/// Every request goes to disk, so a promoted build is visible to the next
/// request without any invalidation.
#[derive(Debug, Clone)]
pub struct StaticServer {
    root: PathBuf,
}

impl StaticServer {
    /// Create a server for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory being served.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the router: every path maps to a file under the root.
    pub fn router(&self) -> Router {
        let files = ServeDir::new(&self.root)
            .append_index_html_on_directories(true)
            .not_found_service(not_found.into_service());

        Router::new()
            .fallback_service(files)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the listening socket.
    pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
        TcpListener::bind((host, port))
            .await
            .map_err(|e| ServerError::BindError(format!("{}:{}", host, port), e.to_string()))
    }

    /// Accept connections on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Serving {} at http://{}", self.root.display(), addr);
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn get(server: &StaticServer, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = server
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status, content_type, String::from_utf8_lossy(&body).to_string())
    }

    #[tokio::test]
    async fn serves_index_for_root() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("index.html"), "A").unwrap();
        let server = StaticServer::new(temp.path());

        let (status, content_type, body) = get(&server, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/html"));
        assert_eq!(body, "A");
    }

    #[tokio::test]
    async fn serves_nested_files_with_content_type() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("blog")).unwrap();
        fs::write(temp.path().join("blog/index.html"), "blog").unwrap();
        fs::write(temp.path().join("style.css"), "body {}").unwrap();
        let server = StaticServer::new(temp.path());

        let (status, _, body) = get(&server, "/blog/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "blog");

        let (status, content_type, _) = get(&server, "/style.css").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/css"));
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let temp = tempdir().unwrap();
        let server = StaticServer::new(temp.path());

        let (status, _, body) = get(&server, "/nope.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not Found");

        let (status, _, _) = get(&server, "/../secret").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let temp = tempdir().unwrap();
        let server = StaticServer::new(temp.path().join("target"));

        let (status, _, _) = get(&server, "/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_fresh_bytes_after_rewrite() {
        let temp = tempdir().unwrap();
        let server = StaticServer::new(temp.path());

        fs::write(temp.path().join("index.html"), "before").unwrap();
        assert_eq!(get(&server, "/").await.2, "before");

        fs::write(temp.path().join("index.html"), "after").unwrap();
        assert_eq!(get(&server, "/").await.2, "after");
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = StaticServer::bind("127.0.0.1", 0).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = StaticServer::bind("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, ServerError::BindError(..)));
    }
}
