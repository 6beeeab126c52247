//! Object sources: where batch files are read from.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rowpipe_shared::{Locator, Result, RowpipeError};
use tracing::debug;
use url::Url;

use crate::USER_AGENT;

/// Maximum object size we are willing to ingest in one batch (64 MB).
const MAX_OBJECT_SIZE: u64 = 64 * 1024 * 1024;

/// Read access to one object per call.
///
/// Errors are [`RowpipeError::SourceNotFound`] when the object does not exist
/// and [`RowpipeError::SourceUnavailable`] for every other failure.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn read(&self, locator: &Locator) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// Local directory
// ---------------------------------------------------------------------------

/// Objects stored as files under `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectSource {
    root: PathBuf,
}

impl LocalObjectSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a locator to a path, refusing anything that escapes the root.
    fn resolve(&self, locator: &Locator) -> Result<PathBuf> {
        let relative = Path::new(&locator.bucket).join(&locator.key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(RowpipeError::source_unavailable(
                locator,
                "locator must not contain absolute or parent path components",
            ));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectSource for LocalObjectSource {
    async fn read(&self, locator: &Locator) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        debug!(path = %path.display(), "reading local object");

        let io_error = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RowpipeError::SourceNotFound(locator.to_string())
            } else {
                RowpipeError::source_unavailable(locator, format!("{}: {e}", path.display()))
            }
        };

        let len = tokio::fs::metadata(&path).await.map_err(io_error)?.len();
        if len > MAX_OBJECT_SIZE {
            return Err(RowpipeError::source_unavailable(
                locator,
                format!("object too large ({len} bytes, max {MAX_OBJECT_SIZE})"),
            ));
        }

        tokio::fs::read(&path).await.map_err(io_error)
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Objects fetched with `GET {endpoint}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct HttpObjectSource {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpObjectSource {
    pub fn new(endpoint: Url, token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RowpipeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    fn object_url(&self, locator: &Locator) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RowpipeError::config(format!("object source endpoint {} cannot be a base", self.endpoint))
            })?
            .pop_if_empty()
            .push(&locator.bucket)
            .extend(locator.key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl ObjectSource for HttpObjectSource {
    async fn read(&self, locator: &Locator) -> Result<Vec<u8>> {
        let url = self.object_url(locator)?;
        debug!(%url, "fetching remote object");

        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RowpipeError::source_unavailable(locator, format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RowpipeError::SourceNotFound(locator.to_string()));
        }
        if !status.is_success() {
            return Err(RowpipeError::source_unavailable(
                locator,
                format!("{url}: HTTP {status}"),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_OBJECT_SIZE {
                return Err(RowpipeError::source_unavailable(
                    locator,
                    format!("object too large ({len} bytes, max {MAX_OBJECT_SIZE})"),
                ));
            }
        }

        let body = response.bytes().await.map_err(|e| {
            RowpipeError::source_unavailable(locator, format!("{url}: failed to read body: {e}"))
        })?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("rp_objects_{}", Uuid::now_v7()))
    }

    #[tokio::test]
    async fn local_reads_bucket_and_key() {
        let root = temp_root();
        let dir = root.join("uploads").join("2024");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("items.csv"), "id,nome\n1,Widget\n").unwrap();

        let source = LocalObjectSource::new(&root);
        let bytes = source
            .read(&Locator::new("uploads", "2024/items.csv"))
            .await
            .expect("read object");
        assert_eq!(bytes, b"id,nome\n1,Widget\n");
    }

    #[tokio::test]
    async fn local_missing_object_is_not_found() {
        let source = LocalObjectSource::new(temp_root());
        let err = source
            .read(&Locator::new("uploads", "missing.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, RowpipeError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn local_oversized_object_is_refused_before_reading() {
        let root = temp_root();
        let dir = root.join("uploads");
        std::fs::create_dir_all(&dir).unwrap();
        // sparse file: the size is reported without the bytes existing on disk
        let file = std::fs::File::create(dir.join("huge.csv")).unwrap();
        file.set_len(MAX_OBJECT_SIZE + 1).unwrap();
        drop(file);

        let err = LocalObjectSource::new(&root)
            .read(&Locator::new("uploads", "huge.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, RowpipeError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("too large"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn local_refuses_parent_traversal() {
        let source = LocalObjectSource::new(temp_root());
        let err = source
            .read(&Locator::new("uploads", "../../etc/passwd"))
            .await
            .unwrap_err();
        assert!(matches!(err, RowpipeError::SourceUnavailable { .. }));
    }

    #[test]
    fn http_object_url_joins_segments() {
        let source = HttpObjectSource::new(
            Url::parse("https://objects.example.com/base/").unwrap(),
            None,
            5,
        )
        .unwrap();
        let url = source
            .object_url(&Locator::new("uploads", "2024/my items.csv"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://objects.example.com/base/uploads/2024/my%20items.csv"
        );
    }

    #[tokio::test]
    async fn http_reads_with_bearer_token() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/uploads/items.csv"))
            .and(wiremock::matchers::header("authorization", "Bearer s3cret"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("id,nome\n"))
            .mount(&server)
            .await;

        let source =
            HttpObjectSource::new(Url::parse(&server.uri()).unwrap(), Some("s3cret".into()), 5)
                .unwrap();
        let bytes = source
            .read(&Locator::new("uploads", "items.csv"))
            .await
            .expect("fetch object");
        assert_eq!(bytes, b"id,nome\n");
    }

    #[tokio::test]
    async fn http_404_is_not_found_and_500_is_unavailable() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/uploads/gone.csv"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/uploads/broken.csv"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = HttpObjectSource::new(Url::parse(&server.uri()).unwrap(), None, 5).unwrap();

        let err = source
            .read(&Locator::new("uploads", "gone.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, RowpipeError::SourceNotFound(_)));

        let err = source
            .read(&Locator::new("uploads", "broken.csv"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }
}
