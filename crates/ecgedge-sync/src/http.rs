//! HTTP artifact download from the model distribution server.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::{ArtifactSource, DownloadError};

/// Longest server error body kept in a [`DownloadError::Server`].
const MAX_ERROR_BODY: usize = 512;

/// Plain-GET artifact source with a whole-request timeout.
pub struct HttpArtifactSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpArtifactSource {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client, timeout })
    }

    fn map_error(&self, url: &str, e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout(self.timeout)
        } else {
            DownloadError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        info!(url = %url, "downloading model artifact");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(DownloadError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| self.map_error(url, e))?;
        if bytes.is_empty() {
            return Err(DownloadError::Empty);
        }
        info!(url = %url, bytes = bytes.len(), "download complete");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source() -> HttpArtifactSource {
        HttpArtifactSource::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download-model"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(b"onnx-bytes".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let bytes = source()
            .fetch(&format!("{}/download-model", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"onnx-bytes");
    }

    #[tokio::test]
    async fn server_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("conversion failed"))
            .mount(&server)
            .await;

        let err = source()
            .fetch(&format!("{}/download-model", server.uri()))
            .await
            .unwrap_err();
        match err {
            DownloadError::Server { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "conversion failed");
            }
            other => panic!("expected Server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let source = HttpArtifactSource::new(Duration::from_millis(200)).unwrap();
        let err = source
            .fetch(&format!("{}/download-model", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = source().fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, DownloadError::Empty));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        // Port 9 (discard) on localhost is reliably closed in test sandboxes.
        let err = source()
            .fetch("http://127.0.0.1:9/download-model")
            .await
            .unwrap_err();
        assert!(
            matches!(err, DownloadError::Transport { .. } | DownloadError::Timeout(_)),
            "got {err:?}"
        );
    }
}
