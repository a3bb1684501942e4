//! GEFS object store client.
//!
//! Downloads one `pgrb2a` file per task into a scratch file that is deleted
//! when the returned handle is dropped.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tempfile::NamedTempFile;

use crate::services::extractor::ExtractError;
use crate::services::links::DownloadTask;

/// Connect timeout for the provider. The whole task is bounded separately.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Client for the GEFS bucket.
#[derive(Debug, Clone)]
pub struct GefsClient {
    client: reqwest::Client,
}

impl GefsClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("gefs-forecast-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }

    /// Stream the task's object into a scratch file under `scratch_dir`.
    ///
    /// The file name is derived from the object key so concurrent tasks never
    /// collide; a random suffix keeps retries of the same key apart too.
    pub async fn download(
        &self,
        task: &DownloadTask,
        scratch_dir: &Path,
    ) -> Result<NamedTempFile, ExtractError> {
        let response = self
            .client
            .get(&task.url)
            .send()
            .await
            .map_err(|e| ExtractError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractError::HttpStatus(response.status().as_u16()));
        }

        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}.", task.scratch_name()))
            .tempfile_in(scratch_dir)?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ExtractError::Download(e.to_string()))?;
            file.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        file.flush()?;

        tracing::debug!("Downloaded {} bytes from {}", written, task.url);

        Ok(file)
    }
}

impl Default for GefsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn task(base_url: &str) -> DownloadTask {
        DownloadTask::new(
            base_url,
            "2024-05-26T00:00:00Z".parse().unwrap(),
            "2024-05-26T12:00:00Z".parse().unwrap(),
            -1,
        )
    }

    const OBJECT_PATH: &str = "/gefs.20240526/00/atmos/pgrb2ap5/geavg.t00z.pgrb2a.0p50.f012";

    #[tokio::test]
    async fn test_download_writes_body_to_scratch_file() {
        let server = MockServer::start().await;
        let body = b"GRIB....7777".to_vec();
        Mock::given(method("GET"))
            .and(path(OBJECT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let client = GefsClient::new();
        let file = assert_ok!(client.download(&task(&server.uri()), scratch.path()).await);

        assert_eq!(std::fs::read(file.path()).unwrap(), body);
        let name = file.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("gefs.20240526.00.atmos.pgrb2ap5.geavg.t00z.pgrb2a.0p50.f012."));
        assert_eq!(file.path().parent().unwrap(), scratch.path());
    }

    #[tokio::test]
    async fn test_scratch_file_removed_on_drop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let file = GefsClient::new()
            .download(&task(&server.uri()), scratch.path())
            .await
            .unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_object_is_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let result = GefsClient::new()
            .download(&task(&server.uri()), scratch.path())
            .await;
        assert!(matches!(result, Err(ExtractError::HttpStatus(404))));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_download_error() {
        let scratch = tempfile::tempdir().unwrap();
        let result = GefsClient::new()
            .download(&task("http://127.0.0.1:9"), scratch.path())
            .await;
        assert!(matches!(result, Err(ExtractError::Download(_))));
    }
}
