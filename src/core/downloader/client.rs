use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::error::{ServerError, ServerResult};

/// Result of a single [`ArtifactFetcher::fetch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    /// `false` when the destination already existed and nothing was fetched.
    pub wrote: bool,
}

/// Persists a remote payload at a local path, at most once.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> ServerResult<FetchOutcome>;
}

/// Idempotent, SHA-1 validated downloader.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    // ── Single file download ────────────────────────────

    /// Download `url` into `dest`, optionally validating SHA-1.
    ///
    /// The whole body is read into memory first and written to a sibling
    /// `.part` file that is renamed into place, so a failed transfer never
    /// leaves a truncated file at `dest`.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> ServerResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ServerError::io(parent, e))?;
        }

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;

        // Validate SHA-1 on the in-memory buffer, before anything touches disk
        if let Some(expected) = sha1_expected {
            let actual = sha1_hex(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ServerError::HashMismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let part = part_path(dest);
        if let Err(e) = write_all(&part, &bytes).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| ServerError::io(dest, e))?;

        debug!("Downloaded: {} -> {:?} ({} bytes)", url, dest, bytes.len());
        Ok(())
    }
}

#[async_trait]
impl ArtifactFetcher for Downloader {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> ServerResult<FetchOutcome> {
        let exists = tokio::fs::try_exists(dest)
            .await
            .map_err(|e| ServerError::io(dest, e))?;
        if exists {
            debug!("Already present, skipping: {:?}", dest);
            return Ok(FetchOutcome { wrote: false });
        }

        self.download_file(url, dest, sha1_expected).await?;
        Ok(FetchOutcome { wrote: true })
    }
}

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn write_all(path: &Path, bytes: &[u8]) -> ServerResult<()> {
    // Scoped so the handle is closed before the rename (required on Windows)
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ServerError::io(path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| ServerError::io(path, e))?;
    file.flush().await.map_err(|e| ServerError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn second_fetch_is_a_no_op() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/worldedit.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("plugins").join("worldedit.jar");
        let url = format!("{}/worldedit.jar", server.uri());
        let downloader = Downloader::new(Client::new());

        let first = downloader.fetch(&url, &dest, None).await.unwrap();
        assert!(first.wrote);
        assert_eq!(std::fs::read(&dest).unwrap(), b"jar-bytes");

        std::fs::write(&dest, b"local edits").unwrap();
        let second = downloader.fetch(&url, &dest, None).await.unwrap();
        assert!(!second.wrote);
        assert_eq!(std::fs::read(&dest).unwrap(), b"local edits");
    }

    #[tokio::test]
    async fn failed_retrieval_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.jar"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.jar");
        let url = format!("{}/missing.jar", server.uri());

        let err = Downloader::new(Client::new())
            .fetch(&url, &dest, None)
            .await
            .unwrap_err();

        assert!(err.is_network());
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn hash_mismatch_is_rejected_before_writing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("plugin.jar");
        let url = format!("{}/plugin.jar", server.uri());
        let expected = sha1_hex(b"original");

        let err = Downloader::new(Client::new())
            .fetch(&url, &dest, Some(&expected))
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::HashMismatch { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn matching_hash_is_accepted_in_any_case() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("plugin.jar");
        let url = format!("{}/plugin.jar", server.uri());
        let expected = sha1_hex(b"payload").to_uppercase();

        let outcome = Downloader::new(Client::new())
            .fetch(&url, &dest, Some(&expected))
            .await
            .unwrap();
        assert!(outcome.wrote);
    }

    #[test]
    fn part_path_is_a_sibling() {
        let dest = Path::new("/srv/plugins/WorldEdit.jar");
        assert_eq!(part_path(dest), Path::new("/srv/plugins/WorldEdit.jar.part"));
    }
}
