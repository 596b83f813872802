use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the server manager core.
/// Every module returns `Result<T, ServerError>`.
#[derive(Debug, Error)]
pub enum ServerError {
    // ── Catalog ─────────────────────────────────────────
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("No build of {slug} matches {game_version} / {loader}")]
    NoMatchingBuild {
        slug: String,
        game_version: String,
        loader: String,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Process ─────────────────────────────────────────
    #[error("Could not launch server process: {0}")]
    Launch(String),

    // ── Server metadata ─────────────────────────────────
    #[error("Server metadata at {path:?} is corrupt: {reason}")]
    MetadataCorrupt { path: PathBuf, reason: String },

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Server already exists: {0}")]
    ServerAlreadyExists(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// Payload retrieval failures: transport errors, bad status, bad bytes.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ServerError::Http(_) | ServerError::DownloadFailed { .. } | ServerError::HashMismatch { .. }
        )
    }

    pub fn is_filesystem(&self) -> bool {
        matches!(self, ServerError::Io { .. })
    }

    /// Wrap an IO error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ServerError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(source: std::io::Error) -> Self {
        ServerError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
