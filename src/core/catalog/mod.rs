mod builds;
mod model;
mod registry;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::core::error::{ServerError, ServerResult};

pub use builds::BuildCatalog;
pub use model::{
    BuildCandidate, DependencyKind, FileHashes, PluginDependency, PluginDescriptor, PluginFile,
    PluginSummary, PluginVersion,
};
pub use registry::ModrinthRegistry;

/// Public server-software and plugin endpoints.
pub const PAPER_API: &str = "https://api.papermc.io/v2";
pub const MODRINTH_API: &str = "https://api.modrinth.com/v2";

/// Read-only view of a remote plugin registry.
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    async fn search_plugins(
        &self,
        query: &str,
        game_version: &str,
        loader: &str,
        limit: usize,
    ) -> ServerResult<Vec<PluginSummary>>;

    /// Resolve a slug or project id. Fails with `PluginNotFound`.
    async fn get_plugin(&self, slug: &str) -> ServerResult<PluginDescriptor>;

    /// Versions in the order the registry returns them.
    async fn get_plugin_versions(&self, slug: &str) -> ServerResult<Vec<PluginVersion>>;
}

/// GET a JSON document. `Ok(None)` on 404, `CatalogUnavailable` on any
/// other transport, status, or decoding failure.
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    what: &str,
) -> ServerResult<Option<T>> {
    let resp = request
        .send()
        .await
        .map_err(|e| ServerError::CatalogUnavailable(format!("{what}: {e}")))?;

    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ServerError::CatalogUnavailable(format!(
            "{what}: HTTP {}",
            status.as_u16()
        )));
    }

    resp.json::<T>()
        .await
        .map(Some)
        .map_err(|e| ServerError::CatalogUnavailable(format!("{what}: {e}")))
}

/// Like [`get_json`] but a 404 is just another unavailable catalog.
pub(crate) async fn get_required_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
) -> ServerResult<T> {
    get_json(client.get(url), url)
        .await?
        .ok_or_else(|| ServerError::CatalogUnavailable(format!("{url}: HTTP 404")))
}
