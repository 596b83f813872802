// ─── Plugin Registry ───
// Modrinth v2 search / project / version endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::get_json;
use super::model::{PluginDescriptor, PluginSummary, PluginVersion};
use super::PluginRegistry;
use crate::core::error::{ServerError, ServerResult};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<PluginSummary>,
}

pub struct ModrinthRegistry {
    client: Client,
    base_url: String,
}

impl ModrinthRegistry {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Facet groups are AND-ed; each inner list is OR-ed.
    fn search_facets(game_version: &str, loader: &str) -> String {
        let facets = vec![
            vec!["project_type:plugin".to_string()],
            vec![format!("versions:{game_version}")],
            vec![format!("categories:{}", loader.to_ascii_lowercase())],
        ];
        serde_json::to_string(&facets).unwrap_or_default()
    }
}

#[async_trait]
impl PluginRegistry for ModrinthRegistry {
    async fn search_plugins(
        &self,
        query: &str,
        game_version: &str,
        loader: &str,
        limit: usize,
    ) -> ServerResult<Vec<PluginSummary>> {
        let url = format!("{}/search", self.base_url);
        let facets = Self::search_facets(game_version, loader);
        let limit = limit.to_string();

        info!(
            "Searching plugins: query={:?} version={} loader={}",
            query, game_version, loader
        );

        let request = self.client.get(&url).query(&[
            ("query", query),
            ("facets", facets.as_str()),
            ("limit", limit.as_str()),
        ]);

        let resp: SearchResponse = get_json(request, &url)
            .await?
            .ok_or_else(|| ServerError::CatalogUnavailable(format!("{url}: HTTP 404")))?;

        debug!("Search returned {} hits", resp.hits.len());
        Ok(resp.hits)
    }

    async fn get_plugin(&self, slug: &str) -> ServerResult<PluginDescriptor> {
        let url = format!("{}/project/{}", self.base_url, slug);
        get_json(self.client.get(&url), &url)
            .await?
            .ok_or_else(|| ServerError::PluginNotFound(slug.to_string()))
    }

    async fn get_plugin_versions(&self, slug: &str) -> ServerResult<Vec<PluginVersion>> {
        let url = format!("{}/project/{}/version", self.base_url, slug);
        get_json(self.client.get(&url), &url)
            .await?
            .ok_or_else(|| ServerError::PluginNotFound(slug.to_string()))
    }
}
