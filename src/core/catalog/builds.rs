// ─── Build Catalog ───
// Lists server-software versions and picks the newest build of each.

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::model::BuildCandidate;
use super::{get_json, get_required_json};
use crate::core::error::{ServerError, ServerResult};

/// Per-version build lookups in flight at once.
const VERSION_FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    #[serde(default)]
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(default)]
    builds: Vec<u32>,
}

/// Client for a PaperMC-style `projects/{project}/versions/{version}` API.
pub struct BuildCatalog {
    client: Client,
    base_url: String,
    project: String,
}

impl BuildCatalog {
    pub fn new(client: Client, base_url: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project: project.into(),
        }
    }

    /// One candidate per published version, using that version's newest build.
    ///
    /// Versions with no builds are dropped. A failure on a single version is
    /// logged and that version skipped; only the top-level listing is fatal.
    pub async fn list_build_candidates(&self) -> ServerResult<Vec<BuildCandidate>> {
        let url = format!("{}/projects/{}", self.base_url, self.project);
        info!("Fetching {} version list from {}", self.project, url);

        let project: ProjectResponse = get_required_json(&self.client, &url).await?;

        let candidates: Vec<Option<BuildCandidate>> = stream::iter(project.versions)
            .map(|version| async move {
                match self.latest_build(&version).await {
                    Ok(Some(build)) => Some(BuildCandidate {
                        download_url: self.download_url(&version, build),
                        version,
                        build,
                    }),
                    Ok(None) => {
                        debug!("Version {} has no builds, skipping", version);
                        None
                    }
                    Err(e) => {
                        warn!("Skipping version {}: {}", version, e);
                        None
                    }
                }
            })
            .buffered(VERSION_FETCH_CONCURRENCY)
            .collect()
            .await;

        let candidates: Vec<BuildCandidate> = candidates.into_iter().flatten().collect();
        info!("Loaded {} build candidates", candidates.len());
        Ok(candidates)
    }

    /// Newest build of one version, without listing the others.
    pub async fn candidate_for(&self, version: &str) -> ServerResult<BuildCandidate> {
        let build = self.latest_build(version).await?.ok_or_else(|| {
            ServerError::CatalogUnavailable(format!(
                "{} {} has no published builds",
                self.project, version
            ))
        })?;
        Ok(BuildCandidate {
            version: version.to_string(),
            build,
            download_url: self.download_url(version, build),
        })
    }

    async fn latest_build(&self, version: &str) -> ServerResult<Option<u32>> {
        let url = format!(
            "{}/projects/{}/versions/{}",
            self.base_url, self.project, version
        );
        let resp: Option<VersionResponse> = get_json(self.client.get(&url), &url).await?;
        let resp = resp.ok_or_else(|| {
            ServerError::CatalogUnavailable(format!("{url}: HTTP 404"))
        })?;
        Ok(resp.builds.into_iter().max())
    }

    /// `{base}/projects/{p}/versions/{v}/builds/{b}/downloads/{p}-{v}-{b}.jar`
    pub fn download_url(&self, version: &str, build: u32) -> String {
        format!(
            "{base}/projects/{p}/versions/{v}/builds/{b}/downloads/{p}-{v}-{b}.jar",
            base = self.base_url,
            p = self.project,
            v = version,
            b = build
        )
    }
}
