use serde::{Deserialize, Serialize};

/// Newest build of one published server-software version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildCandidate {
    pub version: String,
    pub build: u32,
    pub download_url: String,
}

/// Search hit returned by the plugin registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSummary {
    pub slug: String,
    #[serde(rename = "title")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub downloads: u64,
}

/// Registry entry for a single plugin project.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginDescriptor {
    /// Opaque project id. Dependency entries reference plugins by this id.
    pub id: String,
    /// Stable textual identifier; the key of the visited set.
    pub slug: String,
    #[serde(rename = "title")]
    pub display_name: String,
    /// Published version ids, in registry order.
    #[serde(rename = "versions", default)]
    pub available_versions: Vec<String>,
}

/// One published build of a plugin.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginVersion {
    pub id: String,
    #[serde(default)]
    pub version_number: String,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub loaders: Vec<String>,
    #[serde(default)]
    pub files: Vec<PluginFile>,
    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,
}

impl PluginVersion {
    /// Case-insensitive compatibility check against a server's version and loader.
    pub fn supports(&self, game_version: &str, loader: &str) -> bool {
        self.game_versions
            .iter()
            .any(|v| v.eq_ignore_ascii_case(game_version))
            && self.loaders.iter().any(|l| l.eq_ignore_ascii_case(loader))
    }

    /// First file whose name carries `extension` (e.g. `".jar"`).
    pub fn binary_file(&self, extension: &str) -> Option<&PluginFile> {
        let extension = extension.to_ascii_lowercase();
        self.files
            .iter()
            .find(|f| f.effective_name().to_ascii_lowercase().ends_with(&extension))
    }

    pub fn required_dependencies(&self) -> impl Iterator<Item = &PluginDependency> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Required)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginFile {
    pub url: String,
    #[serde(rename = "filename", default)]
    pub file_name: String,
    #[serde(default)]
    pub hashes: FileHashes,
}

impl PluginFile {
    /// Declared file name, or the URL's last path segment when none is declared.
    pub fn effective_name(&self) -> String {
        if !self.file_name.trim().is_empty() {
            return self.file_name.clone();
        }

        let without_query = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileHashes {
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginDependency {
    pub project_id: Option<String>,
    #[serde(rename = "dependency_type")]
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Required,
    Optional,
    Incompatible,
    Embedded,
    #[serde(other)]
    Unknown,
}
