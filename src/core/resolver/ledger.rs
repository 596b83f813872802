use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::dependency::{plain_file_name, InstalledArtifact, VisitedSet};
use crate::core::error::{ServerError, ServerResult};

const LEDGER_FILE: &str = ".installed.json";

/// Plugins installed by earlier runs, persisted as `plugins/.installed.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InstalledLedger {
    /// slug -> jar file name inside the plugins directory
    #[serde(default)]
    plugins: BTreeMap<String, String>,
    #[serde(skip)]
    path: PathBuf,
}

impl InstalledLedger {
    pub fn path_in(plugins_dir: &Path) -> PathBuf {
        plugins_dir.join(LEDGER_FILE)
    }

    /// Load the ledger for a plugins directory. Missing means empty.
    pub async fn load(plugins_dir: &Path) -> ServerResult<Self> {
        let path = Self::path_in(plugins_dir);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    ..Default::default()
                })
            }
            Err(e) => return Err(ServerError::io(&path, e)),
        };

        let mut ledger: Self =
            serde_json::from_str(&raw).map_err(|e| ServerError::MetadataCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        ledger.path = path;
        Ok(ledger)
    }

    /// Visited-set seed: recorded slugs whose jar is still on disk.
    ///
    /// A plugin whose file was removed by hand is left out so the next
    /// install fetches it again.
    pub fn seed(&self) -> VisitedSet {
        let plugins_dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        self.plugins
            .iter()
            .filter(|(slug, file)| {
                let Some(file) = plain_file_name(file) else {
                    warn!("{} recorded with unsafe file name {:?}, ignoring", slug, file);
                    return false;
                };
                let present = plugins_dir.join(file).exists();
                if !present {
                    warn!("{} recorded as installed but {} is missing", slug, file);
                }
                present
            })
            .map(|(slug, _)| slug.clone())
            .collect()
    }

    pub fn record(&mut self, artifact: &InstalledArtifact) {
        self.plugins
            .insert(artifact.slug.clone(), artifact.file_name.clone());
    }

    pub fn file_for(&self, slug: &str) -> Option<&str> {
        self.plugins.get(slug).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub async fn save(&self) -> ServerResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ServerError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ServerError::io(&self.path, e))?;
        debug!("Saved plugin ledger ({} entries) to {:?}", self.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(slug: &str, dir: &Path) -> InstalledArtifact {
        InstalledArtifact {
            slug: slug.into(),
            file_name: format!("{slug}.jar"),
            path: dir.join(format!("{slug}.jar")),
            wrote: true,
        }
    }

    #[tokio::test]
    async fn missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = InstalledLedger::load(dir.path()).await.unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.seed().is_empty());
    }

    #[tokio::test]
    async fn seed_only_contains_plugins_still_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = InstalledLedger::load(dir.path()).await.unwrap();
        ledger.record(&artifact("worldedit", dir.path()));
        ledger.record(&artifact("commandapi", dir.path()));
        ledger.save().await.unwrap();
        std::fs::write(dir.path().join("worldedit.jar"), b"jar").unwrap();

        let reloaded = InstalledLedger::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.file_for("commandapi"), Some("commandapi.jar"));

        let seed = reloaded.seed();
        assert!(seed.contains("worldedit"));
        assert!(!seed.contains("commandapi"));
    }

    #[tokio::test]
    async fn seed_ignores_entries_pointing_outside_the_plugins_dir() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins).unwrap();
        std::fs::write(dir.path().join("outside.jar"), b"jar").unwrap();
        std::fs::write(
            InstalledLedger::path_in(&plugins),
            r#"{ "plugins": { "outside": "../outside.jar" } }"#,
        )
        .unwrap();

        let ledger = InstalledLedger::load(&plugins).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.seed().contains("outside"));
    }

    #[tokio::test]
    async fn corrupt_ledger_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(InstalledLedger::path_in(dir.path()), "{ nope").unwrap();

        let err = InstalledLedger::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, ServerError::MetadataCorrupt { .. }));
    }
}
