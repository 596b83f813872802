use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::model::{Server, ServerRecord};
use crate::core::error::{ServerError, ServerResult};

/// Manages server directories under a single root.
pub struct ServerManager {
    servers_dir: PathBuf,
}

impl ServerManager {
    pub fn new(servers_dir: PathBuf) -> Self {
        Self { servers_dir }
    }

    pub fn servers_dir(&self) -> &Path {
        &self.servers_dir
    }

    /// Create `<servers>/<name>/` with `plugins/` and `info.json`.
    pub async fn create(&self, name: &str, record: ServerRecord) -> ServerResult<Server> {
        validate_name(name)?;
        let path = self.servers_dir.join(name);

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| ServerError::io(&path, e))?;
        if exists {
            return Err(ServerError::ServerAlreadyExists(name.to_string()));
        }

        let server = Server {
            name: name.to_string(),
            path,
            record,
        };

        create_dir_safe(&server.plugins_dir()).await?;
        self.save(&server).await?;

        info!(
            "Created server '{}' ({} / {})",
            server.name, server.record.game_version, server.record.loader_kind
        );
        Ok(server)
    }

    pub async fn save(&self, server: &Server) -> ServerResult<()> {
        let json = serde_json::to_string_pretty(&server.record)?;
        let info_path = server.info_path();
        tokio::fs::write(&info_path, json)
            .await
            .map_err(|e| ServerError::io(info_path, e))
    }

    /// Load a server by directory name.
    pub async fn load(&self, name: &str) -> ServerResult<Server> {
        validate_name(name)?;
        let path = self.servers_dir.join(name);
        if !path.is_dir() {
            return Err(ServerError::ServerNotFound(name.to_string()));
        }

        let info_path = path.join("info.json");
        let json = tokio::fs::read_to_string(&info_path)
            .await
            .map_err(|e| ServerError::MetadataCorrupt {
                path: info_path.clone(),
                reason: e.to_string(),
            })?;
        let record: ServerRecord =
            serde_json::from_str(&json).map_err(|e| ServerError::MetadataCorrupt {
                path: info_path.clone(),
                reason: e.to_string(),
            })?;

        Ok(Server {
            name: name.to_string(),
            path,
            record,
        })
    }

    /// List all servers, sorted by name. Directories with unreadable
    /// metadata are logged and left out.
    pub async fn list(&self) -> ServerResult<Vec<Server>> {
        let mut servers = Vec::new();

        if !self.servers_dir.exists() {
            return Ok(servers);
        }

        let mut entries = tokio::fs::read_dir(&self.servers_dir)
            .await
            .map_err(|e| ServerError::io(&self.servers_dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ServerError::io(&self.servers_dir, e))?
        {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match self.load(&name).await {
                Ok(server) => servers.push(server),
                Err(e) => warn!("Skipping {:?}: {}", entry.path(), e),
            }
        }

        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(servers)
    }

    pub async fn delete(&self, name: &str) -> ServerResult<()> {
        validate_name(name)?;
        let path = self.servers_dir.join(name);
        if !path.is_dir() {
            return Err(ServerError::ServerNotFound(name.to_string()));
        }

        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| ServerError::io(path, e))?;

        info!("Deleted server {}", name);
        Ok(())
    }

    /// Copy a world folder into `<server>/world/`, overwriting files with
    /// the same relative path.
    pub async fn import_world(&self, server: &Server, source: &Path) -> ServerResult<()> {
        if !source.is_dir() {
            return Err(ServerError::Other(format!(
                "World source {:?} is not a directory",
                source
            )));
        }

        let source = source.to_path_buf();
        let destination = server.world_dir();
        tokio::task::spawn_blocking(move || copy_dir_recursive(&source, &destination))
            .await
            .map_err(|e| ServerError::Other(format!("World import task failed: {e}")))??;

        info!("Imported world into {:?}", server.world_dir());
        Ok(())
    }

    pub async fn accept_eula(&self, server: &Server) -> ServerResult<()> {
        let path = server.eula_path();
        tokio::fs::write(&path, "eula=true\n")
            .await
            .map_err(|e| ServerError::io(path, e))
    }
}

/// Names become directory names verbatim.
fn validate_name(name: &str) -> ServerResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || name.contains(['/', '\\'])
    {
        return Err(ServerError::Other(format!("Invalid server name: {name:?}")));
    }
    Ok(())
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> ServerResult<()> {
    std::fs::create_dir_all(destination).map_err(|e| ServerError::io(destination, e))?;

    for entry in std::fs::read_dir(source).map_err(|e| ServerError::io(source, e))? {
        let entry = entry.map_err(|e| ServerError::io(source, e))?;
        let src_path = entry.path();
        let dst_path = destination.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| ServerError::io(&src_path, e))?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            std::fs::copy(&src_path, &dst_path).map_err(|e| ServerError::io(&dst_path, e))?;
        }
    }

    Ok(())
}

async fn create_dir_safe(path: &Path) -> ServerResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| ServerError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ServerManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ServerManager::new(dir.path().join("servers"));
        (dir, manager)
    }

    #[tokio::test]
    async fn create_then_load_round_trips_metadata() {
        let (_dir, manager) = manager();
        let created = manager
            .create("survival", ServerRecord::new("1.20.1", "paper"))
            .await
            .unwrap();
        assert!(created.plugins_dir().is_dir());

        let loaded = manager.load("survival").await.unwrap();
        assert_eq!(loaded.record, ServerRecord::new("1.20.1", "paper"));

        let err = manager
            .create("survival", ServerRecord::new("1.20.1", "paper"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ServerAlreadyExists(_)));
    }

    #[tokio::test]
    async fn corrupt_info_is_metadata_corrupt() {
        let (_dir, manager) = manager();
        let server = manager
            .create("broken", ServerRecord::new("1.20.1", "paper"))
            .await
            .unwrap();
        std::fs::write(server.info_path(), "{\"Version\": 3").unwrap();

        let err = manager.load("broken").await.unwrap_err();
        assert!(matches!(err, ServerError::MetadataCorrupt { .. }));
    }

    #[tokio::test]
    async fn list_skips_unreadable_servers() {
        let (_dir, manager) = manager();
        manager
            .create("b", ServerRecord::new("1.20.1", "paper"))
            .await
            .unwrap();
        manager
            .create("a", ServerRecord::new("1.19.4", "paper"))
            .await
            .unwrap();
        std::fs::create_dir_all(manager.servers_dir().join("stray")).unwrap();

        let names: Vec<_> = manager
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn rejects_path_like_names() {
        let (_dir, manager) = manager();
        for name in ["", "..", "a/b", "a\\b"] {
            assert!(manager.load(name).await.is_err(), "{name:?}");
        }
        assert!(matches!(
            manager.load("nope").await.unwrap_err(),
            ServerError::ServerNotFound(_)
        ));
    }

    #[tokio::test]
    async fn import_world_copies_nested_files() {
        let (dir, manager) = manager();
        let server = manager
            .create("s", ServerRecord::new("1.20.1", "paper"))
            .await
            .unwrap();
        let source = dir.path().join("downloaded-world");
        std::fs::create_dir_all(source.join("region")).unwrap();
        std::fs::write(source.join("level.dat"), b"level").unwrap();
        std::fs::write(source.join("region").join("r.0.0.mca"), b"chunk").unwrap();

        manager.import_world(&server, &source).await.unwrap();

        assert_eq!(std::fs::read(server.world_dir().join("level.dat")).unwrap(), b"level");
        assert!(server.world_dir().join("region").join("r.0.0.mca").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn create_reports_unreadable_servers_dir() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("servers");
        std::fs::write(&not_a_dir, b"file").unwrap();
        let manager = ServerManager::new(not_a_dir.clone());

        let err = manager
            .create("alpha", ServerRecord::new("1.20.1", "paper"))
            .await
            .unwrap_err();

        match err {
            ServerError::Io { path, .. } => assert_eq!(path, not_a_dir.join("alpha")),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_removes_directory() {
        let (_dir, manager) = manager();
        let server = manager
            .create("gone", ServerRecord::new("1.20.1", "paper"))
            .await
            .unwrap();
        manager.delete("gone").await.unwrap();
        assert!(!server.path.exists());
    }
}
