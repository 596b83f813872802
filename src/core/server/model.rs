use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted as `info.json` in the server directory.
///
/// Field names are capitalised on disk (`{"Version": .., "Loader": ..}`) to
/// stay readable by servers created with earlier tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerRecord {
    #[serde(rename = "Version")]
    pub game_version: String,
    #[serde(rename = "Loader")]
    pub loader_kind: String,
}

impl ServerRecord {
    pub fn new(game_version: impl Into<String>, loader_kind: impl Into<String>) -> Self {
        Self {
            game_version: game_version.into(),
            loader_kind: loader_kind.into(),
        }
    }
}

/// A managed server directory plus its metadata.
///
/// Layout:
/// - `server.jar`        — server software
/// - `server.properties` — opaque, owned by the server itself
/// - `plugins/`          — resolver output
/// - `world/`            — imported world
/// - `info.json`         — [`ServerRecord`]
#[derive(Debug, Clone)]
pub struct Server {
    pub name: String,
    pub path: PathBuf,
    pub record: ServerRecord,
}

impl Server {
    pub fn plugins_dir(&self) -> PathBuf {
        self.path.join("plugins")
    }

    pub fn server_jar(&self) -> PathBuf {
        self.path.join("server.jar")
    }

    pub fn info_path(&self) -> PathBuf {
        self.path.join("info.json")
    }

    pub fn properties_path(&self) -> PathBuf {
        self.path.join("server.properties")
    }

    pub fn world_dir(&self) -> PathBuf {
        self.path.join("world")
    }

    pub fn eula_path(&self) -> PathBuf {
        self.path.join("eula.txt")
    }
}
