use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::catalog::{BuildCatalog, ModrinthRegistry, MODRINTH_API, PAPER_API};
use crate::core::downloader::Downloader;
use crate::core::error::ServerResult;
use crate::core::http::build_http_client;
use crate::core::server::ServerManager;

const APP_DIR_NAME: &str = "ServerMaker";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub servers_dir: PathBuf,
    pub java_path: PathBuf,
    pub max_memory: String,
    pub min_memory: String,
    pub build_api_base: String,
    pub build_project: String,
    pub registry_api_base: String,
    pub search_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            servers_dir: default_data_dir().join("servers"),
            java_path: PathBuf::from("java"),
            max_memory: "4G".into(),
            min_memory: "4G".into(),
            build_api_base: PAPER_API.into(),
            build_project: "paper".into(),
            registry_api_base: MODRINTH_API.into(),
            search_limit: 10,
        }
    }
}

impl Settings {
    /// Read `settings.json` from `data_dir`, falling back to defaults when it
    /// is missing or unreadable.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No settings at {:?} ({}), using defaults", path, e);
                return Self::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring unreadable settings at {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}

/// Everything a command needs, built once per invocation.
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: Settings,
    pub http_client: Client,
    pub downloader: Downloader,
    pub server_manager: ServerManager,
}

impl AppState {
    pub fn new(data_dir: PathBuf, settings: Settings) -> ServerResult<Self> {
        let http_client = build_http_client()?;
        let downloader = Downloader::new(http_client.clone());
        let server_manager = ServerManager::new(settings.servers_dir.clone());

        Ok(Self {
            data_dir,
            settings,
            http_client,
            downloader,
            server_manager,
        })
    }

    /// State rooted at the platform data directory, with an optional
    /// one-off servers directory override.
    pub fn from_environment(servers_dir: Option<PathBuf>) -> ServerResult<Self> {
        let data_dir = default_data_dir();
        let mut settings = Settings::load(&data_dir);
        if let Some(dir) = servers_dir {
            settings.servers_dir = dir;
        }
        Self::new(data_dir, settings)
    }

    pub fn build_catalog(&self) -> BuildCatalog {
        BuildCatalog::new(
            self.http_client.clone(),
            &self.settings.build_api_base,
            &self.settings.build_project,
        )
    }

    pub fn plugin_registry(&self) -> ModrinthRegistry {
        ModrinthRegistry::new(self.http_client.clone(), &self.settings.registry_api_base)
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
