use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{error, info, warn};

use crate::core::catalog::PluginRegistry;
use crate::core::downloader::ArtifactFetcher;
use crate::core::error::{ServerError, ServerResult};
use crate::core::resolver::{DependencyResolver, InstalledLedger, ResolveReport};
use crate::core::server::ServerRecord;
use crate::core::state::AppState;
use crate::core::supervisor::{
    interrupt_signal, ConsoleSink, ExitOutcome, LaunchSpec, ServerProcess,
};

#[derive(Debug, Parser)]
#[command(name = "servermaker", version, about = "Create, extend and run Minecraft servers")]
pub struct Cli {
    /// Use this servers directory instead of the configured one.
    #[arg(long, global = true)]
    pub servers_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List downloadable server versions with their newest build.
    Builds,
    /// Create a server and download its software.
    Create {
        name: String,
        #[arg(long = "game-version", short = 'g')]
        game_version: String,
        #[arg(long, default_value = "paper")]
        loader: String,
        /// Write eula.txt accepting the Minecraft EULA.
        #[arg(long)]
        accept_eula: bool,
    },
    /// List managed servers.
    List,
    /// Search plugins compatible with a server.
    Search {
        server: String,
        #[arg(default_value = "")]
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Install plugins and their required dependencies.
    Install {
        server: String,
        #[arg(required = true)]
        slugs: Vec<String>,
    },
    /// Run a server, relaying its console until it exits.
    Play { server: String },
    /// Copy a world folder into a server.
    ImportWorld { server: String, source: PathBuf },
    /// Delete a server directory.
    Delete { server: String },
}

pub async fn dispatch(cli: Cli) -> ServerResult<()> {
    let state = AppState::from_environment(cli.servers_dir)?;

    match cli.command {
        Command::Builds => list_builds(&state).await,
        Command::Create {
            name,
            game_version,
            loader,
            accept_eula,
        } => create_server(&state, &name, &game_version, &loader, accept_eula).await,
        Command::List => list_servers(&state).await,
        Command::Search {
            server,
            query,
            limit,
        } => search_plugins(&state, &server, &query, limit).await,
        Command::Install { server, slugs } => {
            let report = install_plugins(&state, &server, &slugs).await?;
            print_install_report(&report);
            Ok(())
        }
        Command::Play { server } => play_server(&state, &server).await,
        Command::ImportWorld { server, source } => {
            let server = state.server_manager.load(&server).await?;
            state.server_manager.import_world(&server, &source).await?;
            println!("World imported into {}", server.world_dir().display());
            Ok(())
        }
        Command::Delete { server } => {
            state.server_manager.delete(&server).await?;
            println!("Deleted {server}");
            Ok(())
        }
    }
}

async fn list_builds(state: &AppState) -> ServerResult<()> {
    let candidates = state.build_catalog().list_build_candidates().await?;
    for candidate in candidates {
        println!(
            "{:<10} build {:<5} {}",
            candidate.version, candidate.build, candidate.download_url
        );
    }
    Ok(())
}

async fn create_server(
    state: &AppState,
    name: &str,
    game_version: &str,
    loader: &str,
    accept_eula: bool,
) -> ServerResult<()> {
    let candidate = state.build_catalog().candidate_for(game_version).await?;
    let server = state
        .server_manager
        .create(name, ServerRecord::new(game_version, loader))
        .await?;

    info!(
        "Downloading {} {} build {}",
        loader, candidate.version, candidate.build
    );
    if let Err(e) = state
        .downloader
        .fetch(&candidate.download_url, &server.server_jar(), None)
        .await
    {
        error!("Server download failed, removing {}: {}", name, e);
        if let Err(cleanup) = state.server_manager.delete(name).await {
            warn!("Could not remove partial server {}: {}", name, cleanup);
        }
        return Err(e);
    }

    if accept_eula {
        state.server_manager.accept_eula(&server).await?;
    }

    println!(
        "Created {} ({} {} build {}) at {}",
        server.name,
        loader,
        candidate.version,
        candidate.build,
        server.path.display()
    );
    Ok(())
}

async fn list_servers(state: &AppState) -> ServerResult<()> {
    let servers = state.server_manager.list().await?;
    if servers.is_empty() {
        println!(
            "No servers in {}",
            state.server_manager.servers_dir().display()
        );
        return Ok(());
    }
    for server in servers {
        println!(
            "{:<24} {:<10} {}",
            server.name, server.record.game_version, server.record.loader_kind
        );
    }
    Ok(())
}

async fn search_plugins(
    state: &AppState,
    server: &str,
    query: &str,
    limit: Option<usize>,
) -> ServerResult<()> {
    let server = state.server_manager.load(server).await?;
    let limit = limit.unwrap_or(state.settings.search_limit);
    let hits = state
        .plugin_registry()
        .search_plugins(
            query,
            &server.record.game_version,
            &server.record.loader_kind,
            limit,
        )
        .await?;

    if hits.is_empty() {
        println!("No plugins found");
    }
    for hit in hits {
        println!("{:<28} {} - {}", hit.slug, hit.display_name, hit.description);
    }
    Ok(())
}

/// Resolve `slugs` for a server, seeding the visited set from plugins a
/// previous run already installed.
pub async fn install_plugins(
    state: &AppState,
    server: &str,
    slugs: &[String],
) -> ServerResult<ResolveReport> {
    let server = state.server_manager.load(server).await?;
    let plugins_dir = server.plugins_dir();
    let mut ledger = InstalledLedger::load(&plugins_dir).await?;
    let mut visited = ledger.seed();

    let registry = state.plugin_registry();
    let resolver = DependencyResolver::new(
        &registry,
        &state.downloader,
        &server.record.game_version,
        &server.record.loader_kind,
        &plugins_dir,
    );
    let report = resolver.resolve_all(slugs, &mut visited).await;

    for artifact in &report.installed {
        ledger.record(artifact);
    }
    ledger.save().await?;
    Ok(report)
}

fn print_install_report(report: &ResolveReport) {
    for artifact in &report.installed {
        let note = if artifact.wrote { "installed" } else { "already present" };
        println!("{:<28} {} ({})", artifact.slug, artifact.file_name, note);
    }
    for diagnostic in &report.diagnostics {
        println!("skipped {diagnostic}");
    }
    println!(
        "{} plugin file(s) written, {} skipped",
        report.written_count(),
        report.diagnostics.len()
    );
}

async fn play_server(state: &AppState, server: &str) -> ServerResult<()> {
    let server = state.server_manager.load(server).await?;
    if !server.server_jar().is_file() {
        return Err(ServerError::Launch(format!(
            "{} is missing; recreate the server",
            server.server_jar().display()
        )));
    }

    let spec = LaunchSpec::for_server(
        &state.settings.java_path,
        &state.settings.max_memory,
        &state.settings.min_memory,
        &server,
    );
    let mut process = ServerProcess::launch(&spec)?;

    let input = BufReader::new(tokio::io::stdin());
    let report = process
        .supervise(input, ConsoleSink, interrupt_signal())
        .await?;

    match report.outcome {
        ExitOutcome::Clean => println!("Server stopped"),
        ExitOutcome::Abnormal { code: Some(code) } => {
            println!("Server exited with status {code}")
        }
        ExitOutcome::Abnormal { code: None } => println!("Server was terminated externally"),
        ExitOutcome::Interrupted => println!("Server terminated by interrupt"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Settings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_plugin(
        server: &MockServer,
        id: &str,
        slug: &str,
        deps: &[&str],
        expected_downloads: u64,
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/project/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": id, "slug": slug, "title": slug, "versions": [format!("{slug}-v")]
            })))
            .mount(server)
            .await;
        if id != slug {
            Mock::given(method("GET"))
                .and(path(format!("/project/{slug}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "id": id, "slug": slug, "title": slug, "versions": [format!("{slug}-v")]
                })))
                .mount(server)
                .await;
        }
        let dependencies: Vec<_> = deps
            .iter()
            .map(|d| serde_json::json!({ "project_id": d, "dependency_type": "required" }))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/project/{slug}/version")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": format!("{slug}-v"),
                "version_number": "1.0",
                "game_versions": ["1.20.1"],
                "loaders": ["paper"],
                "files": [{
                    "url": format!("{}/files/{slug}.jar", server.uri()),
                    "filename": format!("{slug}.jar")
                }],
                "dependencies": dependencies
            }])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/files/{slug}.jar")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(slug.as_bytes().to_vec()))
            .expect(expected_downloads)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn install_resolves_dependencies_and_is_incremental() {
        let registry = MockServer::start().await;
        mount_plugin(&registry, "worldedit", "worldedit", &["cmdapi-id"], 1).await;
        mount_plugin(&registry, "cmdapi-id", "commandapi", &[], 1).await;

        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            servers_dir: dir.path().join("servers"),
            registry_api_base: registry.uri(),
            ..Settings::default()
        };
        let state = AppState::new(dir.path().to_path_buf(), settings).unwrap();
        let server = state
            .server_manager
            .create("survival", ServerRecord::new("1.20.1", "Paper"))
            .await
            .unwrap();

        let report = install_plugins(&state, "survival", &["worldedit".to_string()])
            .await
            .unwrap();
        assert!(report.is_clean(), "{:?}", report.diagnostics);
        assert_eq!(report.written_count(), 2);
        assert!(server.plugins_dir().join("worldedit.jar").exists());
        assert!(server.plugins_dir().join("commandapi.jar").exists());

        // Second run: everything is seeded from the ledger, nothing refetched
        let again = install_plugins(&state, "survival", &["worldedit".to_string()])
            .await
            .unwrap();
        assert_eq!(again.written_count(), 0);
        assert!(again.installed.is_empty());
    }

    #[tokio::test]
    async fn install_on_corrupt_metadata_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            servers_dir: dir.path().join("servers"),
            ..Settings::default()
        };
        let state = AppState::new(dir.path().to_path_buf(), settings).unwrap();
        let server = state
            .server_manager
            .create("broken", ServerRecord::new("1.20.1", "paper"))
            .await
            .unwrap();
        std::fs::write(server.info_path(), "[]").unwrap();

        let err = install_plugins(&state, "broken", &["worldedit".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::MetadataCorrupt { .. }));
    }

    #[test]
    fn cli_parses_install_with_many_slugs() {
        let cli = Cli::try_parse_from([
            "servermaker",
            "--servers-dir",
            "/srv",
            "install",
            "survival",
            "worldedit",
            "luckperms",
        ])
        .unwrap();
        assert_eq!(cli.servers_dir, Some(PathBuf::from("/srv")));
        match cli.command {
            Command::Install { server, slugs } => {
                assert_eq!(server, "survival");
                assert_eq!(slugs, vec!["worldedit", "luckperms"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_parses_create_defaults_to_paper() {
        let cli = Cli::try_parse_from(["servermaker", "create", "s", "-g", "1.20.1"]).unwrap();
        match cli.command {
            Command::Create {
                game_version,
                loader,
                accept_eula,
                ..
            } => {
                assert_eq!(game_version, "1.20.1");
                assert_eq!(loader, "paper");
                assert!(!accept_eula);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
