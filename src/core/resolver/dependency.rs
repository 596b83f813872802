use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::catalog::{PluginDescriptor, PluginRegistry, PluginVersion};
use crate::core::downloader::ArtifactFetcher;
use crate::core::error::{ServerError, ServerResult};

/// Plugin payloads are always Java archives.
pub const PLUGIN_EXTENSION: &str = ".jar";

/// `name` if it is a single plain path component, so joining it onto the
/// plugins directory cannot land anywhere else.
pub(crate) fn plain_file_name(name: &str) -> Option<&str> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|n| n == name);
    plain.then_some(name)
}

/// Slugs already processed during one resolution run.
///
/// Owned by the caller: start empty for a fresh install, or seed it with
/// already-installed slugs so they are neither re-downloaded nor recursed into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitedSet(HashSet<String>);

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.0.contains(slug)
    }

    /// Returns `false` if the slug was already present.
    pub fn insert(&mut self, slug: impl Into<String>) -> bool {
        self.0.insert(slug.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for VisitedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A plugin file that is present in the destination directory after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    pub slug: String,
    pub file_name: String,
    pub path: PathBuf,
    /// `false` when the file already existed and was left untouched.
    pub wrote: bool,
}

/// Why one slug contributed nothing (or less than expected) to the install.
#[derive(Debug)]
pub struct Diagnostic {
    /// The reference as it appeared in the graph: a slug or a project id.
    pub slug: String,
    pub error: ServerError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.slug, self.error)
    }
}

/// Outcome of one resolution run. Never an error: failures are diagnostics.
#[derive(Debug, Default)]
pub struct ResolveReport {
    pub installed: Vec<InstalledArtifact>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolveReport {
    /// Number of artifacts actually written to disk in this run.
    pub fn written_count(&self) -> usize {
        self.installed.iter().filter(|a| a.wrote).count()
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn skip(&mut self, slug: &str, error: ServerError) {
        warn!("Skipping {}: {}", slug, error);
        self.diagnostics.push(Diagnostic {
            slug: slug.to_string(),
            error,
        });
    }
}

/// Walks a plugin's required-dependency graph and installs one matching
/// artifact per distinct slug.
///
/// Matching is first-match in registry order: the first version listing both
/// the game version and the loader (case-insensitively) wins, even if a later
/// entry is newer.
pub struct DependencyResolver<'a, R: ?Sized, F: ?Sized> {
    registry: &'a R,
    fetcher: &'a F,
    game_version: &'a str,
    loader: &'a str,
    destination_dir: &'a Path,
}

impl<'a, R, F> DependencyResolver<'a, R, F>
where
    R: PluginRegistry + ?Sized,
    F: ArtifactFetcher + ?Sized,
{
    pub fn new(
        registry: &'a R,
        fetcher: &'a F,
        game_version: &'a str,
        loader: &'a str,
        destination_dir: &'a Path,
    ) -> Self {
        Self {
            registry,
            fetcher,
            game_version,
            loader,
            destination_dir,
        }
    }

    /// Resolve a single root plugin. See [`resolve_all`](Self::resolve_all).
    pub async fn resolve(&self, root_slug: &str, visited: &mut VisitedSet) -> ResolveReport {
        self.resolve_all(&[root_slug], visited).await
    }

    /// Resolve several roots against one shared visited set.
    ///
    /// Uses an explicit depth-first work list, so graph depth never grows the
    /// call stack. `visited` gains every slug whose descriptor was found,
    /// whether or not a matching build existed.
    pub async fn resolve_all<S: AsRef<str>>(
        &self,
        roots: &[S],
        visited: &mut VisitedSet,
    ) -> ResolveReport {
        let mut report = ResolveReport::default();
        // Project ids and alternate spellings already mapped to a canonical slug
        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut pending: Vec<String> = roots
            .iter()
            .rev()
            .map(|s| s.as_ref().to_string())
            .collect();

        info!(
            "Resolving {} plugin(s) for {} / {}",
            pending.len(),
            self.game_version,
            self.loader
        );

        while let Some(reference) = pending.pop() {
            if visited.contains(&reference)
                || aliases
                    .get(&reference)
                    .is_some_and(|slug| visited.contains(slug))
            {
                debug!("Already processed: {}", reference);
                continue;
            }

            let descriptor = match self.registry.get_plugin(&reference).await {
                Ok(d) => d,
                Err(e) => {
                    report.skip(&reference, e);
                    continue;
                }
            };

            aliases.insert(reference.clone(), descriptor.slug.clone());
            aliases.insert(descriptor.id.clone(), descriptor.slug.clone());

            // Mark before descending so self- and mutual references terminate
            if !visited.insert(descriptor.slug.clone()) {
                debug!("Already processed: {} ({})", descriptor.slug, reference);
                continue;
            }

            let dependencies = match self.install_one(&descriptor, &mut report).await {
                Ok(deps) => deps,
                Err(e) => {
                    report.skip(&descriptor.slug, e);
                    continue;
                }
            };

            // Reverse so the first declared dependency is processed next
            pending.extend(dependencies.into_iter().rev());
        }

        info!(
            "Resolution finished: {} visited, {} written, {} diagnostic(s)",
            visited.len(),
            report.written_count(),
            report.diagnostics.len()
        );
        report
    }

    /// Install the first matching build of `descriptor` and return the project
    /// references of its required dependencies.
    ///
    /// `Err` means the subtree is not explored. A download failure is recorded
    /// as a diagnostic but still yields the dependency edges.
    async fn install_one(
        &self,
        descriptor: &PluginDescriptor,
        report: &mut ResolveReport,
    ) -> ServerResult<Vec<String>> {
        let slug = &descriptor.slug;
        let versions = self.registry.get_plugin_versions(slug).await?;

        let matched = versions
            .iter()
            .find(|v| v.supports(self.game_version, self.loader))
            .ok_or_else(|| ServerError::NoMatchingBuild {
                slug: slug.clone(),
                game_version: self.game_version.to_string(),
                loader: self.loader.to_string(),
            })?;

        debug!(
            "{}: selected version {} ({})",
            slug, matched.version_number, matched.id
        );

        match matched.binary_file(PLUGIN_EXTENSION) {
            Some(file) => {
                let declared = file.effective_name();
                let Some(file_name) = plain_file_name(&declared).map(str::to_string) else {
                    report.skip(
                        slug,
                        ServerError::Other(format!("refusing unsafe file name {declared:?}")),
                    );
                    return Ok(required_references(slug, matched));
                };
                let dest = self.destination_dir.join(&file_name);
                match self
                    .fetcher
                    .fetch(&file.url, &dest, file.hashes.sha1.as_deref())
                    .await
                {
                    Ok(outcome) => {
                        if outcome.wrote {
                            info!("Installed {} -> {}", slug, file_name);
                        }
                        report.installed.push(InstalledArtifact {
                            slug: slug.clone(),
                            file_name,
                            path: dest,
                            wrote: outcome.wrote,
                        });
                    }
                    Err(e) => report.skip(slug, e),
                }
            }
            None => report.skip(
                slug,
                ServerError::Other(format!(
                    "version {} has no {} file",
                    matched.version_number, PLUGIN_EXTENSION
                )),
            ),
        }

        Ok(required_references(slug, matched))
    }
}

fn required_references(slug: &str, version: &PluginVersion) -> Vec<String> {
    let mut dependencies = Vec::new();
    for dep in version.required_dependencies() {
        match &dep.project_id {
            Some(id) => dependencies.push(id.clone()),
            None => debug!("{}: required dependency without project id, ignored", slug),
        }
    }
    dependencies
}
