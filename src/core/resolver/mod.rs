mod dependency;
mod ledger;

pub use dependency::{
    DependencyResolver, Diagnostic, InstalledArtifact, ResolveReport, VisitedSet,
    PLUGIN_EXTENSION,
};
pub use ledger::InstalledLedger;
