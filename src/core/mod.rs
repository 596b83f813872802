// ─── ServerMaker Core ───
// Backend for managing local Minecraft server installations.
//
// Architecture:
//   core/
//     catalog/    — Server build catalog + plugin registry client
//     downloader/ — Idempotent, SHA-1 validated artifact downloads
//     resolver/   — Deduplicating plugin dependency resolution
//     server/     — Server directories + info.json metadata
//     supervisor/ — Server process launch, console relay, termination
//     state/      — Settings + per-invocation application state

pub mod catalog;
pub mod downloader;
pub mod error;
pub mod http;
pub mod resolver;
pub mod server;
pub mod state;
pub mod supervisor;
