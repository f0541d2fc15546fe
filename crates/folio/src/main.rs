//! # Folio
//!
//! Folio keeps rich-text documents safe on the local machine: explicit saves,
//! periodic autosaves, a bounded version history per document, and a recovery
//! side-channel that survives crashes of the editor host.
//!
//! ## Architecture
//!
//! The workspace is split in two crates:
//!
//! ```text
//! folio (this binary)        argument parsing, rendering, logging setup
//!     │
//!     ▼
//! folioapp (library)         DocumentSession, VersionLedger, RecoveryManager,
//!                            SyncCoordinator, StorageBackend
//! ```
//!
//! The binary never touches storage directly. Every command opens a
//! `DocumentSession`, which owns the active document and coordinates saving,
//! recovery checkpoints and change watching. See the `folioapp` crate docs for
//! the durability rules.
//!
//! ## Errors and Exit Codes
//!
//! Handlers return `anyhow::Result`. Any error is printed to stderr as
//! `Error: <message>` and the process exits with status 1.

mod cli;

fn main() {
    if let Err(e) = cli::commands::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
