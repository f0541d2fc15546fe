//! # Folio Architecture
//!
//! Folio is a **local-first document persistence engine**. An editor hands it
//! snapshots of its content; folio makes sure they reach durable storage, keeps
//! a bounded history, and gets work back after a crash. It is a library that
//! happens to have a CLI client, not the other way around.
//!
//! ## The Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Client (the `folio` CLI, or any editor host)               │
//! │  - Owns a DocumentSession, renders events and errors        │
//! │  - The ONLY place that knows about stdout/stderr/exit codes │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Session (session/)                                         │
//! │  - Active document lifecycle, dirty tracking                │
//! │  - Worker task: autosave ticks, checkpoints, change checks  │
//! └─────────────────────────────────────────────────────────────┘
//!          │              │               │              │
//!          ▼              ▼               ▼              ▼
//! ┌──────────────┐ ┌─────────────┐ ┌────────────┐ ┌─────────────┐
//! │ ledger.rs    │ │ recovery.rs │ │ autosave.rs│ │ sync/       │
//! │ version cap  │ │ side channel│ │ watcher.rs │ │ offline FIFO│
//! └──────────────┘ └─────────────┘ └────────────┘ └─────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/)                                     │
//! │  - Abstract StorageBackend trait                            │
//! │  - FsBackend (production), MemBackend (key-value, tests)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Principle: No I/O Assumptions in Core
//!
//! Everything in this crate:
//! - Takes regular Rust arguments and returns `Result<T, FolioError>`
//! - **Never** writes to stdout/stderr (diagnostics go through `tracing`)
//! - **Never** calls `std::process::exit`
//! - **Never** branches on the host environment; the backend is picked once
//!
//! ## Durability Rules
//!
//! - Primary writes are atomic at the backend boundary.
//! - A failed save leaves the document dirty and the ledger untouched.
//! - Recovery checkpoints are independent of the primary save path.
//! - Nothing offered for recovery is deleted without an explicit decision.
//!
//! ## Testing Strategy
//!
//! 1. **Components** (`ledger`, `recovery`, `sync`, `store`): unit tests against
//!    [`store::mem_backend::MemBackend`], which can also simulate failing and
//!    slow writes.
//! 2. **Session scenarios** (`tests/`): full lifecycles on both backends,
//!    including crash-and-restart by dropping the session mid-edit.
//!
//! ## Module Overview
//!
//! - [`session`]: [`session::DocumentSession`], the entry point for hosts
//! - [`ledger`]: bounded newest-first version history
//! - [`recovery`]: crash checkpoints, orphan scan, retention
//! - [`autosave`]: interval ticks and the no-overlap guard
//! - [`watcher`]: foreign-change notifications for the active file
//! - [`sync`]: deferred network operations with FIFO replay
//! - [`store`]: backends and async I/O helpers
//! - [`config`]: layered settings

pub mod autosave;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod model;
pub mod recovery;
pub mod session;
pub mod store;
pub mod sync;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod watcher;

pub use error::{FolioError, Result};
