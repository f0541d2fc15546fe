//! # CLI Behavior
//!
//! This is **one possible UI client** for folio, not the engine itself.
//! The CLI is the only place that knows about terminal I/O, exit codes, and output formatting.
//!
//! For the overall architecture, see the crate-level documentation in [`crate`].
//!
//! ## Short-Lived Sessions
//!
//! Every invocation opens one [`folioapp::session::DocumentSession`], does its
//! work and closes the session cleanly before exiting. Autosave ticks never get
//! a chance to fire in such a short window, so commands that change content
//! save explicitly.
//!
//! ## Naked Execution (`folio`)
//!
//! Running `folio` with no arguments defaults to `folio list`.
//!
//! ## Recovery
//!
//! `folio recover` lists recovery records whose edits never reached their
//! document (for example after an editor host crashed). `keep` writes the
//! recovered content back as a regular save and drops the record; `discard`
//! drops the record only.
//!
//! ## Writing Content
//!
//! `folio write` accepts plain text (one paragraph block per line) or, with
//! `--json`, a raw content snapshot. Without a text argument the content is
//! read from stdin:
//!
//! ```text
//! $ cat notes.txt | folio write 0b4c...
//! ```
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`. The level defaults to `warn`,
//! `-v` raises it to `debug`, and `FOLIO_LOG` accepts any `EnvFilter` directive.

pub mod commands;
mod handlers;
mod render;
mod setup;
mod styles;
