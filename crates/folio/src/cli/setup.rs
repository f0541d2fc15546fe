use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "folio",
    bin_name = "folio",
    version,
    disable_help_subcommand = true,
    about = "Local-first documents with version history and crash recovery",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Root directory for documents and recovery data
    #[arg(long, global = true, env = "FOLIO_DATA_DIR", help_heading = "Options")]
    pub data_dir: Option<PathBuf>,

    /// Verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help_heading = "Options")]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new document
    #[command(alias = "n", display_order = 1)]
    New {
        /// Initial text; one paragraph per line
        #[arg(long, short = 'c')]
        content: Option<String>,

        /// Title words (joined with spaces)
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },

    /// List stored documents
    #[command(alias = "ls", display_order = 2)]
    List,

    /// Show a document
    #[command(alias = "v", display_order = 3)]
    Show {
        /// Document id or storage path
        document: String,

        /// Print the raw content snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace a document's content and save it
    #[command(alias = "w", display_order = 4)]
    Write {
        /// Document id or storage path
        document: String,

        /// New text; read from stdin when omitted
        text: Option<String>,

        /// Treat the input as a raw JSON snapshot
        #[arg(long)]
        json: bool,
    },

    /// List saved versions, newest first
    #[command(display_order = 10)]
    History {
        /// Document id or storage path
        document: String,
    },

    /// Bring back the content of an earlier version as a new save
    #[command(display_order = 11)]
    Restore {
        /// Document id or storage path
        document: String,

        /// Version id (a unique prefix is enough)
        version: String,
    },

    /// Delete a stored document
    #[command(alias = "rm", display_order = 12)]
    Delete {
        /// Document id or storage path
        document: String,
    },

    /// Inspect and resolve crash-recovery records
    #[command(display_order = 20)]
    Recover {
        #[command(subcommand)]
        action: Option<RecoverCommands>,
    },

    /// Show configuration
    #[command(display_order = 30)]
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum RecoverCommands {
    /// List records whose edits never reached their document
    List,

    /// Write a record's content back to its document and drop the record
    Keep {
        /// Record name (a unique prefix is enough)
        record: String,
    },

    /// Drop a record without applying it
    Discard {
        /// Record name (a unique prefix is enough)
        record: String,
    },

    /// Apply retention rules now
    Prune,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print a commented template with every setting
    Template,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
