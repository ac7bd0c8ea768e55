//! Command-line surface, in the manner of the teacher's own CLI bin: a
//! thin `clap` front end that does argument parsing and nothing else —
//! every subcommand maps onto exactly one `hmem_core` call (spec §6's
//! tool-surface table, minus the registered-handshake transport).

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "hmem", about = "Operator CLI for the hmem hierarchical memory store", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::ValueEnum, Default)]
pub enum StoreArg {
    #[default]
    Personal,
    Company,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new root entry (`write`, spec §4.3).
    Write {
        /// Single-letter prefix (must be in the configured registry).
        prefix: char,
        /// Indented content block; read from stdin with `-`.
        content: String,
        #[arg(long)]
        links: Vec<String>,
        #[arg(long)]
        favorite: bool,
        #[arg(long)]
        pinned: bool,
        #[arg(long)]
        tags: Vec<String>,
        #[arg(long, default_value = "worker")]
        min_role: String,
        #[arg(long, value_enum, default_value_t = StoreArg::Personal)]
        store: StoreArg,
    },
    /// Mutate a root or node (`update_memory` / `fix_agent_memory`).
    Update {
        id: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        favorite: Option<bool>,
        #[arg(long)]
        irrelevant: Option<bool>,
        #[arg(long)]
        pinned: Option<bool>,
        #[arg(long)]
        obsolete: Option<bool>,
        #[arg(long)]
        tags: Vec<String>,
        /// Bypass the `[✓ID]` correction-token requirement (ceo only).
        #[arg(long)]
        curator_bypass: bool,
        #[arg(long, value_enum, default_value_t = StoreArg::Personal)]
        store: StoreArg,
    },
    /// Append children under a live root or node (`append_memory`).
    Append {
        id: String,
        content: String,
        #[arg(long, value_enum, default_value_t = StoreArg::Personal)]
        store: StoreArg,
    },
    /// Delete a root and everything beneath it.
    Delete {
        id: String,
        #[arg(long, value_enum, default_value_t = StoreArg::Personal)]
        store: StoreArg,
    },
    /// Read — by ID, time-around, search, or bulk V2 selection (`read_memory`).
    Read {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        prefix: Option<char>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        time_around: Option<String>,
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        show_obsolete: bool,
        #[arg(long)]
        show_all: bool,
        #[arg(long)]
        titles_only: bool,
        #[arg(long)]
        expand: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        curator: bool,
        #[arg(long, value_enum, default_value_t = StoreArg::Personal)]
        store: StoreArg,
    },
    /// Merge another `.hmem` file into the target store (`import_from_hmem`).
    Import {
        source: std::path::PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum, default_value_t = StoreArg::Personal)]
        store: StoreArg,
    },
    /// Aggregate counters for the target store.
    Stats {
        #[arg(long, value_enum, default_value_t = StoreArg::Personal)]
        store: StoreArg,
    },
    /// Curator operations — all `ceo`-gated (spec §6).
    #[command(subcommand)]
    Audit(AuditCommand),
}

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// List agent stores touched since their last recorded audit.
    Queue,
    /// Record `agent_name` as audited now.
    Mark { agent_name: String },
}
