//! `hmem-core` — the persistent hierarchical memory store engine.
//!
//! A long-lived AI agent writes short "memories" over time and re-reads
//! them across sessions; this crate owns everything that makes that more
//! than a CRUD wrapper over a database: compound-ID trees with lazy,
//! per-level reads (§3-4.2), a bulk-read selection algorithm that decides
//! what to expand/title-only/hide per category (§4.4), the obsolete-chain
//! correction protocol (§4.3), and an import/merge engine with ID
//! remapping (§4.7).
//!
//! The tool-call transport, the interactive installer, sibling-markdown
//! text search, and "skill" files are external collaborators and are not
//! part of this crate — see `crates/hmem-cli` for ambient ops tooling that
//! drives this engine directly, and nothing more.

pub mod config;
pub mod curator;
pub mod error;
pub mod format;
pub mod model;
pub mod read;
pub mod role;
pub mod session;
pub mod store;
pub mod tree;

pub use config::HmemConfig;
pub use error::{HmemError, Result};
pub use model::{MemoryEntry, Node, Promoted, RootEntry, Tag};
pub use read::{read, ReadQuery};
pub use role::{Role, StoreKind};
pub use session::SessionCache;
pub use store::{Store, StoreStats};
