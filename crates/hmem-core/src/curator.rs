//! Curator surface (C7).
//!
//! Two responsibilities, both scoped to the `ceo` role per spec §4.8/§6:
//!
//! - [`AuditState`]: an on-disk `agent_name -> last_audited` map, written
//!   atomically (temp file + rename, the same "don't trust a bare
//!   overwrite" instinct as [`crate::store::Store::open`]'s permission
//!   hardening). [`audit_queue`] compares a caller-supplied list of
//!   `(agent_name, mtime)` observations against it — the directory walk
//!   itself (`Agents/*`, `Assistenten/*`, `memory.hmem`) is a transport
//!   concern, out of scope here per spec §1.
//! - The obsolete-protocol bypass is not a separate code path: it is the
//!   `curator_bypass` flag already threaded through
//!   [`crate::store::Store::update_root`]. This module just owns the
//!   audit bookkeeping that makes the `ceo` role meaningfully different
//!   from `write`/`update_memory` as used by every other role.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `agent_name -> last_audited` timestamps, persisted as
/// `D/audit_state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditState {
    #[serde(flatten)]
    last_audited: HashMap<String, DateTime<Utc>>,
}

impl AuditState {
    /// Load from `path`, defaulting to empty if the file is absent or
    /// fails to parse (audit history is advisory, not load-bearing).
    pub fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!("failed to parse {}: {e}, starting with empty audit state", path.display());
            Self::default()
        })
    }

    /// Record `agent_name` as audited `at`, then persist to `path` via a
    /// temp-file + rename so a crash mid-write never leaves a truncated
    /// file behind.
    pub fn mark_audited(&mut self, path: &Path, agent_name: &str, at: DateTime<Utc>) -> Result<()> {
        self.last_audited.insert(agent_name.to_string(), at);
        self.save(path)
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string());
        std::fs::write(&tmp_path, body)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn last_audited(&self, agent_name: &str) -> Option<DateTime<Utc>> {
        self.last_audited.get(agent_name).copied()
    }
}

/// One candidate for the audit queue: an agent's name and its store's
/// on-disk modification time, as scanned by the (out-of-scope) transport.
#[derive(Debug, Clone)]
pub struct AgentObservation {
    pub agent_name: String,
    pub store_path: PathBuf,
    pub mtime: DateTime<Utc>,
}

/// Agents whose store `mtime` is newer than their recorded audit
/// timestamp (or who have never been audited), in the order observed.
pub fn audit_queue(state: &AuditState, observations: &[AgentObservation]) -> Vec<AgentObservation> {
    observations
        .iter()
        .filter(|obs| match state.last_audited(&obs.agent_name) {
            Some(last) => obs.mtime > last,
            None => true,
        })
        .cloned()
        .collect()
}
