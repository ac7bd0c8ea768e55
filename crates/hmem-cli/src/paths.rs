//! On-disk layout resolution (spec §6).
//!
//! Everything here is pure path arithmetic over a root directory supplied
//! by the environment — no filesystem access beyond an existence check
//! for the `Agents`/`Assistenten` fallback.

use std::path::{Path, PathBuf};

/// `HMEM_ROOT` — the project directory `D`. Required; there is no
/// sensible default for where an agent's memories live.
pub const ENV_ROOT: &str = "HMEM_ROOT";
/// `HMEM_AGENT` — the agent identity. Empty or unset selects the default
/// per-project store (`memory.hmem`) instead of a per-agent one.
pub const ENV_AGENT: &str = "HMEM_AGENT";
/// `HMEM_ROLE` — caller role (`worker | al | pl | ceo`); defaults to `worker`.
pub const ENV_ROLE: &str = "HMEM_ROLE";
/// `HMEM_AUDIT_STATE_PATH` — override for `D/audit_state.json`.
pub const ENV_AUDIT_STATE_PATH: &str = "HMEM_AUDIT_STATE_PATH";

/// Which store a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSelector {
    /// The caller's own store (per-agent, or the project default).
    Personal,
    /// The shared `company.hmem`.
    Company,
}

/// Resolve the `.hmem` file path for `selector`, given root `D` and the
/// optional configured agent name.
pub fn resolve_store_path(root: &Path, agent: Option<&str>, selector: StoreSelector) -> PathBuf {
    match selector {
        StoreSelector::Company => root.join("company.hmem"),
        StoreSelector::Personal => match agent {
            None | Some("") => root.join("memory.hmem"),
            Some(name) => {
                let primary = root.join("Agents").join(name).join(format!("{name}.hmem"));
                let fallback = root.join("Assistenten").join(name).join(format!("{name}.hmem"));
                if !primary.exists() && fallback.exists() {
                    fallback
                } else {
                    primary
                }
            }
        },
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join("hmem.config.json")
}

pub fn audit_state_path(root: &Path, override_path: Option<&str>) -> PathBuf {
    match override_path {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => root.join("audit_state.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_store_defaults_to_memory_hmem() {
        let root = Path::new("/tmp/project");
        assert_eq!(
            resolve_store_path(root, None, StoreSelector::Personal),
            root.join("memory.hmem")
        );
        assert_eq!(
            resolve_store_path(root, Some(""), StoreSelector::Personal),
            root.join("memory.hmem")
        );
    }

    #[test]
    fn named_agent_uses_agents_subdirectory_by_default() {
        let root = Path::new("/tmp/project");
        assert_eq!(
            resolve_store_path(root, Some("scout"), StoreSelector::Personal),
            root.join("Agents/scout/scout.hmem")
        );
    }

    #[test]
    fn company_store_ignores_agent() {
        let root = Path::new("/tmp/project");
        assert_eq!(
            resolve_store_path(root, Some("scout"), StoreSelector::Company),
            root.join("company.hmem")
        );
    }
}
