//! Operator CLI entry point.
//!
//! Logging initializes to stderr exactly as the teacher's `vestige-mcp`
//! main does — stdout stays reserved for command output so a future
//! script-driven transport can pipe it without log noise mixed in.

mod cli;
mod paths;

use std::io::Read as _;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hmem_core::{HmemConfig, ReadQuery, Role, SessionCache, Store, StoreKind};

use cli::{AuditCommand, Cli, Command, StoreArg};
use paths::StoreSelector;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn env_root() -> Result<std::path::PathBuf> {
    let raw = std::env::var(paths::ENV_ROOT)
        .with_context(|| format!("{} is required", paths::ENV_ROOT))?;
    Ok(std::path::PathBuf::from(raw))
}

fn env_agent() -> Option<String> {
    std::env::var(paths::ENV_AGENT).ok().filter(|s| !s.is_empty())
}

fn env_role() -> Role {
    std::env::var(paths::ENV_ROLE)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Role::Worker)
}

fn open_store(root: &std::path::Path, agent: Option<&str>, selector: StoreSelector) -> Result<Store> {
    let config = HmemConfig::load(&paths::config_path(root));
    let kind = match selector {
        StoreSelector::Personal => StoreKind::Personal,
        StoreSelector::Company => StoreKind::Company,
    };
    let path = paths::resolve_store_path(root, agent, selector);
    let store = Store::open(path, config, kind).context("failed to open store")?;
    if store.is_corrupted() {
        tracing::warn!("store reports DbCorrupted; reads proceed, writes will refuse");
    }
    Ok(store)
}

fn selector_of(arg: &StoreArg) -> StoreSelector {
    match arg {
        StoreArg::Personal => StoreSelector::Personal,
        StoreArg::Company => StoreSelector::Company,
    }
}

/// Reject a write when it targets the company store below `al` (spec §6/§7
/// `RoleDenied`).
fn check_write_gate(selector: StoreSelector, role: Role) -> Result<()> {
    if selector == StoreSelector::Company && !role.can_write_company() {
        bail!("role denied: {role} cannot write to the company store");
    }
    Ok(())
}

fn read_content_arg(raw: &str) -> Result<String> {
    if raw == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(raw.to_string())
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = env_root()?;
    let agent = env_agent();
    let role = env_role();

    match cli.command {
        Command::Write { prefix, content, links, favorite, pinned, tags, min_role, store } => {
            let selector = selector_of(&store);
            check_write_gate(selector, role)?;
            let store = open_store(&root, agent.as_deref(), selector)?;
            let min_role: Role = min_role.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let content = read_content_arg(&content)?;
            let id = store.write(prefix, &content, links, min_role, favorite, pinned, &tags)?;
            println!("{id}");
        }
        Command::Update {
            id,
            content,
            favorite,
            irrelevant,
            pinned,
            obsolete,
            tags,
            curator_bypass,
            store,
        } => {
            let selector = selector_of(&store);
            check_write_gate(selector, role)?;
            if curator_bypass && role != Role::Ceo {
                bail!("role denied: curator bypass requires ceo");
            }
            let store = open_store(&root, agent.as_deref(), selector)?;
            let content = content.map(|c| read_content_arg(&c)).transpose()?;
            let tags_opt = if tags.is_empty() { None } else { Some(tags.as_slice()) };

            if hmem_core::store::ids::is_node_id(&id) {
                store.update_node(&id, content.as_deref(), favorite, irrelevant, tags_opt)?;
            } else {
                store.update_root(
                    &id,
                    content.as_deref(),
                    None,
                    obsolete,
                    favorite,
                    irrelevant,
                    pinned,
                    tags_opt,
                    curator_bypass,
                )?;
            }
            println!("updated {id}");
        }
        Command::Append { id, content, store } => {
            let selector = selector_of(&store);
            check_write_gate(selector, role)?;
            let store = open_store(&root, agent.as_deref(), selector)?;
            let content = read_content_arg(&content)?;
            let new_ids = store.append_children(&id, &content)?;
            for new_id in new_ids {
                println!("{new_id}");
            }
        }
        Command::Delete { id, store } => {
            let selector = selector_of(&store);
            check_write_gate(selector, role)?;
            let store = open_store(&root, agent.as_deref(), selector)?;
            store.delete(&id)?;
            println!("deleted {id}");
        }
        Command::Read {
            id,
            prefix,
            search,
            time_around,
            period,
            show_obsolete,
            show_all,
            titles_only,
            expand,
            limit,
            curator,
            store,
        } => {
            let selector = selector_of(&store);
            let store = open_store(&root, agent.as_deref(), selector)?;
            let allowed_roles = match selector {
                StoreSelector::Company => Some(role.allowed_roles()),
                StoreSelector::Personal => None,
            };
            let query = ReadQuery {
                id,
                prefix,
                search,
                time_around,
                period,
                show_obsolete,
                show_all,
                titles_only,
                expand,
                limit,
                ..Default::default()
            };
            let mut session = SessionCache::new();
            let entries = hmem_core::read(&store, &mut session, allowed_roles.as_deref(), &query)?;
            let rendered = if query.id.is_some() || query.time_around.is_some() || query.search.is_some() {
                entries
                    .iter()
                    .map(|e| hmem_core::format::format_entry(e, curator))
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                hmem_core::format::format_bulk(&store.config, &entries, curator)
            };
            print!("{rendered}");
        }
        Command::Import { source, dry_run, store } => {
            let selector = selector_of(&store);
            check_write_gate(selector, role)?;
            let store = open_store(&root, agent.as_deref(), selector)?;
            let summary = store.import_from_hmem(&source, dry_run)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Stats { store } => {
            let selector = selector_of(&store);
            let store = open_store(&root, agent.as_deref(), selector)?;
            let stats = store.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Audit(cmd) => run_audit(&root, role, cmd)?,
    }

    Ok(())
}

/// Scan `D/Agents/*`, `D/Assistenten/*`, and `D/memory.hmem` for their
/// `.hmem` file's mtime. This directory walk is the CLI's own concern
/// (spec §1 only excludes it from `hmem-core`, not from ambient tooling).
fn scan_agent_stores(root: &std::path::Path) -> Vec<hmem_core::curator::AgentObservation> {
    let mut out = Vec::new();

    let default_store = root.join("memory.hmem");
    if let Ok(meta) = std::fs::metadata(&default_store) {
        if let Ok(mtime) = meta.modified() {
            out.push(hmem_core::curator::AgentObservation {
                agent_name: "default".to_string(),
                store_path: default_store,
                mtime: mtime.into(),
            });
        }
    }

    for dirname in ["Agents", "Assistenten"] {
        let Ok(entries) = std::fs::read_dir(root.join(dirname)) else { continue };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else { continue };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let store_path = entry.path().join(format!("{name}.hmem"));
            if let Ok(meta) = std::fs::metadata(&store_path) {
                if let Ok(mtime) = meta.modified() {
                    out.push(hmem_core::curator::AgentObservation {
                        agent_name: name,
                        store_path,
                        mtime: mtime.into(),
                    });
                }
            }
        }
    }

    out
}

fn run_audit(root: &std::path::Path, role: Role, cmd: AuditCommand) -> Result<()> {
    if role != Role::Ceo {
        bail!("role denied: audit operations require ceo");
    }
    let state_path = paths::audit_state_path(root, std::env::var(paths::ENV_AUDIT_STATE_PATH).ok().as_deref());

    match cmd {
        AuditCommand::Queue => {
            let state = hmem_core::curator::AuditState::load(&state_path);
            let observations = scan_agent_stores(root);
            let queue = hmem_core::curator::audit_queue(&state, &observations);
            for obs in queue {
                println!("{} ({})", obs.agent_name, obs.store_path.display());
            }
        }
        AuditCommand::Mark { agent_name } => {
            let mut state = hmem_core::curator::AuditState::load(&state_path);
            state.mark_audited(&state_path, &agent_name, Utc::now())?;
            println!("marked {agent_name} audited");
        }
    }
    Ok(())
}
