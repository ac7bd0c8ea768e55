//! Import/merge engine (part of C3, §4.7).
//!
//! `Store::import_from_hmem` merges another `.hmem` file into this store in
//! three phases: analyze (duplicate/new/conflict detection), plan (node
//! re-parenting and ID remapping), commit (one transaction, or a rollback
//! in `dry_run` mode so the counts come back without writing anything).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::{params, Connection};

use super::{format_timestamp, ids, migrations, row_to_node, row_to_root, Store};
use crate::error::Result;
use crate::model::RootEntry;

/// Outcome of one import run.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub inserted: u32,
    pub merged: u32,
    pub nodes_inserted: u32,
    pub nodes_skipped: u32,
    pub tags_imported: u32,
    pub remapped: bool,
    pub conflicts: u32,
}

enum RootDecision {
    /// Source root already exists in the target under this ID.
    Duplicate(String),
    /// Source root has no match; `final_id` is its ID in the target
    /// (identity unless the whole import got remapped).
    New { final_id: String },
}

struct PlannedNode {
    final_id: String,
    final_parent_id: String,
    final_root_id: String,
    source_owner_id: String,
    depth: u32,
    seq: u32,
    content: String,
}

impl Store {
    /// Merge `source_path`'s roots, nodes, and tags into this store.
    pub fn import_from_hmem(&self, source_path: &Path, dry_run: bool) -> Result<ImportSummary> {
        self.guard()?;

        let source = Connection::open(source_path)?;
        Self::configure_connection(&source)?;
        migrations::apply_migrations(&source)?;

        let mut stmt = source.prepare("SELECT * FROM roots WHERE seq > 0 ORDER BY prefix, seq")?;
        let source_roots: Vec<RootEntry> = stmt
            .query_map([], row_to_root)?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // --- Phase 1: analyze -------------------------------------------------
        let target_ids: HashSet<String> = {
            let mut stmt = tx.prepare("SELECT id FROM roots WHERE seq > 0")?;
            stmt.query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<_>>()?
        };

        let mut dup_by_key: HashMap<(char, String), String> = HashMap::new();
        {
            let mut stmt = tx.prepare("SELECT id, prefix, level_1 FROM roots WHERE seq > 0")?;
            let rows: Vec<(String, String, String)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<_>>()?;
            for (id, prefix, level_1) in rows {
                let prefix = prefix.chars().next().unwrap_or('?');
                dup_by_key.insert((prefix, level_1), id);
            }
        }

        let mut conflicts = 0u32;
        let mut decisions: Vec<RootDecision> = Vec::with_capacity(source_roots.len());
        for root in &source_roots {
            if let Some(target_id) = dup_by_key.get(&(root.prefix, root.level_1.clone())) {
                decisions.push(RootDecision::Duplicate(target_id.clone()));
            } else {
                if target_ids.contains(&root.id) {
                    conflicts += 1;
                }
                decisions.push(RootDecision::New { final_id: root.id.clone() });
            }
        }
        let remapped = conflicts > 0;

        let mut next_seq: HashMap<char, u32> = HashMap::new();
        if remapped {
            for root in &source_roots {
                if next_seq.contains_key(&root.prefix) {
                    continue;
                }
                let seq: u32 = tx.query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM roots WHERE prefix = ?1",
                    params![root.prefix.to_string()],
                    |row| row.get(0),
                )?;
                next_seq.insert(root.prefix, seq);
            }
        }

        // id_map covers every source ID (root or node) -> its final target ID.
        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut final_root_id = HashMap::new();
        for (root, decision) in source_roots.iter().zip(decisions.iter()) {
            let final_id = match decision {
                RootDecision::Duplicate(target_id) => target_id.clone(),
                RootDecision::New { final_id } if !remapped => final_id.clone(),
                RootDecision::New { .. } => {
                    let seq = next_seq.entry(root.prefix).or_insert(1);
                    let id = format!("{}{:04}", root.prefix, *seq);
                    *seq += 1;
                    id
                }
            };
            id_map.insert(root.id.clone(), final_id.clone());
            final_root_id.insert(root.id.clone(), final_id);
        }

        // --- Phase 2: plan ------------------------------------------------
        let mut planned_nodes: Vec<PlannedNode> = Vec::new();
        let mut nodes_skipped = 0u32;
        let mut inserted = 0u32;
        let mut merged = 0u32;

        for (root, decision) in source_roots.iter().zip(decisions.iter()) {
            let target_root_id = final_root_id[&root.id].clone();

            let mut stmt = source.prepare(
                "SELECT * FROM nodes WHERE root_id = ?1 ORDER BY depth, seq",
            )?;
            let source_nodes = stmt
                .query_map(params![root.id], row_to_node)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);

            match decision {
                RootDecision::New { .. } => {
                    inserted += 1;
                    for node in &source_nodes {
                        let final_id = remap_prefix(&node.id, &root.id, &target_root_id);
                        let final_parent_id =
                            remap_prefix(&node.parent_id, &root.id, &target_root_id);
                        id_map.insert(node.id.clone(), final_id.clone());
                        planned_nodes.push(PlannedNode {
                            final_id,
                            final_parent_id,
                            final_root_id: target_root_id.clone(),
                            source_owner_id: node.id.clone(),
                            depth: node.depth,
                            seq: node.seq,
                            content: node.content.clone(),
                        });
                    }
                }
                RootDecision::Duplicate(target_id) => {
                    merged += 1;
                    let existing_contents: HashSet<String> = {
                        let mut stmt = tx.prepare(
                            "SELECT content FROM nodes WHERE root_id = ?1 AND depth = 2",
                        )?;
                        stmt.query_map(params![target_id], |row| row.get::<_, String>(0))?
                            .collect::<rusqlite::Result<_>>()?
                    };
                    let mut next_sibling_seq: u32 = tx.query_row(
                        "SELECT COALESCE(MAX(seq), 0) + 1 FROM nodes WHERE parent_id = ?1",
                        params![target_id],
                        |row| row.get(0),
                    )?;

                    let l2_children: Vec<_> =
                        source_nodes.iter().filter(|n| n.depth == 2).collect();
                    for child in l2_children {
                        if existing_contents.contains(&child.content) {
                            let skipped_descendants = source_nodes
                                .iter()
                                .filter(|n| n.id.starts_with(&format!("{}.", child.id)))
                                .count() as u32;
                            nodes_skipped += 1 + skipped_descendants;
                            continue;
                        }

                        let final_child_id = format!("{target_id}.{next_sibling_seq}");
                        id_map.insert(child.id.clone(), final_child_id.clone());
                        planned_nodes.push(PlannedNode {
                            final_id: final_child_id.clone(),
                            final_parent_id: target_id.clone(),
                            final_root_id: target_id.clone(),
                            source_owner_id: child.id.clone(),
                            depth: 2,
                            seq: next_sibling_seq,
                            content: child.content.clone(),
                        });
                        next_sibling_seq += 1;

                        for descendant in source_nodes
                            .iter()
                            .filter(|n| n.id.starts_with(&format!("{}.", child.id)))
                        {
                            let final_id =
                                remap_prefix(&descendant.id, &child.id, &final_child_id);
                            let final_parent_id =
                                remap_prefix(&descendant.parent_id, &child.id, &final_child_id);
                            id_map.insert(descendant.id.clone(), final_id.clone());
                            planned_nodes.push(PlannedNode {
                                final_id,
                                final_parent_id,
                                final_root_id: target_id.clone(),
                                source_owner_id: descendant.id.clone(),
                                depth: descendant.depth,
                                seq: descendant.seq,
                                content: descendant.content.clone(),
                            });
                        }
                    }
                }
            }
        }

        // --- Phase 3: commit ------------------------------------------------
        let now = format_timestamp(chrono::Utc::now());
        let mut tags_imported = 0u32;

        for (root, decision) in source_roots.iter().zip(decisions.iter()) {
            if let RootDecision::New { .. } = decision {
                let final_id = final_root_id[&root.id].clone();
                let level_1 = rewrite_tokens(&root.level_1, &id_map);
                let title = rewrite_tokens(&root.title, &id_map);
                let links: Vec<String> = root
                    .links
                    .iter()
                    .map(|l| id_map.get(l).cloned().unwrap_or_else(|| l.clone()))
                    .collect();
                let links_json = serde_json::to_string(&links).unwrap_or_else(|_| "[]".into());
                let seq: u32 = final_id[1..].parse().unwrap_or(root.seq);

                tx.execute(
                    "INSERT INTO roots
                        (id, prefix, seq, created_at, level_1, title, links, min_role,
                         obsolete, favorite, irrelevant, pinned)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        final_id,
                        root.prefix.to_string(),
                        seq,
                        now,
                        level_1,
                        title,
                        links_json,
                        root.min_role.to_string(),
                        root.obsolete,
                        root.favorite,
                        root.irrelevant,
                        root.pinned,
                    ],
                )?;

                tags_imported += copy_tags(&source, &tx, &root.id, &final_id)?;
            }
        }

        for node in &planned_nodes {
            let content = rewrite_tokens(&node.content, &id_map);
            let title = crate::tree::auto_extract_title(&content, self.config.max_title_chars);
            tx.execute(
                "INSERT INTO nodes (id, parent_id, root_id, depth, seq, content, title, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    node.final_id,
                    node.final_parent_id,
                    node.final_root_id,
                    node.depth as i64,
                    node.seq,
                    content,
                    title,
                    now,
                ],
            )?;
            tags_imported += copy_tags(&source, &tx, &node.source_owner_id, &node.final_id)?;
        }

        let nodes_inserted = planned_nodes.len() as u32;
        let summary = ImportSummary {
            inserted,
            merged,
            nodes_inserted,
            nodes_skipped,
            tags_imported,
            remapped,
            conflicts,
        };

        if dry_run {
            drop(tx);
        } else {
            tx.commit()?;
        }

        Ok(summary)
    }
}

/// Replace the `old_prefix` leading segment of `id` with `new_prefix`.
/// `id` is always either equal to `old_prefix` or starts with `old_prefix .`.
fn remap_prefix(id: &str, old_prefix: &str, new_prefix: &str) -> String {
    if id == old_prefix {
        new_prefix.to_string()
    } else {
        format!("{new_prefix}{}", &id[old_prefix.len()..])
    }
}

/// Rewrite every well-formed `[✓ID]` correction token in `text` through `map`.
fn rewrite_tokens(text: &str, map: &HashMap<String, String>) -> String {
    let marker = "[\u{2713}";
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(idx) = rest.find(marker) else {
            out.push_str(rest);
            break;
        };
        let (before, from_marker) = rest.split_at(idx);
        out.push_str(before);
        let after_marker = &from_marker[marker.len()..];
        match after_marker.find(']') {
            Some(end) => {
                let candidate = &after_marker[..end];
                if ids::is_valid_id(candidate) {
                    let mapped = map.get(candidate).map(String::as_str).unwrap_or(candidate);
                    out.push_str("[\u{2713}");
                    out.push_str(mapped);
                    out.push(']');
                    rest = &after_marker[end + 1..];
                } else {
                    out.push_str(marker);
                    rest = after_marker;
                }
            }
            None => {
                out.push_str(marker);
                rest = after_marker;
            }
        }
    }
    out
}

/// Copy every `(old_owner, tag)` row from `source` to `(new_owner, tag)` in
/// `tx`, skipping tags the target owner already carries. Returns the count
/// actually inserted.
fn copy_tags(source: &Connection, tx: &rusqlite::Transaction, old_owner: &str, new_owner: &str) -> Result<u32> {
    let mut stmt = source.prepare("SELECT tag FROM tags WHERE owner_id = ?1")?;
    let tags: Vec<String> = stmt
        .query_map(params![old_owner], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    let mut count = 0;
    for tag in tags {
        let changed = tx.execute(
            "INSERT OR IGNORE INTO tags (owner_id, tag) VALUES (?1, ?2)",
            params![new_owner, tag],
        )?;
        count += changed as u32;
    }
    Ok(count)
}
