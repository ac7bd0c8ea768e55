//! Read engine (C4).
//!
//! One dispatch point, [`read`], branching on which of `id` / `time_around`
//! / `search` is set in a [`ReadQuery`] — otherwise a bulk V2 selection
//! pass. Obsolete-chain following, link resolution, and the bulk selection
//! algorithm all live here; [`crate::store::Store`] only ever returns flat
//! rows.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::error::{HmemError, Result};
use crate::model::{MemoryEntry, Node, Promoted, RootEntry};
use crate::role::Role;
use crate::session::{Phase, SessionCache};
use crate::store::{ids, BulkFilters, Store};

/// The single `read(opts)` input. Exactly one of `id` / `time_around` /
/// `search` should be set; if none are, the call is a bulk read.
#[derive(Debug, Clone)]
pub struct ReadQuery {
    pub id: Option<String>,
    pub time_around: Option<String>,
    pub period: Option<String>,
    pub search: Option<String>,
    pub prefix: Option<char>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub tag: Option<String>,
    pub show_obsolete: bool,
    /// Curator-mode shortcut: expand everything, skip session-cache gating.
    pub show_all: bool,
    pub titles_only: bool,
    pub expand: bool,
    pub limit: Option<usize>,
    pub follow_obsolete: bool,
    pub show_obsolete_path: bool,
    pub link_depth: i32,
}

impl Default for ReadQuery {
    fn default() -> Self {
        Self {
            id: None,
            time_around: None,
            period: None,
            search: None,
            prefix: None,
            after: None,
            before: None,
            tag: None,
            show_obsolete: false,
            show_all: false,
            titles_only: false,
            expand: false,
            limit: None,
            follow_obsolete: true,
            show_obsolete_path: false,
            link_depth: 1,
        }
    }
}

/// Dispatch on `query`'s populated field.
pub fn read(
    store: &Store,
    session: &mut SessionCache,
    allowed_roles: Option<&[Role]>,
    query: &ReadQuery,
) -> Result<Vec<MemoryEntry>> {
    if let Some(id) = query.id.clone() {
        return read_by_id(store, allowed_roles, &id, query);
    }
    if let Some(reference) = query.time_around.clone() {
        return read_time_around(store, allowed_roles, &reference, query);
    }
    if let Some(needle) = query.search.clone() {
        return read_search(store, allowed_roles, &needle);
    }
    read_bulk(store, session, allowed_roles, query)
}

// ----------------------------------------------------------------------
// 4.4.1 By ID
// ----------------------------------------------------------------------

fn read_by_id(
    store: &Store,
    allowed_roles: Option<&[Role]>,
    id: &str,
    query: &ReadQuery,
) -> Result<Vec<MemoryEntry>> {
    if ids::is_node_id(id) {
        let node = store.get_node(id)?.ok_or_else(|| HmemError::NotFound(id.to_string()))?;
        store.bump_node_access(id)?;
        let mut entry = MemoryEntry::from_node(&node);
        let descendants = store.get_node_descendants(id, 1)?;
        let children = build_child_entries(&descendants, id);
        if !children.is_empty() {
            entry.children = Some(children);
        }
        entry.expanded = true;
        return Ok(vec![entry]);
    }

    if !ids::is_root_id(id) {
        return Err(HmemError::InvalidId(id.to_string()));
    }

    let root = store.get_root(id)?.ok_or_else(|| HmemError::NotFound(id.to_string()))?;
    check_role(allowed_roles, &root)?;

    if root.obsolete && query.follow_obsolete {
        let chain = walk_obsolete_chain(store, id)?;
        if chain.len() > 1 {
            let final_id = chain.last().unwrap().clone();
            if query.show_obsolete_path {
                let mut out = Vec::with_capacity(chain.len());
                for cid in &chain {
                    let mut entry = build_root_entry(store, allowed_roles, cid, query, true)?;
                    entry.obsolete_chain = Some(chain.clone());
                    out.push(entry);
                }
                store.bump_root_access(&final_id)?;
                return Ok(out);
            }
            store.bump_root_access(&final_id)?;
            let mut entry = build_root_entry(store, allowed_roles, &final_id, query, true)?;
            entry.obsolete_chain = Some(chain);
            return Ok(vec![entry]);
        }
    }

    store.bump_root_access(id)?;
    let entry = build_root_entry(store, allowed_roles, id, query, true)?;
    Ok(vec![entry])
}

fn check_role(allowed_roles: Option<&[Role]>, root: &RootEntry) -> Result<()> {
    if let Some(roles) = allowed_roles {
        if !roles.contains(&root.min_role) {
            return Err(HmemError::NotFound(root.id.clone()));
        }
    }
    Ok(())
}

/// Fetch one root as a fully populated [`MemoryEntry`]: children to the
/// requested depth, tags, resolved links (when `resolve_links_flag`), and
/// related-by-tag entries.
fn build_root_entry(
    store: &Store,
    allowed_roles: Option<&[Role]>,
    id: &str,
    query: &ReadQuery,
    resolve_links_flag: bool,
) -> Result<MemoryEntry> {
    let root = store.get_root(id)?.ok_or_else(|| HmemError::NotFound(id.to_string()))?;
    let mut entry = MemoryEntry::from_root(&root);
    entry.expanded = true;

    let depth = if query.expand { store.config.max_depth as u32 } else { 2 };
    let nodes = store.get_subtree_nodes(id, depth)?;
    let children = build_child_entries(&nodes, id);
    if !children.is_empty() {
        entry.children = Some(children);
    }

    let tags = store.get_tags(id)?;
    if !tags.is_empty() {
        entry.tags = Some(tags.clone());
    }

    if resolve_links_flag && !root.links.is_empty() {
        let mut visited = HashSet::new();
        visited.insert(id.to_string());
        let resolved = resolve_links(store, allowed_roles, &root.links, &mut visited, query.link_depth - 1, None);
        entry.linked_entries = if resolved.visible.is_empty() { None } else { Some(resolved.visible) };
        entry.hidden_obsolete_links = resolved.hidden_obsolete;
        entry.hidden_irrelevant_links = resolved.hidden_irrelevant;
    }

    if tags.len() >= 2 {
        let related = store.query_related_by_tags(&tags, id, allowed_roles)?;
        if !related.is_empty() {
            entry.related_entries =
                Some(related.into_iter().take(5).map(|r| MemoryEntry::from_root(&r)).collect());
        }
    }

    Ok(entry)
}

/// Nest a flat node list into a tree under `parent_id`, siblings ordered
/// by `seq`.
fn build_child_entries(nodes: &[Node], parent_id: &str) -> Vec<MemoryEntry> {
    let mut direct: Vec<&Node> = nodes.iter().filter(|n| n.parent_id == parent_id).collect();
    direct.sort_by_key(|n| n.seq);
    direct
        .into_iter()
        .map(|node| {
            let mut entry = MemoryEntry::from_node(node);
            let kids = build_child_entries(nodes, &node.id);
            if !kids.is_empty() {
                entry.expanded = true;
                entry.children = Some(kids);
            }
            entry
        })
        .collect()
}

/// Walk the `[✓ID]` chain from `start_id`, at most 10 hops, stopping at a
/// cycle, a missing/non-root target, or the first non-obsolete entry.
fn walk_obsolete_chain(store: &Store, start_id: &str) -> Result<Vec<String>> {
    let mut chain = vec![start_id.to_string()];
    let mut seen = HashSet::new();
    seen.insert(start_id.to_string());
    let mut current = start_id.to_string();

    for _ in 0..10 {
        let Some(root) = store.get_root(&current)? else { break };
        if !root.obsolete {
            break;
        }
        let Some(next) = ids::find_correction_token(&root.level_1) else { break };
        if !ids::is_root_id(&next) || seen.contains(&next) {
            break;
        }
        seen.insert(next.clone());
        chain.push(next.clone());
        current = next;
    }
    Ok(chain)
}

struct ResolvedLinks {
    visible: Vec<MemoryEntry>,
    hidden_obsolete: usize,
    hidden_irrelevant: usize,
}

/// Resolve a list of link targets, skipping anything already `visited`
/// (cycle guard) or, in a bulk context, already present in the bulk's own
/// visible set (`bulk_visible`, to avoid rendering the same entry twice).
fn resolve_links(
    store: &Store,
    allowed_roles: Option<&[Role]>,
    links: &[String],
    visited: &mut HashSet<String>,
    depth_left: i32,
    bulk_visible: Option<&HashSet<String>>,
) -> ResolvedLinks {
    let mut visible = Vec::new();
    let mut hidden_obsolete = 0;
    let mut hidden_irrelevant = 0;

    for link in links {
        if visited.contains(link) {
            continue;
        }
        if bulk_visible.is_some_and(|b| b.contains(link)) {
            continue;
        }
        visited.insert(link.clone());

        if ids::is_root_id(link) {
            let Ok(Some(target)) = store.get_root(link) else { continue };
            if let Some(roles) = allowed_roles {
                if !roles.contains(&target.min_role) {
                    continue;
                }
            }
            if target.irrelevant {
                hidden_irrelevant += 1;
                continue;
            }
            if target.obsolete {
                hidden_obsolete += 1;
                continue;
            }
            let mut entry = MemoryEntry::from_root(&target);
            if depth_left > 0 {
                let nested = resolve_links(store, allowed_roles, &target.links, visited, depth_left - 1, bulk_visible);
                entry.linked_entries = if nested.visible.is_empty() { None } else { Some(nested.visible) };
                entry.hidden_obsolete_links = nested.hidden_obsolete;
                entry.hidden_irrelevant_links = nested.hidden_irrelevant;
            }
            visible.push(entry);
        } else if ids::is_node_id(link) {
            if let Ok(Some(target)) = store.get_node(link) {
                if target.irrelevant {
                    hidden_irrelevant += 1;
                } else {
                    visible.push(MemoryEntry::from_node(&target));
                }
            }
        }
    }

    ResolvedLinks { visible, hidden_obsolete, hidden_irrelevant }
}

// ----------------------------------------------------------------------
// 4.4.2 Time-around
// ----------------------------------------------------------------------

fn read_time_around(
    store: &Store,
    allowed_roles: Option<&[Role]>,
    reference_id: &str,
    query: &ReadQuery,
) -> Result<Vec<MemoryEntry>> {
    if !ids::is_root_id(reference_id) {
        return Err(HmemError::InvalidId(reference_id.to_string()));
    }
    let reference = store
        .get_root(reference_id)?
        .ok_or_else(|| HmemError::NotFound(reference_id.to_string()))?;

    let window = parse_period(query.period.as_deref());
    let roots = store.query_time_around(&reference, window, allowed_roles)?;
    Ok(roots.into_iter().map(|r| MemoryEntry::from_root(&r)).collect())
}

/// `+Nh` / `-Nh` / `Nh` / `both` all produce a symmetric ±N-hour window;
/// `both` (and anything unparseable) defaults to ±2h.
fn parse_period(period: Option<&str>) -> Duration {
    let Some(raw) = period else { return Duration::hours(2) };
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("both") {
        return Duration::hours(2);
    }
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let hours: i64 = digits.parse().unwrap_or(2);
    Duration::hours(hours.max(0))
}

// ----------------------------------------------------------------------
// 4.4.3 Search
// ----------------------------------------------------------------------

fn read_search(store: &Store, allowed_roles: Option<&[Role]>, query: &str) -> Result<Vec<MemoryEntry>> {
    let roots = store.query_search(query, allowed_roles)?;
    for root in &roots {
        store.bump_root_access(&root.id)?;
    }
    Ok(roots.into_iter().map(|r| MemoryEntry::from_root(&r)).collect())
}

// ----------------------------------------------------------------------
// 4.4.4 Bulk (V2 selection)
// ----------------------------------------------------------------------

fn access_score(access_count: i64, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
    access_count as f64 / (age_days + 2.0).log2()
}

fn read_bulk(
    store: &Store,
    session: &mut SessionCache,
    allowed_roles: Option<&[Role]>,
    query: &ReadQuery,
) -> Result<Vec<MemoryEntry>> {
    let filters = BulkFilters {
        prefix: query.prefix,
        after: query.after,
        before: query.before,
        tag: query.tag.clone(),
        include_obsolete: query.show_obsolete || query.show_all,
        include_irrelevant: false,
    };
    let roots = store.query_bulk(&filters, allowed_roles)?;
    let narrowed = filters.prefix.is_some() || filters.after.is_some() || filters.before.is_some();
    if narrowed {
        for root in &roots {
            store.bump_root_access(&root.id)?;
        }
    }

    let now = Utc::now();

    if query.show_all {
        let bulk_visible: HashSet<String> = roots.iter().map(|r| r.id.clone()).collect();
        let mut out = Vec::new();
        for root in &roots {
            if root.obsolete && !query.show_obsolete {
                continue;
            }
            out.push(build_bulk_entry(store, allowed_roles, root, 3, &bulk_visible, None)?);
        }
        return Ok(out);
    }

    let mut obsolete = Vec::new();
    let mut by_prefix: BTreeMap<char, Vec<RootEntry>> = BTreeMap::new();
    for root in roots {
        if root.obsolete {
            obsolete.push(root);
        } else {
            by_prefix.entry(root.prefix).or_default().push(root);
        }
    }

    let slot_fraction = session.slot_fraction();
    let mut expanded_ids: HashSet<String> = HashSet::new();
    let mut access_selected: HashSet<String> = HashSet::new();

    for group in by_prefix.values() {
        let eligible: Vec<&RootEntry> = group
            .iter()
            .filter(|r| !matches!(session.phase_of(&r.id, now, &store.config), Phase::Hidden | Phase::TitleOnly))
            .collect();

        let (newest_n, access_n) = store.config.bulk_read_v2.slot_counts(group.len(), slot_fraction);

        // `group` (and so `eligible`) already arrives newest-effective-date
        // first, courtesy of `Store::query_bulk`'s ORDER BY.
        for r in eligible.iter().take(newest_n) {
            expanded_ids.insert(r.id.clone());
        }

        let mut remaining: Vec<&RootEntry> =
            eligible.into_iter().filter(|r| !expanded_ids.contains(&r.id)).collect();
        remaining.sort_by(|a, b| {
            access_score(b.access_count, b.created_at, now)
                .partial_cmp(&access_score(a.access_count, a.created_at, now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for r in remaining.into_iter().filter(|r| r.access_count >= 2).take(access_n) {
            expanded_ids.insert(r.id.clone());
            access_selected.insert(r.id.clone());
        }
    }

    for group in by_prefix.values() {
        for r in group {
            if (r.favorite || r.pinned) && session.phase_of(&r.id, now, &store.config) != Phase::Hidden {
                expanded_ids.insert(r.id.clone());
            }
        }
    }

    let mut title_only_ids: HashSet<String> = HashSet::new();
    for group in by_prefix.values() {
        for r in group {
            if expanded_ids.contains(&r.id) {
                continue;
            }
            if session.phase_of(&r.id, now, &store.config) == Phase::TitleOnly {
                title_only_ids.insert(r.id.clone());
            }
        }
    }

    let mut bulk_visible: HashSet<String> = expanded_ids.clone();
    bulk_visible.extend(title_only_ids.iter().cloned());

    let mut out = Vec::new();
    for group in by_prefix.values() {
        for r in group {
            if expanded_ids.contains(&r.id) {
                let mut entry = if query.titles_only {
                    MemoryEntry::from_root(r)
                } else {
                    build_bulk_entry(store, allowed_roles, r, 3, &bulk_visible, Some((slot_fraction, now)))?
                };
                entry.expanded = true;
                entry.promoted = if r.favorite {
                    Some(Promoted::Favorite)
                } else if access_selected.contains(&r.id) {
                    Some(Promoted::Access)
                } else {
                    None
                };
                out.push(entry);
            } else if title_only_ids.contains(&r.id) {
                let mut entry = MemoryEntry::from_root(r);
                entry.expanded = false;
                out.push(entry);
            }
        }
    }

    if query.show_obsolete {
        out.extend(obsolete.iter().map(MemoryEntry::from_root));
    }

    let delivered_ids: Vec<String> = out.iter().map(|e| e.id.clone()).collect();
    let promoted_ids: Vec<String> =
        out.iter().filter(|e| e.promoted.is_some()).map(|e| e.id.clone()).collect();
    session.register_delivered(&delivered_ids, &promoted_ids, now);

    let limit = query.limit.unwrap_or(store.config.default_read_limit);
    out.truncate(limit);

    Ok(out)
}

/// One expanded bulk entry: L2+ children to `children_depth`, links
/// resolved against the bulk's own visible set to avoid double-rendering.
///
/// `child_selection`, when set, carries the `(slot_fraction, now)` pair
/// needed to apply the same newest/access/favorite selection to the L2
/// children that `read_bulk` applies to roots (spec step 7); the curator
/// `showAll` shortcut passes `None` and gets the full unfiltered subtree.
fn build_bulk_entry(
    store: &Store,
    allowed_roles: Option<&[Role]>,
    root: &RootEntry,
    children_depth: u32,
    bulk_visible: &HashSet<String>,
    child_selection: Option<(f64, DateTime<Utc>)>,
) -> Result<MemoryEntry> {
    let mut entry = MemoryEntry::from_root(root);
    let nodes = store.get_subtree_nodes(&root.id, children_depth)?;

    match child_selection {
        Some((slot_fraction, now)) => {
            let (children, hidden) =
                select_child_entries(&nodes, &root.id, slot_fraction, now, &store.config.bulk_read_v2);
            entry.hidden_children_count = hidden;
            if !children.is_empty() {
                entry.children = Some(children);
            }
        }
        None => {
            let children = build_child_entries(&nodes, &root.id);
            if !children.is_empty() {
                entry.children = Some(children);
            }
        }
    }

    if !root.links.is_empty() {
        let mut visited = HashSet::new();
        visited.insert(root.id.clone());
        let resolved = resolve_links(store, allowed_roles, &root.links, &mut visited, 0, Some(bulk_visible));
        entry.linked_entries = if resolved.visible.is_empty() { None } else { Some(resolved.visible) };
        entry.hidden_obsolete_links = resolved.hidden_obsolete;
        entry.hidden_irrelevant_links = resolved.hidden_irrelevant;
    }

    Ok(entry)
}

/// Apply the newest/most-accessed/favorite selection from step 5-6 of the
/// bulk algorithm to `parent_id`'s direct children instead of a prefix
/// group of roots, returning the expanded subset (nested to whatever
/// depth `nodes` already carries) and how many non-irrelevant children
/// were left out of it.
fn select_child_entries(
    nodes: &[Node],
    parent_id: &str,
    slot_fraction: f64,
    now: DateTime<Utc>,
    bulk_read_v2: &crate::config::BulkReadV2Config,
) -> (Vec<MemoryEntry>, usize) {
    let mut direct: Vec<&Node> = nodes.iter().filter(|n| n.parent_id == parent_id && !n.irrelevant).collect();
    direct.sort_by_key(|n| n.seq);

    let (newest_n, access_n) = bulk_read_v2.slot_counts(direct.len(), slot_fraction);

    let mut by_newest = direct.clone();
    by_newest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let mut selected: HashSet<String> = by_newest.iter().take(newest_n).map(|n| n.id.clone()).collect();

    let mut remaining: Vec<&Node> = direct.iter().copied().filter(|n| !selected.contains(&n.id)).collect();
    remaining.sort_by(|a, b| {
        access_score(b.access_count, b.created_at, now)
            .partial_cmp(&access_score(a.access_count, a.created_at, now))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for n in remaining.into_iter().filter(|n| n.access_count >= 2).take(access_n) {
        selected.insert(n.id.clone());
    }

    for n in &direct {
        if n.favorite {
            selected.insert(n.id.clone());
        }
    }

    let hidden = direct.len().saturating_sub(selected.len());

    let children = direct
        .into_iter()
        .filter(|n| selected.contains(&n.id))
        .map(|node| {
            let mut entry = MemoryEntry::from_node(node);
            let kids = build_child_entries(nodes, &node.id);
            if !kids.is_empty() {
                entry.expanded = true;
                entry.children = Some(kids);
            }
            entry
        })
        .collect();

    (children, hidden)
}
