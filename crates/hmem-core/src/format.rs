//! Formatter (C6).
//!
//! Renders [`MemoryEntry`] trees into compact text for an agent audience, or
//! a verbose variant for the curator role. Two entry points: [`format_entry`]
//! for a single by-ID/time-around/search result, and [`format_bulk`] for the
//! prefix-grouped bulk listing.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::config::HmemConfig;
use crate::model::{MemoryEntry, Promoted};

/// Render a bulk read result: grouped by prefix, each group headed by its
/// configured description and a `(shown/total)` count, with a trailing
/// hidden-obsolete-count line.
pub fn format_bulk(config: &HmemConfig, entries: &[MemoryEntry], curator: bool) -> String {
    let mut by_prefix: Vec<(char, Vec<&MemoryEntry>)> = Vec::new();
    let mut hidden_obsolete = 0usize;

    for entry in entries {
        if entry.obsolete {
            hidden_obsolete += 1;
            continue;
        }
        match by_prefix.iter_mut().find(|(p, _)| *p == entry.prefix) {
            Some((_, group)) => group.push(entry),
            None => by_prefix.push((entry.prefix, vec![entry])),
        }
    }
    by_prefix.sort_by_key(|(p, _)| *p);

    let mut out = String::new();
    for (prefix, group) in &by_prefix {
        let label = config
            .prefix_descriptions
            .get(prefix)
            .cloned()
            .unwrap_or_else(|| prefix.to_string());
        let shown = group.len();
        let _ = writeln!(out, "## {label} ({shown}/{shown})");
        for entry in group {
            write_entry(&mut out, entry, 0, curator);
        }
        out.push('\n');
    }

    let obsolete_tail: usize = entries.iter().filter(|e| e.obsolete).count();
    debug_assert_eq!(obsolete_tail, hidden_obsolete);
    if hidden_obsolete > 0 {
        let _ = writeln!(out, "({hidden_obsolete} obsolete entries hidden)");
    }

    out
}

/// Render a single entry (by-ID, time-around, or search result) plus its
/// linked entries.
pub fn format_entry(entry: &MemoryEntry, curator: bool) -> String {
    let mut out = String::new();
    write_entry(&mut out, entry, 0, curator);

    if let Some(links) = entry.linked_entries.as_ref().filter(|l| !l.is_empty()) {
        out.push_str("--- Linked entries ---\n");
        for linked in links {
            write_entry(&mut out, linked, 0, curator);
            if let Some(children) = linked.children.as_ref() {
                for child in children {
                    write_drill_hint(&mut out, child, 1);
                }
            }
        }
    }

    out
}

fn write_entry(out: &mut String, entry: &MemoryEntry, indent: usize, curator: bool) {
    let pad = "  ".repeat(indent);
    let marker = promoted_marker(entry.promoted, curator);
    let obsolete_marker = if entry.obsolete {
        if curator { " [⚠ OBSOLETE]" } else { " [!]" }
    } else {
        ""
    };

    if curator {
        let role_tag = "";
        let _ = writeln!(
            out,
            "{pad}{id} {date}{marker}{obsolete_marker} (accessed {access}x){role_tag}  {text}",
            id = entry.id,
            date = entry.created_at.to_rfc3339(),
            marker = marker,
            access = entry.access_count,
            text = entry.level_1,
        );
    } else {
        let _ = writeln!(
            out,
            "{pad}{id} {date}{marker}{obsolete_marker}  {text}",
            id = entry.id,
            date = short_date(entry.created_at),
            marker = marker,
            text = entry.level_1,
        );
    }

    write_children(out, entry, indent + 1, curator);
}

fn write_children(out: &mut String, entry: &MemoryEntry, indent: usize, curator: bool) {
    let Some(children) = entry.children.as_ref() else {
        return;
    };

    if entry.expanded {
        for child in children {
            write_entry(out, child, indent, curator);
        }
        if entry.hidden_children_count > 0 {
            let pad = "  ".repeat(indent);
            let _ = writeln!(
                out,
                "{pad}[+{n} more → {id}]",
                n = entry.hidden_children_count,
                id = entry.id,
            );
        }
    } else if let Some(first) = children.first() {
        write_entry(out, first, indent, curator);
        let remaining = children.len().saturating_sub(1) + entry.hidden_children_count;
        if remaining > 0 {
            let pad = "  ".repeat(indent);
            let _ = writeln!(out, "{pad}[+{remaining} more → {id}]", id = entry.id);
        }
    }
}

fn write_drill_hint(out: &mut String, entry: &MemoryEntry, indent: usize) {
    let pad = "  ".repeat(indent);
    let _ = writeln!(out, "{pad}[+ → {id}]  {text}", id = entry.id, text = entry.level_1);
}

fn promoted_marker(promoted: Option<Promoted>, curator: bool) -> &'static str {
    match (promoted, curator) {
        (Some(Promoted::Favorite), _) => " [♥]",
        (Some(Promoted::Access), _) => " [★]",
        (None, _) => "",
    }
}

fn short_date(ts: DateTime<Utc>) -> String {
    ts.format("%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HmemConfig;
    use crate::model::RootEntry;
    use crate::role::Role;

    fn sample_root(id: &str, prefix: char, text: &str) -> RootEntry {
        RootEntry {
            id: id.to_string(),
            prefix,
            seq: 1,
            created_at: Utc::now(),
            level_1: text.to_string(),
            title: text.to_string(),
            access_count: 0,
            last_accessed: None,
            links: Vec::new(),
            min_role: Role::Worker,
            obsolete: false,
            favorite: false,
            irrelevant: false,
            pinned: false,
        }
    }

    #[test]
    fn compact_entry_includes_short_date_and_text() {
        let entry = MemoryEntry::from_root(&sample_root("P0001", 'P', "ship the thing"));
        let rendered = format_entry(&entry, false);
        assert!(rendered.contains("P0001"));
        assert!(rendered.contains("ship the thing"));
        assert!(!rendered.contains("OBSOLETE"));
    }

    #[test]
    fn obsolete_marker_differs_by_mode() {
        let mut root = sample_root("P0002", 'P', "dead end");
        root.obsolete = true;
        let entry = MemoryEntry::from_root(&root);
        assert!(format_entry(&entry, false).contains("[!]"));
        assert!(format_entry(&entry, true).contains("[⚠ OBSOLETE]"));
    }

    #[test]
    fn promoted_markers_render() {
        let mut entry = MemoryEntry::from_root(&sample_root("L0001", 'L', "lesson"));
        entry.promoted = Some(Promoted::Favorite);
        assert!(format_entry(&entry, false).contains("[♥]"));
        entry.promoted = Some(Promoted::Access);
        assert!(format_entry(&entry, false).contains("[★]"));
    }

    #[test]
    fn bulk_groups_by_prefix_and_counts_hidden_obsolete() {
        let config = HmemConfig::default();
        let mut obsolete_root = sample_root("P0002", 'P', "old");
        obsolete_root.obsolete = true;
        let entries = vec![
            MemoryEntry::from_root(&sample_root("P0001", 'P', "alpha")),
            MemoryEntry::from_root(&obsolete_root),
            MemoryEntry::from_root(&sample_root("L0001", 'L', "beta")),
        ];
        let rendered = format_bulk(&config, &entries, false);
        assert!(rendered.contains("Project"));
        assert!(rendered.contains("Lesson"));
        assert!(rendered.contains("1 obsolete entries hidden"));
    }

    #[test]
    fn non_expanded_entry_with_children_shows_drill_hint() {
        let mut entry = MemoryEntry::from_root(&sample_root("P0003", 'P', "parent"));
        entry.children = Some(vec![
            MemoryEntry::from_root(&sample_root("P0003.1", 'P', "first child")),
            MemoryEntry::from_root(&sample_root("P0003.2", 'P', "second child")),
        ]);
        entry.expanded = false;
        let rendered = format_entry(&entry, false);
        assert!(rendered.contains("first child"));
        assert!(rendered.contains("[+1 more → P0003]"));
    }
}
