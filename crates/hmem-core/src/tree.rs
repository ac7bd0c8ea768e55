//! Tree parser (C2).
//!
//! Converts tab/space-indented text into `(title, level_1, nodes[])` with
//! compound IDs anchored to a root. Two entry points: [`parse_absolute`]
//! (for a new root) and [`parse_relative`] (for appending under an existing
//! live parent).

use std::collections::HashMap;

use crate::error::{HmemError, Result};

/// One parsed node, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNode {
    pub id: String,
    pub parent_id: String,
    pub depth: usize,
    pub seq: u32,
    pub content: String,
    pub title: String,
}

/// The result of parsing a full memory's content block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTree {
    pub title: String,
    pub level_1: String,
    pub nodes: Vec<ParsedNode>,
}

#[derive(Debug, Clone, Copy)]
enum IndentUnit {
    Tab,
    Spaces(usize),
}

fn detect_indent_unit(raw_lines: &[&str]) -> IndentUnit {
    if raw_lines.iter().any(|l| l.starts_with('\t')) {
        return IndentUnit::Tab;
    }
    for line in raw_lines {
        let spaces = line.chars().take_while(|c| *c == ' ').count();
        if spaces > 0 {
            return IndentUnit::Spaces(spaces);
        }
    }
    IndentUnit::Spaces(4)
}

fn indent_level(line: &str, unit: IndentUnit) -> usize {
    match unit {
        IndentUnit::Tab => line.chars().take_while(|c| *c == '\t').count(),
        IndentUnit::Spaces(n) => {
            if n == 0 {
                0
            } else {
                let spaces = line.chars().take_while(|c| *c == ' ').count();
                spaces / n
            }
        }
    }
}

/// Extract the auto-title from a single line: prefer the text before
/// `" — "` if it fits within `max_title_chars`, else truncate at a word
/// boundary, else hard-truncate.
pub fn auto_extract_title(line: &str, max_title_chars: usize) -> String {
    let line = line.trim();

    if let Some(idx) = line.find(" — ") {
        let candidate = &line[..idx];
        if candidate.chars().count() <= max_title_chars {
            return candidate.to_string();
        }
    }

    if line.chars().count() <= max_title_chars {
        return line.to_string();
    }

    let truncated: String = line.chars().take(max_title_chars).collect();
    if let Some(pos) = truncated.rfind(' ') {
        truncated[..pos].to_string()
    } else {
        truncated
    }
}

/// Map a raw tab/indent count to a tree depth, collapsing anything past
/// `max_depth - 1` tabs into the deepest allowed level.
fn depth_for_indent(indent: usize, max_depth: usize) -> usize {
    let max_depth = max_depth.max(1);
    indent.min(max_depth.saturating_sub(1)) + 1
}

/// Parse a fresh root's content block. `root_id` anchors compound IDs for
/// any depth >= 2 lines (the depth-1 lines become the root's own title/level_1
/// instead of nodes).
pub fn parse_absolute(text: &str, root_id: &str, max_depth: usize, max_title_chars: usize) -> Result<ParsedTree> {
    let raw_lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if raw_lines.is_empty() {
        return Err(HmemError::EmptyContent);
    }

    let unit = detect_indent_unit(&raw_lines);

    let mut l1_lines: Vec<String> = Vec::new();
    let mut rest: Vec<(usize, String)> = Vec::new();

    for line in &raw_lines {
        let indent = indent_level(line, unit);
        let content = line.trim().to_string();
        if indent == 0 {
            l1_lines.push(content);
        } else {
            let depth = depth_for_indent(indent, max_depth);
            rest.push((depth, content));
        }
    }

    if l1_lines.is_empty() {
        return Err(HmemError::EmptyContent);
    }

    let (title, level_1) = if l1_lines.len() == 1 {
        let only = &l1_lines[0];
        (auto_extract_title(only, max_title_chars), only.clone())
    } else {
        let title = l1_lines[0].clone();
        let level_1 = l1_lines[1..].join(" | ");
        (title, level_1)
    };

    let mut seq_at_parent: HashMap<String, u32> = HashMap::new();
    let mut last_id_at_depth: HashMap<usize, String> = HashMap::new();
    last_id_at_depth.insert(1, root_id.to_string());

    let mut nodes = Vec::with_capacity(rest.len());
    for (depth, content) in rest {
        let parent_id = if depth == 2 {
            root_id.to_string()
        } else {
            last_id_at_depth
                .get(&(depth - 1))
                .cloned()
                .unwrap_or_else(|| root_id.to_string())
        };

        let seq = {
            let e = seq_at_parent.entry(parent_id.clone()).or_insert(0);
            *e += 1;
            *e
        };
        let id = format!("{parent_id}.{seq}");
        last_id_at_depth.insert(depth, id.clone());

        nodes.push(ParsedNode {
            title: auto_extract_title(&content, max_title_chars),
            id,
            parent_id,
            depth,
            seq,
            content,
        });
    }

    Ok(ParsedTree {
        title,
        level_1,
        nodes,
    })
}

/// Parse content to be appended under a live parent (root or node).
///
/// `parent_depth` is the depth of the parent itself (1 for a root),
/// `start_seq` is the next free sibling sequence under that parent (from
/// `MAX(seq)+1` in storage). Lines whose absolute depth would exceed
/// `max_depth` are silently discarded.
pub fn parse_relative(
    text: &str,
    parent_id: &str,
    parent_depth: usize,
    start_seq: u32,
    max_depth: usize,
    max_title_chars: usize,
) -> Vec<ParsedNode> {
    let raw_lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if raw_lines.is_empty() {
        return Vec::new();
    }
    let unit = detect_indent_unit(&raw_lines);

    let mut seq_at_parent: HashMap<String, u32> = HashMap::new();
    seq_at_parent.insert(parent_id.to_string(), start_seq.saturating_sub(1));

    let mut last_id_at_depth: HashMap<usize, String> = HashMap::new();
    last_id_at_depth.insert(parent_depth, parent_id.to_string());

    let mut nodes = Vec::new();
    for line in raw_lines {
        let indent = indent_level(line, unit);
        let depth = parent_depth + 1 + indent;
        if depth > max_depth {
            continue;
        }
        let content = line.trim().to_string();

        let parent = if depth == parent_depth + 1 {
            parent_id.to_string()
        } else {
            last_id_at_depth
                .get(&(depth - 1))
                .cloned()
                .unwrap_or_else(|| parent_id.to_string())
        };

        let seq = {
            let e = seq_at_parent.entry(parent.clone()).or_insert(0);
            *e += 1;
            *e
        };
        let id = format!("{parent}.{seq}");
        last_id_at_depth.insert(depth, id.clone());

        nodes.push(ParsedNode {
            title: auto_extract_title(&content, max_title_chars),
            id,
            parent_id: parent,
            depth,
            seq,
            content,
        });
    }
    nodes
}
