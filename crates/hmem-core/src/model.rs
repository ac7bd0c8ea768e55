//! Data model: root entries, nodes, tags, and the in-memory `MemoryEntry` view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-level memory, identified by `PREFIX + 4-digit sequence` (e.g. `L0023`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootEntry {
    pub id: String,
    pub prefix: char,
    pub seq: u32,
    pub created_at: DateTime<Utc>,
    pub level_1: String,
    pub title: String,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub links: Vec<String>,
    pub min_role: crate::role::Role,
    pub obsolete: bool,
    pub favorite: bool,
    pub irrelevant: bool,
    pub pinned: bool,
}

/// A nested detail line under a root entry, identified by a dotted compound ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub parent_id: String,
    pub root_id: String,
    pub depth: u32,
    pub seq: u32,
    pub content: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub favorite: bool,
    pub irrelevant: bool,
}

/// A `(owner_id, tag)` association. `owner_id` is a root or node ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub owner_id: String,
    pub tag: String,
}

/// One of the "promoted" reasons a bulk-read entry can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Promoted {
    Favorite,
    Access,
}

/// The object returned to callers of [`crate::read::read`].
///
/// Not a subclass hierarchy — a record with optional fields. Whether an
/// entry was reached as a root, a node wrapped as an entry, or a
/// chain-resolved entry is visible only through inspection of its fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: String,
    pub prefix: char,
    pub created_at: DateTime<Utc>,
    pub level_1: String,
    pub title: String,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub obsolete: bool,
    pub favorite: bool,
    pub irrelevant: bool,
    pub pinned: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<MemoryEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_entries: Option<Vec<MemoryEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted: Option<Promoted>,
    pub expanded: bool,
    pub hidden_children_count: usize,
    pub hidden_obsolete_links: usize,
    pub hidden_irrelevant_links: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obsolete_chain: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_entries: Option<Vec<MemoryEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl MemoryEntry {
    /// Build the common shell of a `MemoryEntry` from a [`RootEntry`].
    pub fn from_root(root: &RootEntry) -> Self {
        Self {
            id: root.id.clone(),
            prefix: root.prefix,
            created_at: root.created_at,
            level_1: root.level_1.clone(),
            title: root.title.clone(),
            access_count: root.access_count,
            last_accessed: root.last_accessed,
            obsolete: root.obsolete,
            favorite: root.favorite,
            irrelevant: root.irrelevant,
            pinned: root.pinned,
            children: None,
            linked_entries: None,
            promoted: None,
            expanded: false,
            hidden_children_count: 0,
            hidden_obsolete_links: 0,
            hidden_irrelevant_links: 0,
            obsolete_chain: None,
            related_entries: None,
            tags: None,
        }
    }

    /// Wrap a [`Node`] as a `MemoryEntry` for uniform return shape. Carries
    /// the node's content in `level_1`; `prefix` is extracted from the root ID.
    pub fn from_node(node: &Node) -> Self {
        let prefix = node
            .root_id
            .chars()
            .next()
            .unwrap_or('?');
        Self {
            id: node.id.clone(),
            prefix,
            created_at: node.created_at,
            level_1: node.content.clone(),
            title: node.title.clone(),
            access_count: node.access_count,
            last_accessed: node.last_accessed,
            obsolete: false,
            favorite: node.favorite,
            irrelevant: node.irrelevant,
            pinned: false,
            children: None,
            linked_entries: None,
            promoted: None,
            expanded: false,
            hidden_children_count: 0,
            hidden_obsolete_links: 0,
            hidden_irrelevant_links: 0,
            obsolete_chain: None,
            related_entries: None,
            tags: None,
        }
    }
}
