//! Store (C3): schema, connection lifecycle, and the CRUD surface every
//! other module is built on.
//!
//! A single `Mutex<Connection>` — the concurrency model (one cooperative
//! writer per process, serialized tool calls) never needs a reader/writer
//! split. All multi-statement operations run inside one transaction.

pub mod ids;
pub mod import;
pub mod migrations;
pub mod tags;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::config::HmemConfig;
use crate::error::{HmemError, Result};
use crate::model::{Node, RootEntry};
use crate::role::{Role, StoreKind};
use crate::tree::{auto_extract_title, parse_absolute, parse_relative};

/// Render a timestamp the way every stored column expects it: millisecond
/// precision, `Z` suffix, fixed width — lexicographic order matches
/// chronological order, which the bulk-read `ORDER BY` relies on.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str, field: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid {field} timestamp '{value}': {e}"),
                )),
            )
        })
}

fn parse_timestamp_opt(value: Option<String>, field: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|s| parse_timestamp(&s, field)).transpose()
}

fn row_to_root(row: &rusqlite::Row) -> rusqlite::Result<RootEntry> {
    let prefix_str: String = row.get("prefix")?;
    let created_at: String = row.get("created_at")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;
    let links_json: String = row.get("links")?;
    let min_role_str: String = row.get("min_role")?;

    Ok(RootEntry {
        id: row.get("id")?,
        prefix: prefix_str.chars().next().unwrap_or('?'),
        seq: row.get("seq")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        level_1: row.get("level_1")?,
        title: row.get("title")?,
        access_count: row.get("access_count")?,
        last_accessed: parse_timestamp_opt(last_accessed, "last_accessed")?,
        links: serde_json::from_str(&links_json).unwrap_or_default(),
        min_role: min_role_str.parse().unwrap_or(Role::Worker),
        obsolete: row.get("obsolete")?,
        favorite: row.get("favorite")?,
        irrelevant: row.get("irrelevant")?,
        pinned: row.get("pinned")?,
    })
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<Node> {
    let created_at: String = row.get("created_at")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;

    Ok(Node {
        id: row.get("id")?,
        parent_id: row.get("parent_id")?,
        root_id: row.get("root_id")?,
        depth: row.get("depth")?,
        seq: row.get("seq")?,
        content: row.get("content")?,
        title: row.get("title")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        access_count: row.get("access_count")?,
        last_accessed: parse_timestamp_opt(last_accessed, "last_accessed")?,
        favorite: row.get("favorite")?,
        irrelevant: row.get("irrelevant")?,
    })
}

/// Bulk-query filters, applied in [`Store::query_bulk`].
#[derive(Debug, Clone, Default)]
pub struct BulkFilters {
    pub prefix: Option<char>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub tag: Option<String>,
    pub include_obsolete: bool,
    pub include_irrelevant: bool,
}

/// Aggregate counters returned by [`Store::stats`].
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub root_count: u64,
    pub node_count: u64,
    pub obsolete_count: u64,
    pub favorite_count: u64,
    pub tag_count: u64,
}

/// A single memory store backed by one SQLite file.
pub struct Store {
    conn: Mutex<Connection>,
    pub config: HmemConfig,
    pub kind: StoreKind,
    path: PathBuf,
    corrupted: bool,
}

impl Store {
    fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
    }

    fn check_integrity(conn: &Connection) -> rusqlite::Result<bool> {
        let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result.eq_ignore_ascii_case("ok"))
    }

    fn backup_corrupt(path: &Path) -> std::io::Result<PathBuf> {
        let backup = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.corrupt", ext.to_string_lossy()),
            None => "corrupt".to_string(),
        });
        std::fs::copy(path, &backup)?;
        Ok(backup)
    }

    /// Open (creating if absent) the store at `path`. Runs the integrity
    /// check, migrations, and header-row seeding. A failed integrity check
    /// does not error the open — it flips `corrupted`, after which every
    /// write refuses with [`HmemError::DbCorrupted`]; reads still work
    /// against whatever the file last held.
    pub fn open(path: PathBuf, config: HmemConfig, kind: StoreKind) -> Result<Self> {
        let existed = path.exists();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;

        #[cfg(unix)]
        if !existed {
            use std::os::unix::fs::PermissionsExt;
            if path.exists() {
                let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
            }
        }

        Self::configure_connection(&conn)?;

        let mut corrupted = false;
        if existed {
            let intact = Self::check_integrity(&conn).unwrap_or(false);
            if !intact {
                let backup = Self::backup_corrupt(&path)?;
                tracing::warn!(
                    "integrity check failed for {}, backed up to {}",
                    path.display(),
                    backup.display()
                );
                corrupted = true;
            }
        }

        if !corrupted {
            migrations::apply_migrations(&conn)?;
            Self::ensure_headers(&conn, &config)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            config,
            kind,
            path,
            corrupted,
        })
    }

    /// Seed one `seq = 0` header row per configured prefix, if missing.
    /// Depends on the runtime-loaded config, so it cannot live in the
    /// static migration SQL.
    fn ensure_headers(conn: &Connection, config: &HmemConfig) -> rusqlite::Result<()> {
        let now = format_timestamp(Utc::now());
        for (prefix, label) in &config.prefixes {
            let id = format!("{prefix}0000");
            conn.execute(
                "INSERT OR IGNORE INTO roots
                    (id, prefix, seq, created_at, level_1, title, links, min_role)
                 VALUES (?1, ?2, 0, ?3, ?4, ?4, '[]', 'worker')",
                params![id, prefix.to_string(), now, label],
            )?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    fn guard(&self) -> Result<()> {
        if self.corrupted {
            return Err(HmemError::DbCorrupted(format!(
                "{} failed its integrity check",
                self.path.display()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create a new root entry, parsing `content` into its tree.
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        prefix: char,
        content: &str,
        links: Vec<String>,
        min_role: Role,
        favorite: bool,
        pinned: bool,
        tags_in: &[String],
    ) -> Result<String> {
        self.guard()?;
        if !self.config.prefixes.contains_key(&prefix) {
            return Err(HmemError::InvalidPrefix(prefix.to_string()));
        }
        let tags = tags::normalize_tags(tags_in)?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let seq: u32 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM roots WHERE prefix = ?1",
            params![prefix.to_string()],
            |row| row.get(0),
        )?;
        let id = format!("{prefix}{seq:04}");

        let tree = parse_absolute(content, &id, self.config.max_depth, self.config.max_title_chars)?;

        let l1_limit = self.config.tolerant_limit_for_depth(1);
        if tree.level_1.chars().count() > l1_limit {
            return Err(HmemError::CharLimitExceeded {
                got: tree.level_1.chars().count(),
                limit: l1_limit,
            });
        }
        for node in &tree.nodes {
            let limit = self.config.tolerant_limit_for_depth(node.depth);
            if node.content.chars().count() > limit {
                return Err(HmemError::CharLimitExceeded {
                    got: node.content.chars().count(),
                    limit,
                });
            }
        }

        let now = format_timestamp(Utc::now());
        let links_json = serde_json::to_string(&links).unwrap_or_else(|_| "[]".into());

        tx.execute(
            "INSERT INTO roots
                (id, prefix, seq, created_at, level_1, title, links, min_role, favorite, pinned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                prefix.to_string(),
                seq,
                now,
                tree.level_1,
                tree.title,
                links_json,
                min_role.to_string(),
                favorite,
                pinned,
            ],
        )?;

        for node in &tree.nodes {
            tx.execute(
                "INSERT INTO nodes (id, parent_id, root_id, depth, seq, content, title, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    node.id,
                    node.parent_id,
                    id,
                    node.depth as i64,
                    node.seq,
                    node.content,
                    node.title,
                    now,
                ],
            )?;
        }

        for tag in &tags {
            tx.execute(
                "INSERT OR IGNORE INTO tags (owner_id, tag) VALUES (?1, ?2)",
                params![id, tag],
            )?;
        }

        tx.commit()?;
        Ok(id)
    }

    /// Append relative content under a live parent (root or node), bumping
    /// the direct parent's access counter and, for a node parent, the
    /// owning root's as well (the bubble-up touches only the direct parent
    /// and the root, never the whole ancestor chain).
    pub fn append_children(&self, parent_id: &str, content: &str) -> Result<Vec<String>> {
        self.guard()?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let (parent_depth, root_id) = if ids::is_root_id(parent_id) {
            if !Self::root_exists(&tx, parent_id)? {
                return Err(HmemError::NotFound(parent_id.to_string()));
            }
            (1usize, parent_id.to_string())
        } else if ids::is_node_id(parent_id) {
            let root_id: Option<String> = tx
                .query_row(
                    "SELECT root_id FROM nodes WHERE id = ?1",
                    params![parent_id],
                    |row| row.get(0),
                )
                .optional()?;
            let root_id = root_id.ok_or_else(|| HmemError::NotFound(parent_id.to_string()))?;
            (ids::depth_of(parent_id), root_id)
        } else {
            return Err(HmemError::InvalidId(parent_id.to_string()));
        };

        let start_seq: u32 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM nodes WHERE parent_id = ?1",
            params![parent_id],
            |row| row.get(0),
        )?;

        let nodes = parse_relative(
            content,
            parent_id,
            parent_depth,
            start_seq,
            self.config.max_depth,
            self.config.max_title_chars,
        );
        if nodes.is_empty() {
            return Err(HmemError::EmptyContent);
        }
        for node in &nodes {
            let limit = self.config.tolerant_limit_for_depth(node.depth);
            if node.content.chars().count() > limit {
                return Err(HmemError::CharLimitExceeded {
                    got: node.content.chars().count(),
                    limit,
                });
            }
        }

        let now = format_timestamp(Utc::now());
        let mut new_ids = Vec::with_capacity(nodes.len());
        for node in &nodes {
            tx.execute(
                "INSERT INTO nodes (id, parent_id, root_id, depth, seq, content, title, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    node.id,
                    node.parent_id,
                    root_id,
                    node.depth as i64,
                    node.seq,
                    node.content,
                    node.title,
                    now,
                ],
            )?;
            new_ids.push(node.id.clone());
        }

        if ids::is_node_id(parent_id) {
            tx.execute(
                "UPDATE nodes SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
                params![now, parent_id],
            )?;
        }
        tx.execute(
            "UPDATE roots SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
            params![now, root_id],
        )?;

        tx.commit()?;
        Ok(new_ids)
    }

    /// Update a node's content, favorite/irrelevant flags, and tags. Nodes
    /// carry no obsolete protocol — only roots do.
    pub fn update_node(
        &self,
        id: &str,
        content: Option<&str>,
        favorite: Option<bool>,
        irrelevant: Option<bool>,
        tags_in: Option<&[String]>,
    ) -> Result<()> {
        self.guard()?;
        let depth = ids::depth_of(id);
        let limit = self.config.tolerant_limit_for_depth(depth);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        if let Some(content) = content {
            if content.chars().count() > limit {
                return Err(HmemError::CharLimitExceeded {
                    got: content.chars().count(),
                    limit,
                });
            }
            let title = auto_extract_title(content, self.config.max_title_chars);
            let changed = tx.execute(
                "UPDATE nodes SET content = ?1, title = ?2 WHERE id = ?3",
                params![content, title, id],
            )?;
            if changed == 0 {
                return Err(HmemError::NotFound(id.to_string()));
            }
        } else if !Self::node_exists(&tx, id)? {
            return Err(HmemError::NotFound(id.to_string()));
        }

        if let Some(favorite) = favorite {
            tx.execute("UPDATE nodes SET favorite = ?1 WHERE id = ?2", params![favorite, id])?;
        }
        if let Some(irrelevant) = irrelevant {
            tx.execute("UPDATE nodes SET irrelevant = ?1 WHERE id = ?2", params![irrelevant, id])?;
        }
        if let Some(tags_in) = tags_in {
            Self::replace_tags(&tx, id, tags_in)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Update a root entry. `obsolete = Some(true)` enforces the
    /// correction-token protocol unless `curator_bypass` is set.
    #[allow(clippy::too_many_arguments)]
    pub fn update_root(
        &self,
        id: &str,
        content: Option<&str>,
        links: Option<Vec<String>>,
        obsolete: Option<bool>,
        favorite: Option<bool>,
        irrelevant: Option<bool>,
        pinned: Option<bool>,
        tags_in: Option<&[String]>,
        curator_bypass: bool,
    ) -> Result<()> {
        self.guard()?;
        if !ids::is_root_id(id) {
            return Err(HmemError::InvalidId(id.to_string()));
        }

        let l1_limit = self.config.tolerant_limit_for_depth(1);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        if !Self::root_exists(&tx, id)? {
            return Err(HmemError::NotFound(id.to_string()));
        }

        let effective_content = if let Some(content) = content {
            if content.chars().count() > l1_limit {
                return Err(HmemError::CharLimitExceeded {
                    got: content.chars().count(),
                    limit: l1_limit,
                });
            }
            let title = auto_extract_title(content, self.config.max_title_chars);
            tx.execute(
                "UPDATE roots SET level_1 = ?1, title = ?2 WHERE id = ?3",
                params![content, title, id],
            )?;
            Some(content.to_string())
        } else {
            None
        };

        if let Some(links) = links {
            let links_json = serde_json::to_string(&links).unwrap_or_else(|_| "[]".into());
            tx.execute("UPDATE roots SET links = ?1 WHERE id = ?2", params![links_json, id])?;
        }
        if let Some(favorite) = favorite {
            tx.execute("UPDATE roots SET favorite = ?1 WHERE id = ?2", params![favorite, id])?;
        }
        if let Some(irrelevant) = irrelevant {
            tx.execute("UPDATE roots SET irrelevant = ?1 WHERE id = ?2", params![irrelevant, id])?;
        }
        if let Some(pinned) = pinned {
            tx.execute("UPDATE roots SET pinned = ?1 WHERE id = ?2", params![pinned, id])?;
        }
        if let Some(tags_in) = tags_in {
            Self::replace_tags(&tx, id, tags_in)?;
        }

        match obsolete {
            Some(true) => {
                let level_1_for_token = match &effective_content {
                    Some(c) => c.clone(),
                    None => tx.query_row(
                        "SELECT level_1 FROM roots WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )?,
                };
                Self::apply_obsolete_protocol(&tx, id, &level_1_for_token, curator_bypass)?;
            }
            Some(false) => {
                tx.execute("UPDATE roots SET obsolete = 0 WHERE id = ?1", params![id])?;
            }
            None => {}
        }

        tx.commit()?;
        Ok(())
    }

    fn apply_obsolete_protocol(
        tx: &Transaction,
        id: &str,
        level_1: &str,
        curator_bypass: bool,
    ) -> Result<()> {
        let token = ids::find_correction_token(level_1);
        let target = match token {
            Some(token) => {
                if !Self::id_exists(tx, &token)? {
                    return Err(HmemError::CorrectionTargetMissing(token));
                }
                Some(token)
            }
            None => {
                if curator_bypass {
                    None
                } else {
                    return Err(HmemError::ObsoleteWithoutCorrection);
                }
            }
        };
        Self::freeze_obsolete(tx, id, target.as_deref())
    }

    /// Mark `id` obsolete, zero its `access_count`, and transfer the old
    /// count to `target` (if any). The bidirectional link step only
    /// applies when `target` is itself a root — links live on roots only,
    /// so a node correction target gets the access-count transfer but not
    /// the link (the one asymmetry in the protocol).
    fn freeze_obsolete(tx: &Transaction, id: &str, target: Option<&str>) -> Result<()> {
        let old_access: i64 =
            tx.query_row("SELECT access_count FROM roots WHERE id = ?1", params![id], |row| {
                row.get(0)
            })?;
        tx.execute(
            "UPDATE roots SET obsolete = 1, access_count = 0 WHERE id = ?1",
            params![id],
        )?;

        if let Some(target) = target {
            if ids::is_root_id(target) {
                tx.execute(
                    "UPDATE roots SET access_count = access_count + ?1 WHERE id = ?2",
                    params![old_access, target],
                )?;
                Self::add_link(tx, target, id)?;
                Self::add_link(tx, id, target)?;
            } else {
                tx.execute(
                    "UPDATE nodes SET access_count = access_count + ?1 WHERE id = ?2",
                    params![old_access, target],
                )?;
            }
        }
        Ok(())
    }

    fn add_link(tx: &Transaction, owner_root_id: &str, target_id: &str) -> Result<()> {
        let existing: String =
            tx.query_row("SELECT links FROM roots WHERE id = ?1", params![owner_root_id], |row| {
                row.get(0)
            })?;
        let mut links: Vec<String> = serde_json::from_str(&existing).unwrap_or_default();
        if !links.iter().any(|l| l == target_id) {
            links.push(target_id.to_string());
            let links_json = serde_json::to_string(&links).unwrap_or_else(|_| "[]".into());
            tx.execute(
                "UPDATE roots SET links = ?1 WHERE id = ?2",
                params![links_json, owner_root_id],
            )?;
        }
        Ok(())
    }

    fn replace_tags(tx: &Transaction, owner_id: &str, tags_in: &[String]) -> Result<()> {
        let tags = tags::normalize_tags(tags_in)?;
        tx.execute("DELETE FROM tags WHERE owner_id = ?1", params![owner_id])?;
        for tag in &tags {
            tx.execute(
                "INSERT OR IGNORE INTO tags (owner_id, tag) VALUES (?1, ?2)",
                params![owner_id, tag],
            )?;
        }
        Ok(())
    }

    /// Delete a root and every node and tag beneath it. Deleting a node
    /// alone is not part of the public surface — only whole roots are
    /// removable (see spec §4.3).
    pub fn delete(&self, root_id: &str) -> Result<()> {
        self.guard()?;
        if !ids::is_root_id(root_id) {
            return Err(HmemError::InvalidId(root_id.to_string()));
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let node_pattern = format!("{root_id}.%");
        tx.execute(
            "DELETE FROM tags WHERE owner_id = ?1 OR owner_id LIKE ?2",
            params![root_id, node_pattern],
        )?;
        tx.execute("DELETE FROM nodes WHERE root_id = ?1", params![root_id])?;
        let changed = tx.execute("DELETE FROM roots WHERE id = ?1", params![root_id])?;
        if changed == 0 {
            return Err(HmemError::NotFound(root_id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.guard()?;
        let conn = self.conn.lock().unwrap();
        let root_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM roots WHERE seq > 0", [], |row| row.get(0))?;
        let node_count: u64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let obsolete_count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM roots WHERE obsolete = 1",
            [],
            |row| row.get(0),
        )?;
        let favorite_count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM roots WHERE favorite = 1",
            [],
            |row| row.get(0),
        )?;
        let tag_count: u64 = conn.query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        Ok(StoreStats {
            root_count,
            node_count,
            obsolete_count,
            favorite_count,
            tag_count,
        })
    }

    // ------------------------------------------------------------------
    // Read-side query helpers, used by `crate::read`
    // ------------------------------------------------------------------

    fn root_exists(tx: &Transaction, id: &str) -> Result<bool> {
        Ok(tx
            .query_row("SELECT 1 FROM roots WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn node_exists(tx: &Transaction, id: &str) -> Result<bool> {
        Ok(tx
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn id_exists(tx: &Transaction, id: &str) -> Result<bool> {
        if ids::is_root_id(id) {
            Self::root_exists(tx, id)
        } else if ids::is_node_id(id) {
            Self::node_exists(tx, id)
        } else {
            Ok(false)
        }
    }

    pub fn get_root(&self, id: &str) -> Result<Option<RootEntry>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM roots WHERE id = ?1", params![id], row_to_root)
            .optional()
            .map_err(HmemError::from)
    }

    pub fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM nodes WHERE id = ?1", params![id], row_to_node)
            .optional()
            .map_err(HmemError::from)
    }

    /// All nodes belonging to `root_id`, up to `max_depth` tree depth
    /// (root is depth 1, so `max_depth = 2` means direct children only).
    /// Unsorted by tree position — callers group by `parent_id` themselves.
    pub fn get_subtree_nodes(&self, root_id: &str, max_depth: u32) -> Result<Vec<Node>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM nodes WHERE root_id = ?1 AND depth <= ?2 ORDER BY depth, seq",
        )?;
        let rows = stmt.query_map(params![root_id, max_depth], row_to_node)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Descendants of a specific node, `levels` tree-levels deep below it.
    pub fn get_node_descendants(&self, node_id: &str, levels: u32) -> Result<Vec<Node>> {
        let anchor_depth = ids::depth_of(node_id) as u32;
        let max_depth = anchor_depth + levels;
        let pattern = format!("{node_id}.%");
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM nodes WHERE id LIKE ?1 AND depth <= ?2 ORDER BY depth, seq",
        )?;
        let rows = stmt.query_map(params![pattern, max_depth], row_to_node)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_tags(&self, owner_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT tag FROM tags WHERE owner_id = ?1 ORDER BY tag")?;
        let rows = stmt.query_map(params![owner_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Bumping an access counter is a read-path side effect (it happens on
    /// every delivered read, corrupted store or not) rather than a guarded
    /// write — it proceeds even when `corrupted` is set, same as every
    /// other read method.
    pub fn bump_root_access(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE roots SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
            params![format_timestamp(Utc::now()), id],
        )?;
        Ok(())
    }

    pub fn bump_node_access(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE nodes SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
            params![format_timestamp(Utc::now()), id],
        )?;
        Ok(())
    }

    /// Roots matching `filters`, newest-effective-date first. Effective
    /// date is `max(root.created_at, max(child.created_at))` so a root
    /// that recently grew a new node sorts as recently touched.
    pub fn query_bulk(&self, filters: &BulkFilters, allowed_roles: Option<&[Role]>) -> Result<Vec<RootEntry>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT r.* FROM roots r WHERE r.seq > 0",
        );
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filters.include_obsolete {
            clauses.push("r.obsolete = 0".to_string());
        }
        if !filters.include_irrelevant {
            clauses.push("r.irrelevant = 0".to_string());
        }
        if let Some(prefix) = filters.prefix {
            args.push(Box::new(prefix.to_string()));
            clauses.push(format!("r.prefix = ?{}", args.len()));
        }
        if let Some(after) = filters.after {
            args.push(Box::new(format_timestamp(after)));
            clauses.push(format!("r.created_at >= ?{}", args.len()));
        }
        if let Some(before) = filters.before {
            args.push(Box::new(format_timestamp(before)));
            clauses.push(format!("r.created_at <= ?{}", args.len()));
        }
        if let Some(tag) = &filters.tag {
            args.push(Box::new(tag.clone()));
            clauses.push(format!(
                "r.id IN (SELECT owner_id FROM tags WHERE tag = ?{})",
                args.len()
            ));
        }
        if let Some(roles) = allowed_roles {
            let placeholders: Vec<String> = roles
                .iter()
                .map(|role| {
                    args.push(Box::new(role.to_string()));
                    format!("?{}", args.len())
                })
                .collect();
            clauses.push(format!("r.min_role IN ({})", placeholders.join(", ")));
        }

        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        sql.push_str(
            " ORDER BY MAX(r.created_at, COALESCE(\
                (SELECT MAX(n.created_at) FROM nodes n WHERE n.root_id = r.id), r.created_at\
              )) DESC",
        );

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_root)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Roots whose effective date falls within `window` of `reference`'s
    /// own effective date, excluding `reference` itself.
    pub fn query_time_around(
        &self,
        reference: &RootEntry,
        window: chrono::Duration,
        allowed_roles: Option<&[Role]>,
    ) -> Result<Vec<RootEntry>> {
        let anchor = effective_date(reference, &[]);
        let filters = BulkFilters {
            after: Some(anchor - window),
            before: Some(anchor + window),
            ..Default::default()
        };
        let mut roots = self.query_bulk(&filters, allowed_roles)?;
        roots.retain(|root| root.id != reference.id);
        Ok(roots)
    }

    /// Case-insensitive substring search over root `level_1`/`title`, node
    /// `content`, and tags — a root matches if any of the three does.
    pub fn query_search(&self, query: &str, allowed_roles: Option<&[Role]>) -> Result<Vec<RootEntry>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT r.* FROM roots r WHERE r.seq > 0 AND r.obsolete = 0 AND r.irrelevant = 0 \
             AND (r.level_1 LIKE ?1 ESCAPE '\\' OR r.title LIKE ?1 ESCAPE '\\' \
             OR r.id IN (SELECT owner_id FROM tags WHERE tag LIKE ?1 ESCAPE '\\') \
             OR r.id IN (SELECT root_id FROM nodes n WHERE n.content LIKE ?1 ESCAPE '\\'))",
        );
        let pattern = format!("%{}%", escape_like(query));
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(pattern)];

        if let Some(roles) = allowed_roles {
            let placeholders: Vec<String> = roles
                .iter()
                .map(|role| {
                    args.push(Box::new(role.to_string()));
                    format!("?{}", args.len())
                })
                .collect();
            sql.push_str(&format!(" AND r.min_role IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY r.created_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_root)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Roots (other than `exclude_id`) sharing at least two tags with
    /// `tags`, used to populate `relatedEntries`.
    pub fn query_related_by_tags(
        &self,
        tags: &[String],
        exclude_id: &str,
        allowed_roles: Option<&[Role]>,
    ) -> Result<Vec<RootEntry>> {
        if tags.len() < 2 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();

        let placeholders: Vec<String> = (1..=tags.len()).map(|i| format!("?{i}")).collect();
        let mut sql = format!(
            "SELECT r.* FROM roots r WHERE r.seq > 0 AND r.obsolete = 0 AND r.id != ?{} \
             AND (SELECT COUNT(*) FROM tags t WHERE t.owner_id = r.id AND t.tag IN ({})) >= 2",
            tags.len() + 1,
            placeholders.join(", ")
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> =
            tags.iter().map(|t| Box::new(t.clone()) as Box<dyn rusqlite::ToSql>).collect();
        args.push(Box::new(exclude_id.to_string()));

        if let Some(roles) = allowed_roles {
            let role_placeholders: Vec<String> = roles
                .iter()
                .map(|role| {
                    args.push(Box::new(role.to_string()));
                    format!("?{}", args.len())
                })
                .collect();
            sql.push_str(&format!(" AND r.min_role IN ({})", role_placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY r.created_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_root)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// The timestamp a root effectively sorts by: its own `created_at`, or a
/// child's if more recent. `children` lets callers pass an already-loaded
/// set instead of a fresh query; pass `&[]` to fall back to `created_at`.
pub fn effective_date(root: &RootEntry, children: &[Node]) -> DateTime<Utc> {
    children
        .iter()
        .map(|n| n.created_at)
        .chain(std::iter::once(root.created_at))
        .max()
        .unwrap_or(root.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HmemConfig;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hmem.db");
        let store = Store::open(path, HmemConfig::default(), StoreKind::Personal).unwrap();
        (dir, store)
    }

    #[test]
    fn write_then_read_root() {
        let (_dir, store) = open_store();
        let id = store
            .write('L', "SSE auth — header workaround", vec![], Role::Worker, false, false, &[])
            .unwrap();
        assert_eq!(id, "L0001");
        let root = store.get_root(&id).unwrap().unwrap();
        assert_eq!(root.title, "SSE auth");
        assert_eq!(root.seq, 1);
    }

    #[test]
    fn headers_seeded_on_open() {
        let (_dir, store) = open_store();
        let header = store.get_root("L0000").unwrap().unwrap();
        assert_eq!(header.seq, 0);
    }

    #[test]
    fn sequential_writes_increment_seq() {
        let (_dir, store) = open_store();
        let a = store.write('L', "first", vec![], Role::Worker, false, false, &[]).unwrap();
        let b = store.write('L', "second", vec![], Role::Worker, false, false, &[]).unwrap();
        assert_eq!(a, "L0001");
        assert_eq!(b, "L0002");
    }

    #[test]
    fn append_children_bumps_parent_and_root_access() {
        let (_dir, store) = open_store();
        let id = store.write('L', "Root note", vec![], Role::Worker, false, false, &[]).unwrap();
        let new_ids = store.append_children(&id, "A child line").unwrap();
        assert_eq!(new_ids, vec!["L0001.1"]);
        let root = store.get_root(&id).unwrap().unwrap();
        assert_eq!(root.access_count, 1);
    }

    #[test]
    fn obsolete_without_token_is_rejected() {
        let (_dir, store) = open_store();
        let id = store.write('L', "Root note", vec![], Role::Worker, false, false, &[]).unwrap();
        let err = store
            .update_root(&id, Some("no token here"), None, Some(true), None, None, None, None, false)
            .unwrap_err();
        assert!(matches!(err, HmemError::ObsoleteWithoutCorrection));
    }

    #[test]
    fn obsolete_transfers_access_and_links_bidirectionally() {
        let (_dir, store) = open_store();
        let old = store.write('L', "Old lesson", vec![], Role::Worker, false, false, &[]).unwrap();
        store.bump_root_access(&old).unwrap();
        store.bump_root_access(&old).unwrap();
        let new = store.write('L', "New lesson", vec![], Role::Worker, false, false, &[]).unwrap();

        let correction = format!("Superseded — [\u{2713}{new}]");
        store
            .update_root(&old, Some(&correction), None, Some(true), None, None, None, None, false)
            .unwrap();

        let old_root = store.get_root(&old).unwrap().unwrap();
        assert!(old_root.obsolete);
        assert_eq!(old_root.access_count, 0);
        assert!(old_root.links.contains(&new));

        let new_root = store.get_root(&new).unwrap().unwrap();
        assert_eq!(new_root.access_count, 2);
        assert!(new_root.links.contains(&old));
    }

    #[test]
    fn obsolete_to_node_target_transfers_access_without_link() {
        let (_dir, store) = open_store();
        let anchor = store.write('L', "Anchor", vec![], Role::Worker, false, false, &[]).unwrap();
        store.append_children(&anchor, "Detail child").unwrap();
        let old = store.write('L', "Old lesson", vec![], Role::Worker, false, false, &[]).unwrap();
        store.bump_root_access(&old).unwrap();

        let correction = format!("Superseded — [\u{2713}{anchor}.1]");
        store
            .update_root(&old, Some(&correction), None, Some(true), None, None, None, None, false)
            .unwrap();

        let old_root = store.get_root(&old).unwrap().unwrap();
        assert!(old_root.links.is_empty());

        let child = store.get_node(&format!("{anchor}.1")).unwrap().unwrap();
        assert_eq!(child.access_count, 1);
    }

    #[test]
    fn curator_bypass_allows_obsolete_without_token() {
        let (_dir, store) = open_store();
        let id = store.write('L', "Root note", vec![], Role::Worker, false, false, &[]).unwrap();
        store
            .update_root(&id, None, None, Some(true), None, None, None, None, true)
            .unwrap();
        assert!(store.get_root(&id).unwrap().unwrap().obsolete);
    }

    #[test]
    fn delete_removes_root_nodes_and_tags() {
        let (_dir, store) = open_store();
        let id = store
            .write('L', "Root note", vec![], Role::Worker, false, false, &["rust".to_string()])
            .unwrap();
        store.append_children(&id, "Detail child").unwrap();
        store.delete(&id).unwrap();
        assert!(store.get_root(&id).unwrap().is_none());
        assert!(store.get_node(&format!("{id}.1")).unwrap().is_none());
        assert!(store.get_tags(&id).unwrap().is_empty());
    }

    #[test]
    fn corrupted_store_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hmem.db");
        std::fs::write(&path, b"not a sqlite file at all, long enough to fail the header check")
            .unwrap();
        let store = Store::open(path, HmemConfig::default(), StoreKind::Personal).unwrap();
        assert!(store.is_corrupted());
        let err = store
            .write('L', "x", vec![], Role::Worker, false, false, &[])
            .unwrap_err();
        assert!(matches!(err, HmemError::DbCorrupted(_)));
    }

    #[test]
    fn search_matches_level_1_and_tags() {
        let (_dir, store) = open_store();
        store
            .write('L', "SSE auth workaround", vec![], Role::Worker, false, false, &["networking".into()])
            .unwrap();
        let by_content = store.query_search("auth", None).unwrap();
        assert_eq!(by_content.len(), 1);
        let by_tag = store.query_search("networking", None).unwrap();
        assert_eq!(by_tag.len(), 1);
    }

    #[test]
    fn bulk_query_respects_role_filter() {
        let (_dir, store) = open_store();
        store.write('L', "worker visible", vec![], Role::Worker, false, false, &[]).unwrap();
        store.write('L', "ceo only", vec![], Role::Ceo, false, false, &[]).unwrap();
        let worker_view = store
            .query_bulk(&BulkFilters::default(), Some(&Role::Worker.allowed_roles()))
            .unwrap();
        assert_eq!(worker_view.len(), 1);
        let ceo_view = store
            .query_bulk(&BulkFilters::default(), Some(&Role::Ceo.allowed_roles()))
            .unwrap();
        assert_eq!(ceo_view.len(), 2);
    }
}
