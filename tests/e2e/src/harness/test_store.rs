//! Isolated on-disk store manager for integration tests.
//!
//! Mirrors the teacher's own temp-database-per-test pattern: a
//! `tempfile::TempDir` held alongside the open store so cleanup happens on
//! drop, plus a handful of seeding helpers for common tree shapes.

use std::path::PathBuf;

use chrono::Utc;
use hmem_core::role::Role;
use hmem_core::{HmemConfig, Store, StoreKind};
use tempfile::TempDir;

/// Owns a temp directory and an open [`Store`] pointed at a file inside it.
pub struct TestStore {
    pub store: Store,
    _temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestStore {
    /// Open a fresh personal store with default config in a new temp dir.
    pub fn new_personal() -> Self {
        Self::with_config(StoreKind::Personal, HmemConfig::default())
    }

    /// Open a fresh company store with default config in a new temp dir.
    pub fn new_company() -> Self {
        Self::with_config(StoreKind::Company, HmemConfig::default())
    }

    pub fn with_config(kind: StoreKind, config: HmemConfig) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.hmem");
        let store = Store::open(db_path.clone(), config, kind).expect("failed to open test store");
        Self {
            store,
            _temp_dir: temp_dir,
            db_path,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Write `count` single-line roots under `prefix`, returning their IDs
    /// in creation order.
    pub fn seed_roots(&mut self, prefix: char, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                self.store
                    .write(
                        prefix,
                        &format!("seeded entry {i}"),
                        vec![],
                        Role::Worker,
                        false,
                        false,
                        &[],
                    )
                    .expect("seed write failed")
            })
            .collect()
    }

    /// Write a root and bump its access counter `reads` times, as a V2
    /// bulk-read selection test would need to differentiate "most accessed"
    /// candidates from freshly written ones.
    pub fn seed_accessed_root(&mut self, prefix: char, content: &str, reads: u32) -> String {
        let id = self
            .store
            .write(prefix, content, vec![], Role::Worker, false, false, &[])
            .expect("seed write failed");
        for _ in 0..reads {
            self.store.bump_root_access(&id).expect("bump access failed");
        }
        id
    }

    pub fn now() -> chrono::DateTime<Utc> {
        Utc::now()
    }
}
