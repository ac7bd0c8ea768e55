//! Error taxonomy for the memory store.
//!
//! One kind per failure mode in the public surface; every public operation
//! fails with exactly one of these, each carrying a human-readable message.

/// Errors surfaced by [`crate::store::Store`] and [`crate::read`].
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum HmemError {
    /// `write` was called with a prefix not present in the prefix registry.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// The parsed content had no L1 line.
    #[error("empty content")]
    EmptyContent,

    /// Level or node content exceeded `limit * 1.25`.
    #[error("char limit exceeded: {got} bytes, limit is {limit} (with tolerance)")]
    CharLimitExceeded {
        /// Number of bytes the content actually occupied.
        got: usize,
        /// The tolerant limit (`configured * 1.25`) it was checked against.
        limit: usize,
    },

    /// An ID did not parse as a root or node ID.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// An ID parsed correctly but no matching row exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store's integrity check failed on open; all writes are refused.
    #[error("database corrupted, backed up to {0}")]
    DbCorrupted(String),

    /// `updateNode(..., obsolete=true)` without a `[✓ID]` token and without
    /// curator bypass.
    #[error("obsolete entries require a [✓ID] correction token")]
    ObsoleteWithoutCorrection,

    /// A `[✓ID]` token referenced an ID that does not exist.
    #[error("correction target missing: {0}")]
    CorrectionTargetMissing(String),

    /// A write to the company store was attempted below the `al` role.
    #[error("role denied: {0} cannot write to the company store")]
    RoleDenied(String),

    /// A tag failed the `#[a-z0-9_-]{1,49}` regex or the owner already has 10.
    #[error("invalid tag: {0}")]
    InvalidTag(String),

    /// An obsolete chain or link graph looped; traversal was truncated.
    ///
    /// Never returned as a hard error to callers (per spec, this is a
    /// "silently broken with a chain-truncation marker" condition) — it
    /// exists so internal plumbing and tests can name the condition.
    #[error("cycle detected while walking {0}")]
    CycleDetected(String),

    /// `hmem.config.json` failed to parse; defaults were used instead.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HmemError>;
