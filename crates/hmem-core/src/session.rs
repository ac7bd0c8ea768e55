//! Session cache (C5).
//!
//! Per-session, in-memory three-phase lifecycle (hidden / cached /
//! expired) of delivered entry IDs, plus a halving slot-fraction the read
//! engine uses to decide how aggressively to expand a prefix group on
//! repeated bulk reads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::HmemConfig;

/// Where a delivered entry currently sits in its three-phase lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fully excluded from bulk output.
    Hidden,
    /// Appears as a one-line title-only row.
    TitleOnly,
    /// Removed from the cache; fully eligible again.
    Expired,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    delivered_at: DateTime<Utc>,
    promoted: bool,
}

/// Per-session in-memory cache. Pass this explicitly per connection — it
/// is the only process-wide-shaped state in the engine and is tied to one
/// transport connection, never smuggled through a global.
#[derive(Debug, Clone, Default)]
pub struct SessionCache {
    entries: HashMap<String, CacheEntry>,
    bulk_reads: u32,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of delivered IDs (from one bulk read), marking
    /// which of them were delivered in promoted (favorite/pinned) form.
    /// Also increments the bulk-read counter used by [`Self::slot_fraction`].
    pub fn register_delivered(&mut self, ids: &[String], promoted_ids: &[String], now: DateTime<Utc>) {
        for id in ids {
            self.entries
                .entry(id.clone())
                .or_insert_with(|| CacheEntry {
                    delivered_at: now,
                    promoted: promoted_ids.contains(id),
                });
        }
        self.bulk_reads += 1;
    }

    /// The phase of a given ID at time `now`, per the configured window
    /// durations. Prunes expired entries as a side effect (cache prunes on
    /// every read).
    pub fn phase_of(&mut self, id: &str, now: DateTime<Utc>, cfg: &HmemConfig) -> Phase {
        self.prune(now, cfg);
        match self.entries.get(id) {
            None => Phase::Expired,
            Some(entry) => {
                let age = (now - entry.delivered_at).num_seconds();
                if age < cfg.session_hidden_secs {
                    Phase::Hidden
                } else {
                    let title_only_window = if entry.promoted {
                        cfg.session_titleonly_promoted_secs
                    } else {
                        cfg.session_titleonly_secs
                    };
                    if age < title_only_window {
                        Phase::TitleOnly
                    } else {
                        Phase::Expired
                    }
                }
            }
        }
    }

    /// Drop entries that have fully expired.
    pub fn prune(&mut self, now: DateTime<Utc>, cfg: &HmemConfig) {
        self.entries.retain(|_, entry| {
            let age = (now - entry.delivered_at).num_seconds();
            let window = if entry.promoted {
                cfg.session_titleonly_promoted_secs
            } else {
                cfg.session_titleonly_secs
            };
            age < window
        });
    }

    /// `0.5 ^ bulk_reads` — halves on every successive bulk read of the
    /// same session.
    pub fn slot_fraction(&self) -> f64 {
        0.5f64.powi(self.bulk_reads as i32)
    }

    /// Clear the cache and reset the bulk-read counter.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.bulk_reads = 0;
    }

    pub fn bulk_reads(&self) -> u32 {
        self.bulk_reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn three_phases_over_time() {
        let cfg = HmemConfig::default();
        let mut cache = SessionCache::new();
        let t0 = Utc::now();
        cache.register_delivered(&["L0001".into()], &[], t0);

        assert_eq!(cache.phase_of("L0001", t0 + Duration::minutes(3), &cfg), Phase::Hidden);
        assert_eq!(cache.phase_of("L0001", t0 + Duration::minutes(10), &cfg), Phase::TitleOnly);
        assert_eq!(cache.phase_of("L0001", t0 + Duration::minutes(40), &cfg), Phase::Expired);
    }

    #[test]
    fn promoted_entries_use_shorter_titleonly_window() {
        let cfg = HmemConfig::default();
        let mut cache = SessionCache::new();
        let t0 = Utc::now();
        cache.register_delivered(&["L0002".into()], &["L0002".into()], t0);

        // 20 minutes: past the 15-min promoted title-only window.
        assert_eq!(cache.phase_of("L0002", t0 + Duration::minutes(20), &cfg), Phase::Expired);
    }

    #[test]
    fn slot_fraction_halves_each_bulk_read() {
        let mut cache = SessionCache::new();
        assert_eq!(cache.slot_fraction(), 1.0);
        cache.register_delivered(&[], &[], Utc::now());
        assert_eq!(cache.slot_fraction(), 0.5);
        cache.register_delivered(&[], &[], Utc::now());
        assert_eq!(cache.slot_fraction(), 0.25);
    }

    #[test]
    fn reset_clears_everything() {
        let mut cache = SessionCache::new();
        cache.register_delivered(&["L0001".into()], &[], Utc::now());
        cache.reset();
        assert_eq!(cache.bulk_reads(), 0);
        assert_eq!(cache.slot_fraction(), 1.0);
    }
}
