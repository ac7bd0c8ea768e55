//! Config loader (C1).
//!
//! Reads per-store configuration from `hmem.config.json`. Parse failures
//! fall back silently to defaults (with a `tracing::warn!`) — config is
//! advisory, never load-bearing for correctness.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default single-letter prefix registry.
pub const DEFAULT_PREFIXES: &[(char, &str)] = &[
    ('P', "Project"),
    ('L', "Lesson"),
    ('T', "Task"),
    ('E', "Error"),
    ('D', "Decision"),
    ('M', "Milestone"),
    ('S', "Skill"),
    ('N', "Favorite"),
];

/// Either a fixed-count or percentage-form bulk-read V2 parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReadV2Config {
    /// Fixed newest-slot count, used when percentage fields are absent.
    #[serde(default)]
    pub top_newest_count: Option<usize>,
    /// Fixed most-accessed-slot count, used when percentage fields are absent.
    #[serde(default)]
    pub top_access_count: Option<usize>,
    /// Percentage (0.0-1.0) of a prefix group's size to expand as newest.
    #[serde(default)]
    pub newest_percent: Option<f64>,
    /// Percentage (0.0-1.0) of a prefix group's size to expand as most-accessed.
    #[serde(default)]
    pub access_percent: Option<f64>,
    #[serde(default)]
    pub newest_min: Option<usize>,
    #[serde(default)]
    pub newest_max: Option<usize>,
    #[serde(default)]
    pub access_min: Option<usize>,
    #[serde(default)]
    pub access_max: Option<usize>,
}

impl Default for BulkReadV2Config {
    fn default() -> Self {
        Self {
            top_newest_count: Some(3),
            top_access_count: Some(2),
            newest_percent: None,
            access_percent: None,
            newest_min: None,
            newest_max: None,
            access_min: None,
            access_max: None,
        }
    }
}

impl BulkReadV2Config {
    /// Resolve the (newest, access) slot counts for a prefix group of the
    /// given size, at the given session `slot_fraction` (see C5).
    pub fn slot_counts(&self, group_size: usize, slot_fraction: f64) -> (usize, usize) {
        let newest = if let (Some(pct), ) = (self.newest_percent,) {
            let raw = (group_size as f64 * pct * slot_fraction).ceil() as usize;
            let raw = self.newest_min.map_or(raw, |min| raw.max(min));
            self.newest_max.map_or(raw, |max| raw.min(max))
        } else {
            let base = self.top_newest_count.unwrap_or(3);
            ((base as f64 * slot_fraction).ceil() as usize).max(0)
        };

        let access = if let (Some(pct), ) = (self.access_percent,) {
            let raw = (group_size as f64 * pct * slot_fraction).ceil() as usize;
            let raw = self.access_min.map_or(raw, |min| raw.max(min));
            self.access_max.map_or(raw, |max| raw.min(max))
        } else {
            let base = self.top_access_count.unwrap_or(2);
            ((base as f64 * slot_fraction).ceil() as usize).max(0)
        };

        (newest, access)
    }
}

/// Per-store configuration, loaded from `hmem.config.json` (all fields
/// optional; unknown fields ignored).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HmemConfig {
    /// Explicit per-level char limits. If shorter than `max_depth`, padded
    /// with its last value and truncated.
    pub max_chars_per_level: Option<Vec<usize>>,
    /// L1 char limit, used with `max_ln_chars` to interpolate when
    /// `max_chars_per_level` is absent.
    pub max_l1_chars: Option<usize>,
    /// L(max_depth) char limit, the other end of the interpolation.
    pub max_ln_chars: Option<usize>,
    /// Maximum tree depth, clamped to 1-10.
    pub max_depth: usize,
    /// Maximum length of the auto-extracted title.
    pub max_title_chars: usize,
    /// Single-letter prefix -> human label.
    pub prefixes: HashMap<char, String>,
    /// Single-letter prefix -> group header text rendered by the formatter.
    pub prefix_descriptions: HashMap<char, String>,
    /// Bulk-read V2 selection parameters.
    pub bulk_read_v2: BulkReadV2Config,
    /// Used only when the caller does not pass a limit.
    pub default_read_limit: usize,
    /// Session-cache hidden-phase window, in seconds. See Open Question (d).
    pub session_hidden_secs: i64,
    /// Session-cache title-only window (non-promoted), in seconds.
    pub session_titleonly_secs: i64,
    /// Session-cache title-only window (promoted), in seconds.
    pub session_titleonly_promoted_secs: i64,
}

impl Default for HmemConfig {
    fn default() -> Self {
        Self {
            max_chars_per_level: None,
            max_l1_chars: Some(500),
            max_ln_chars: Some(200),
            max_depth: 5,
            max_title_chars: 50,
            prefixes: DEFAULT_PREFIXES
                .iter()
                .map(|(c, label)| (*c, label.to_string()))
                .collect(),
            prefix_descriptions: DEFAULT_PREFIXES
                .iter()
                .map(|(c, label)| (*c, label.to_string()))
                .collect(),
            bulk_read_v2: BulkReadV2Config::default(),
            default_read_limit: 20,
            session_hidden_secs: 5 * 60,
            session_titleonly_secs: 30 * 60,
            session_titleonly_promoted_secs: 15 * 60,
        }
    }
}

impl HmemConfig {
    /// Load from a `hmem.config.json` file. Falls back to [`Default`] on
    /// any I/O or parse failure, logging a warning — config is advisory.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("failed to parse {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Per-level char limits, padded/truncated to `max_depth`, computed by
    /// linear interpolation from L1 to Ln when `max_chars_per_level` is absent.
    pub fn effective_char_limits(&self) -> Vec<usize> {
        let depth = self.max_depth.clamp(1, 10);

        if let Some(explicit) = &self.max_chars_per_level {
            let mut limits = explicit.clone();
            if limits.is_empty() {
                limits.push(500);
            }
            let last = *limits.last().unwrap();
            while limits.len() < depth {
                limits.push(last);
            }
            limits.truncate(depth);
            return limits;
        }

        let l1 = self.max_l1_chars.unwrap_or(500) as f64;
        let ln = self.max_ln_chars.unwrap_or(200) as f64;
        (0..depth)
            .map(|i| {
                if depth == 1 {
                    l1 as usize
                } else {
                    let t = i as f64 / (depth - 1) as f64;
                    (l1 + (ln - l1) * t).round() as usize
                }
            })
            .collect()
    }

    /// The tolerant (`* 1.25`) limit for a given 1-indexed depth.
    pub fn tolerant_limit_for_depth(&self, depth: usize) -> usize {
        let limits = self.effective_char_limits();
        let idx = (depth.saturating_sub(1)).min(limits.len().saturating_sub(1));
        let base = limits.get(idx).copied().unwrap_or(200);
        (base as f64 * 1.25).floor() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_l1_and_ln() {
        let cfg = HmemConfig {
            max_l1_chars: Some(500),
            max_ln_chars: Some(100),
            max_depth: 5,
            ..Default::default()
        };
        let limits = cfg.effective_char_limits();
        assert_eq!(limits.len(), 5);
        assert_eq!(limits[0], 500);
        assert_eq!(limits[4], 100);
        // monotonically decreasing
        assert!(limits.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn explicit_array_pads_and_truncates() {
        let cfg = HmemConfig {
            max_chars_per_level: Some(vec![500, 300]),
            max_depth: 4,
            ..Default::default()
        };
        assert_eq!(cfg.effective_char_limits(), vec![500, 300, 300, 300]);
    }

    #[test]
    fn tolerant_limit_applies_25_percent() {
        let cfg = HmemConfig {
            max_chars_per_level: Some(vec![500]),
            max_depth: 1,
            ..Default::default()
        };
        assert_eq!(cfg.tolerant_limit_for_depth(1), 625);
    }

    #[test]
    fn parse_failure_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("hmem-cfg-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hmem.config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cfg = HmemConfig::load(&path);
        assert_eq!(cfg.max_depth, 5);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
