//! Tag validation: `#[a-z0-9_-]{1,49}`, lowercased, de-duplicated per owner,
//! at most 10 per owner.

use crate::error::{HmemError, Result};

/// Maximum number of tags a single owner (root or node) may carry.
pub const MAX_TAGS_PER_OWNER: usize = 10;

/// Normalize a raw tag (adding a leading `#` and lowercasing if needed) and
/// validate it against the tag regex.
pub fn normalize_tag(raw: &str) -> Result<String> {
    let lower = raw.to_lowercase();
    let candidate = if let Some(stripped) = lower.strip_prefix('#') {
        stripped.to_string()
    } else {
        lower
    };

    let valid = !candidate.is_empty()
        && candidate.len() <= 49
        && candidate
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

    if valid {
        Ok(format!("#{candidate}"))
    } else {
        Err(HmemError::InvalidTag(raw.to_string()))
    }
}

/// Normalize and de-duplicate a batch of tags, rejecting the whole batch if
/// it would push the owner over [`MAX_TAGS_PER_OWNER`].
pub fn normalize_tags(raw: &[String]) -> Result<Vec<String>> {
    let mut seen = Vec::new();
    for tag in raw {
        let normalized = normalize_tag(tag)?;
        if !seen.contains(&normalized) {
            seen.push(normalized);
        }
    }
    if seen.len() > MAX_TAGS_PER_OWNER {
        return Err(HmemError::InvalidTag(format!(
            "too many tags ({} > {MAX_TAGS_PER_OWNER})",
            seen.len()
        )));
    }
    Ok(seen)
}
