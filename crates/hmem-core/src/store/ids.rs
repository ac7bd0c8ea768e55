//! ID validation and correction-token parsing.
//!
//! Bit-exact invariants assumed across schema versions:
//! - Root ID: `^[A-Z][0-9]{4}$`
//! - Node ID: `^[A-Z][0-9]{4}(\.[0-9]+)+$`
//! - Correction token: `\[✓[A-Z][0-9]{4}(\.[0-9]+)*\]` anywhere in `level_1`.

/// Is `s` a well-formed root ID (`L0001`)?
pub fn is_root_id(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(prefix) = chars.next() else {
        return false;
    };
    if !prefix.is_ascii_uppercase() {
        return false;
    }
    let rest: String = chars.collect();
    rest.len() == 4 && rest.chars().all(|c| c.is_ascii_digit())
}

/// Is `s` a well-formed node ID (`L0001.2.1`)?
pub fn is_node_id(s: &str) -> bool {
    let Some((root, tail)) = s.split_once('.') else {
        return false;
    };
    if !is_root_id(root) {
        return false;
    }
    tail.split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Is `s` a well-formed ID of either kind?
pub fn is_valid_id(s: &str) -> bool {
    is_root_id(s) || is_node_id(s)
}

/// The root ID a given ID (root or node) belongs to.
pub fn root_of(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}

/// The prefix letter of an ID.
pub fn prefix_of(id: &str) -> Option<char> {
    id.chars().next()
}

/// The parent ID of a node ID (root up to the last dot). `None` for root IDs.
pub fn parent_of(node_id: &str) -> Option<&str> {
    node_id.rfind('.').map(|idx| &node_id[..idx])
}

/// The dotted depth of a node ID (1 + number of dots). Roots are depth 1.
pub fn depth_of(id: &str) -> usize {
    1 + id.matches('.').count()
}

/// Find the first `[✓ID]` correction token in `text` whose ID is well-formed.
/// Returns the bare ID (without the surrounding `[✓...]`).
pub fn find_correction_token(text: &str) -> Option<String> {
    let marker = "[\u{2713}"; // "[✓"
    let mut search_from = 0;
    while let Some(rel_start) = text[search_from..].find(marker) {
        let begin = search_from + rel_start + marker.len();
        let Some(rel_end) = text[begin..].find(']') else {
            break;
        };
        let candidate = &text[begin..begin + rel_end];
        if is_valid_id(candidate) {
            return Some(candidate.to_string());
        }
        search_from = begin + rel_end + 1;
    }
    None
}
