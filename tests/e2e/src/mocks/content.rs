//! Generators for indented content blocks, the input shape the tree parser
//! (`hmem_core::tree`) and `Store::write`/`append_children` consume.

/// A flat block: a level-1 line followed by `children` sibling lines at one
/// indent step, two spaces per level as the parser's default-detected unit.
pub fn indented_block(level_1: &str, children: &[&str]) -> String {
    let mut out = String::new();
    out.push_str(level_1);
    out.push('\n');
    for child in children {
        out.push_str("  ");
        out.push_str(child);
        out.push('\n');
    }
    out
}

/// A block with one line per depth, each indented one step deeper than the
/// last — exercises depth collapse at the parser's max depth when `lines`
/// exceeds it.
pub fn nested_block(level_1: &str, lines: &[&str]) -> String {
    let mut out = String::new();
    out.push_str(level_1);
    out.push('\n');
    for (depth, line) in lines.iter().enumerate() {
        out.push_str(&"  ".repeat(depth + 1));
        out.push_str(line);
        out.push('\n');
    }
    out
}
