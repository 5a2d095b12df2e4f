//! Line-level diff rendering for change previews.
//!
//! Produces a compact unified-style view: unchanged prefix and suffix
//! lines are trimmed to a small context window, the differing middle is
//! shown as removals then additions. Output is deterministic for a
//! given pair of inputs.

const CONTEXT_LINES: usize = 3;

/// Render a line diff between two file contents.
///
/// Returns an empty string when the contents are identical.
pub fn line_diff(old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    // Trim the common prefix and suffix; everything between differs.
    let mut prefix = 0;
    while prefix < old_lines.len()
        && prefix < new_lines.len()
        && old_lines[prefix] == new_lines[prefix]
    {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old_lines.len() - prefix
        && suffix < new_lines.len() - prefix
        && old_lines[old_lines.len() - 1 - suffix] == new_lines[new_lines.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mut out = String::new();
    let context_start = prefix.saturating_sub(CONTEXT_LINES);
    for line in &old_lines[context_start..prefix] {
        out.push_str(&format!(" {line}\n"));
    }
    for line in &old_lines[prefix..old_lines.len() - suffix] {
        out.push_str(&format!("-{line}\n"));
    }
    for line in &new_lines[prefix..new_lines.len() - suffix] {
        out.push_str(&format!("+{line}\n"));
    }
    let suffix_end = (old_lines.len() - suffix + CONTEXT_LINES).min(old_lines.len());
    for line in &old_lines[old_lines.len() - suffix..suffix_end] {
        out.push_str(&format!(" {line}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_contents_produce_no_diff() {
        assert_eq!(line_diff("a\nb\n", "a\nb\n"), "");
    }

    #[test]
    fn changed_line_shows_removal_and_addition() {
        let diff = line_diff("a\nb\nc\n", "a\nx\nc\n");
        assert_eq!(diff, " a\n-b\n+x\n c\n");
    }

    #[test]
    fn pure_addition() {
        let diff = line_diff("a\n", "a\nb\n");
        assert_eq!(diff, " a\n+b\n");
    }

    #[test]
    fn pure_removal() {
        let diff = line_diff("a\nb\n", "a\n");
        assert_eq!(diff, " a\n-b\n");
    }

    #[test]
    fn context_is_bounded() {
        let old: String = (0..20).map(|i| format!("line{i}\n")).collect();
        let new = old.replace("line10", "changed");
        let diff = line_diff(&old, &new);
        // 3 context lines each side, 1 removal, 1 addition
        assert_eq!(diff.lines().count(), 8);
        assert!(diff.contains("-line10"));
        assert!(diff.contains("+changed"));
        assert!(!diff.contains(" line0\n"));
    }

    #[test]
    fn diff_from_empty_is_all_additions() {
        let diff = line_diff("", "a\nb\n");
        assert_eq!(diff, "+a\n+b\n");
    }
}
