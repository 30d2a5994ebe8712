//! Pure value extraction from program output lines.
//!
//! Lines are handed in exactly as read from the file, trailing newline
//! included, so column positions count the terminator. All functions are
//! total: out-of-range requests yield `None`, never a panic.

/// The line at `index`: zero-based from the start when non-negative,
/// from the end when negative (`-1` is the last line).
pub fn line_at<'a>(lines: &[&'a str], index: i64) -> Option<&'a str> {
    let len = lines.len() as i64;
    let target = if index >= 0 { index } else { len + index };
    if target < 0 || target >= len {
        return None;
    }
    Some(lines[target as usize])
}

/// The line `offset` lines away from the first line containing `pattern`
/// as a substring. An offset of zero is the matching line itself; a
/// missing pattern or an offset outside the file yields `None`.
pub fn pattern_line<'a>(lines: &[&'a str], pattern: &str, offset: i64) -> Option<&'a str> {
    let found = lines.iter().position(|line| line.contains(pattern))?;
    let target = found as i64 + offset;
    if target < 0 || target >= lines.len() as i64 {
        return None;
    }
    Some(lines[target as usize])
}

/// The `index`-th whitespace-separated field of `line`, one-based.
pub fn field(line: &str, index: i64) -> Option<&str> {
    if index < 1 {
        return None;
    }
    line.split_whitespace().nth(index as usize - 1)
}

/// The first whitespace-delimited token at or after character `position`
/// (one-based). A position inside a token yields its remainder; a position
/// on whitespace skips ahead to the next token; only whitespace left
/// yields an empty string. Positions beyond the line yield `None`.
pub fn column(line: &str, position: i64) -> Option<String> {
    if position < 1 || position as usize > line.chars().count() {
        return None;
    }
    let tail: String = line.chars().skip(position as usize - 1).collect();
    Some(tail.split_whitespace().next().unwrap_or("").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: [&str; 4] = [
        "Energy: -42.5000 Ry\n",
        "Total force: 1.2345e-03 Ha\n",
        "Status converged OK\n",
        "Iterations 10\n",
    ];

    #[test]
    fn line_at_indexes_from_either_end() {
        assert_eq!(line_at(&LINES, 0), Some(LINES[0]));
        assert_eq!(line_at(&LINES, 3), Some(LINES[3]));
        assert_eq!(line_at(&LINES, 4), None);
        assert_eq!(line_at(&LINES, -1), Some(LINES[3]));
        assert_eq!(line_at(&LINES, -4), Some(LINES[0]));
        assert_eq!(line_at(&LINES, -5), None);
        assert_eq!(line_at(&[], 0), None);
    }

    #[test]
    fn pattern_line_offsets_from_the_match() {
        assert_eq!(pattern_line(&LINES, "Energy:", 0), Some(LINES[0]));
        assert_eq!(pattern_line(&LINES, "Energy:", 2), Some(LINES[2]));
        assert_eq!(pattern_line(&LINES, "Status", -1), Some(LINES[1]));
        assert_eq!(pattern_line(&LINES, "Status", 2), None);
        assert_eq!(pattern_line(&LINES, "Energy:", -1), None);
        assert_eq!(pattern_line(&LINES, "no such line", 0), None);
    }

    #[test]
    fn pattern_line_takes_the_first_occurrence() {
        let lines = ["x\n", "hit one\n", "hit two\n"];
        assert_eq!(pattern_line(&lines, "hit", 0), Some("hit one\n"));
    }

    #[test]
    fn field_is_one_based_and_total() {
        let line = "Energy: -42.5000 Ry\n";
        assert_eq!(field(line, 1), Some("Energy:"));
        assert_eq!(field(line, 2), Some("-42.5000"));
        assert_eq!(field(line, 3), Some("Ry"));
        assert_eq!(field(line, 4), None);
        assert_eq!(field(line, 0), None);
        assert_eq!(field(line, -1), None);
    }

    #[test]
    fn column_takes_the_token_under_or_after_the_position() {
        let line = "Energy: -42.5000 Ry\n";
        assert_eq!(column(line, 9).as_deref(), Some("-42.5000"));
        assert_eq!(column(line, 10).as_deref(), Some("42.5000"));
        assert_eq!(column(line, 8).as_deref(), Some("-42.5000"));
        // the trailing newline still counts as a position
        assert_eq!(column(line, 20).as_deref(), Some(""));
        assert_eq!(column(line, 21), None);
        assert_eq!(column(line, 0), None);
    }
}
