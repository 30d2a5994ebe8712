use std::fmt::Write as _;
use std::io::IsTerminal;
use std::path::Path;
use touchstone_kernel::{EvaluatedMatch, MatchNode, Mismatch};
use tracing::debug;

/// Column the status marker is aligned to, independent of nesting depth.
const STATUS_COLUMN: usize = 50;

/// ANSI escapes for terminal output. All fields are empty strings when
/// stdout is not a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub blue: &'static str,
    pub red: &'static str,
    pub green: &'static str,
    pub reset: &'static str,
}

impl Palette {
    pub const COLOR: Palette = Palette {
        blue: "\x1b[34m",
        red: "\x1b[31m",
        green: "\x1b[32m",
        reset: "\x1b[0m",
    };

    pub const PLAIN: Palette = Palette {
        blue: "",
        red: "",
        green: "",
        reset: "",
    };

    pub fn detect() -> Palette {
        if std::io::stdout().is_terminal() {
            Palette::COLOR
        } else {
            Palette::PLAIN
        }
    }
}

/// Two spaces per nesting level.
pub fn indent(level: usize) -> String {
    "  ".repeat(level)
}

pub fn banner(palette: &Palette, name: &str) -> String {
    format!("{}***** {name} *****{}", palette.blue, palette.reset)
}

/// One `name [ OK ]` / `name [FAIL]` status line.
pub fn status_line(palette: &Palette, name: &str, success: bool, level: usize) -> String {
    let marker = if success {
        format!("[{} OK {}]", palette.green, palette.reset)
    } else {
        format!("[{}FAIL{}]", palette.red, palette.reset)
    };
    let pad = indent(level);
    let width = STATUS_COLUMN.saturating_sub(pad.len());
    format!("{pad}{name:<width$} {marker}")
}

/// The diagnostic block printed under a failed comparison. Numeric
/// mismatches show the difference and, when the reference allows a
/// relative view, percent deviations; text mismatches quote both sides.
pub fn mismatch_block(mismatch: &Mismatch, level: usize) -> String {
    let pad = indent(level);
    let rule = format!("{pad}{}", "-".repeat(40));
    let mut block = String::new();
    let _ = writeln!(block, "{rule}");
    match mismatch {
        Mismatch::Numeric {
            calculated,
            reference,
            difference,
            deviation_pct,
            tolerance,
            tolerance_pct,
        } => {
            let _ = writeln!(block, "{pad}Calculated value : {calculated:?}");
            let _ = writeln!(block, "{pad}Reference value  : {reference:?}");
            let _ = writeln!(block, "{pad}Difference       : {difference:?}");
            if let Some(deviation) = deviation_pct {
                let _ = writeln!(block, "{pad}Deviation [%]    : {deviation:.6}");
            }
            if let Some(tolerance) = tolerance {
                let _ = writeln!(block, "{pad}Tolerance        : {tolerance:?}");
            }
            if let Some(tolerance_pct) = tolerance_pct {
                let _ = writeln!(block, "{pad}Tolerance [%]    : {tolerance_pct:.6}");
            }
        }
        Mismatch::Text {
            calculated,
            expected,
        } => {
            let _ = writeln!(block, "{pad}Calculated value : '{calculated}'");
            let _ = writeln!(block, "{pad}Expected value   : '{expected}'");
        }
    }
    block.push_str(&rule);
    block
}

/// Render the evaluated match tree. Groups print their name and indent
/// their children one level; a leaf that broadcast into several sets does
/// the same, labelling each set with its own display name.
pub fn render_match_tree(palette: &Palette, nodes: &[MatchNode], level: usize) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            MatchNode::Group { name, children } => {
                let _ = writeln!(out, "{}{name}", indent(level));
                out.push_str(&render_match_tree(palette, children, level + 1));
            }
            MatchNode::Leaf { name, sets, .. } => match sets.as_slice() {
                [single] => render_set(palette, single, level, &mut out),
                sets => {
                    let _ = writeln!(out, "{}{name}", indent(level));
                    for set in sets {
                        render_set(palette, set, level + 1, &mut out);
                    }
                }
            },
        }
    }
    out
}

fn render_set(palette: &Palette, set: &EvaluatedMatch, level: usize, out: &mut String) {
    let _ = writeln!(
        out,
        "{}",
        status_line(palette, &set.display_name, set.success, level)
    );
    if let Some(mismatch) = &set.mismatch {
        let _ = writeln!(out, "{}", mismatch_block(mismatch, level + 1));
    }
}

/// Dump the stdout and stderr a failed execution left in the working
/// directory. Streams over ten lines are truncated to their tail unless
/// `full` is set.
pub fn captured_output(palette: &Palette, work_dir: &Path, input: &str, full: bool) -> String {
    let mut out = String::new();
    for (file, name) in [("stdout", "STDOUT"), ("stderr", "STDERR")] {
        let bytes = match std::fs::read(work_dir.join(file)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let _ = writeln!(
                    out,
                    "\n{}=== {name} from {input} does not exist ==={}",
                    palette.red, palette.reset
                );
                continue;
            }
            Err(err) => {
                debug!("Failed to read {name} file: {err}");
                continue;
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        if content.trim().is_empty() {
            let _ = writeln!(
                out,
                "\n{}=== {name} from {input} is empty ==={}",
                palette.red, palette.reset
            );
            continue;
        }
        let lines: Vec<&str> = content.lines().collect();
        let _ = writeln!(
            out,
            "\n{}=== {name} from {input} ==={}",
            palette.red, palette.reset
        );
        if full || lines.len() <= 10 {
            let _ = writeln!(out, "{content}");
        } else {
            let _ = writeln!(out, "... (showing last 10 lines, use -vv to see full output)");
            let _ = writeln!(out, "{}", lines[lines.len() - 10..].join("\n"));
        }
        let _ = writeln!(out, "{}=== End {name} ==={}", palette.red, palette.reset);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use touchstone_kernel::ParamSet;

    fn set(display: &str, success: bool, mismatch: Option<Mismatch>) -> EvaluatedMatch {
        EvaluatedMatch {
            index: 0,
            display_name: display.to_string(),
            params: ParamSet::default(),
            success,
            calculated: Some("1".to_string()),
            mismatch,
        }
    }

    #[test]
    fn banner_wraps_name_in_blue() {
        assert_eq!(
            banner(&Palette::COLOR, "Demo"),
            "\x1b[34m***** Demo *****\x1b[0m"
        );
        assert_eq!(banner(&Palette::PLAIN, "Demo"), "***** Demo *****");
    }

    #[test]
    fn status_markers_align_to_one_column() {
        let line = status_line(&Palette::PLAIN, "Execution", true, 2);
        assert!(line.starts_with("    Execution"));
        assert!(line.ends_with("[ OK ]"));
        assert_eq!(line.find('['), Some(51));

        let line = status_line(&Palette::PLAIN, "energy", false, 4);
        assert!(line.starts_with("        energy"));
        assert!(line.ends_with("[FAIL]"));
        assert_eq!(line.find('['), Some(51));

        let colored = status_line(&Palette::COLOR, "energy", true, 3);
        assert!(colored.contains("[\x1b[32m OK \x1b[0m]"));
    }

    #[test]
    fn numeric_mismatch_block_lists_every_figure() {
        let mismatch = Mismatch::Numeric {
            calculated: -42.505,
            reference: -42.5,
            difference: 0.005,
            deviation_pct: Some(0.011764705882352941),
            tolerance: Some(0.001),
            tolerance_pct: Some(0.002352941176470588),
        };
        let expected = concat!(
            "      ----------------------------------------\n",
            "      Calculated value : -42.505\n",
            "      Reference value  : -42.5\n",
            "      Difference       : 0.005\n",
            "      Deviation [%]    : 0.011765\n",
            "      Tolerance        : 0.001\n",
            "      Tolerance [%]    : 0.002353\n",
            "      ----------------------------------------",
        );
        assert_eq!(mismatch_block(&mismatch, 3), expected);
    }

    #[test]
    fn numeric_mismatch_block_skips_unavailable_figures() {
        let mismatch = Mismatch::Numeric {
            calculated: 1.5,
            reference: 0.0,
            difference: 1.5,
            deviation_pct: None,
            tolerance: None,
            tolerance_pct: None,
        };
        let block = mismatch_block(&mismatch, 0);
        assert!(block.contains("Difference       : 1.5"));
        assert!(!block.contains("Deviation"));
        assert!(!block.contains("Tolerance"));
    }

    #[test]
    fn text_mismatch_block_quotes_both_sides() {
        let mismatch = Mismatch::Text {
            calculated: "diverged".to_string(),
            expected: "converged".to_string(),
        };
        let block = mismatch_block(&mismatch, 3);
        assert!(block.contains("      Calculated value : 'diverged'"));
        assert!(block.contains("      Expected value   : 'converged'"));
    }

    #[test]
    fn tree_rendering_nests_groups_and_broadcast_sets() {
        let nodes = vec![
            MatchNode::Group {
                name: "energies".to_string(),
                children: vec![MatchNode::Leaf {
                    name: "energy".to_string(),
                    path: vec!["energies".to_string(), "energy".to_string()],
                    sets: vec![set("energy", true, None)],
                }],
            },
            MatchNode::Leaf {
                name: "sweep".to_string(),
                path: vec!["sweep".to_string()],
                sets: vec![set("first", true, None), set("second", false, None)],
            },
        ];
        let rendered = render_match_tree(&Palette::PLAIN, &nodes, 3);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "      energies");
        assert!(lines[1].starts_with("        energy"));
        assert!(lines[1].ends_with("[ OK ]"));
        assert_eq!(lines[2], "      sweep");
        assert!(lines[3].starts_with("        first"));
        assert!(lines[4].starts_with("        second"));
        assert!(lines[4].ends_with("[FAIL]"));
    }

    #[test]
    fn failed_comparison_renders_its_block_below_the_status() {
        let mismatch = Mismatch::Text {
            calculated: "b".to_string(),
            expected: "a".to_string(),
        };
        let nodes = vec![MatchNode::Leaf {
            name: "status".to_string(),
            path: vec!["status".to_string()],
            sets: vec![set("status", false, Some(mismatch))],
        }];
        let rendered = render_match_tree(&Palette::PLAIN, &nodes, 3);
        assert!(rendered.contains("status"));
        assert!(rendered.contains("        Calculated value : 'b'"));
    }

    #[test]
    fn captured_output_reports_missing_streams() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dump = captured_output(&Palette::PLAIN, dir.path(), "run.inp", false);
        assert!(dump.contains("=== STDOUT from run.inp does not exist ==="));
        assert!(dump.contains("=== STDERR from run.inp does not exist ==="));
    }

    #[test]
    fn captured_output_truncates_long_streams() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lines: Vec<String> = (1..=12).map(|i| format!("line {i}")).collect();
        fs::write(dir.path().join("stdout"), lines.join("\n")).expect("write stdout");
        fs::write(dir.path().join("stderr"), "").expect("write stderr");

        let dump = captured_output(&Palette::PLAIN, dir.path(), "run.inp", false);
        assert!(dump.contains("=== STDOUT from run.inp ==="));
        assert!(dump.contains("... (showing last 10 lines, use -vv to see full output)"));
        assert!(!dump.contains("line 1\n"));
        assert!(dump.contains("line 3"));
        assert!(dump.contains("=== End STDOUT ==="));
        assert!(dump.contains("=== STDERR from run.inp is empty ==="));

        let full = captured_output(&Palette::PLAIN, dir.path(), "run.inp", true);
        assert!(full.contains("line 1\nline 2\n"));
        assert!(!full.contains("showing last"));
    }
}
