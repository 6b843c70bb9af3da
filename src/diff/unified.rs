use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::io::{self, Write};
use tracing::{Level, debug, span};

/// Configuration for unified diff output
#[derive(Debug, Clone, Copy)]
pub struct UnifiedDiffConfig {
    /// Number of context lines around changes
    pub context_lines: usize,
    /// Whether to colorize the output
    pub colorize: bool,
}

impl Default for UnifiedDiffConfig {
    fn default() -> Self {
        Self {
            context_lines: 3,
            colorize: false,
        }
    }
}

/// Write a unified diff from `old` to `new`.
///
/// `old_label` and `new_label` follow the `---`/`+++` markers verbatim.
/// Returns the number of changed lines; nothing at all is written when the
/// contents are equal.
///
/// # Errors
///
/// Returns an error if writing fails
pub fn write_unified_diff(
    old: &str,
    new: &str,
    old_label: &str,
    new_label: &str,
    config: &UnifiedDiffConfig,
    writer: &mut dyn Write,
) -> io::Result<usize> {
    let span = span!(Level::DEBUG, "unified_diff", file = new_label);
    let _guard = span.enter();

    let diff = TextDiff::from_lines(old, new);
    let mut changes = 0;
    let mut wrote_header = false;

    for hunk in diff
        .unified_diff()
        .context_radius(config.context_lines)
        .iter_hunks()
    {
        if !wrote_header {
            let old_header = format!("--- {old_label}");
            let new_header = format!("+++ {new_label}");
            if config.colorize {
                writeln!(writer, "{}", old_header.red())?;
                writeln!(writer, "{}", new_header.green())?;
            } else {
                writeln!(writer, "{old_header}")?;
                writeln!(writer, "{new_header}")?;
            }
            wrote_header = true;
        }

        let header = hunk.header().to_string();
        if config.colorize {
            writeln!(writer, "{}", header.cyan())?;
        } else {
            writeln!(writer, "{header}")?;
        }

        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => {
                    changes += 1;
                    let line = format!("-{change}");
                    if config.colorize { line.red().to_string() } else { line }
                }
                ChangeTag::Insert => {
                    changes += 1;
                    let line = format!("+{change}");
                    if config.colorize { line.green().to_string() } else { line }
                }
                ChangeTag::Equal => format!(" {change}"),
            };
            write!(writer, "{line}")?;
            if change.missing_newline() {
                writeln!(writer)?;
                writeln!(writer, "\\ No newline at end of file")?;
            }
        }
    }

    debug!(changes, "diff written");
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(old: &str, new: &str) -> (String, usize) {
        let mut out = Vec::new();
        let changes = write_unified_diff(
            old,
            new,
            "repo/tags/all/etc/hosts",
            "/etc/hosts",
            &UnifiedDiffConfig::default(),
            &mut out,
        )
        .unwrap();
        (String::from_utf8(out).unwrap(), changes)
    }

    #[test]
    fn test_changed_line() {
        let (out, changes) = render("a\nb\nc\n", "a\nB\nc\n");
        assert_eq!(changes, 2);
        assert!(out.starts_with("--- repo/tags/all/etc/hosts\n+++ /etc/hosts\n"));
        assert!(out.contains("@@ -1,3 +1,3 @@"));
        assert!(out.contains("\n-b\n+B\n"));
    }

    #[test]
    fn test_equal_content_writes_nothing() {
        let (out, changes) = render("same\n", "same\n");
        assert_eq!(changes, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_newline_marker() {
        let (out, _) = render("a\n", "a\nb");
        assert!(out.contains("+b\n\\ No newline at end of file\n"));
    }
}
