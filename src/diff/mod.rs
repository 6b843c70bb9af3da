//! Rendering of differences between target objects and the repository.
//!
//! Each differing entry is shown as metadata lines (`mode 0o644 -> 0o640`,
//! repository value first) followed, for file content, by a unified diff
//! from the stored blob to the target file. Missing objects are shown as
//! `! <path> missing`.

/// Binary file detection
pub mod binary;
/// Unified diff generation for text files
pub mod unified;

pub use binary::is_binary;
pub use unified::{UnifiedDiffConfig, write_unified_diff};

use crate::CageContext;
use crate::compare::{Comparison, Difference};
use crate::error::{IoResultExt, Result};
use crate::manifest::Entry;
use chrono::{Local, TimeZone};
use colored::Colorize;
use std::fs;
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// `---`/`+++` label: the path plus its modification time
fn label(path: &Path) -> String {
    let modified = fs::metadata(path)
        .ok()
        .and_then(|m| Local.timestamp_opt(m.mtime(), 0).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());
    match modified {
        Some(date) => format!("{}\t{date}", path.display()),
        None => path.display().to_string(),
    }
}

/// `-` for unmanaged values
fn unset(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Write the differences of one entry of `tag`.
///
/// # Errors
///
/// Returns an error if a file cannot be read or writing fails
pub fn render_entry(
    ctx: &CageContext,
    tag: &str,
    entry: &Entry,
    comparison: &Comparison,
    config: &UnifiedDiffConfig,
    writer: &mut dyn Write,
) -> Result<()> {
    let target = ctx.target_path(&entry.path);
    let blob = ctx.blob_path(tag, &entry.path);
    let stdout = Path::new("-");
    let io = |e: std::io::Error| crate::error::CageError::from_io(stdout, e);

    let missing = |writer: &mut dyn Write, path: &Path| {
        let line = format!("! {} missing", path.display());
        if config.colorize {
            writeln!(writer, "{}", line.yellow())
        } else {
            writeln!(writer, "{line}")
        }
    };
    if comparison.has(Difference::MissingInRepo) {
        missing(writer, &blob).map_err(io)?;
    }
    if comparison.has(Difference::MissingInTarget) {
        missing(writer, &target).map_err(io)?;
    }

    let Some(actual) = comparison.target.as_ref() else {
        return Ok(());
    };
    let mut changes: Vec<(&str, String, String)> = Vec::new();
    for difference in comparison.iter() {
        match difference {
            Difference::TypeMismatch => {
                changes.push(("type", entry.kind.to_string(), actual.kind.to_string()));
            }
            Difference::OwnerDiffers => changes.push((
                "owner",
                unset(entry.owner.as_deref()).to_string(),
                actual.owner.clone(),
            )),
            Difference::GroupDiffers => changes.push((
                "group",
                unset(entry.group.as_deref()).to_string(),
                actual.group.clone(),
            )),
            Difference::ModeDiffers => changes.push((
                "mode",
                entry.mode.map_or_else(|| "-".to_string(), |m| m.to_string()),
                actual.mode.to_string(),
            )),
            Difference::LinkTargetDiffers => changes.push((
                "link target",
                unset(entry.target.as_deref()).to_string(),
                unset(actual.link_target.as_deref()).to_string(),
            )),
            Difference::MissingInTarget
            | Difference::MissingInRepo
            | Difference::ContentDiffers => {}
        }
    }
    for (what, repo, found) in changes {
        let line = format!("{}: {what} {repo} -> {found}", target.display());
        if config.colorize {
            writeln!(writer, "{}", line.bold()).map_err(io)?;
        } else {
            writeln!(writer, "{line}").map_err(io)?;
        }
    }

    if comparison.has(Difference::ContentDiffers) {
        let old = fs::read(&blob).at(&blob)?;
        let new = fs::read(&target).at(&target)?;
        if is_binary(&old) || is_binary(&new) {
            writeln!(
                writer,
                "Binary files {} and {} differ",
                blob.display(),
                target.display()
            )
            .map_err(io)?;
        } else {
            write_unified_diff(
                &String::from_utf8_lossy(&old),
                &String::from_utf8_lossy(&new),
                &label(&blob),
                &label(&target),
                config,
                writer,
            )
            .map_err(io)?;
        }
    }
    Ok(())
}
