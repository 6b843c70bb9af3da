use crate::CageContext;
use crate::compare::{Comparison, Difference, compare};
use crate::manifest::{Entry, EntryKind, Manifest};
use crate::output;
use crate::sync::{Resolution, resolve_entries};
use crate::utils::formatters::{Align, format_mode, format_short_date, write_table};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::io::{self, Write};
use std::path::PathBuf;

/// Column alignment of the long format
const LONG_ALIGN: [Align; 8] = [
    Align::Left,
    Align::Left,
    Align::Left,
    Align::Left,
    Align::Right,
    Align::Right,
    Align::Left,
    Align::Left,
];

/// List managed entries as target paths, or as a table with `long`.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded, the entry set cannot
/// be resolved, or the output cannot be written
pub fn execute(ctx: &CageContext, files: &[String], long: bool, tabs: bool) -> Result<bool> {
    let manifest = super::load_manifest(ctx)?;
    let resolution = resolve_entries(&manifest, ctx, files)?;
    for message in &resolution.warnings {
        output::warning(&format!("warning: {message}"));
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = if long {
        let rows = long_rows(ctx, &manifest, &resolution, Local::now())?;
        write_table(&rows, &LONG_ALIGN, tabs, &mut out)
    } else {
        let mut paths: Vec<PathBuf> = resolution
            .iter()
            .map(|(_, path)| ctx.target_path(path))
            .collect();
        paths.sort();
        paths
            .iter()
            .try_for_each(|path| writeln!(out, "{}", path.display()))
    };
    written.context("Failed to write to stdout")?;
    Ok(true)
}

/// ` ` when in sync, `!` when a side is missing, `*` when they differ
fn status(comparison: &crate::error::Result<Comparison>) -> &'static str {
    match comparison {
        Err(_) => "?",
        Ok(c) if c.has(Difference::MissingInTarget) || c.has(Difference::MissingInRepo) => "!",
        Ok(c) if !c.is_identical() => "*",
        Ok(_) => " ",
    }
}

/// One table row per selected entry, sorted by target path
fn long_rows(
    ctx: &CageContext,
    manifest: &Manifest,
    resolution: &Resolution,
    now: DateTime<Local>,
) -> Result<Vec<Vec<String>>> {
    let mut selected: Vec<(PathBuf, &str, &Entry)> = Vec::with_capacity(resolution.len());
    for (tag, path) in resolution.iter() {
        selected.push((ctx.target_path(path), tag, manifest.entry(tag, path)?));
    }
    selected.sort_by(|a, b| a.0.cmp(&b.0));

    let rows = selected
        .into_iter()
        .map(|(target, tag, entry)| {
            let comparison = compare(entry, &ctx.target, &ctx.tag_storage(tag));
            let found = comparison.as_ref().ok().and_then(|c| c.target.as_ref());

            let kind = found.map_or(entry.kind, |f| f.kind);
            let mode = found
                .map(|f| f.mode)
                .or(entry.mode)
                .map_or(0, |m| m.bits());
            let owner = found
                .map(|f| f.owner.clone())
                .or_else(|| entry.owner.clone())
                .unwrap_or_else(|| "-".to_string());
            let group = found
                .map(|f| f.group.clone())
                .or_else(|| entry.group.clone())
                .unwrap_or_else(|| "-".to_string());
            let size = found.map_or_else(|| "-".to_string(), |f| f.size.to_string());
            let date = found.map_or_else(|| "-".to_string(), |f| format_short_date(f.modified, now));

            let mut name = target.display().to_string();
            match entry.kind {
                EntryKind::Dir => name.push('/'),
                EntryKind::Link => {
                    if let Some(link) = &entry.target {
                        name.push_str(" -> ");
                        name.push_str(link);
                    }
                }
                EntryKind::File => {}
            }

            vec![
                status(&comparison).to_string(),
                format_mode(kind.type_char(), mode),
                owner,
                group,
                size,
                date,
                tag.to_string(),
                name,
            ]
        })
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::TestCage;

    const MANIFEST: &str = "\
hosts:
  test.example.com:
    tags: [all]
tags:
  all:
    entries:
      etc/motd:
        type: file
        mode: '0o644'
      etc/gone:
        type: file
        mode: '0o600'
      etc/conf.d:
        type: dir
        mode: '0o755'
      etc/localtime:
        type: link
        target: /usr/share/zoneinfo/UTC
";

    #[test]
    fn test_long_rows() {
        let cage = TestCage::with_manifest(MANIFEST);
        cage.write_blob("all", "etc/motd", "hello\n");
        cage.write_target("etc/motd", "changed\n");
        cage.write_blob("all", "etc/gone", "x\n");

        let manifest = cage.manifest();
        let resolution = resolve_entries(&manifest, &cage.ctx, &[]).unwrap();
        let rows = long_rows(&cage.ctx, &manifest, &resolution, Local::now()).unwrap();
        assert_eq!(rows.len(), 4);

        let name = |path: &str| cage.target.join(path).display().to_string();
        let row = |suffix: &str| {
            rows.iter()
                .find(|r| r[7].ends_with(suffix))
                .unwrap()
                .clone()
        };

        let motd = row("etc/motd");
        assert_eq!(motd[0], "*");
        assert_eq!(motd[1], "-rw-r--r--");
        assert_eq!(motd[4], "8");
        assert_eq!(motd[6], "all");

        let gone = row("etc/gone");
        assert_eq!(gone[0], "!");
        assert_eq!(gone[1], "-rw-------");
        assert_eq!(gone[5], "-");

        assert_eq!(row("etc/conf.d/")[7], format!("{}/", name("etc/conf.d")));
        assert_eq!(
            row("UTC")[7],
            format!("{} -> /usr/share/zoneinfo/UTC", name("etc/localtime"))
        );

        // sorted by target path
        let names: Vec<&str> = rows.iter().map(|r| r[7].as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
