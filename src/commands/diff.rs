use crate::CageContext;
use crate::diff::{UnifiedDiffConfig, render_entry};
use crate::output;
use crate::sync::{Outcome, SyncEngine};
use anyhow::{Context, Result};
use std::io::{self, IsTerminal, Write};

/// Print the differences between target and repository.
///
/// Returns `Ok(false)` if any entry differs or failed, like `diff(1)`.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded, the entry set cannot
/// be resolved, or the output cannot be written
pub fn execute(ctx: &CageContext, files: &[String]) -> Result<bool> {
    let manifest = super::load_manifest(ctx)?;
    let report = SyncEngine::new(ctx).diff(&manifest, files)?;

    let config = UnifiedDiffConfig {
        colorize: io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        ..UnifiedDiffConfig::default()
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for entry in &report.entries {
        if let Outcome::Differs(comparison) = &entry.outcome {
            let managed = manifest.entry(&entry.tag, &entry.path)?;
            render_entry(ctx, &entry.tag, managed, comparison, &config, &mut out)
                .with_context(|| format!("Failed to show differences of {}", entry.path))?;
        }
    }
    out.flush().context("Failed to write to stdout")?;

    output::report("checked", &report);
    Ok(!report.has_failures() && report.differing() == 0)
}
