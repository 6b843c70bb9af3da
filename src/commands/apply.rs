use crate::CageContext;
use crate::output;
use crate::sync::SyncEngine;
use anyhow::Result;

/// Write the selected entries from the repository to the target.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or the entry set cannot
/// be resolved
pub fn execute(ctx: &CageContext, files: &[String]) -> Result<bool> {
    let manifest = super::load_manifest(ctx)?;
    let report = SyncEngine::new(ctx).apply(&manifest, files)?;
    output::report("applied", &report);
    Ok(!report.has_failures())
}
