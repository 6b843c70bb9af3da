use crate::CageContext;
use crate::output;
use crate::sync::SyncEngine;
use anyhow::Result;

/// Copy the selected entries from the target into the repository.
///
/// The manifest is written even when some entries failed, so the entries
/// that were saved keep their refreshed metadata.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or written or the
/// entry set cannot be resolved
pub fn execute(ctx: &CageContext, files: &[String]) -> Result<bool> {
    let mut manifest = super::load_manifest(ctx)?;
    let report = SyncEngine::new(ctx).save(&mut manifest, files)?;
    super::store_manifest(ctx, &manifest)?;

    output::report("saved", &report);
    Ok(!report.has_failures())
}
