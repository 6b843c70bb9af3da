use crate::CageContext;
use crate::output;
use crate::sync::SyncEngine;
use anyhow::{Result, bail};

/// Stop managing `paths` in `tag`. Target files are left alone.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or written or the tag
/// is unknown
pub fn execute(ctx: &CageContext, tag: &str, paths: &[String], purge: bool) -> Result<bool> {
    if paths.is_empty() {
        bail!("Need at least one file to remove");
    }
    let mut manifest = super::load_manifest(ctx)?;
    let report = SyncEngine::new(ctx).remove(&mut manifest, tag, paths, purge)?;
    super::store_manifest(ctx, &manifest)?;

    output::report("removed", &report);
    Ok(!report.has_failures())
}
