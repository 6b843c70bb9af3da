use crate::CageContext;
use crate::output;
use crate::sync::SyncEngine;
use anyhow::{Result, bail};

/// Start managing `paths` in `tag`, creating the tag if needed.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or written, the tag name
/// is invalid, or a path is already managed in the tag and `force` is not set
pub fn execute(ctx: &CageContext, tag: &str, paths: &[String], force: bool) -> Result<bool> {
    if paths.is_empty() {
        bail!("Need at least one file to add");
    }
    let mut manifest = super::load_manifest(ctx)?;
    let report = SyncEngine::new(ctx).add(&mut manifest, tag, paths, force)?;
    super::store_manifest(ctx, &manifest)?;

    output::report("added", &report);
    Ok(!report.has_failures())
}
