use crate::CageContext;
use crate::manifest::validate_tag_name;
use crate::output;
use anyhow::{Result, bail};

/// Create an empty tag.
///
/// # Errors
///
/// Returns an error if the tag exists or the manifest cannot be read or written
pub fn execute(ctx: &CageContext, name: &str, description: Option<&str>) -> Result<bool> {
    validate_tag_name(name)?;
    let mut manifest = super::load_manifest(ctx)?;
    if !manifest.ensure_tag(name, description.unwrap_or_default()) {
        bail!("Tag {name} already exists");
    }
    super::store_manifest(ctx, &manifest)?;
    output::success(&format!("Created tag {name}"));
    Ok(true)
}
