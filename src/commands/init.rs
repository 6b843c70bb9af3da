use crate::CageContext;
use crate::manifest::{DEFAULT_TAG, Manifest};
use crate::output;
use anyhow::{Context, Result, bail};

/// Create a manifest for the current host with the default tag.
///
/// # Errors
///
/// Returns an error if the manifest already exists or cannot be written
pub fn execute(ctx: &CageContext) -> Result<bool> {
    if ctx.manifest_path.exists() {
        bail!("Manifest {} already exists", ctx.manifest_path.display());
    }
    if let Some(dir) = ctx.manifest_path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let manifest = Manifest::initial(&ctx.hostname);
    super::store_manifest(ctx, &manifest)?;

    output::success(&format!(
        "Initialized {} for host {} with tag {DEFAULT_TAG}",
        ctx.manifest_path.display(),
        ctx.hostname
    ));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{TEST_HOST, TestCage};

    #[test]
    fn test_init_creates_manifest() {
        let cage = TestCage::new();
        assert!(execute(&cage.ctx).unwrap());

        let manifest = cage.manifest();
        assert_eq!(manifest.host(TEST_HOST).unwrap().tags, vec!["all"]);
        assert!(manifest.tag("all").unwrap().entries.is_empty());
    }

    #[test]
    fn test_init_refuses_existing_manifest() {
        let cage = TestCage::with_manifest("tags: {}\n");
        let err = execute(&cage.ctx).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(
            std::fs::read_to_string(&cage.manifest_path).unwrap(),
            "tags: {}\n"
        );
    }
}
