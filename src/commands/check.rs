use crate::CageContext;
use crate::error::CageError;
use crate::manifest::Manifest;
use crate::output;
use anyhow::Result;

/// Validate the manifest: entry definitions, host tag references and hook names.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read at all
pub fn execute(ctx: &CageContext) -> Result<bool> {
    let manifest = match Manifest::load(&ctx.manifest_path) {
        Ok(manifest) => manifest,
        Err(e @ CageError::Validation(_)) => {
            output::error(&e.to_string());
            return Ok(false);
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!(
                "Failed to load manifest {}",
                ctx.manifest_path.display()
            )));
        }
    };

    let problems = manifest.check();
    for problem in &problems {
        output::warning(problem);
    }
    if problems.is_empty() {
        let entries: usize = manifest.tags.values().map(|t| t.entries.len()).sum();
        output::success(&format!(
            "{}: {} hosts, {} tags, {entries} entries",
            ctx.manifest_path.display(),
            manifest.hosts.len(),
            manifest.tags.len()
        ));
    }
    Ok(problems.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::TestCage;

    #[test]
    fn test_clean_manifest() {
        let cage = TestCage::with_manifest("hosts:\n  h:\n    tags: [all]\ntags:\n  all: {}\n");
        assert!(execute(&cage.ctx).unwrap());
    }

    #[test]
    fn test_dangling_tag_reference() {
        let cage = TestCage::with_manifest("hosts:\n  h:\n    tags: [all, gone]\ntags:\n  all: {}\n");
        assert!(!execute(&cage.ctx).unwrap());
    }

    #[test]
    fn test_invalid_entry() {
        let cage = TestCage::with_manifest("tags:\n  all:\n    entries:\n      l:\n        type: link\n");
        assert!(!execute(&cage.ctx).unwrap());
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        let cage = TestCage::new();
        assert!(execute(&cage.ctx).is_err());
    }
}
