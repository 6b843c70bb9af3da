//! One module per subcommand.
//!
//! Every `execute` returns `Ok(true)` when the run was clean and `Ok(false)`
//! when it finished but something failed or differed; `main` maps the
//! latter to exit status 1.

/// `add`: start managing files
pub mod add;
/// `apply`: repository to target
pub mod apply;
/// `check`: manifest validation
pub mod check;
/// `diff`: show differences
pub mod diff;
/// `init`: new manifest
pub mod init;
/// `list`: managed files
pub mod list;
/// `remove`: stop managing files
pub mod remove;
/// `save`: target to repository
pub mod save;
/// `tag`: create a tag
pub mod tag;

use crate::CageContext;
use crate::manifest::Manifest;
use anyhow::{Context, Result};

/// Load the manifest named by the context.
pub(crate) fn load_manifest(ctx: &CageContext) -> Result<Manifest> {
    Manifest::load(&ctx.manifest_path)
        .with_context(|| format!("Failed to load manifest {}", ctx.manifest_path.display()))
}

/// Persist the manifest if the command changed it.
pub(crate) fn store_manifest(ctx: &CageContext, manifest: &Manifest) -> Result<()> {
    if !manifest.is_dirty() {
        return Ok(());
    }
    manifest
        .save(&ctx.manifest_path)
        .with_context(|| format!("Failed to write manifest {}", ctx.manifest_path.display()))
}
