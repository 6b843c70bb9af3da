#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]
#![allow(clippy::indexing_slicing)] // Bounds checked by logic

//! # Hamstercage - Tagged Configuration File Manager
//!
//! Hamstercage keeps configuration files of many hosts in one repository.
//! A YAML manifest lists every managed file, directory and symlink together
//! with its owner, group and permissions; entries are grouped into tags and
//! hosts pick the tags that apply to them.
//!
//! ## Architecture
//!
//! - [`manifest`]: hosts, tags, entries and their YAML form
//! - [`compare`]: what differs between a target object and the repository
//! - [`sync`]: `save`, `apply`, `add`, `remove` and `diff` over a set of entries
//! - [`hooks`]: pre/post hooks defined on tags
//! - [`commands`]: command implementations behind the CLI
//! - [`output`]: user-facing status lines
//!
//! ## Example Usage
//!
//! ```no_run
//! use hamstercage::CageContext;
//! use hamstercage::manifest::Manifest;
//! use hamstercage::sync::SyncEngine;
//!
//! # fn main() -> anyhow::Result<()> {
//! let ctx = CageContext::new("/".into(), "/srv/cage/hamstercage.yaml".into(), None, None)?;
//! let manifest = Manifest::load(&ctx.manifest_path)?;
//!
//! let report = SyncEngine::new(&ctx).apply(&manifest, &[])?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

/// Command-line interface definitions (argument parsing structures).
pub mod cli;

/// Command implementations behind the CLI.
pub mod commands;

/// Comparison of target objects with their repository representation.
pub mod compare;

/// Rendering of differences between target and repository.
pub mod diff;

/// Error taxonomy.
pub mod error;

/// Hook dispatch.
pub mod hooks;

/// Manifest model: hosts, tags and entries.
pub mod manifest;

/// Output formatting.
pub mod output;

/// The sync engine.
pub mod sync;

/// Utility functions and helpers.
pub mod utils;

/// Fixtures shared by unit tests.
#[cfg(test)]
pub mod test_utils;

use error::{CageError, Result};
use hooks::{HookCommand, HookContext, HookPolicy, Step, TagSummary};
use std::path::{Path, PathBuf};

/// Current version of the hamstercage binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default manifest file name.
pub const DEFAULT_MANIFEST_FILE: &str = "hamstercage.yaml";

/// Directory below the repository base holding one directory per tag.
pub const TAGS_DIR: &str = "tags";

/// Where things are: the target tree, the manifest and the repository,
/// plus the host and tags a command works on.
///
/// Built once from the command line and passed to everything that touches
/// the filesystem.
///
/// # Examples
///
/// ```
/// use hamstercage::CageContext;
/// use std::path::Path;
///
/// # fn main() -> hamstercage::error::Result<()> {
/// let ctx = CageContext::new(
///     "/".into(),
///     "/srv/cage/hamstercage.yaml".into(),
///     None,
///     Some("web1.example.com".into()),
/// )?;
/// assert_eq!(ctx.repo, Path::new("/srv/cage"));
/// assert_eq!(
///     ctx.blob_path("all", "etc/profile"),
///     Path::new("/srv/cage/tags/all/etc/profile")
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CageContext {
    /// Root of the tree entry paths are relative to, usually `/`.
    pub target: PathBuf,

    /// Path of the manifest file.
    pub manifest_path: PathBuf,

    /// Repository base directory; blobs live below `<repo>/tags`.
    pub repo: PathBuf,

    /// Name of the host the command runs for.
    pub hostname: String,

    /// Tags selected on the command line; empty means the host's tags.
    pub tags: Vec<String>,

    /// What a failing hook does to the rest of the run.
    pub hook_policy: HookPolicy,
}

impl CageContext {
    /// Creates a context. The repository defaults to the manifest's
    /// directory, the hostname to the name of this machine.
    ///
    /// # Errors
    ///
    /// Returns a validation error if no hostname is given and the system
    /// hostname cannot be determined.
    pub fn new(
        target: PathBuf,
        manifest_path: PathBuf,
        repo: Option<PathBuf>,
        hostname: Option<String>,
    ) -> Result<Self> {
        let repo = repo.unwrap_or_else(|| match manifest_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        });
        let hostname = match hostname {
            Some(name) => name,
            None => utils::hostname().ok_or_else(|| {
                CageError::Validation("unable to determine hostname, use --hostname".to_string())
            })?,
        };

        Ok(Self {
            target,
            manifest_path,
            repo,
            hostname,
            tags: Vec::new(),
            hook_policy: HookPolicy::default(),
        })
    }

    /// Restricts the context to the given tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the hook failure policy.
    #[must_use]
    pub const fn with_hook_policy(mut self, policy: HookPolicy) -> Self {
        self.hook_policy = policy;
        self
    }

    /// Directory holding one directory of blobs per tag.
    #[must_use]
    pub fn storage_root(&self) -> PathBuf {
        self.repo.join(TAGS_DIR)
    }

    /// Blob directory of `tag`.
    #[must_use]
    pub fn tag_storage(&self, tag: &str) -> PathBuf {
        self.storage_root().join(tag)
    }

    /// Where the content of file entry `path` of `tag` is stored.
    #[must_use]
    pub fn blob_path(&self, tag: &str, path: &str) -> PathBuf {
        utils::path_as_child_of(&self.tag_storage(tag), path)
    }

    /// Location of entry `path` in the target tree.
    #[must_use]
    pub fn target_path(&self, path: &str) -> PathBuf {
        utils::path_as_child_of(&self.target, path)
    }

    /// Converts a path given by the user to an entry path.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty paths and paths leaving the target.
    pub fn normalize(&self, input: &str) -> Result<String> {
        utils::normalize_target_path(input, &self.target)
    }

    /// Hook context for running `step` of `command` for `tag`.
    #[must_use]
    pub fn hook_context<'a>(
        &'a self,
        command: HookCommand,
        step: Step,
        tag: &'a TagSummary,
    ) -> HookContext<'a> {
        HookContext {
            manifest_path: &self.manifest_path,
            repo: &self.repo,
            command,
            step,
            tag,
        }
    }

    /// Directory containing the manifest.
    #[must_use]
    pub fn manifest_dir(&self) -> &Path {
        match self.manifest_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}
